pub mod error;
pub mod token_manager;

pub use error::AuthError;
pub use token_manager::{TokenInfo, TokenManager, TokenManagerBuilder};
