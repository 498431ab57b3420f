pub mod environment;
pub mod proc_loader;
pub mod proc_validator;
pub mod settings;

pub use environment::Environment;
pub use settings::{CacheConfig, CacheKind, Credentials, HttpConfig, LogFormat, LoggingConfig, SdkConfig};

impl SdkConfig {
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        proc_loader::file_to_config(path.as_ref())
    }

    pub fn from_env() -> anyhow::Result<Self> {
        proc_loader::env_to_config()
    }
}
