use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

const SANDBOX_OAUTH_URL: &str = "https://sandbox.safaricom.co.ke/oauth/v1/generate";
const PRODUCTION_OAUTH_URL: &str = "https://api.safaricom.co.ke/oauth/v1/generate";

/// Target deployment of the provider API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Sandbox,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Sandbox => "sandbox",
            Environment::Production => "production",
        }
    }

    /// Token endpoint for this environment, without query string.
    pub fn oauth_url(&self) -> &'static str {
        match self {
            Environment::Sandbox => SANDBOX_OAUTH_URL,
            Environment::Production => PRODUCTION_OAUTH_URL,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sandbox" => Ok(Environment::Sandbox),
            "production" => Ok(Environment::Production),
            other => Err(anyhow!("invalid environment '{}', use sandbox or production", other)),
        }
    }
}
