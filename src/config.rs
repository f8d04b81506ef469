//! Process configuration

use std::env;
use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "MOBILEYARD_DB_PATH";
pub const ENV_TOKEN_SECRET: &str = "MOBILEYARD_TOKEN_SECRET";

const DEFAULT_DB_PATH: &str = "mobileyard.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub token_secret: String,
}

impl Config {
    /// Read configuration from the environment, `.env` entries included.
    /// The database path has a default; the token secret does not.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let db_path = match env::var(ENV_DB_PATH) {
            Ok(path) => PathBuf::from(path),
            Err(_) => {
                log::info!("{ENV_DB_PATH} not set; using ./{DEFAULT_DB_PATH}");
                PathBuf::from(DEFAULT_DB_PATH)
            }
        };

        let token_secret = env::var(ENV_TOKEN_SECRET)
            .map_err(|_| anyhow::anyhow!("{ENV_TOKEN_SECRET} is not set"))?;
        if token_secret.trim().is_empty() {
            anyhow::bail!("{ENV_TOKEN_SECRET} is empty");
        }

        Ok(Self {
            db_path,
            token_secret,
        })
    }
}
