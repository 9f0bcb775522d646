use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use dotenvy::dotenv;

/// Server settings read from the environment.
///
/// `PERSIST_PATH` snapshots accounts, participation, assignments and
/// wishlists. Login sessions are held in memory only, so every user has to
/// log in again after a restart.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub persist_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // .env is optional outside development
        let _ = dotenv();

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            persist_path: env::var("PERSIST_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
