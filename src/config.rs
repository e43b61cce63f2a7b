use std::net::SocketAddr;

use clap::{Parser, ValueEnum};

use crate::connection::is_in_memory;

pub const DEFAULT_LOG_FILTER: &str = "pantry_api=info,warp=info";

const DEVELOPMENT_DATABASE_URL: &str = "sqlite://pantry.db";
const TESTING_DATABASE_URL: &str = "sqlite::memory:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Development,
    Testing,
    Production,
}

/// Runtime settings. Every option can also come from the environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "pantry-api", version, about = "Pantry management REST API")]
pub struct Config {
    #[arg(long, env = "PANTRY_ENV", value_enum, default_value = "development")]
    pub environment: Environment,

    /// Defaults to a file next to the binary, or an in-memory database when testing
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "PANTRY_BIND", default_value = "127.0.0.1:5000")]
    pub bind: SocketAddr,

    #[arg(long, env = "PANTRY_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,
}

impl Config {
    pub fn database_url(&self) -> String {
        match (&self.database_url, self.environment) {
            (Some(url), _) => url.clone(),
            (None, Environment::Testing) => TESTING_DATABASE_URL.to_owned(),
            (None, _) => DEVELOPMENT_DATABASE_URL.to_owned(),
        }
    }

    /// An in-memory database only exists on its one connection.
    pub fn max_connections(&self) -> u32 {
        if is_in_memory(&self.database_url()) {
            1
        } else {
            self.max_connections
        }
    }
}
