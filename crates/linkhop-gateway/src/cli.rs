use std::time::Duration;

use clap::Parser;
use linkhop_storage::{BackendConfig, MySqlBackendOptions};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::warn;

pub const SERVER_ADDRESS_ENV: &str = "SERVER_ADDRESS";
pub const BASE_URL_ENV: &str = "BASE_URL";
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";
pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const SESSION_SECRET_ENV: &str = "SESSION_SECRET";
pub const DELETION_QUEUE_CAPACITY_ENV: &str = "DELETION_QUEUE_CAPACITY";
pub const STORAGE_TIMEOUT_MS_ENV: &str = "STORAGE_TIMEOUT_MS";
pub const LOG_JSON_ENV: &str = "LOG_JSON";

pub const DEFAULT_SERVER_ADDRESS: &str = "localhost:8080";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_FILE_STORAGE_PATH: &str = "/tmp/short-url-db.json";

#[derive(Debug, Parser)]
#[command(name = "linkhop-gateway")]
pub struct CLI {
    /// Address the HTTP server listens on.
    #[arg(short = 'a', long, env = SERVER_ADDRESS_ENV, default_value = DEFAULT_SERVER_ADDRESS)]
    pub server_address: String,

    /// Prefix of every short URL handed out.
    #[arg(short = 'b', long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(short = 'l', long, env = LOG_LEVEL_ENV, default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// Append-only link log; an empty value keeps links in memory only.
    #[arg(
        short = 'f',
        long,
        env = FILE_STORAGE_PATH_ENV,
        default_value = DEFAULT_FILE_STORAGE_PATH
    )]
    pub file_storage_path: String,

    /// MySQL DSN; takes precedence over the file log when set.
    #[arg(short = 'd', long, env = DATABASE_DSN_ENV)]
    pub database_dsn: Option<String>,

    /// HMAC secret for session cookies. Random per process when unset.
    #[arg(long, env = SESSION_SECRET_ENV, hide_env_values = true)]
    pub session_secret: Option<String>,

    #[arg(long, env = DELETION_QUEUE_CAPACITY_ENV, default_value_t = 1024)]
    pub deletion_queue_capacity: usize,

    #[arg(long, env = STORAGE_TIMEOUT_MS_ENV, default_value_t = 3000)]
    pub storage_timeout_ms: u64,

    #[arg(long, env = LOG_JSON_ENV)]
    pub log_json: bool,
}

impl CLI {
    pub fn backend_config(&self) -> BackendConfig {
        let options = MySqlBackendOptions::builder()
            .statement_timeout(Duration::from_millis(self.storage_timeout_ms))
            .build();

        BackendConfig::from_options(
            self.database_dsn.as_deref(),
            Some(self.file_storage_path.as_str()),
            options,
        )
    }

    /// The configured secret, or a random one that dies with the process.
    pub fn session_secret(&self) -> String {
        match self.session_secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => secret.to_owned(),
            None => {
                warn!("session secret not configured, sessions will not survive a restart");
                rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(32)
                    .map(char::from)
                    .collect()
            }
        }
    }
}
