use std::time::Duration;

use crate::Result;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers::{ContainerAsync, GenericImage};
use typed_builder::TypedBuilder;

const CONNECT_ATTEMPTS: usize = 20;
const CONNECT_BACKOFF: Duration = Duration::from_millis(500);

#[derive(TypedBuilder)]
pub struct MysqlConfig {
    #[builder(default = "linkhop".to_string())]
    database: String,
    #[builder(default = "linkhop".to_string())]
    username: String,
    #[builder(default = "linkhop".to_string())]
    password: String,
    #[builder(default = "8.4".to_string())]
    tag: String,
}

/// Test fixture for a disposable MySQL server.
pub struct MySqlServer {
    container: ContainerAsync<GenericImage>,
    config: MysqlConfig,
}

impl MySqlServer {
    /// Starts a MySQL container suitable for integration tests.
    pub async fn new(config: MysqlConfig) -> Result<Self> {
        let container = GenericImage::new("mysql", config.tag.as_str())
            .with_exposed_port(3306_u16.tcp())
            .with_wait_for(WaitFor::message_on_stderr("ready for connections"))
            .with_env_var("MYSQL_DATABASE", config.database.as_str())
            .with_env_var("MYSQL_USER", config.username.as_str())
            .with_env_var("MYSQL_PASSWORD", config.password.as_str())
            .with_env_var("MYSQL_ROOT_PASSWORD", "root")
            .start()
            .await?;

        Ok(Self { container, config })
    }

    /// DSN reachable from the host running the tests.
    pub async fn database_url(&self) -> Result<String> {
        let host = self.container.get_host().await?;
        let port = self.container.get_host_port_ipv4(3306).await?;
        let MysqlConfig {
            database,
            username,
            password,
            ..
        } = &self.config;

        Ok(format!("mysql://{username}:{password}@{host}:{port}/{database}"))
    }

    /// Opens a pool, retrying while the server finishes its first boot.
    ///
    /// MySQL logs "ready for connections" once for the temporary init server
    /// too, so the first attempts can be refused.
    pub async fn connect(&self) -> Result<MySqlPool> {
        let url = self.database_url().await?;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match MySqlPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await
            {
                Ok(pool) => return Ok(pool),
                Err(err) if attempt >= CONNECT_ATTEMPTS => return Err(err.into()),
                Err(_) => tokio::time::sleep(CONNECT_BACKOFF).await,
            }
        }
    }
}
