use crate::env_config::models::{app_config::PostgresConfig, app_env::AppEnv};
use sqlx::{Pool, Postgres, postgres::PgPoolOptions};
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct PostgresConnection {
    pool: Pool<Postgres>,
}

impl PostgresConnection {
    pub async fn new(env: &AppEnv, config: &PostgresConfig) -> Result<Self, sqlx::Error> {
        info!(
            "Connecting to PostgreSQL at {}/{}",
            env.postgres_host, env.postgres_database
        );

        let connection_string = format!(
            "postgres://{}:{}@{}/{}",
            env.postgres_user, env.postgres_password, env.postgres_host, env.postgres_database
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .max_lifetime(Duration::from_secs(config.max_lifetime))
            .idle_timeout(Duration::from_secs(config.idle_timeout))
            .acquire_timeout(Duration::from_secs(config.timeout))
            .connect(&connection_string)
            .await?;

        debug!("Executing test query on PostgreSQL");
        if let Err(e) = sqlx::query("SELECT 1").execute(&pool).await {
            error!("PostgreSQL test query failed: {}", e);
            return Err(e);
        }

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    /// Waits for in-flight queries and releases every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
    }
}
