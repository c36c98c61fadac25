use crate::db::postgres::{
    connection::PostgresConnection,
    repository::snapshot_repository::{StructSnapshotRepository, TraitSnapshotRepository},
};
use crate::env_config::models::app_setting::AppSettings;
use std::sync::Arc;
use tracing::{error, info};

pub struct PostgresService {
    pub connection: Arc<PostgresConnection>,

    pub repository_snapshot: Arc<dyn TraitSnapshotRepository + Send + Sync>,
}

impl PostgresService {
    pub async fn new(settings: &Arc<AppSettings>) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing PostgreSQL service components");

        let postgres_connection =
            match PostgresConnection::new(&settings.app_env, &settings.app_config.postgres).await {
                Ok(conn) => {
                    info!("PostgreSQL connection established successfully");
                    Arc::new(conn)
                }
                Err(e) => {
                    error!("Failed to establish PostgreSQL connection: {}", e);
                    return Err(Box::new(e));
                }
            };

        let snapshot_repository = Arc::new(StructSnapshotRepository::new(
            postgres_connection.clone(),
            &settings.app_config.scraper.table_name,
        )) as Arc<dyn TraitSnapshotRepository + Send + Sync>;

        info!("PostgreSQL service initialized successfully");
        Ok(Self {
            connection: postgres_connection,
            repository_snapshot: snapshot_repository,
        })
    }
}
