// src/app_state/models.rs
use crate::db::postgres::postgres_service::PostgresService;
use crate::env_config::models::app_setting::AppSettings;

use std::sync::Arc;

pub struct AppState {
    pub settings: Arc<AppSettings>,
    pub postgres_service: Arc<PostgresService>,
}

impl AppState {
    pub fn new(settings: Arc<AppSettings>, postgres_service: Arc<PostgresService>) -> Self {
        Self {
            settings,
            postgres_service,
        }
    }
}
