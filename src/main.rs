mod app_state;
mod browser;
mod db;
mod env_config;
mod logger;
mod services;

use app_state::models::AppState;
use browser::{session::SessionFactory, webdriver::WebDriverFactory};
use chrono::Utc;
use db::postgres::postgres_service::PostgresService;
use env_config::models::{app_config::AppConfig, app_env::AppEnv, app_setting::AppSettings};
use services::snapshots::{coordinator::SnapshotCoordinator, export};
use std::{process, sync::Arc, time::Duration};
use tokio::signal;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    // Инициализация приложения
    let settings: Arc<AppSettings> = Arc::new(initialize_application());

    // Подключение к базе данных
    let postgres_service = initialize_database_connection(settings.clone()).await;

    // Создание глобального состояния приложения
    let app_state = AppState::new(settings.clone(), Arc::new(postgres_service));

    let exit_code = run_ingestion(&app_state).await;

    app_state.postgres_service.connection.close().await;
    info!("Snapshot ingestor finished with exit code {}", exit_code);
    process::exit(exit_code);
}

/// Инициализирует настройки и логирование приложения
fn initialize_application() -> AppSettings {
    // Загрузка переменных окружения и конфигурации
    let environment = AppEnv::new();
    let config = AppConfig::new(&environment.env);
    let app_settings = AppSettings {
        app_config: config,
        app_env: environment,
    };

    // Настройка логирования с уровнем и форматом из конфигурации
    logger::init_logger(
        &app_settings.app_config.log.level,
        &app_settings.app_config.log.format,
        app_settings.app_env.is_local(),
    )
    .expect("Failed to initialize logger");

    info!("Starting Snapshot Ingestor...");
    info!("Current environment: {}", app_settings.app_env.env);

    // Подробный вывод конфигурации только в режиме разработки
    if app_settings.app_env.is_local() {
        info!("Running in local development mode");
        debug!("Configuration details: {:#?}", app_settings.app_config);
    } else {
        info!("Running in production mode");
    }

    app_settings
}

/// Устанавливает соединение с PostgreSQL
async fn initialize_database_connection(settings: Arc<AppSettings>) -> PostgresService {
    info!("Initializing database connection...");

    match PostgresService::new(&settings).await {
        Ok(service) => service,
        Err(err) => {
            error!("Failed to connect to PostgreSQL: {}", err);
            panic!("Cannot continue without PostgreSQL connection");
        }
    }
}

/// Догоняет временной ряд снимков и выгружает таблицу в CSV.
/// Возвращает код завершения процесса.
async fn run_ingestion(app_state: &AppState) -> i32 {
    let settings = &app_state.settings;
    let webdriver = &settings.app_config.webdriver;

    let sessions: Arc<dyn SessionFactory> = match WebDriverFactory::new(
        &settings.app_env.webdriver_url,
        &webdriver.browser_name,
        &webdriver.browser_args,
        Duration::from_secs(webdriver.request_timeout_secs),
    ) {
        Ok(factory) => Arc::new(factory),
        Err(err) => {
            error!("Failed to build WebDriver client: {}", err);
            return 1;
        }
    };
    info!("Using WebDriver endpoint {}", settings.app_env.webdriver_url);

    let mut coordinator = SnapshotCoordinator::from_app_state(app_state, sessions);

    // Ctrl-C прерывает текущую дату; зафиксированные снимки остаются в базе
    let shutdown = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    };

    let summary = match coordinator.run(|| Utc::now().date_naive(), shutdown).await {
        Ok(summary) => summary,
        Err(err) => {
            error!("Ingestion stopped: {}", err);
            return 1;
        }
    };

    info!(
        "Run complete: {} snapshots, {} rows inserted, {} rows skipped, {} retries, {} session restarts, {} watchdog restarts",
        summary.snapshots,
        summary.rows_inserted,
        summary.rows_skipped,
        summary.retries,
        summary.session_restarts,
        summary.watchdog_restarts
    );

    if summary.interrupted {
        warn!("Interrupted before catching up, skipping CSV export");
        return 130;
    }

    match export::export_table(
        app_state.postgres_service.repository_snapshot.as_ref(),
        &settings.app_config.export,
        &settings.app_config.scraper.table_name,
        Utc::now().date_naive(),
    )
    .await
    {
        Ok(Some(path)) => info!("CSV export written to {}", path.display()),
        Ok(None) => {}
        Err(err) => {
            error!("CSV export failed: {}", err);
            return 1;
        }
    }

    0
}
