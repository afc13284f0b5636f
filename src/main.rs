use std::{net::SocketAddr, sync::Arc};

use payroll_engine::api::{AppState, create_router};
use payroll_engine::calculation::CalculationEngine;
use payroll_engine::config::{ConfigLoader, Settings};
use payroll_engine::lifecycle::PayrollLifecycle;
use payroll_engine::store::{
    InMemoryPayrollInfo, InMemoryPeriodStore, PayrollInfoSource, PeriodStore, SqliteStore,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .init();

    let loader = ConfigLoader::load(&settings.config_dir).map_err(|error| {
        error!(config_dir = %settings.config_dir, %error, "failed to load payroll configuration");
        error
    })?;
    let engine = CalculationEngine::new(loader.config().clone());

    let (store, payroll_info): (Arc<dyn PeriodStore>, Arc<dyn PayrollInfoSource>) =
        match &settings.database_url {
            Some(database_url) => {
                let sqlite = Arc::new(SqliteStore::connect(database_url).await.map_err(|error| {
                    error!(%database_url, %error, "failed to open SQLite database");
                    error
                })?);
                info!(%database_url, "using SQLite store");
                let store: Arc<dyn PeriodStore> = sqlite.clone();
                let payroll_info: Arc<dyn PayrollInfoSource> = sqlite;
                (store, payroll_info)
            }
            None => {
                warn!("PAYROLL_DATABASE_URL not set; data will not survive a restart");
                let store: Arc<dyn PeriodStore> = Arc::new(InMemoryPeriodStore::new());
                let payroll_info: Arc<dyn PayrollInfoSource> = Arc::new(InMemoryPayrollInfo::new());
                (store, payroll_info)
            }
        };

    let lifecycle = PayrollLifecycle::new(store, payroll_info, engine);
    let recovered = lifecycle.recover_interrupted().await?;
    if recovered > 0 {
        warn!(recovered, "reset periods left calculating by a previous run");
    }

    let app = create_router(AppState::new(lifecycle));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "payroll engine listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
