mod accounting;
mod accounting_service;
mod config;
mod front;
mod migration;
pub mod models;
mod store;

use std::process;

use env_logger::Env;
use sqlx::postgres::PgPoolOptions;

use crate::{accounting_service::AccountingService, config::AppConfig, store::users};

#[tokio::main]
async fn main() {
    env_logger::init_from_env(Env::default().default_filter_or("restopos=info"));

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(err) => {
            log::error!("{}", err);
            process::exit(1);
        }
    };

    if let Err(err) = run(config).await {
        log::error!("{:#}", err);
        process::exit(1);
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    migration::migrate(&pool, &config.paths.migrations).await?;
    users::ensure_admin(&pool, &config.auth.bootstrap_admin_password).await?;

    let service = AccountingService::from_config(&config.accounting_service)?;
    match &service {
        Some(_) => log::info!("journals are posted to the accounting service at {}", config.accounting_service.url),
        None => log::info!("journals are posted to the local ledger"),
    }

    front::start_web_server(pool, config, service).await
}
