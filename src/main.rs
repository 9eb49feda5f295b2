use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use patota_club::{
    adapters::database::sqlite::SqliteDatabase, cli::Cli, commands::DomainLogic,
    config::AppConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::init();
    let config = AppConfig::from_env();

    // Command output goes to stdout, logs stay on stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .with_writer(std::io::stderr)
        .init();

    let database = Arc::new(SqliteDatabase::connect(&config.database_url).await?);
    tracing::debug!(url = %config.database_url, "database ready");

    let domain = DomainLogic::new(database.clone(), database, config.club);
    cli.run(&domain).await
}
