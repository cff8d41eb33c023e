use clap::Args;
use serde_json::json;

use crate::catalog::PlanCatalog;
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::config::config;
use crate::database::bootstrap::{bootstrap, seed_catalog};
use crate::database::DatabaseManager;

#[derive(Args)]
pub struct InitArgs {
    #[arg(long, help = "Seed from this YAML catalog instead of the built-in one")]
    pub catalog: Option<std::path::PathBuf>,
}

pub async fn handle(args: InitArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = config();
    let database_url = DatabaseManager::database_url_from_env()?;
    let db = DatabaseManager::connect(&database_url, &config.database).await?;

    bootstrap(db.main_pool()).await?;

    let catalog = match args.catalog.as_deref().or(config.tenancy.catalog_path.as_deref()) {
        Some(path) => PlanCatalog::from_yaml_file(path)?,
        None => PlanCatalog::defaults(),
    };
    let report = seed_catalog(db.main_pool(), &catalog).await?;
    db.close().await;

    output_success(
        &output_format,
        &format!(
            "Shared area ready ({} modules and {} plans added)",
            report.modules_inserted, report.plans_inserted
        ),
        Some(json!({
            "modules_inserted": report.modules_inserted,
            "plans_inserted": report.plans_inserted,
        })),
    )
}
