use chrono::Utc;
use clap::Subcommand;
use serde_json::json;

use crate::cli::context::ControlPlane;
use crate::cli::utils::*;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum TrialCommands {
    #[command(about = "Expire every trial whose end date has passed")]
    Expire,
}

pub async fn handle(cmd: TrialCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TrialCommands::Expire => {
            let plane = ControlPlane::connect().await?;
            let expired = plane.service.expire_trials(Utc::now()).await;
            plane.shutdown().await;
            let expired = expired?;

            let slugs: Vec<&str> = expired.iter().map(|t| t.slug.as_str()).collect();
            if let OutputFormat::Text = output_format {
                for slug in &slugs {
                    println!("expired {}", slug);
                }
            }
            output_success(
                &output_format,
                &format!("{} trial(s) expired", expired.len()),
                Some(json!({ "expired": slugs })),
            )
        }
    }
}
