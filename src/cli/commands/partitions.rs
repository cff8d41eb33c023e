use clap::Subcommand;
use serde_json::json;

use crate::cli::context::ControlPlane;
use crate::cli::utils::*;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum PartitionCommands {
    #[command(about = "List partitions with no live tenant row (reported, never dropped)")]
    Orphans,
}

pub async fn handle(cmd: PartitionCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        PartitionCommands::Orphans => {
            let plane = ControlPlane::connect().await?;
            let orphans = plane.service.find_orphan_partitions().await;
            plane.shutdown().await;
            let orphans = orphans?;

            if orphans.is_empty() {
                return output_empty_collection(&output_format, "orphans", "No orphan partitions");
            }
            match output_format {
                OutputFormat::Json => {
                    let names: Vec<&str> = orphans.iter().map(|p| p.as_str()).collect();
                    println!("{}", serde_json::to_string_pretty(&json!({ "orphans": names }))?);
                }
                OutputFormat::Text => {
                    println!("{:<40} {}", "PARTITION", "SLUG");
                    println!("{}", "-".repeat(60));
                    for orphan in &orphans {
                        println!("{:<40} {}", orphan.as_str(), orphan.slug());
                    }
                }
            }
            Ok(())
        }
    }
}
