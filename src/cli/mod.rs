pub mod commands;
pub mod context;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "orgctl")]
#[command(about = "orgctl - operator tooling for the orgplane tenant control plane")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Prepare the shared area and seed the plan catalog")]
    Init(commands::init::InitArgs),

    #[command(about = "List subscription plans")]
    Plans,

    #[command(about = "Tenant lifecycle management")]
    Tenant {
        #[command(subcommand)]
        cmd: commands::tenant::TenantCommands,
    },

    #[command(about = "Tenant partition maintenance")]
    Partitions {
        #[command(subcommand)]
        cmd: commands::partitions::PartitionCommands,
    },

    #[command(about = "Trial maintenance")]
    Trials {
        #[command(subcommand)]
        cmd: commands::trials::TrialCommands,
    },

    #[command(about = "Mint a signed access token")]
    Token(commands::token::TokenArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Init(args) => commands::init::handle(args, output_format).await,
        Commands::Plans => commands::plans::handle(output_format).await,
        Commands::Tenant { cmd } => commands::tenant::handle(cmd, output_format).await,
        Commands::Partitions { cmd } => commands::partitions::handle(cmd, output_format).await,
        Commands::Trials { cmd } => commands::trials::handle(cmd, output_format).await,
        Commands::Token(args) => commands::token::handle(args, output_format),
    }
}
