use clap::Args;
use serde_json::json;
use uuid::Uuid;

use crate::auth::TokenVerifier;
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::config::config;

#[derive(Args)]
pub struct TokenArgs {
    #[arg(long, help = "Tenant id the token is bound to")]
    pub tenant: i64,

    #[arg(long, help = "Principal id (random when omitted)")]
    pub user: Option<Uuid>,

    #[arg(long = "permission", short = 'p', help = "Permission to grant; repeatable")]
    pub permissions: Vec<String>,
}

pub fn handle(args: TokenArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let verifier = TokenVerifier::from_config(&config().security)?;
    let user_id = args.user.unwrap_or_else(Uuid::new_v4);
    let token = verifier.issue(user_id, args.tenant, args.permissions.clone())?;

    match output_format {
        OutputFormat::Text => {
            println!("{}", token);
            Ok(())
        }
        OutputFormat::Json => output_success(
            &output_format,
            "Token issued",
            Some(json!({
                "token": token,
                "user_id": user_id,
                "tenant_id": args.tenant,
                "permissions": args.permissions,
            })),
        ),
    }
}
