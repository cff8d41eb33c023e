use clap::Subcommand;
use serde_json::json;

use crate::cli::context::ControlPlane;
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::config::config;
use crate::database::models::plan::PlanType;
use crate::database::models::principal::AdminPrincipal;
use crate::database::models::tenant::{Tenant, TenantProfile, TenantStatus};
use crate::database::{PageRequest, TenantFilter};
use crate::services::{TenantError, TenantService, UsageReport};

/// Operator identity recorded on plan changes made from the command line.
const CLI_INITIATOR: &str = "orgctl";

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "List tenants")]
    List {
        #[arg(long, help = "Only tenants in this status")]
        status: Option<TenantStatus>,
        #[arg(long, help = "Only tenants on this plan")]
        plan: Option<PlanType>,
        #[arg(long, help = "Match name, slug or contact email")]
        search: Option<String>,
        #[arg(long, help = "Include soft-deleted tenants")]
        include_deleted: bool,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        size: Option<u32>,
    },

    #[command(about = "Show tenant details")]
    Show {
        #[arg(help = "Tenant id or slug")]
        tenant: String,
    },

    #[command(about = "Create a tenant, its partition and its admin principal")]
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        slug: String,
        #[arg(long)]
        contact_email: String,
        #[arg(long)]
        company_name: Option<String>,
        #[arg(long)]
        industry: Option<String>,
        #[arg(long, help = "Plan type (defaults to the configured plan)")]
        plan: Option<PlanType>,
        #[arg(long)]
        admin_username: String,
        #[arg(long)]
        admin_email: String,
        #[arg(long, help = "Pre-computed credential hash for the admin")]
        admin_credential_hash: String,
        #[arg(long, default_value = "Admin")]
        admin_first_name: String,
        #[arg(long, default_value = "User")]
        admin_last_name: String,
    },

    #[command(about = "Change a tenant's plan")]
    Subscribe {
        #[arg(help = "Tenant id or slug")]
        tenant: String,
        #[arg(help = "New plan type")]
        plan: PlanType,
        #[arg(long)]
        reason: Option<String>,
    },

    #[command(about = "Suspend a tenant")]
    Suspend {
        #[arg(help = "Tenant id or slug")]
        tenant: String,
        #[arg(long)]
        reason: Option<String>,
    },

    #[command(about = "Reactivate a tenant")]
    Activate {
        #[arg(help = "Tenant id or slug")]
        tenant: String,
    },

    #[command(about = "Cancel a tenant's subscription")]
    Cancel {
        #[arg(help = "Tenant id or slug")]
        tenant: String,
        #[arg(long)]
        reason: Option<String>,
    },

    #[command(about = "Show quota usage")]
    Usage {
        #[arg(help = "Tenant id or slug")]
        tenant: String,
    },

    #[command(about = "Show subscription history")]
    History {
        #[arg(help = "Tenant id or slug")]
        tenant: String,
    },

    #[command(about = "Soft-delete a tenant and close its connections")]
    Delete {
        #[arg(help = "Tenant id or slug")]
        tenant: String,
    },

    #[command(about = "Restore a soft-deleted tenant")]
    Restore {
        #[arg(help = "Tenant id or slug")]
        tenant: String,
    },
}

pub async fn handle(cmd: TenantCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let plane = ControlPlane::connect().await?;
    let result = dispatch(&plane.service, cmd, &output_format).await;
    plane.shutdown().await;
    result
}

async fn dispatch(service: &TenantService, cmd: TenantCommands, output_format: &OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TenantCommands::List {
            status,
            plan,
            search,
            include_deleted,
            page,
            size,
        } => {
            let api = &config().api;
            let request = PageRequest::new(page, size.unwrap_or(api.default_page_size), api.max_page_size)
                .map_err(anyhow::Error::msg)?;
            let filter = TenantFilter {
                status,
                plan,
                search,
                include_deleted,
            };
            let page = service.list_tenants(&filter, request).await?;

            if page.items.is_empty() {
                return output_empty_collection(output_format, "tenants", "No tenants found");
            }
            match output_format {
                OutputFormat::Json => output_json("tenants", &page)?,
                OutputFormat::Text => {
                    println!(
                        "{:<6} {:<24} {:<28} {:<10} {:<14} {}",
                        "ID", "SLUG", "NAME", "STATUS", "PLAN", "CREATED"
                    );
                    println!("{}", "-".repeat(100));
                    for tenant in &page.items {
                        let deleted = if tenant.is_deleted() { " (deleted)" } else { "" };
                        println!(
                            "{:<6} {:<24} {:<28} {:<10} {:<14} {}{}",
                            tenant.id,
                            tenant.slug,
                            tenant.name,
                            tenant.status,
                            tenant.plan,
                            tenant.created_at.format("%Y-%m-%d %H:%M"),
                            deleted
                        );
                    }
                    println!("\npage {} of {} ({} tenants)", page.page, page.pages, page.total);
                }
            }
            Ok(())
        }
        TenantCommands::Show { tenant } => {
            let tenant = resolve(service, &tenant).await?;
            match output_format {
                OutputFormat::Json => output_json("tenant", &tenant),
                OutputFormat::Text => {
                    print_tenant(&tenant);
                    Ok(())
                }
            }
        }
        TenantCommands::Create {
            name,
            slug,
            contact_email,
            company_name,
            industry,
            plan,
            admin_username,
            admin_email,
            admin_credential_hash,
            admin_first_name,
            admin_last_name,
        } => {
            let profile = TenantProfile {
                name,
                slug,
                contact_email,
                company_name,
                industry,
                ..TenantProfile::default()
            };
            let admin = AdminPrincipal {
                username: admin_username,
                email: admin_email,
                credential_hash: admin_credential_hash,
                first_name: admin_first_name,
                last_name: admin_last_name,
            };
            let plan = plan.unwrap_or(config().tenancy.default_plan);
            let provisioned = service.create_tenant(profile, admin, plan).await?;

            output_success(
                output_format,
                &format!(
                    "Tenant '{}' created (id {}, {} on {})",
                    provisioned.tenant.slug, provisioned.tenant.id, provisioned.tenant.status, provisioned.tenant.plan
                ),
                Some(json!({
                    "tenant": provisioned.tenant,
                    "admin": provisioned.admin,
                    "roles": provisioned.roles,
                })),
            )
        }
        TenantCommands::Subscribe { tenant, plan, reason } => {
            let tenant = resolve(service, &tenant).await?;
            let update = service
                .update_subscription(tenant.id, plan, reason, Some(CLI_INITIATOR.to_string()))
                .await?;
            output_success(
                output_format,
                &format!(
                    "Tenant '{}' moved from {} to {}",
                    update.tenant.slug, update.history.old_plan, update.history.new_plan
                ),
                Some(json!({ "tenant": update.tenant, "history": update.history })),
            )
        }
        TenantCommands::Suspend { tenant, reason } => {
            let tenant = resolve(service, &tenant).await?;
            let tenant = service.suspend(tenant.id, reason).await?;
            report_status(output_format, &tenant)
        }
        TenantCommands::Activate { tenant } => {
            let tenant = resolve(service, &tenant).await?;
            let tenant = service.activate(tenant.id).await?;
            report_status(output_format, &tenant)
        }
        TenantCommands::Cancel { tenant, reason } => {
            let tenant = resolve(service, &tenant).await?;
            let tenant = service.cancel(tenant.id, reason).await?;
            report_status(output_format, &tenant)
        }
        TenantCommands::Usage { tenant } => {
            let tenant = resolve(service, &tenant).await?;
            let report = service.get_usage(tenant.id).await?;
            match output_format {
                OutputFormat::Json => output_json("usage", &report),
                OutputFormat::Text => {
                    print_usage(&tenant.slug, &report);
                    Ok(())
                }
            }
        }
        TenantCommands::History { tenant } => {
            let tenant = resolve(service, &tenant).await?;
            let history = service.subscription_history(tenant.id).await?;
            if history.is_empty() {
                return output_empty_collection(output_format, "history", "No plan changes recorded");
            }
            match output_format {
                OutputFormat::Json => output_json("history", &history)?,
                OutputFormat::Text => {
                    println!("{:<20} {:<14} {:<14} {:<12} {}", "CHANGED", "FROM", "TO", "BY", "REASON");
                    println!("{}", "-".repeat(80));
                    for entry in &history {
                        println!(
                            "{:<20} {:<14} {:<14} {:<12} {}",
                            entry.changed_at.format("%Y-%m-%d %H:%M"),
                            entry.old_plan,
                            entry.new_plan,
                            or_dash(entry.initiated_by.as_deref()),
                            or_dash(entry.reason.as_deref())
                        );
                    }
                }
            }
            Ok(())
        }
        TenantCommands::Delete { tenant } => {
            let tenant = resolve(service, &tenant).await?;
            let tenant = service.deactivate(tenant.id).await?;
            output_success(
                output_format,
                &format!("Tenant '{}' deleted", tenant.slug),
                Some(json!({ "tenant": tenant })),
            )
        }
        TenantCommands::Restore { tenant } => {
            let tenant = resolve(service, &tenant).await?;
            let tenant = service.restore(tenant.id).await?;
            output_success(
                output_format,
                &format!("Tenant '{}' restored", tenant.slug),
                Some(json!({ "tenant": tenant })),
            )
        }
    }
}

/// Numeric arguments are ids, anything else is a slug.
async fn resolve(service: &TenantService, ident: &str) -> Result<Tenant, TenantError> {
    match ident.trim().parse::<i64>() {
        Ok(id) => service.get_tenant(id).await,
        Err(_) => service.get_tenant_by_slug(ident).await,
    }
}

fn report_status(output_format: &OutputFormat, tenant: &Tenant) -> anyhow::Result<()> {
    output_success(
        output_format,
        &format!("Tenant '{}' is now {}", tenant.slug, tenant.status),
        Some(json!({ "tenant": tenant })),
    )
}

fn print_tenant(tenant: &Tenant) {
    let modules: Vec<&str> = tenant.enabled_modules.iter().map(String::as_str).collect();
    print_fields(&[
        ("ID", tenant.id.to_string()),
        ("Name", tenant.name.clone()),
        ("Slug", tenant.slug.clone()),
        ("Contact", tenant.contact_email.clone()),
        ("Company", or_dash(tenant.company_name.as_deref())),
        ("Status", tenant.status.to_string()),
        ("Plan", tenant.plan.to_string()),
        ("Billing", tenant.billing_cycle.as_str().to_string()),
        ("Trial ends", or_dash(tenant.trial_ends_at.map(|t| t.format("%Y-%m-%d %H:%M")))),
        (
            "Subscription ends",
            or_dash(tenant.subscription_ends_at.map(|t| t.format("%Y-%m-%d %H:%M"))),
        ),
        ("Modules", modules.join(", ")),
        ("Created", tenant.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ("Deleted", or_dash(tenant.deleted_at.map(|t| t.format("%Y-%m-%d %H:%M")))),
    ]);
    if let Some(notes) = tenant.notes.as_deref().filter(|n| !n.is_empty()) {
        println!("\n{}", notes);
    }
}

fn print_usage(slug: &str, report: &UsageReport) {
    println!("Usage for '{}' ({} on {})", slug, report.status, report.plan);
    println!("{:<12} {:>12} {:>12} {:>8}", "RESOURCE", "CURRENT", "LIMIT", "USED %");
    println!("{}", "-".repeat(48));
    for (name, usage) in [
        ("users", &report.users),
        ("employees", &report.employees),
        ("storage_gb", &report.storage),
    ] {
        println!(
            "{:<12} {:>12} {:>12} {:>7.2}%",
            name, usage.current, usage.limit, usage.percentage
        );
    }
}
