use crate::cli::context::ControlPlane;
use crate::cli::utils::*;
use crate::cli::OutputFormat;

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let plane = ControlPlane::connect().await?;
    let plans = plane.service.list_plans();
    plane.shutdown().await;

    if plans.is_empty() {
        return output_empty_collection(&output_format, "plans", "No active plans");
    }

    match output_format {
        OutputFormat::Json => output_json("plans", &plans)?,
        OutputFormat::Text => {
            println!(
                "{:<14} {:<12} {:>10} {:>8} {:>10} {:>8} {:>6}  {}",
                "PLAN", "NAME", "MONTHLY", "USERS", "EMPLOYEES", "GB", "TRIAL", "MODULES"
            );
            println!("{}", "-".repeat(100));
            for plan in &plans {
                let modules: Vec<&str> = plan.enabled_modules.iter().map(String::as_str).collect();
                println!(
                    "{:<14} {:<12} {:>10} {:>8} {:>10} {:>8} {:>6}  {}",
                    plan.plan_type,
                    plan.name,
                    format!("{} {}", plan.monthly_price, plan.currency),
                    plan.quotas.max_users,
                    plan.quotas.max_employees,
                    plan.quotas.max_storage_gb,
                    plan.trial_days,
                    modules.join(",")
                );
            }
        }
    }
    Ok(())
}
