use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;

use crate::database::models::plan::{ModuleDefinition, PlanType, Quotas, SubscriptionPlan};

struct ModuleSeed {
    name: &'static str,
    display_name: &'static str,
    description: &'static str,
    dependencies: &'static [&'static str],
    permissions: &'static [&'static str],
    features: &'static [&'static str],
}

const MODULES: &[ModuleSeed] = &[
    ModuleSeed {
        name: "core",
        display_name: "Core System",
        description: "Basic system functionality and user management",
        dependencies: &[],
        permissions: &["users:read", "users:write", "profile:read", "profile:write"],
        features: &["user_management", "profile_management", "basic_reporting"],
    },
    ModuleSeed {
        name: "employees",
        display_name: "Employee Management",
        description: "Comprehensive employee lifecycle management",
        dependencies: &["core"],
        permissions: &["employees:read", "employees:write", "employees:delete", "employees:approve"],
        features: &["employee_records", "onboarding", "offboarding", "employee_directory"],
    },
    ModuleSeed {
        name: "departments",
        display_name: "Department Management",
        description: "Organizational structure and department management",
        dependencies: &["core"],
        permissions: &["departments:read", "departments:write", "departments:delete"],
        features: &["org_chart", "department_hierarchy", "headcount_planning"],
    },
    ModuleSeed {
        name: "leave",
        display_name: "Leave Management",
        description: "Leave requests, approvals, and calendar management",
        dependencies: &["employees"],
        permissions: &["leave:read", "leave:write", "leave:approve", "leave:delete"],
        features: &["leave_requests", "leave_calendar", "leave_balances", "approval_workflows"],
    },
    ModuleSeed {
        name: "attendance",
        display_name: "Attendance Tracking",
        description: "Time tracking, attendance monitoring, and reporting",
        dependencies: &["employees"],
        permissions: &["attendance:read", "attendance:write", "attendance:approve"],
        features: &["time_tracking", "attendance_reports", "overtime_management"],
    },
    ModuleSeed {
        name: "payroll",
        display_name: "Payroll Management",
        description: "Salary processing, tax calculations, and payroll reports",
        dependencies: &["employees"],
        permissions: &["payroll:read", "payroll:write", "payroll:approve"],
        features: &["salary_processing", "tax_calculations", "payroll_reports"],
    },
    ModuleSeed {
        name: "performance",
        display_name: "Performance Management",
        description: "Performance reviews, goal setting, and feedback systems",
        dependencies: &["employees"],
        permissions: &["performance:read", "performance:write", "performance:approve"],
        features: &["performance_reviews", "goal_management", "feedback_system"],
    },
    ModuleSeed {
        name: "recruitment",
        display_name: "Recruitment & Hiring",
        description: "Job posting, candidate management, and hiring workflows",
        dependencies: &["core"],
        permissions: &["recruitment:read", "recruitment:write", "recruitment:approve"],
        features: &["job_postings", "candidate_tracking", "interview_scheduling"],
    },
    ModuleSeed {
        name: "training",
        display_name: "Training & Development",
        description: "Training programs, skill development, and certifications",
        dependencies: &["employees"],
        permissions: &["training:read", "training:write", "training:approve"],
        features: &["training_programs", "skill_assessments", "certification_tracking"],
    },
    ModuleSeed {
        name: "documents",
        display_name: "Document Management",
        description: "Document storage, version control, and compliance",
        dependencies: &["core"],
        permissions: &["documents:read", "documents:write", "documents:delete"],
        features: &["document_storage", "version_control", "compliance_tracking"],
    },
];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn modules() -> Vec<ModuleDefinition> {
    MODULES
        .iter()
        .enumerate()
        .map(|(i, seed)| ModuleDefinition {
            name: seed.name.to_string(),
            display_name: seed.display_name.to_string(),
            description: Some(seed.description.to_string()),
            is_core: seed.name == "core",
            dependencies: strings(seed.dependencies),
            permissions: strings(seed.permissions),
            features: strings(seed.features),
            sort_order: i as i32,
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn plan(
    name: &str,
    plan_type: PlanType,
    description: &str,
    prices: (i64, i64),
    quotas: (i32, i32, i32),
    modules: &[&str],
    flags: &[&str],
    trial_days: u32,
    support_tier: &str,
) -> SubscriptionPlan {
    SubscriptionPlan {
        name: name.to_string(),
        plan_type,
        description: Some(description.to_string()),
        is_active: true,
        sort_order: 0,
        monthly_price: Decimal::from(prices.0),
        yearly_price: Decimal::from(prices.1),
        currency: "USD".to_string(),
        quotas: Quotas {
            max_users: quotas.0,
            max_employees: quotas.1,
            max_storage_gb: quotas.2,
        },
        enabled_modules: modules.iter().map(|m| m.to_string()).collect::<BTreeSet<_>>(),
        feature_flags: flags.iter().map(|f| (f.to_string(), true)).collect::<BTreeMap<_, _>>(),
        trial_days,
        support_tier: support_tier.to_string(),
    }
}

pub fn plans() -> Vec<SubscriptionPlan> {
    let mut plans = vec![
        plan(
            "Free",
            PlanType::Free,
            "Basic HRMS functionality for small teams",
            (0, 0),
            (3, 10, 1),
            &["core", "employees", "departments"],
            &[],
            0,
            "community",
        ),
        plan(
            "Basic",
            PlanType::Basic,
            "Essential HR tools for growing businesses",
            (29, 290),
            (10, 50, 5),
            &["core", "employees", "departments", "leave", "attendance"],
            &[],
            14,
            "email",
        ),
        plan(
            "Professional",
            PlanType::Professional,
            "Complete HR solution for established companies",
            (79, 790),
            (25, 200, 20),
            &["core", "employees", "departments", "leave", "attendance", "payroll", "performance"],
            &["advanced_reporting"],
            14,
            "priority",
        ),
        plan(
            "Enterprise",
            PlanType::Enterprise,
            "Advanced HRMS with custom features and dedicated support",
            (199, 1990),
            (100, 1000, 100),
            &[
                "core",
                "employees",
                "departments",
                "leave",
                "attendance",
                "payroll",
                "performance",
                "recruitment",
                "training",
                "documents",
            ],
            &["advanced_reporting", "api_access", "sso"],
            30,
            "dedicated",
        ),
    ];
    for (i, plan) in plans.iter_mut().enumerate() {
        plan.sort_order = i as i32;
    }
    plans
}
