//! Registry of subscription plans and the modules they grant.
//!
//! The catalog is validated once when it is built and then shared
//! read-only for the life of the process.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::models::plan::{ModuleDefinition, PlanType, SubscriptionPlan};

pub mod defaults;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Duplicate catalog entry '{0}'")]
    Duplicate(String),

    #[error("Module '{module}' depends on unknown module '{dependency}'")]
    UnknownDependency { module: String, dependency: String },

    #[error("Plan '{plan}' enables unknown module '{module}'")]
    UnknownModule { plan: String, module: String },

    #[error("Plan '{plan}' enables '{module}' without its dependency '{dependency}'")]
    MissingDependency {
        plan: String,
        module: String,
        dependency: String,
    },

    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid catalog file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to load catalog from store: {0}")]
    Store(String),
}

/// On-disk catalog layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub modules: Vec<ModuleDefinition>,
    pub plans: Vec<SubscriptionPlan>,
}

#[derive(Debug, Clone)]
pub struct PlanCatalog {
    modules: BTreeMap<String, ModuleDefinition>,
    plans: BTreeMap<PlanType, SubscriptionPlan>,
}

impl PlanCatalog {
    /// Built-in modules and plans. Validated by the unit tests below.
    pub fn defaults() -> Self {
        Self {
            modules: defaults::modules().into_iter().map(|m| (m.name.clone(), m)).collect(),
            plans: defaults::plans().into_iter().map(|p| (p.plan_type, p)).collect(),
        }
    }

    /// Build a catalog, rejecting any plan whose module set is not closed
    /// under module dependencies.
    pub fn from_parts(modules: Vec<ModuleDefinition>, plans: Vec<SubscriptionPlan>) -> Result<Self, CatalogError> {
        let mut by_name = BTreeMap::new();
        for module in modules {
            if by_name.contains_key(&module.name) {
                return Err(CatalogError::Duplicate(module.name));
            }
            by_name.insert(module.name.clone(), module);
        }

        for module in by_name.values() {
            if let Some(dep) = module.dependencies.iter().find(|d| !by_name.contains_key(*d)) {
                return Err(CatalogError::UnknownDependency {
                    module: module.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        let mut by_type = BTreeMap::new();
        for plan in plans {
            if by_type.contains_key(&plan.plan_type) {
                return Err(CatalogError::Duplicate(plan.plan_type.to_string()));
            }
            for name in &plan.enabled_modules {
                let module = by_name.get(name).ok_or_else(|| CatalogError::UnknownModule {
                    plan: plan.name.clone(),
                    module: name.clone(),
                })?;
                if let Some(dep) = module.dependencies.iter().find(|d| !plan.enabled_modules.contains(*d)) {
                    return Err(CatalogError::MissingDependency {
                        plan: plan.name.clone(),
                        module: name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            by_type.insert(plan.plan_type, plan);
        }

        Ok(Self {
            modules: by_name,
            plans: by_type,
        })
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(source)?;
        Self::from_parts(file.modules, file.plans)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&source)
    }

    /// Active plan of the given type. Inactive plans cannot be assigned.
    pub fn plan(&self, plan_type: PlanType) -> Option<&SubscriptionPlan> {
        self.plans.get(&plan_type).filter(|p| p.is_active)
    }

    pub fn active_plans(&self) -> Vec<&SubscriptionPlan> {
        let mut plans: Vec<_> = self.plans.values().filter(|p| p.is_active).collect();
        plans.sort_by_key(|p| p.sort_order);
        plans
    }

    pub fn all_plans(&self) -> impl Iterator<Item = &SubscriptionPlan> {
        self.plans.values()
    }

    pub fn module(&self, name: &str) -> Option<&ModuleDefinition> {
        self.modules.get(name)
    }

    pub fn modules(&self) -> Vec<&ModuleDefinition> {
        let mut modules: Vec<_> = self.modules.values().collect();
        modules.sort_by_key(|m| m.sort_order);
        modules
    }

    /// Definitions for `names` in catalog order. Unknown names are skipped.
    pub fn modules_for(&self, names: &BTreeSet<String>) -> Vec<&ModuleDefinition> {
        let mut modules: Vec<_> = names.iter().filter_map(|n| self.modules.get(n)).collect();
        modules.sort_by_key(|m| m.sort_order);
        modules
    }

    /// Modules in `granted` whose dependencies are not also granted.
    pub fn unsatisfied_dependencies(&self, granted: &BTreeSet<String>) -> Vec<(String, String)> {
        granted
            .iter()
            .filter_map(|name| self.modules.get(name))
            .flat_map(|m| {
                m.dependencies
                    .iter()
                    .filter(|d| !granted.contains(*d))
                    .map(move |d| (m.name.clone(), d.clone()))
            })
            .collect()
    }

    pub fn into_file(self) -> CatalogFile {
        CatalogFile {
            modules: self.modules.into_values().collect(),
            plans: self.plans.into_values().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_matches_published_plans() {
        let catalog = PlanCatalog::defaults();
        let free = catalog.plan(PlanType::Free).unwrap();
        assert_eq!(free.quotas.max_employees, 10);
        assert_eq!(free.trial_days, 0);

        let basic = catalog.plan(PlanType::Basic).unwrap();
        assert_eq!(basic.trial_days, 14);
        assert!(!basic.includes_module("payroll"));

        let enterprise = catalog.plan(PlanType::Enterprise).unwrap();
        assert_eq!(enterprise.quotas.max_employees, 1000);
        assert_eq!(enterprise.enabled_modules.len(), 10);
        assert!(catalog.plan(PlanType::Custom).is_none());
    }

    #[test]
    fn built_in_catalog_passes_validation() {
        PlanCatalog::from_parts(defaults::modules(), defaults::plans()).unwrap();
    }

    #[test]
    fn every_default_plan_is_dependency_closed() {
        let catalog = PlanCatalog::defaults();
        for plan in catalog.active_plans() {
            assert!(catalog.unsatisfied_dependencies(&plan.enabled_modules).is_empty(), "{}", plan.name);
        }
    }

    #[test]
    fn rejects_plan_missing_a_dependency() {
        let mut plans = defaults::plans();
        plans[1].enabled_modules.remove("employees");

        let err = PlanCatalog::from_parts(defaults::modules(), plans).unwrap_err();
        assert!(matches!(err, CatalogError::MissingDependency { ref dependency, .. } if dependency == "employees"));
    }

    #[test]
    fn rejects_unknown_module_and_duplicates() {
        let mut plans = defaults::plans();
        plans[1].enabled_modules.insert("teleportation".to_string());
        assert!(matches!(
            PlanCatalog::from_parts(defaults::modules(), plans),
            Err(CatalogError::UnknownModule { .. })
        ));

        let mut modules = defaults::modules();
        modules.push(modules[0].clone());
        assert!(matches!(
            PlanCatalog::from_parts(modules, defaults::plans()),
            Err(CatalogError::Duplicate(_))
        ));
    }

    #[test]
    fn inactive_plans_are_not_assignable() {
        let mut plans = defaults::plans();
        plans[1].is_active = false;
        let catalog = PlanCatalog::from_parts(defaults::modules(), plans).unwrap();

        assert!(catalog.plan(PlanType::Basic).is_none());
        assert_eq!(catalog.active_plans().len(), 3);
    }

    #[test]
    fn loads_yaml_catalog() {
        let yaml = r#"
modules:
  - name: core
    display_name: Core
  - name: employees
    display_name: Employees
    dependencies: [core]
plans:
  - name: Starter
    plan_type: custom
    max_users: 2
    max_employees: 5
    max_storage_gb: 1
    enabled_modules: [core, employees]
    trial_days: 7
"#;
        let catalog = PlanCatalog::from_yaml_str(yaml).unwrap();
        let plan = catalog.plan(PlanType::Custom).unwrap();
        assert_eq!(plan.quotas.max_employees, 5);
        assert_eq!(catalog.modules_for(&plan.enabled_modules)[0].name, "core");
    }
}
