use serde::{Deserialize, Serialize};

use stockroom_core::{BranchId, StockError, StockResult};

/// A warehouse branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    /// Default receiving location and default unassign destination.
    pub is_main: bool,
}

/// Authoritative list of branches.
///
/// Invariants held after every successful mutation:
/// - names are non-empty and unique (compared trimmed, case-insensitively)
/// - exactly one branch is main once at least one branch is registered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchRegistry {
    branches: Vec<Branch>,
}

impl BranchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from pre-existing branches (configuration or database).
    ///
    /// When no branch is flagged main, the first one becomes main. More than
    /// one flagged main branch is rejected.
    pub fn from_branches(branches: impl IntoIterator<Item = Branch>) -> StockResult<Self> {
        let mut registry = Self::new();
        let mut main = None;

        for branch in branches {
            if branch.is_main {
                if let Some(existing) = main {
                    return Err(StockError::invalid(format!(
                        "more than one main branch (first: {existing}, second: {})",
                        branch.id
                    )));
                }
                main = Some(branch.id);
            }
            registry.insert(branch.id, &branch.name)?;
        }

        if let Some(id) = main {
            registry.set_main(id)?;
        }

        Ok(registry)
    }

    /// Register a new branch with a fresh identifier.
    pub fn register(&mut self, name: &str, main: bool) -> StockResult<Branch> {
        let id = BranchId::new();
        self.insert(id, name)?;
        if main {
            self.set_main(id)?;
        }
        self.ensure_known(id).cloned()
    }

    fn insert(&mut self, id: BranchId, name: &str) -> StockResult<()> {
        let name = Self::validate_name(name)?;
        if self.contains(id) {
            return Err(StockError::invalid(format!("branch {id} already registered")));
        }
        if self.by_name(&name).is_some() {
            return Err(StockError::invalid(format!("branch name '{name}' already in use")));
        }

        // First branch in becomes main until told otherwise.
        let is_main = self.branches.is_empty();
        self.branches.push(Branch { id, name, is_main });
        Ok(())
    }

    pub fn rename(&mut self, id: BranchId, name: &str) -> StockResult<()> {
        let name = Self::validate_name(name)?;
        if let Some(other) = self.by_name(&name) {
            if other.id != id {
                return Err(StockError::invalid(format!("branch name '{name}' already in use")));
            }
        }

        let branch = self
            .branches
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| StockError::invalid(format!("unknown branch {id}")))?;
        branch.name = name;
        Ok(())
    }

    /// Move the main flag to `id`.
    pub fn set_main(&mut self, id: BranchId) -> StockResult<()> {
        self.ensure_known(id)?;
        for branch in &mut self.branches {
            branch.is_main = branch.id == id;
        }
        Ok(())
    }

    pub fn main(&self) -> Option<&Branch> {
        self.branches.iter().find(|b| b.is_main)
    }

    pub fn main_id(&self) -> StockResult<BranchId> {
        self.main()
            .map(|b| b.id)
            .ok_or_else(|| StockError::invalid("no main branch registered"))
    }

    pub fn get(&self, id: BranchId) -> Option<&Branch> {
        self.branches.iter().find(|b| b.id == id)
    }

    /// Lookup by name, trimmed and compared with full Unicode lowercasing
    /// (matches the `lower(name)` unique index in Postgres).
    pub fn by_name(&self, name: &str) -> Option<&Branch> {
        let needle = Self::fold(name);
        self.branches.iter().find(|b| Self::fold(&b.name) == needle)
    }

    pub fn contains(&self, id: BranchId) -> bool {
        self.get(id).is_some()
    }

    pub fn ensure_known(&self, id: BranchId) -> StockResult<&Branch> {
        self.get(id)
            .ok_or_else(|| StockError::invalid(format!("unknown branch {id}")))
    }

    /// All branches ordered by name.
    pub fn list(&self) -> Vec<Branch> {
        let mut out = self.branches.clone();
        out.sort_by_cached_key(|b| (Self::fold(&b.name), b.name.clone()));
        out
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    fn fold(name: &str) -> String {
        name.trim().to_lowercase()
    }

    fn validate_name(name: &str) -> StockResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StockError::invalid("branch name cannot be empty"));
        }
        Ok(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(name: &str, is_main: bool) -> Branch {
        Branch {
            id: BranchId::new(),
            name: name.to_string(),
            is_main,
        }
    }

    #[test]
    fn first_registered_branch_becomes_main() {
        let mut registry = BranchRegistry::new();
        let a = registry.register("cucuta", false).unwrap();
        let b = registry.register("bogota", false).unwrap();

        assert!(registry.get(a.id).unwrap().is_main);
        assert!(!registry.get(b.id).unwrap().is_main);
        assert_eq!(registry.main_id().unwrap(), a.id);
    }

    #[test]
    fn registering_with_main_moves_the_flag() {
        let mut registry = BranchRegistry::new();
        let a = registry.register("cucuta", false).unwrap();
        let b = registry.register("bogota", true).unwrap();

        assert_eq!(registry.main_id().unwrap(), b.id);
        assert!(!registry.get(a.id).unwrap().is_main);
        assert_eq!(registry.list().iter().filter(|b| b.is_main).count(), 1);
    }

    #[test]
    fn duplicate_and_empty_names_are_rejected() {
        let mut registry = BranchRegistry::new();
        registry.register("Cucuta", false).unwrap();

        assert!(matches!(
            registry.register("  cucuta ", false),
            Err(StockError::InvalidArgument(_))
        ));
        assert!(matches!(
            registry.register("   ", false),
            Err(StockError::InvalidArgument(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn names_compare_with_unicode_case_folding() {
        let mut registry = BranchRegistry::new();
        let bogota = registry.register("Bogotá", false).unwrap();
        let other = registry.register("Medellín", false).unwrap();

        assert!(matches!(
            registry.register("BOGOTÁ", false),
            Err(StockError::InvalidArgument(_))
        ));
        assert!(matches!(
            registry.rename(other.id, " bogotá "),
            Err(StockError::InvalidArgument(_))
        ));
        assert_eq!(registry.by_name("bogotá").unwrap().id, bogota.id);

        // Renaming a branch to a different casing of its own name is allowed.
        registry.rename(bogota.id, "BOGOTÁ").unwrap();
        assert_eq!(registry.get(bogota.id).unwrap().name, "BOGOTÁ");
    }

    #[test]
    fn list_orders_names_without_regard_to_case() {
        let mut registry = BranchRegistry::new();
        registry.register("Zeta", false).unwrap();
        registry.register("bogota", false).unwrap();
        registry.register("Cali", false).unwrap();

        let names: Vec<String> = registry.list().into_iter().map(|b| b.name).collect();
        assert_eq!(names, ["bogota", "Cali", "Zeta"]);
    }

    #[test]
    fn from_branches_honours_flag_and_rejects_two_mains() {
        let a = branch("a", false);
        let b = branch("b", true);
        let registry = BranchRegistry::from_branches(vec![a.clone(), b.clone()]).unwrap();
        assert_eq!(registry.main_id().unwrap(), b.id);

        let err = BranchRegistry::from_branches(vec![branch("x", true), branch("y", true)]).unwrap_err();
        assert!(matches!(err, StockError::InvalidArgument(_)));
    }

    #[test]
    fn rename_keeps_identity_and_main_flag() {
        let mut registry = BranchRegistry::new();
        let a = registry.register("old", false).unwrap();
        registry.register("other", false).unwrap();

        registry.rename(a.id, "new").unwrap();
        let renamed = registry.get(a.id).unwrap();
        assert_eq!(renamed.name, "new");
        assert!(renamed.is_main);

        assert!(registry.rename(a.id, "other").is_err());
        assert!(registry.rename(BranchId::new(), "ghost").is_err());
    }

    #[test]
    fn empty_registry_has_no_main() {
        let registry = BranchRegistry::new();
        assert!(registry.main().is_none());
        assert!(matches!(registry.main_id(), Err(StockError::InvalidArgument(_))));
    }
}
