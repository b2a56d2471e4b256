//! Registered components and scope resolution

use crate::component::StoppableComponent;
use crate::error::StopError;
use crate::scope::StopScope;
use indexmap::IndexMap;

/// Components in registration order
#[derive(Debug, Default)]
pub(crate) struct ComponentRegistry {
    components: IndexMap<String, StoppableComponent>,
}

impl ComponentRegistry {
    pub(crate) fn insert(&mut self, component: StoppableComponent) {
        self.components.insert(component.name.clone(), component);
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<StoppableComponent> {
        self.components.shift_remove(name)
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.components.len()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.components.keys().cloned().collect()
    }

    /// Registered components among `names`, in registration order
    pub(crate) fn resolve(&self, names: &[String]) -> Vec<StoppableComponent> {
        self.components
            .values()
            .filter(|c| names.contains(&c.name))
            .cloned()
            .collect()
    }

    fn labelled(
        &self,
        targets: &[String],
        label: fn(&StoppableComponent) -> Option<&str>,
    ) -> Vec<StoppableComponent> {
        self.components
            .values()
            .filter(|c| label(c).is_some_and(|l| targets.iter().any(|t| t == l)))
            .cloned()
            .collect()
    }

    /// Components selected by a scope and its targets
    pub(crate) fn select(
        &self,
        scope: StopScope,
        targets: Option<&[String]>,
    ) -> Result<Vec<StoppableComponent>, StopError> {
        match (scope, targets) {
            (StopScope::Component, Some(names)) => {
                if let Some(unknown) = names.iter().find(|n| !self.contains(n)) {
                    return Err(StopError::UnknownComponent(unknown.clone()));
                }
                Ok(self.resolve(names))
            }
            (StopScope::Subsystem, Some(subsystems)) => {
                Ok(self.labelled(subsystems, StoppableComponent::subsystem))
            }
            (StopScope::Service, Some(services)) => Ok(self.labelled(services, StoppableComponent::service)),
            (StopScope::Component | StopScope::Subsystem, None) => {
                Err(StopError::MissingTargets(scope))
            }
            (StopScope::Service | StopScope::System | StopScope::Global, _) => {
                Ok(self.components.values().cloned().collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_test_utils::CallCounter;

    fn registry() -> ComponentRegistry {
        let counter = CallCounter::new();
        let mut registry = ComponentRegistry::default();
        registry.insert(
            StoppableComponent::new("api", counter.handler::<()>())
                .in_subsystem("frontend")
                .in_service("web"),
        );
        registry.insert(
            StoppableComponent::new("worker", counter.handler::<()>())
                .in_subsystem("jobs")
                .in_service("web"),
        );
        registry.insert(StoppableComponent::new("db", counter.handler::<()>()).in_subsystem("storage"));
        registry
    }

    fn names(selected: &[StoppableComponent]) -> Vec<&str> {
        selected.iter().map(StoppableComponent::name).collect()
    }

    #[test]
    fn component_scope_selects_exactly_the_targets() {
        let registry = registry();
        let selected = registry
            .select(StopScope::Component, Some(&["db".to_string()]))
            .unwrap();
        assert_eq!(names(&selected), vec!["db"]);
    }

    #[test]
    fn labels_select_subsystems_and_services() {
        let registry = registry();
        let jobs = registry
            .select(StopScope::Subsystem, Some(&["jobs".to_string(), "storage".to_string()]))
            .unwrap();
        assert_eq!(names(&jobs), vec!["worker", "db"]);

        let web = registry
            .select(StopScope::Service, Some(&["web".to_string()]))
            .unwrap();
        assert_eq!(names(&web), vec!["api", "worker"]);
    }

    #[test]
    fn broad_scopes_select_everything() {
        let registry = registry();
        for scope in [StopScope::Service, StopScope::System, StopScope::Global] {
            assert_eq!(registry.select(scope, None).unwrap().len(), 3);
        }
        let system = registry
            .select(StopScope::System, Some(&["db".to_string()]))
            .unwrap();
        assert_eq!(system.len(), 3);
    }

    #[test]
    fn invalid_selections() {
        let registry = registry();
        assert_eq!(
            registry.select(StopScope::Component, None).unwrap_err(),
            StopError::MissingTargets(StopScope::Component)
        );
        assert_eq!(
            registry
                .select(StopScope::Component, Some(&["ghost".to_string()]))
                .unwrap_err(),
            StopError::UnknownComponent("ghost".to_string())
        );
    }
}
