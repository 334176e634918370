//! Process-wide, thread-safe registry mapping `(namespace, name, version)` to
//! a [`TaskTemplate`] (§4.7).

mod handler;
mod template;

use std::collections::HashMap;
use std::sync::RwLock;

pub use handler::{CustomEventDeclaration, StepHandler, StepHandlerOutcome};
pub use template::{StepTemplate, TaskTemplate, TemplateValidationError};

use crate::errors::{TaskerError, TaskerResult};

fn key(namespace: &str, name: &str, version: &str) -> String {
    format!("{namespace}/{name}/{version}")
}

/// Options controlling a single [`HandlerRegistry::register`] call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterOptions {
    /// When `false` (the default), registering an already-bound
    /// `(namespace, name, version)` fails instead of overwriting it.
    pub replace: bool,
}

/// Many-readers-one-writer lookup table. Reads take a short-lived read lock
/// over a plain `HashMap`; writers briefly exclude readers on register/
/// unregister (§4.7).
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    templates: RwLock<HashMap<String, TaskTemplate>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        template: TaskTemplate,
        options: RegisterOptions,
    ) -> TaskerResult<()> {
        template
            .validate()
            .map_err(|e| TaskerError::RegistryError(e.to_string()))?;

        let k = key(&template.namespace, &template.name, &template.version);
        let mut guard = self.templates.write().unwrap();
        if !options.replace && guard.contains_key(&k) {
            return Err(TaskerError::RegistryError(format!(
                "task template already registered: {k}"
            )));
        }
        guard.insert(k, template);
        Ok(())
    }

    pub fn lookup(&self, namespace: &str, name: &str, version: &str) -> TaskerResult<TaskTemplate> {
        let k = key(namespace, name, version);
        self.templates
            .read()
            .unwrap()
            .get(&k)
            .cloned()
            .ok_or_else(|| TaskerError::RegistryError(format!("no task template registered: {k}")))
    }

    /// Removes a binding. A subsequent `lookup` behaves as if it was never
    /// registered (§8 round-trip law).
    pub fn unregister(&self, namespace: &str, name: &str, version: &str) -> TaskerResult<()> {
        let k = key(namespace, name, version);
        self.templates
            .write()
            .unwrap()
            .remove(&k)
            .map(|_| ())
            .ok_or_else(|| TaskerError::RegistryError(format!("no task template registered: {k}")))
    }

    pub fn registered_count(&self) -> usize {
        self.templates.read().unwrap().len()
    }

    pub fn namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self
            .templates
            .read()
            .unwrap()
            .values()
            .map(|t| t.namespace.clone())
            .collect();
        namespaces.sort();
        namespaces.dedup();
        namespaces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::{Task, WorkflowStep};
    use async_trait::async_trait;
    use std::sync::Arc;

    #[derive(Debug)]
    struct NoopHandler;

    #[async_trait]
    impl StepHandler for NoopHandler {
        async fn process(
            &self,
            _task: &Task,
            _sequence: &[WorkflowStep],
            _step: &WorkflowStep,
        ) -> StepHandlerOutcome {
            StepHandlerOutcome::Success(None)
        }
    }

    fn template() -> TaskTemplate {
        TaskTemplate {
            namespace: "payments".to_string(),
            name: "checkout".to_string(),
            version: "1.0.0".to_string(),
            steps: vec![StepTemplate {
                named_step: "charge".to_string(),
                dependencies: vec![],
                handler: Arc::new(NoopHandler),
                default_retry_limit: 3,
                default_retryable: true,
                skippable: false,
            }],
            context_schema: None,
        }
    }

    #[test]
    fn register_then_lookup_round_trips() {
        let registry = HandlerRegistry::new();
        registry
            .register(template(), RegisterOptions::default())
            .unwrap();
        let found = registry.lookup("payments", "checkout", "1.0.0").unwrap();
        assert_eq!(found.name, "checkout");
    }

    #[test]
    fn duplicate_registration_without_replace_fails() {
        let registry = HandlerRegistry::new();
        registry
            .register(template(), RegisterOptions::default())
            .unwrap();
        let err = registry.register(template(), RegisterOptions::default());
        assert!(err.is_err());
    }

    #[test]
    fn replace_option_allows_overwrite() {
        let registry = HandlerRegistry::new();
        registry
            .register(template(), RegisterOptions::default())
            .unwrap();
        registry
            .register(template(), RegisterOptions { replace: true })
            .unwrap();
        assert_eq!(registry.registered_count(), 1);
    }

    #[test]
    fn unregister_makes_lookup_behave_as_never_registered() {
        let registry = HandlerRegistry::new();
        registry
            .register(template(), RegisterOptions::default())
            .unwrap();
        registry.unregister("payments", "checkout", "1.0.0").unwrap();
        assert!(registry.lookup("payments", "checkout", "1.0.0").is_err());
    }

    #[test]
    fn invalid_template_is_rejected_at_registration() {
        let registry = HandlerRegistry::new();
        let mut bad = template();
        bad.steps[0].dependencies.push("charge".to_string());
        assert!(registry.register(bad, RegisterOptions::default()).is_err());
    }
}
