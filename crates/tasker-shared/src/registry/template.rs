//! The in-memory Step Template Model (§2 component 9, §4.7).

use std::sync::Arc;

use serde_json::Value;

use super::handler::{CustomEventDeclaration, StepHandler};

/// One named step's defaults within a task template.
#[derive(Clone)]
pub struct StepTemplate {
    pub named_step: String,
    pub dependencies: Vec<String>,
    pub handler: Arc<dyn StepHandler>,
    pub default_retry_limit: i32,
    pub default_retryable: bool,
    pub skippable: bool,
}

impl std::fmt::Debug for StepTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepTemplate")
            .field("named_step", &self.named_step)
            .field("dependencies", &self.dependencies)
            .field("default_retry_limit", &self.default_retry_limit)
            .field("default_retryable", &self.default_retryable)
            .field("skippable", &self.skippable)
            .finish()
    }
}

/// A validated task definition: its step DAG template plus an optional
/// JSON-Schema for the task context (§6).
#[derive(Debug, Clone)]
pub struct TaskTemplate {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub steps: Vec<StepTemplate>,
    pub context_schema: Option<Value>,
}

/// Errors produced validating a template at registration time (§4.7).
#[derive(Debug, thiserror::Error)]
pub enum TemplateValidationError {
    #[error("step template graph contains a cycle")]
    Cyclic,
    #[error("step '{0}' depends on itself")]
    SelfEdge(String),
    #[error("duplicate dependency edge '{0}' -> '{1}'")]
    DuplicateEdge(String, String),
    #[error("step '{0}' lists unknown dependency '{1}'")]
    UnknownDependency(String, String),
}

impl TaskTemplate {
    /// Validates the DAG: acyclic, no self-edges, no duplicate edge pairs, no
    /// dangling dependency names (§4.7, mirroring §3's WorkflowStepEdge
    /// invariants at the template level).
    pub fn validate(&self) -> Result<(), TemplateValidationError> {
        let names: std::collections::HashSet<&str> =
            self.steps.iter().map(|s| s.named_step.as_str()).collect();

        let mut seen_edges = std::collections::HashSet::new();
        for step in &self.steps {
            for dep in &step.dependencies {
                if dep == &step.named_step {
                    return Err(TemplateValidationError::SelfEdge(step.named_step.clone()));
                }
                if !names.contains(dep.as_str()) {
                    return Err(TemplateValidationError::UnknownDependency(
                        step.named_step.clone(),
                        dep.clone(),
                    ));
                }
                if !seen_edges.insert((dep.clone(), step.named_step.clone())) {
                    return Err(TemplateValidationError::DuplicateEdge(
                        dep.clone(),
                        step.named_step.clone(),
                    ));
                }
            }
        }

        self.check_acyclic()
    }

    fn check_acyclic(&self) -> Result<(), TemplateValidationError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let index: std::collections::HashMap<&str, usize> = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.named_step.as_str(), i))
            .collect();
        let mut marks = vec![Mark::Unvisited; self.steps.len()];

        fn visit(
            i: usize,
            steps: &[StepTemplate],
            index: &std::collections::HashMap<&str, usize>,
            marks: &mut [Mark],
        ) -> Result<(), TemplateValidationError> {
            match marks[i] {
                Mark::Done => return Ok(()),
                Mark::InProgress => return Err(TemplateValidationError::Cyclic),
                Mark::Unvisited => {}
            }
            marks[i] = Mark::InProgress;
            for dep in &steps[i].dependencies {
                let dep_idx = index[dep.as_str()];
                visit(dep_idx, steps, index, marks)?;
            }
            marks[i] = Mark::Done;
            Ok(())
        }

        for i in 0..self.steps.len() {
            visit(i, &self.steps, &index, &mut marks)?;
        }
        Ok(())
    }

    pub fn custom_events(&self) -> Vec<CustomEventDeclaration> {
        self.steps
            .iter()
            .flat_map(|s| s.handler.custom_events())
            .collect()
    }
}
