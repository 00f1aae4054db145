//! Tool command table.
//!
//! Maps tool names from the live provider to synchronous handlers that read
//! and update the session's [`SessionState`]. Each tool carries a category,
//! and the category decides which outcome (if any) gets recorded.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tether_types::memory::Outcome;

use crate::session::state::SessionState;

/// Uniform handler signature: session state plus raw JSON arguments in,
/// user-facing result string out.
pub type ToolHandler = Box<dyn Fn(&mut SessionState, &Value) -> String + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    TaskCreation,
    StepProgress,
    WinLogging,
    /// Breathing, grounding, sensory checks, breaks, reframes.
    Regulation,
    /// Check-ins and reminders.
    Scheduling,
    /// Read-only lookups; never recorded.
    Informational,
}

impl ToolCategory {
    /// Outcome recorded for a call in this category.
    pub fn outcome(self) -> Option<Outcome> {
        match self {
            ToolCategory::TaskCreation => Some(Outcome::TaskStarted),
            ToolCategory::StepProgress => Some(Outcome::TaskProgress),
            ToolCategory::WinLogging => Some(Outcome::TaskCompleted),
            ToolCategory::Regulation => Some(Outcome::ReEngaged),
            ToolCategory::Scheduling => Some(Outcome::InterventionApplied),
            ToolCategory::Informational => None,
        }
    }
}

/// Provider-facing description of one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

struct RegisteredTool {
    declaration: ToolDeclaration,
    handler: ToolHandler,
}

/// Result of dispatching one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub result: String,
    pub category: Option<ToolCategory>,
}

impl ToolOutput {
    pub fn is_known(&self) -> bool {
        self.category.is_some()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.category.and_then(ToolCategory::outcome)
    }
}

pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        category: ToolCategory,
        parameters: Value,
        handler: F,
    ) where
        F: Fn(&mut SessionState, &Value) -> String + Send + Sync + 'static,
    {
        let name = name.into();
        self.tools.insert(
            name.clone(),
            RegisteredTool {
                declaration: ToolDeclaration {
                    name,
                    description: description.into(),
                    category,
                    parameters,
                },
                handler: Box::new(handler),
            },
        );
    }

    pub fn category(&self, name: &str) -> Option<ToolCategory> {
        self.tools.get(name).map(|t| t.declaration.category)
    }

    /// Declarations sorted by name.
    pub fn declarations(&self) -> Vec<&ToolDeclaration> {
        let mut decls: Vec<&ToolDeclaration> =
            self.tools.values().map(|t| &t.declaration).collect();
        decls.sort_by(|a, b| a.name.cmp(&b.name));
        decls
    }

    /// Run a tool against the session state.
    ///
    /// Unknown names produce an explanatory result rather than an error so
    /// the provider always gets a response.
    pub fn dispatch(&self, state: &mut SessionState, name: &str, args: &Value) -> ToolOutput {
        match self.tools.get(name) {
            Some(tool) => {
                state.record_interaction();
                ToolOutput {
                    result: (tool.handler)(state, args),
                    category: Some(tool.declaration.category),
                }
            }
            None => {
                tracing::warn!(tool = name, "unknown tool called");
                ToolOutput {
                    result: format!("Unknown tool: {name}"),
                    category: None,
                }
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_types::memory::UserId;
    use uuid::Uuid;

    fn state() -> SessionState {
        SessionState::new(Uuid::now_v7(), UserId::parse("u1").unwrap())
    }

    #[test]
    fn test_category_outcomes() {
        assert_eq!(ToolCategory::TaskCreation.outcome(), Some(Outcome::TaskStarted));
        assert_eq!(ToolCategory::StepProgress.outcome(), Some(Outcome::TaskProgress));
        assert_eq!(ToolCategory::WinLogging.outcome(), Some(Outcome::TaskCompleted));
        assert_eq!(ToolCategory::Regulation.outcome(), Some(Outcome::ReEngaged));
        assert_eq!(
            ToolCategory::Scheduling.outcome(),
            Some(Outcome::InterventionApplied)
        );
        assert_eq!(ToolCategory::Informational.outcome(), None);
    }

    #[test]
    fn test_custom_tool_dispatch() {
        let mut registry = ToolRegistry::new();
        registry.register(
            "echo",
            "Echo the text argument",
            ToolCategory::Informational,
            json!({"type": "object"}),
            |_state, args| args["text"].as_str().unwrap_or_default().to_string(),
        );

        let mut s = state();
        let out = registry.dispatch(&mut s, "echo", &json!({"text": "hi"}));
        assert_eq!(out.result, "hi");
        assert!(out.is_known());
        assert_eq!(out.outcome(), None);
        assert_eq!(s.interaction_count, 1);
    }

    #[test]
    fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let mut s = state();
        let out = registry.dispatch(&mut s, "teleport", &Value::Null);
        assert_eq!(out.result, "Unknown tool: teleport");
        assert!(!out.is_known());
        assert_eq!(s.interaction_count, 0);
    }
}
