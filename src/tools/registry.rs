use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::{Tool, ToolError};

/// Name to tool mapping, read-only after initialization.
#[derive(Default)]
pub struct ToolRegistry {
    tools: FxHashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the builtin tools (`echo`, `delay`,
    /// `always_fail`).
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::builtin::register_builtins(&mut registry);
        registry
    }

    /// Register a tool under a unique name.
    pub fn register<T: Tool + 'static>(
        &mut self,
        name: impl Into<String>,
        tool: T,
    ) -> Result<(), ToolError> {
        let name = name.into();
        if self.tools.contains_key(&name) {
            return Err(ToolError::Duplicate { name });
        }
        self.tools.insert(name, Arc::new(tool));
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        self.tools.get(name).cloned().ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })
    }

    /// Names of all registered tools, sorted for stable display.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolContext;
    use async_trait::async_trait;
    use serde_json::Value;

    struct Noop;

    #[async_trait]
    impl Tool for Noop {
        async fn run(
            &self,
            _ctx: ToolContext,
            _input: FxHashMap<String, Value>,
        ) -> Result<Value, ToolError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register("noop", Noop).unwrap();
        assert!(registry.get("noop").is_ok());
        assert!(matches!(
            registry.get("nope"),
            Err(ToolError::NotFound { .. })
        ));
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = ToolRegistry::new();
        registry.register("noop", Noop).unwrap();
        assert!(matches!(
            registry.register("noop", Noop).unwrap_err(),
            ToolError::Duplicate { .. }
        ));
    }

    #[test]
    fn builtins_are_present() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["always_fail", "delay", "echo"]);
    }
}
