//! Shared workflow memory with dotted-path access and variable interpolation.
//!
//! `Memory` is the single mutable resource shared across a workflow run. It
//! stores a tree of JSON values addressed by dotted paths (`global.a.b`),
//! supports `${path}` interpolation in templates, and produces deep
//! snapshots for trace events.
//!
//! # Concurrency
//!
//! The store is guarded by a [`parking_lot::RwLock`]: input resolution inside
//! concurrently running steps takes read locks, while merges at the end of a
//! superstep take the write lock. Tools never see memory directly; they
//! receive already-interpolated inputs.
//!
//! # Examples
//!
//! ```rust
//! use skein::memory::Memory;
//! use serde_json::json;
//!
//! let mem = Memory::new();
//! mem.set("global.user.name", json!("ada")).unwrap();
//!
//! assert_eq!(mem.get("global.user.name").unwrap(), json!("ada"));
//! assert_eq!(mem.resolve_interpolation("hello ${global.user.name}"), "hello ada");
//! ```

use miette::Diagnostic;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised by dotted-path access.
#[derive(Debug, Error, Diagnostic)]
pub enum MemoryError {
    /// The supplied path was empty.
    #[error("empty memory path")]
    #[diagnostic(code(skein::memory::empty_path))]
    EmptyPath,

    /// An intermediate segment resolved to a non-mapping leaf.
    #[error("path segment '{segment}' in '{path}' is not a mapping")]
    #[diagnostic(
        code(skein::memory::not_a_map),
        help("A prefix of this path already holds a scalar value.")
    )]
    NotAMap { path: String, segment: String },

    /// No value is bound at the path.
    #[error("path '{path}' not found")]
    #[diagnostic(code(skein::memory::not_found))]
    NotFound { path: String },
}

/// Hierarchical key/value store for workflow variables.
#[derive(Debug, Default)]
pub struct Memory {
    data: RwLock<Map<String, Value>>,
}

impl Memory {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` at `path`, creating intermediate mappings as needed.
    ///
    /// Fails if an intermediate segment already resolves to a scalar leaf:
    /// no prefix of a bound path may itself be a leaf.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use skein::memory::Memory;
    /// use serde_json::json;
    ///
    /// let mem = Memory::new();
    /// mem.set("a.b", json!(1)).unwrap();
    /// assert!(mem.set("a.b.c", json!(2)).is_err()); // a.b is a leaf
    /// ```
    pub fn set(&self, path: &str, value: Value) -> Result<(), MemoryError> {
        if path.is_empty() {
            return Err(MemoryError::EmptyPath);
        }
        let segments: Vec<&str> = path.split('.').collect();
        let (last, intermediate) = segments
            .split_last()
            .expect("split on non-empty string yields at least one segment");

        let mut guard = self.data.write();
        let mut current = &mut *guard;
        for segment in intermediate {
            let entry = current
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match entry {
                Value::Object(map) => current = map,
                _ => {
                    return Err(MemoryError::NotAMap {
                        path: path.to_string(),
                        segment: (*segment).to_string(),
                    })
                }
            }
        }
        current.insert((*last).to_string(), value);
        Ok(())
    }

    /// Retrieve the value at `path` (a leaf or an intermediate mapping).
    pub fn get(&self, path: &str) -> Result<Value, MemoryError> {
        if path.is_empty() {
            return Err(MemoryError::EmptyPath);
        }
        let guard = self.data.read();
        let mut current: Option<&Value> = None;
        for segment in path.split('.') {
            let map = match current {
                None => &*guard,
                Some(Value::Object(map)) => map,
                Some(_) => {
                    return Err(MemoryError::NotAMap {
                        path: path.to_string(),
                        segment: segment.to_string(),
                    })
                }
            };
            current = Some(map.get(segment).ok_or_else(|| MemoryError::NotFound {
                path: path.to_string(),
            })?);
        }
        Ok(current.cloned().unwrap_or(Value::Null))
    }

    /// Replace every `${path}` occurrence in `template` with the rendered
    /// value at that path.
    ///
    /// Missing paths render as the empty string; this operation never fails.
    /// Text outside placeholders is preserved byte for byte, and an
    /// unterminated `${` is left as-is.
    pub fn resolve_interpolation(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    if let Ok(value) = self.get(&after[..end]) {
                        out.push_str(&render_value(&value));
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Deep copy of the entire store.
    ///
    /// Snapshots attached to trace events must not observe later mutations,
    /// so the whole tree is cloned.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        Value::Object(self.data.read().clone())
    }

    /// Apply initial bindings in order. Failures are logged, not fatal.
    pub fn seed<'a>(&self, pairs: impl IntoIterator<Item = (&'a str, Value)>) {
        for (path, value) in pairs {
            if let Err(err) = self.set(path, value) {
                tracing::warn!(path, %err, "skipping initial memory binding");
            }
        }
    }
}

/// Render a value for interpolation and expression stringification.
///
/// Strings render bare (no surrounding quotes); everything else uses the
/// compact JSON form (`null`, `true`, `42`, `[1,2]`, `{"k":"v"}`).
#[must_use]
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
