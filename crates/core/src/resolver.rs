//! Name resolution: mapping a raw call-site location to a qualified name.
//!
//! The tracker records call sites as (file, line, instance, function)
//! tuples; turning those into human-readable owners is delegated to a
//! resolver so hosts can plug in whatever source of truth they have
//! (debug info, a build-time side table, static analysis).

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no qualified name registered for {file}:{line}")]
    UnknownSite { file: String, line: u32 },
}

/// A resolved call site: the owning class for methods, the qualified source
/// file for free functions, and the function name itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    /// Source-file qualifier; present for free functions.
    pub file: Option<String>,
    /// Owning class; present for methods.
    pub class: Option<String>,
    /// Function or method name.
    pub func: String,
}

/// Maps a raw call-site location to a stable qualified name.
///
/// Called once per distinct raw call-site token during finalize, so
/// implementations must memoize per source file rather than re-deriving
/// names on every lookup.
pub trait NameResolver {
    fn qualify(&mut self, file: &str, line: u32) -> Result<QualifiedName, ResolveError>;
}

/// Side-table resolver: qualified names registered up front and looked up
/// by (file, line). The table itself is the memo.
#[derive(Debug, Clone, Default)]
pub struct TableResolver {
    by_site: HashMap<(String, u32), QualifiedName>,
}

impl TableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method definition site.
    pub fn method(mut self, file: &str, line: u32, class: &str, func: &str) -> Self {
        self.insert(
            file,
            line,
            QualifiedName {
                file: None,
                class: Some(class.to_string()),
                func: func.to_string(),
            },
        );
        self
    }

    /// Register a free-function definition site.
    pub fn function(mut self, file: &str, line: u32, func: &str) -> Self {
        self.insert(
            file,
            line,
            QualifiedName {
                file: Some(file.to_string()),
                class: None,
                func: func.to_string(),
            },
        );
        self
    }

    pub fn insert(&mut self, file: &str, line: u32, qualified: QualifiedName) {
        self.by_site.insert((file.to_string(), line), qualified);
    }
}

impl NameResolver for TableResolver {
    fn qualify(&mut self, file: &str, line: u32) -> Result<QualifiedName, ResolveError> {
        self.by_site
            .get(&(file.to_string(), line))
            .cloned()
            .ok_or_else(|| ResolveError::UnknownSite {
                file: file.to_string(),
                line,
            })
    }
}
