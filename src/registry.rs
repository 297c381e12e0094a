//! Name → constructor maps for buffer and trigger types.
//!
//! The current buffer and trigger of a channel-set are named by its
//! `current_buffer` and `current_trigger` attributes. Discovery resolves
//! that name through a [`Registry`] to build the typed object; unknown
//! names fall back to a generic constructor.

use std::collections::HashMap;

use crate::sysfs::ObjectDir;

/// Constructor stored in a [`Registry`].
pub type Constructor<T> = fn(ObjectDir) -> T;

/// Explicit map from type name to constructor, with a fallback.
pub struct Registry<T> {
    constructors: HashMap<String, Constructor<T>>,
    fallback: Constructor<T>,
}

impl<T> Registry<T> {
    /// Empty registry that builds everything with `fallback`.
    pub fn new(fallback: Constructor<T>) -> Self {
        Self {
            constructors: HashMap::new(),
            fallback,
        }
    }

    /// Add or replace the constructor for `type_name`.
    pub fn register(&mut self, type_name: impl Into<String>, constructor: Constructor<T>) -> &mut Self {
        self.constructors.insert(type_name.into(), constructor);
        self
    }

    /// Whether `type_name` has its own constructor.
    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build an object of `type_name` from its directory scan.
    pub fn build(&self, type_name: &str, dir: ObjectDir) -> T {
        let constructor = self
            .constructors
            .get(type_name)
            .copied()
            .unwrap_or(self.fallback);
        constructor(dir)
    }
}

impl<T> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.names())
            .finish()
    }
}
