//! Explicit environment context.
//!
//! Placeholder resolution and binding export read from an [`Environment`]
//! value that is passed down the call chain, rather than from (and into) the
//! process-global environment.

use std::collections::BTreeMap;

/// Prefix for bindings exported to the deploy routine.
pub const BINDING_PREFIX: &str = "PRENV_";

/// Key/value environment visible to `${env:...}` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Create an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current process environment.
    ///
    /// Variables whose name or value is not valid unicode are skipped.
    #[must_use]
    pub fn from_process() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace a variable.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Overlay `bindings` on top of this environment; later values win.
    pub fn extend<I, K, V>(&mut self, bindings: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in bindings {
            self.set(k, v);
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Variables carrying the [`BINDING_PREFIX`].
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .iter()
            .filter(|(k, _)| k.starts_with(BINDING_PREFIX))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replace every occurrence of a `PRENV_*` variable name in `text` with
    /// its value.
    ///
    /// Longer names are substituted first so `PRENV_DB_NAME` is not clobbered
    /// by a shorter `PRENV_DB`.
    #[must_use]
    pub fn substitute_tokens(&self, text: &str) -> String {
        let mut bindings: Vec<_> = self.bindings().collect();
        bindings.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));

        bindings
            .into_iter()
            .fold(text.to_string(), |acc, (name, value)| acc.replace(name, value))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = Self::new();
        env.extend(iter);
        env
    }
}
