//! Database catalog (`database_config.json`).
//!
//! ```json
//! {
//!   "databases": {
//!     "orders-1": {"share": false, "host": "${tf:orders_1_host}", "name": "orders"},
//!     "staging":  {"host": "staging.internal", "port": 5432}
//!   }
//! }
//! ```

use prenv_config::{loader::validate_required, ConfigError, BINDING_PREFIX};
use serde_json::Value;
use std::collections::BTreeMap;

const SHARE_KEY: &str = "share";

/// One leasable database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Database {
    /// Whether several items may hold this database at once. Defaults to `true`.
    pub share: bool,
    /// Connection attributes exported to the deploy routine.
    pub attributes: BTreeMap<String, String>,
}

impl Database {
    /// Attributes as `PRENV_<UPPERCASE_NAME>` bindings.
    #[must_use]
    pub fn bindings(&self) -> BTreeMap<String, String> {
        self.attributes
            .iter()
            .map(|(name, value)| {
                (
                    format!("{BINDING_PREFIX}{}", name.to_uppercase()),
                    value.clone(),
                )
            })
            .collect()
    }

    fn from_value(name: &str, value: &Value) -> Result<Self, ConfigError> {
        let Value::Object(entries) = value else {
            return Err(malformed(format!("database {name} must be a mapping")));
        };

        let mut share = true;
        let mut attributes = BTreeMap::new();
        for (key, item) in entries {
            if key == SHARE_KEY {
                share = match item {
                    Value::Bool(flag) => *flag,
                    Value::Null => true,
                    _ => return Err(malformed(format!("database {name}: share must be a boolean"))),
                };
                continue;
            }

            let rendered = match item {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => {
                    return Err(malformed(format!(
                        "database {name}: attribute {key} must be a scalar"
                    )))
                }
            };
            attributes.insert(key.clone(), rendered);
        }

        Ok(Self { share, attributes })
    }
}

/// Databases keyed by name. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    databases: BTreeMap<String, Database>,
}

impl Catalog {
    /// Build a catalog from a resolved `database_config.json` document.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if `databases` is missing or empty and
    /// `ConfigError::Malformed` if an entry has the wrong shape.
    pub fn from_document(document: &Value) -> Result<Self, ConfigError> {
        validate_required(document, &["databases"], "database")?;
        let Some(Value::Object(entries)) = document.get("databases") else {
            return Err(malformed("databases must be a mapping".to_string()));
        };

        let databases = entries
            .iter()
            .map(|(name, value)| Ok((name.clone(), Database::from_value(name, value)?)))
            .collect::<Result<_, ConfigError>>()?;

        Ok(Self { databases })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Database> {
        self.databases.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.databases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Database)> {
        self.databases.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn shareable(&self) -> impl Iterator<Item = (&str, &Database)> {
        self.iter().filter(|(_, db)| db.share)
    }

    pub fn exclusive(&self) -> impl Iterator<Item = (&str, &Database)> {
        self.iter().filter(|(_, db)| !db.share)
    }
}

impl FromIterator<(String, Database)> for Catalog {
    fn from_iter<I: IntoIterator<Item = (String, Database)>>(iter: I) -> Self {
        Self {
            databases: iter.into_iter().collect(),
        }
    }
}

fn malformed(message: String) -> ConfigError {
    ConfigError::Malformed {
        config: "database".to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prenv_config::KeyProblem;
    use serde_json::json;

    #[test]
    fn test_share_defaults_to_true() {
        let doc = json!({
            "databases": {
                "a": {"share": false, "host": "a.internal"},
                "b": {"host": "b.internal"},
            }
        });

        let catalog = Catalog::from_document(&doc).unwrap();
        assert!(!catalog.get("a").unwrap().share);
        assert!(catalog.get("b").unwrap().share);
        assert_eq!(catalog.exclusive().map(|(n, _)| n).collect::<Vec<_>>(), ["a"]);
        assert_eq!(catalog.shareable().map(|(n, _)| n).collect::<Vec<_>>(), ["b"]);
    }

    #[test]
    fn test_bindings_skip_share_and_uppercase() {
        let doc = json!({
            "databases": {
                "orders": {"share": false, "host": "db.internal", "db_name": "orders", "port": 5432}
            }
        });

        let catalog = Catalog::from_document(&doc).unwrap();
        let bindings = catalog.get("orders").unwrap().bindings();
        assert_eq!(
            bindings,
            BTreeMap::from([
                ("PRENV_DB_NAME".to_string(), "orders".to_string()),
                ("PRENV_HOST".to_string(), "db.internal".to_string()),
                ("PRENV_PORT".to_string(), "5432".to_string()),
            ])
        );
    }

    #[test]
    fn test_missing_databases_key() {
        let err = Catalog::from_document(&json!({})).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { problem: KeyProblem::Missing, .. }));

        let err = Catalog::from_document(&json!({"databases": {}})).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { problem: KeyProblem::Empty, .. }));
    }

    #[test]
    fn test_malformed_entries() {
        for doc in [
            json!({"databases": ["a"]}),
            json!({"databases": {"a": "host"}}),
            json!({"databases": {"a": {"share": "no"}}}),
            json!({"databases": {"a": {"hosts": ["x", "y"]}}}),
        ] {
            assert!(matches!(
                Catalog::from_document(&doc).unwrap_err(),
                ConfigError::Malformed { .. }
            ));
        }
    }
}
