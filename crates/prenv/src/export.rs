//! Rendering database bindings for the deploy step.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

const MULTILINE_DELIMITER: &str = "PRENV_EOF";

/// `KEY=value` lines, one per binding, in key order.
///
/// Multi-line values use the heredoc form understood by `$GITHUB_ENV`.
pub fn env_lines(bindings: &BTreeMap<String, String>) -> String {
    bindings
        .iter()
        .map(|(key, value)| {
            if value.contains('\n') {
                format!("{key}<<{MULTILINE_DELIMITER}\n{value}\n{MULTILINE_DELIMITER}\n")
            } else {
                format!("{key}={value}\n")
            }
        })
        .collect()
}

/// Append bindings to a `$GITHUB_ENV`-style file.
pub fn append_env_file(path: &Path, bindings: &BTreeMap<String, String>) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    file.write_all(env_lines(bindings).as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("PRENV_HOST".to_string(), "db.internal".to_string()),
            ("PRENV_CERT".to_string(), "line1\nline2".to_string()),
        ])
    }

    #[test]
    fn test_env_lines() {
        assert_eq!(
            env_lines(&bindings()),
            "PRENV_CERT<<PRENV_EOF\nline1\nline2\nPRENV_EOF\nPRENV_HOST=db.internal\n"
        );
    }

    #[test]
    fn test_append_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("github_env");
        std::fs::write(&path, "EXISTING=1\n").unwrap();

        append_env_file(&path, &BTreeMap::from([("PRENV_PORT".to_string(), "5432".to_string())]))
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "EXISTING=1\nPRENV_PORT=5432\n"
        );
    }
}
