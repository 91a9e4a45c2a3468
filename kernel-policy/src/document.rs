//! Loading policy documents from disk.
//!
//! Accepts `//` comments and trailing commas (spec.md §6.2) via the
//! `json5` crate — nothing in the retrieved corpus covers permissive
//! JSON parsing, so this one dependency is sourced from the wider
//! ecosystem rather than the teacher (see DESIGN.md). OS config-dir
//! resolution uses the `dirs` crate for the same reason.

use std::path::PathBuf;

use crate::model::{PolicyDocument, PolicyValidationError};

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to read policy document at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse policy document at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: json5::Error,
    },
    #[error("could not resolve an OS configuration directory")]
    NoConfigDir,
    #[error("policy document at {path} failed validation: {errors:?}")]
    Invalid {
        path: PathBuf,
        errors: Vec<PolicyValidationError>,
    },
}

/// Parse and validate a policy document from a JSON5 string (comments
/// and trailing commas tolerated, property names matched
/// case-insensitively by the parser's normal JSON5 behavior on this
/// kernel's lowercase schema).
pub fn parse_document(source: &str) -> Result<PolicyDocument, json5::Error> {
    json5::from_str(source)
}

/// Canonical on-disk path for each writable/readable policy source,
/// per spec.md §6.2.
pub fn organization_policy_path() -> Result<PathBuf, DocumentError> {
    let base = dirs::config_dir().ok_or(DocumentError::NoConfigDir)?;
    Ok(base.join("incontrol").join("policy.json"))
}

pub fn team_policy_path() -> Result<PathBuf, DocumentError> {
    let base = dirs::config_dir().ok_or(DocumentError::NoConfigDir)?;
    Ok(base.join("incontrol").join("team-policy.json"))
}

pub fn user_policy_path() -> Result<PathBuf, DocumentError> {
    let base = dirs::config_dir().ok_or(DocumentError::NoConfigDir)?;
    Ok(base.join("incontrol").join("user-policy.json"))
}

pub fn load_document(path: &std::path::Path) -> Result<PolicyDocument, DocumentError> {
    let text = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let document = parse_document(&text).map_err(|source| DocumentError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let report = document.validate();
    if !report.is_valid() {
        return Err(DocumentError::Invalid {
            path: path.to_path_buf(),
            errors: report.errors,
        });
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comments_and_trailing_commas() {
        let source = r#"{
            // this is an org policy
            "version": "1.0.0",
            "locked": true,
            "tools": {
                "deny": ["shell-*"],
            },
        }"#;
        let doc = parse_document(source).unwrap();
        assert!(doc.locked);
        assert_eq!(doc.tools.unwrap().deny, vec!["shell-*".to_string()]);
    }

    #[test]
    fn paths_are_rooted_under_incontrol() {
        let path = user_policy_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "user-policy.json");
        assert!(path.to_string_lossy().contains("incontrol"));
    }

    #[test]
    fn load_document_rejects_a_document_with_duplicate_rule_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(
            &path,
            r#"{
                "version": "1.0.0",
                "tools": {
                    "rules": [
                        {"id": "r1", "tool": "a", "decision": "allow"},
                        {"id": "r1", "tool": "b", "decision": "deny"}
                    ]
                }
            }"#,
        )
        .unwrap();

        let result = load_document(&path);
        assert!(matches!(result, Err(DocumentError::Invalid { .. })));
    }
}
