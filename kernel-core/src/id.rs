//! Identifiers used throughout the trust kernel.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A canonical plugin identifier: lowercase `[a-z0-9.-]`, no leading or
/// trailing dot, no `..`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl PluginId {
    /// Validate and wrap a plugin id string.
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_plugin_id(&id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PluginId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub(crate) fn validate_plugin_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidId("plugin id is empty".into()));
    }
    if id.starts_with('.') || id.ends_with('.') {
        return Err(Error::InvalidId(
            "plugin id cannot start or end with a dot".into(),
        ));
    }
    if id.contains("..") {
        return Err(Error::InvalidId("plugin id cannot contain '..'".into()));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
    {
        return Err(Error::InvalidId(format!(
            "plugin id '{id}' contains characters outside [a-z0-9.-]"
        )));
    }
    Ok(())
}

/// A per-invocation execution identifier, fresh for every `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ids_parse() {
        assert!(PluginId::parse("com.x.greeter").is_ok());
        assert!(PluginId::parse("shell-exec").is_ok());
        assert!(PluginId::parse("a.b.c123").is_ok());
    }

    #[test]
    fn rejects_leading_trailing_dot() {
        assert!(PluginId::parse(".com.x").is_err());
        assert!(PluginId::parse("com.x.").is_err());
    }

    #[test]
    fn rejects_double_dot() {
        assert!(PluginId::parse("com..x").is_err());
    }

    #[test]
    fn rejects_uppercase_and_symbols() {
        assert!(PluginId::parse("Com.X").is_err());
        assert!(PluginId::parse("com/x").is_err());
        assert!(PluginId::parse("com_x").is_err());
    }

    #[test]
    fn execution_ids_are_fresh() {
        assert_ne!(ExecutionId::new(), ExecutionId::new());
    }
}
