use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FimError, Result};

/// Identifier issued to this agent by the registration service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Blank identifiers are treated as absent.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(FimError::MissingIdentity);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Identifier as sent to the collector.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
