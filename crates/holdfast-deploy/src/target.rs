//! Deployment target handoff record
//!
//! The resolved configuration the coordinator hands to a host's bootstrap
//! sequencer: domain, workload image, environment and credential material.
//! Built once per convergence attempt, immutable after handoff, serialized
//! as JSON for the remote-execution channel.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

/// Resolved configuration for one host convergence
///
/// Maps use `BTreeMap` so serialized output is deterministic — the bootstrap
/// sequencer relies on that to materialize identical files on every re-run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    /// State resource this target was derived from
    pub resource_id: String,

    /// Public domain the workload serves
    pub domain: String,

    /// Workload container image reference
    pub image: String,

    /// Environment for the workload
    pub env: BTreeMap<String, String>,

    /// Credential material (registry tokens, API keys); opaque here
    pub credentials: BTreeMap<String, String>,

    pub created_at: DateTime<Utc>,
}

impl DeploymentTarget {
    pub fn new(
        resource_id: impl Into<String>,
        domain: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            domain: domain.into(),
            image: image.into(),
            env: BTreeMap::new(),
            credentials: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_credential(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.credentials.insert(key.into(), value.into());
        self
    }

    /// Serialize for the remote-execution handoff
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path.as_ref(), self.to_json()?).await?;
        Ok(())
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&content)
    }
}
