use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::DeployError;

// ---------------------------------------------------------------------------
// Infrastructure outputs
// ---------------------------------------------------------------------------

/// Outputs of the infrastructure apply step, produced once per run.
///
/// Ephemeral: never persisted itself, only its derived values are folded
/// into the config. Must pass [`Metadata::assert_valid`] before the
/// certificate or director stages may trust it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub director_public_ip: String,
    pub web_public_ip: String,
}

impl Metadata {
    pub fn assert_valid(&self) -> Result<(), DeployError> {
        if self.director_public_ip.is_empty() {
            return Err(DeployError::InvalidMetadata(
                "director_public_ip missing from infrastructure output".into(),
            ));
        }
        if self.web_public_ip.is_empty() {
            return Err(DeployError::InvalidMetadata(
                "web_public_ip missing from infrastructure output".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Infrastructure driver contract
// ---------------------------------------------------------------------------

/// Scoped driver over the infrastructure-as-code tool.
///
/// Acquired from a [`InfraDriverFactory`] and released via `cleanup` on
/// every exit path of the stage that acquired it.
#[async_trait]
pub trait InfraDriver: Send {
    async fn apply(&mut self, destroy: bool) -> anyhow::Result<()>;

    async fn output(&self) -> anyhow::Result<Metadata>;

    async fn cleanup(&mut self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait InfraDriverFactory: Send + Sync {
    async fn create(&self, config: &Config) -> anyhow::Result<Box<dyn InfraDriver>>;
}

// ---------------------------------------------------------------------------
// IaaS lookups
// ---------------------------------------------------------------------------

/// A DNS hosted zone candidate returned by the IaaS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZone {
    pub name: String,
    pub id: String,
}

/// Read-only cloud API lookups consumed by requirements resolution.
#[async_trait]
pub trait IaasClient: Send + Sync {
    /// Find the hosted zone whose name is the longest suffix of `domain`.
    /// Longest-match is the disambiguation policy when several zones are
    /// valid parents of the requested domain.
    async fn find_longest_matching_hosted_zone(&self, domain: &str)
    -> anyhow::Result<HostedZone>;

    /// Public IP of the machine running the deploy.
    async fn current_public_ip(&self) -> anyhow::Result<String>;
}
