use async_trait::async_trait;

use crate::config::{Config, DeployArgs};

// ---------------------------------------------------------------------------
// Pipeline client contract
// ---------------------------------------------------------------------------

/// Login material for the pipeline tool targeting a CI web node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineCredentials {
    pub target: String,
    pub api_url: String,
    pub username: String,
    pub password: String,
}

/// Scoped client over the pipeline tool.
///
/// Acquired from a [`PipelineClientFactory`] and released via `cleanup` on
/// every exit path of the stage that acquired it.
#[async_trait]
pub trait PipelineClient: Send {
    /// Whether the targeted CI web node is reachable and accepting logins.
    async fn can_connect(&self) -> anyhow::Result<bool>;

    /// Install the default self-update pipeline on the target.
    ///
    /// `allow_version_mismatch` tolerates a client/target version skew, used
    /// when the operator tooling may be newer than the running instance.
    async fn set_default_pipeline(
        &self,
        args: &DeployArgs,
        config: &Config,
        allow_version_mismatch: bool,
    ) -> anyhow::Result<()>;

    async fn cleanup(&mut self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PipelineClientFactory: Send + Sync {
    async fn create(
        &self,
        credentials: PipelineCredentials,
    ) -> anyhow::Result<Box<dyn PipelineClient>>;
}
