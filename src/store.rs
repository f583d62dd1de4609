use async_trait::async_trait;

use crate::config::{Config, DeployArgs};

// ---------------------------------------------------------------------------
// Config store contract
// ---------------------------------------------------------------------------

/// Asset name for the director's opaque state blob.
pub const DIRECTOR_STATE_ASSET: &str = "director-state.json";

/// Asset name for the director's opaque credentials blob.
pub const DIRECTOR_CREDS_ASSET: &str = "director-creds.yml";

/// Persists the configuration aggregate and opaque binary assets.
///
/// Backed by an object store in production; the orchestration core only
/// depends on this contract.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load the existing config, or create a fresh one seeded from the
    /// requested args. Returns `true` when a new config was created.
    async fn load_or_create(&self, args: &DeployArgs) -> anyhow::Result<(Config, bool)>;

    async fn update(&self, config: &Config) -> anyhow::Result<()>;

    async fn has_asset(&self, name: &str) -> anyhow::Result<bool>;

    async fn load_asset(&self, name: &str) -> anyhow::Result<Vec<u8>>;

    async fn store_asset(&self, name: &str, data: &[u8]) -> anyhow::Result<()>;
}

/// Load an asset, treating absence as empty bytes.
///
/// A missing director state or credentials blob is a legitimate first-run
/// signal ("no existing director"), not an error.
pub async fn load_asset_if_present(
    store: &dyn ConfigStore,
    name: &str,
) -> anyhow::Result<Vec<u8>> {
    if store.has_asset(name).await? {
        store.load_asset(name).await
    } else {
        Ok(Vec::new())
    }
}
