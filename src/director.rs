use async_trait::async_trait;
use serde::Deserialize;

use crate::config::{Config, DeploySecrets};
use crate::error::DeployError;
use crate::infra::Metadata;
use crate::store::{self, ConfigStore};

/// Port of the credential service colocated with the director.
pub const CREDHUB_PORT: u16 = 8844;

/// Fixed login name for the credential service CLI.
pub const CREDHUB_USERNAME: &str = "credhub-cli";

/// Fixed admin login name for the CI web node.
pub const APP_ADMIN_USERNAME: &str = "admin";

// ---------------------------------------------------------------------------
// Director driver contract
// ---------------------------------------------------------------------------

/// Result of a director deploy.
///
/// State and credential bytes are carried alongside the result rather than
/// inside it: the driver returns whatever the director wrote even when the
/// deploy itself failed, so in-progress director-side changes can always be
/// persisted.
pub struct DeployOutcome {
    pub state: Vec<u8>,
    pub creds: Vec<u8>,
    pub result: anyhow::Result<()>,
}

/// Scoped driver over the director deploy operation.
///
/// Acquired from a [`DirectorDriverFactory`] and released via `cleanup` on
/// every exit path of the stage that acquired it.
#[async_trait]
pub trait DirectorDriver: Send {
    /// Deploy the director. Empty `state`/`creds` mean "no existing
    /// director". With `detach` the call returns as soon as submission
    /// succeeds instead of waiting for completion.
    async fn deploy(&mut self, state: Vec<u8>, creds: Vec<u8>, detach: bool) -> DeployOutcome;

    async fn cleanup(&mut self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait DirectorDriverFactory: Send + Sync {
    async fn create(
        &self,
        config: &Config,
        metadata: &Metadata,
    ) -> anyhow::Result<Box<dyn DirectorDriver>>;
}

// ---------------------------------------------------------------------------
// Deploy + secret extraction
// ---------------------------------------------------------------------------

/// Drive a director deploy and return the resulting secrets bundle.
///
/// Loads persisted director state/credentials (absence means first run),
/// deploys, persists whatever came back, and extracts structured secrets
/// from the credentials document.
pub async fn deploy_director(
    store: &dyn ConfigStore,
    factory: &dyn DirectorDriverFactory,
    config: &Config,
    metadata: &Metadata,
    detach: bool,
) -> Result<DeploySecrets, DeployError> {
    let mut secrets = DeploySecrets::from_config(config);

    let mut driver = factory.create(config, metadata).await?;
    let result = run_deploy(store, driver.as_mut(), config, &mut secrets, detach).await;
    if let Err(e) = driver.cleanup().await {
        tracing::warn!(error = %e, "director driver cleanup failed");
    }
    result?;

    Ok(secrets)
}

async fn run_deploy(
    store: &dyn ConfigStore,
    driver: &mut dyn DirectorDriver,
    config: &Config,
    secrets: &mut DeploySecrets,
    detach: bool,
) -> Result<(), DeployError> {
    let state = store::load_asset_if_present(store, store::DIRECTOR_STATE_ASSET).await?;
    let creds = store::load_asset_if_present(store, store::DIRECTOR_CREDS_ASSET).await?;

    tracing::info!(detach, "deploying director");
    let outcome = driver.deploy(state, creds, detach).await;

    // Persist both blobs unconditionally, even when the deploy errored. The
    // deploy error takes precedence, then the state-write failure over the
    // creds-write failure.
    let mut result = outcome.result.map_err(DeployError::from);
    if let Err(e) = store.store_asset(store::DIRECTOR_STATE_ASSET, &outcome.state).await {
        if result.is_ok() {
            result = Err(DeployError::Persistence {
                asset: store::DIRECTOR_STATE_ASSET,
                source: e,
            });
        }
    }
    if let Err(e) = store.store_asset(store::DIRECTOR_CREDS_ASSET, &outcome.creds).await {
        if result.is_ok() {
            result = Err(DeployError::Persistence {
                asset: store::DIRECTOR_CREDS_ASSET,
                source: e,
            });
        }
    }
    result?;

    extract_secrets(secrets, &outcome.creds, &config.domain)
}

/// The structured fields read out of the director credentials document.
#[derive(Debug, Default, Deserialize)]
struct CredsDoc {
    #[serde(default)]
    credhub_cli_password: String,
    #[serde(default)]
    credhub_admin_client_secret: String,
    #[serde(default)]
    internal_tls: InternalTls,
    #[serde(default)]
    web_admin_password: String,
}

#[derive(Debug, Default, Deserialize)]
struct InternalTls {
    #[serde(default)]
    ca: String,
}

fn extract_secrets(
    secrets: &mut DeploySecrets,
    creds: &[u8],
    domain: &str,
) -> Result<(), DeployError> {
    let doc: CredsDoc = if creds.is_empty() {
        CredsDoc::default()
    } else {
        serde_yaml::from_slice(creds)?
    };

    secrets.credhub_password = doc.credhub_cli_password;
    secrets.credhub_admin_client_secret = doc.credhub_admin_client_secret;
    secrets.credhub_ca_cert = doc.internal_tls.ca;
    secrets.credhub_url = format!("https://{domain}:{CREDHUB_PORT}/");
    secrets.credhub_username = CREDHUB_USERNAME.to_owned();
    secrets.app_username = APP_ADMIN_USERNAME.to_owned();

    // A no-op deploy yields no password; keep the previous one.
    if !doc.web_admin_password.is_empty() {
        secrets.app_password = doc.web_admin_password.clone();
        secrets.metrics_password = doc.web_admin_password;
    }

    Ok(())
}
