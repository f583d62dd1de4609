use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Persisted configuration aggregate
// ---------------------------------------------------------------------------

/// The persisted deployment configuration.
///
/// Long-lived; mutated incrementally across pipeline stages and written back
/// to the config store at two checkpoints per run (after the infrastructure
/// apply and after the full deploy). `region`, once set, must never change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Identity — immutable once set
    pub deployment: String,
    pub project: String,
    pub region: String,

    // Network / domain
    pub domain: String,
    pub hosted_zone_id: String,
    pub hosted_zone_record_prefix: String,
    pub source_access_ip: String,
    pub director_public_ip: String,

    // Director TLS material — generated exactly once per deployment
    pub director_ca_cert: String,
    pub director_cert: String,
    pub director_key: String,

    // CI web node TLS material
    pub app_cert: String,
    pub app_key: String,
    pub app_ca_cert: String,
    pub app_user_provided_cert: bool,

    // Secrets
    pub director_username: String,
    pub director_password: String,
    pub app_username: String,
    pub app_password: String,
    pub metrics_password: String,
    pub credhub_url: String,
    pub credhub_username: String,
    pub credhub_password: String,
    pub credhub_admin_client_secret: String,
    pub credhub_ca_cert: String,

    // Topology
    pub worker_count: u32,
    pub worker_size: String,
    pub web_size: String,
    pub db_instance_class: String,
}

impl Config {
    /// Fold a secrets bundle back into the persisted aggregate.
    pub fn apply_secrets(&mut self, secrets: &DeploySecrets) {
        self.credhub_password = secrets.credhub_password.clone();
        self.credhub_admin_client_secret = secrets.credhub_admin_client_secret.clone();
        self.credhub_ca_cert = secrets.credhub_ca_cert.clone();
        self.credhub_url = secrets.credhub_url.clone();
        self.credhub_username = secrets.credhub_username.clone();
        self.app_username = secrets.app_username.clone();
        self.app_password = secrets.app_password.clone();
        self.metrics_password = secrets.metrics_password.clone();
        self.director_username = secrets.director_username.clone();
        self.director_password = secrets.director_password.clone();
        self.director_ca_cert = secrets.director_ca_cert.clone();
    }
}

// ---------------------------------------------------------------------------
// Requested changes
// ---------------------------------------------------------------------------

/// User-requested changes for this run, produced by the (external) CLI layer.
#[derive(Debug, Clone, Default)]
pub struct DeployArgs {
    pub region: String,
    /// DNS name for the CI web node. `None` means "use the public IP".
    pub domain: Option<String>,
    /// User-supplied TLS certificate; suppresses certificate generation.
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    /// Database size; `None` retains the previously persisted instance class.
    pub db_size: Option<DbSize>,
    pub worker_count: u32,
    pub worker_size: String,
    pub web_size: String,
    /// Upgrade an already-running deployment from within itself.
    pub self_update: bool,
}

/// Database size, mapped to an IaaS instance class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbSize {
    Small,
    Medium,
    Large,
    XLarge,
    XLarge2,
    XLarge4,
}

impl DbSize {
    pub fn instance_class(self) -> &'static str {
        match self {
            Self::Small => "db.t3.small",
            Self::Medium => "db.t3.medium",
            Self::Large => "db.m5.large",
            Self::XLarge => "db.m5.xlarge",
            Self::XLarge2 => "db.m5.2xlarge",
            Self::XLarge4 => "db.m5.4xlarge",
        }
    }
}

impl FromStr for DbSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            "xlarge" => Ok(Self::XLarge),
            "2xlarge" => Ok(Self::XLarge2),
            "4xlarge" => Ok(Self::XLarge4),
            other => Err(anyhow::anyhow!("unknown db size {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Secrets bundle
// ---------------------------------------------------------------------------

/// Transient credential bundle round-tripped between [`Config`] and the
/// director deploy driver.
///
/// Seeded from the previous config so a no-op deploy that yields no new
/// secret preserves the old one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploySecrets {
    pub credhub_password: String,
    pub credhub_admin_client_secret: String,
    pub credhub_ca_cert: String,
    pub credhub_url: String,
    pub credhub_username: String,
    pub app_username: String,
    pub app_password: String,
    pub metrics_password: String,
    pub director_username: String,
    pub director_password: String,
    pub director_ca_cert: String,
}

impl DeploySecrets {
    pub fn from_config(config: &Config) -> Self {
        Self {
            credhub_password: config.credhub_password.clone(),
            credhub_admin_client_secret: config.credhub_admin_client_secret.clone(),
            credhub_ca_cert: config.credhub_ca_cert.clone(),
            credhub_url: config.credhub_url.clone(),
            credhub_username: config.credhub_username.clone(),
            app_username: config.app_username.clone(),
            app_password: config.app_password.clone(),
            metrics_password: config.metrics_password.clone(),
            director_username: config.director_username.clone(),
            director_password: config.director_password.clone(),
            director_ca_cert: config.director_ca_cert.clone(),
        }
    }
}
