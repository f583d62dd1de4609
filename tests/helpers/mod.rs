//! In-memory recording doubles for the deploy pipeline's collaborators.
//!
//! Every double appends to a shared call log so tests can assert on call
//! ordering across collaborators.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use skyhook::certs::{CertGenerator, GeneratedCerts};
use skyhook::config::{Config, DeployArgs};
use skyhook::deploy::Deployer;
use skyhook::director::{DeployOutcome, DirectorDriver, DirectorDriverFactory};
use skyhook::infra::{HostedZone, IaasClient, InfraDriver, InfraDriverFactory, Metadata};
use skyhook::pipeline::{PipelineClient, PipelineClientFactory, PipelineCredentials};
use skyhook::store::ConfigStore;

pub type CallLog = Arc<Mutex<Vec<String>>>;

fn record(log: &CallLog, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

// ---------------------------------------------------------------------------
// Output sinks
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreInner {
    config: Option<Config>,
    assets: HashMap<String, Vec<u8>>,
}

#[derive(Clone)]
pub struct MemoryStore {
    log: CallLog,
    inner: Arc<Mutex<StoreInner>>,
    fail_store_asset: Arc<Mutex<bool>>,
}

impl MemoryStore {
    fn new(log: CallLog) -> Self {
        Self {
            log,
            inner: Arc::default(),
            fail_store_asset: Arc::default(),
        }
    }

    pub fn seed(&self, config: Config) {
        self.inner.lock().unwrap().config = Some(config);
    }

    pub fn fail_asset_writes(&self) {
        *self.fail_store_asset.lock().unwrap() = true;
    }

    pub fn stored_config(&self) -> Option<Config> {
        self.inner.lock().unwrap().config.clone()
    }

    pub fn asset(&self, name: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().assets.get(name).cloned()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn load_or_create(&self, args: &DeployArgs) -> anyhow::Result<(Config, bool)> {
        record(&self.log, "store.load_or_create");
        let mut inner = self.inner.lock().unwrap();
        if let Some(config) = &inner.config {
            return Ok((config.clone(), false));
        }
        let config = Config {
            deployment: "skyhook-ci".into(),
            project: "ci".into(),
            domain: args.domain.clone().unwrap_or_default(),
            ..Config::default()
        };
        inner.config = Some(config.clone());
        Ok((config, true))
    }

    async fn update(&self, config: &Config) -> anyhow::Result<()> {
        record(&self.log, "store.update");
        self.inner.lock().unwrap().config = Some(config.clone());
        Ok(())
    }

    async fn has_asset(&self, name: &str) -> anyhow::Result<bool> {
        Ok(self.inner.lock().unwrap().assets.contains_key(name))
    }

    async fn load_asset(&self, name: &str) -> anyhow::Result<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .assets
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such asset {name}"))
    }

    async fn store_asset(&self, name: &str, data: &[u8]) -> anyhow::Result<()> {
        record(&self.log, format!("store.store_asset {name}"));
        if *self.fail_store_asset.lock().unwrap() {
            anyhow::bail!("asset write refused: {name}");
        }
        self.inner
            .lock()
            .unwrap()
            .assets
            .insert(name.to_owned(), data.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// IaaS lookups
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StubIaas {
    pub public_ip: Arc<Mutex<String>>,
    pub zones: Arc<Mutex<Vec<HostedZone>>>,
}

#[async_trait]
impl IaasClient for StubIaas {
    async fn find_longest_matching_hosted_zone(&self, domain: &str) -> anyhow::Result<HostedZone> {
        self.zones
            .lock()
            .unwrap()
            .iter()
            .filter(|z| domain == z.name || domain.ends_with(&format!(".{}", z.name)))
            .max_by_key(|z| z.name.len())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no hosted zone matches {domain}"))
    }

    async fn current_public_ip(&self) -> anyhow::Result<String> {
        Ok(self.public_ip.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Infrastructure driver
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FakeInfra {
    log: CallLog,
    pub metadata: Arc<Mutex<Metadata>>,
}

#[async_trait]
impl InfraDriver for FakeInfra {
    async fn apply(&mut self, destroy: bool) -> anyhow::Result<()> {
        record(&self.log, format!("infra.apply destroy={destroy}"));
        Ok(())
    }

    async fn output(&self) -> anyhow::Result<Metadata> {
        record(&self.log, "infra.output");
        Ok(self.metadata.lock().unwrap().clone())
    }

    async fn cleanup(&mut self) -> anyhow::Result<()> {
        record(&self.log, "infra.cleanup");
        Ok(())
    }
}

#[async_trait]
impl InfraDriverFactory for FakeInfra {
    async fn create(&self, _config: &Config) -> anyhow::Result<Box<dyn InfraDriver>> {
        Ok(Box::new(self.clone()))
    }
}

// ---------------------------------------------------------------------------
// Director driver
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FakeDirector {
    log: CallLog,
    pub state_out: Arc<Mutex<Vec<u8>>>,
    pub creds_out: Arc<Mutex<Vec<u8>>>,
    pub fail_deploy: Arc<Mutex<bool>>,
    pub received: Arc<Mutex<Option<(Vec<u8>, Vec<u8>, bool)>>>,
}

#[async_trait]
impl DirectorDriver for FakeDirector {
    async fn deploy(&mut self, state: Vec<u8>, creds: Vec<u8>, detach: bool) -> DeployOutcome {
        record(&self.log, format!("director.deploy detach={detach}"));
        *self.received.lock().unwrap() = Some((state, creds, detach));
        DeployOutcome {
            state: self.state_out.lock().unwrap().clone(),
            creds: self.creds_out.lock().unwrap().clone(),
            result: if *self.fail_deploy.lock().unwrap() {
                Err(anyhow::anyhow!("director deploy failed"))
            } else {
                Ok(())
            },
        }
    }

    async fn cleanup(&mut self) -> anyhow::Result<()> {
        record(&self.log, "director.cleanup");
        Ok(())
    }
}

#[async_trait]
impl DirectorDriverFactory for FakeDirector {
    async fn create(
        &self,
        _config: &Config,
        _metadata: &Metadata,
    ) -> anyhow::Result<Box<dyn DirectorDriver>> {
        Ok(Box::new(self.clone()))
    }
}

// ---------------------------------------------------------------------------
// Pipeline client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FakePipeline {
    log: CallLog,
    pub reachable: Arc<Mutex<bool>>,
    pub credentials: Arc<Mutex<Option<PipelineCredentials>>>,
}

#[async_trait]
impl PipelineClient for FakePipeline {
    async fn can_connect(&self) -> anyhow::Result<bool> {
        record(&self.log, "pipeline.can_connect");
        Ok(*self.reachable.lock().unwrap())
    }

    async fn set_default_pipeline(
        &self,
        _args: &DeployArgs,
        _config: &Config,
        allow_version_mismatch: bool,
    ) -> anyhow::Result<()> {
        record(
            &self.log,
            format!("pipeline.set_default_pipeline mismatch={allow_version_mismatch}"),
        );
        Ok(())
    }

    async fn cleanup(&mut self) -> anyhow::Result<()> {
        record(&self.log, "pipeline.cleanup");
        Ok(())
    }
}

#[async_trait]
impl PipelineClientFactory for FakePipeline {
    async fn create(
        &self,
        credentials: PipelineCredentials,
    ) -> anyhow::Result<Box<dyn PipelineClient>> {
        *self.credentials.lock().unwrap() = Some(credentials);
        Ok(Box::new(self.clone()))
    }
}

// ---------------------------------------------------------------------------
// Certificate generator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FakeCertGen {
    log: CallLog,
    pub calls: Arc<Mutex<Vec<Vec<String>>>>,
}

#[async_trait]
impl CertGenerator for FakeCertGen {
    async fn generate(
        &self,
        _deployment: &str,
        hosts: &[String],
    ) -> anyhow::Result<GeneratedCerts> {
        record(&self.log, format!("certs.generate {}", hosts.join(",")));
        self.calls.lock().unwrap().push(hosts.to_vec());
        Ok(GeneratedCerts {
            cert: format!("cert:{}", hosts.join(",")).into_bytes(),
            key: b"generated-key".to_vec(),
            ca_cert: b"generated-ca".to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

pub const DEFAULT_CREDS_YAML: &str = "\
credhub_cli_password: ch-pass
credhub_admin_client_secret: ch-secret
internal_tls:
  ca: internal-ca
web_admin_password: admin-pass
";

/// One fully-wired set of doubles sharing a call log.
pub struct World {
    pub log: CallLog,
    pub store: MemoryStore,
    pub iaas: StubIaas,
    pub infra: FakeInfra,
    pub director: FakeDirector,
    pub pipeline: FakePipeline,
    pub certgen: FakeCertGen,
    pub stdout: SharedBuf,
    pub stderr: SharedBuf,
}

impl World {
    pub fn new() -> Self {
        let log: CallLog = Arc::default();
        Self {
            store: MemoryStore::new(log.clone()),
            iaas: StubIaas {
                public_ip: Arc::new(Mutex::new("203.0.113.9".into())),
                zones: Arc::new(Mutex::new(vec![
                    HostedZone {
                        name: "example.com".into(),
                        id: "Z-ROOT".into(),
                    },
                    HostedZone {
                        name: "dev.example.com".into(),
                        id: "Z-DEV".into(),
                    },
                ])),
            },
            infra: FakeInfra {
                log: log.clone(),
                metadata: Arc::new(Mutex::new(Metadata {
                    director_public_ip: "34.248.0.10".into(),
                    web_public_ip: "52.214.0.20".into(),
                })),
            },
            director: FakeDirector {
                log: log.clone(),
                state_out: Arc::new(Mutex::new(b"{\"directors\":1}".to_vec())),
                creds_out: Arc::new(Mutex::new(DEFAULT_CREDS_YAML.as_bytes().to_vec())),
                fail_deploy: Arc::default(),
                received: Arc::default(),
            },
            pipeline: FakePipeline {
                log: log.clone(),
                reachable: Arc::new(Mutex::new(true)),
                credentials: Arc::default(),
            },
            certgen: FakeCertGen {
                log: log.clone(),
                calls: Arc::default(),
            },
            stdout: SharedBuf::default(),
            stderr: SharedBuf::default(),
            log,
        }
    }

    pub fn deployer(&self, args: DeployArgs) -> Deployer {
        Deployer {
            store: Box::new(self.store.clone()),
            iaas: Box::new(self.iaas.clone()),
            infra_factory: Box::new(self.infra.clone()),
            director_factory: Box::new(self.director.clone()),
            pipeline_factory: Box::new(self.pipeline.clone()),
            cert_generator: Box::new(self.certgen.clone()),
            args,
            stdout: Box::new(self.stdout.clone()),
            stderr: Box::new(self.stderr.clone()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}
