use std::io::Write;

use crate::certs::CertGenerator;
use crate::config::{Config, DeployArgs, DeploySecrets};
use crate::director::{self, DirectorDriverFactory};
use crate::error::DeployError;
use crate::infra::{IaasClient, InfraDriverFactory, Metadata};
use crate::pipeline::{PipelineClientFactory, PipelineCredentials};
use crate::requirements;
use crate::store::ConfigStore;

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// The top-level deploy pipeline.
///
/// Runs a strict, non-overlapping stage sequence per invocation and
/// short-circuits on the first error. Config is persisted at two
/// checkpoints (after the infrastructure apply and after the full deploy),
/// so a crash in between leaves "infrastructure provisioned, director
/// unconfirmed" — re-running is the recovery path.
pub struct Deployer {
    pub store: Box<dyn ConfigStore>,
    pub iaas: Box<dyn IaasClient>,
    pub infra_factory: Box<dyn InfraDriverFactory>,
    pub director_factory: Box<dyn DirectorDriverFactory>,
    pub pipeline_factory: Box<dyn PipelineClientFactory>,
    pub cert_generator: Box<dyn CertGenerator>,
    pub args: DeployArgs,
    pub stdout: Box<dyn Write + Send>,
    pub stderr: Box<dyn Write + Send>,
}

impl Deployer {
    /// Deploy or upgrade the CI control plane. Idempotent across repeated
    /// invocations; returns the final persisted config.
    pub async fn deploy(&mut self) -> Result<Config, DeployError> {
        let (mut config, created) = self.store.load_or_create(&self.args).await?;
        tracing::info!(deployment = %config.deployment, created, "loaded deployment config");
        if !created {
            writeln!(self.stdout, "\nUSING PREVIOUS DEPLOYMENT CONFIG")?;
        }

        // Captured once, before any mutation: gates certificate reuse and
        // forced pipeline reconfiguration downstream.
        let domain_changed = self.args.domain.as_deref().unwrap_or_default() != config.domain;

        let pre = requirements::resolve_pre_infra(
            &config,
            &self.args,
            self.iaas.as_ref(),
            self.stderr.as_mut(),
        )
        .await?;
        config.region = pre.region;
        config.db_instance_class = pre.db_instance_class;
        config.source_access_ip = pre.source_access_ip;
        config.hosted_zone_id = pre.hosted_zone_id;
        config.hosted_zone_record_prefix = pre.hosted_zone_record_prefix;
        config.domain = pre.domain;

        let metadata = self.apply_infra(&config).await?;
        self.store.update(&config).await?;

        let req = requirements::resolve_pre_deploy(
            self.cert_generator.as_ref(),
            &self.args,
            domain_changed,
            &config,
            &metadata,
            self.stdout.as_mut(),
        )
        .await?;
        config.domain = req.domain;
        config.worker_count = req.worker_count;
        config.worker_size = req.worker_size;
        config.web_size = req.web_size;
        config.director_public_ip = req.director_public_ip;
        config.director_ca_cert = req.director_certs.ca_cert;
        config.director_cert = req.director_certs.cert;
        config.director_key = req.director_certs.key;
        config.app_cert = req.app_certs.cert;
        config.app_key = req.app_certs.key;
        config.app_ca_cert = req.app_certs.ca_cert;
        config.app_user_provided_cert = req.app_certs.user_provided;

        let secrets = if self.args.self_update {
            self.update_and_detach(&config, &metadata).await?
        } else {
            self.deploy_and_configure(&config, &metadata).await?
        };
        config.apply_secrets(&secrets);

        self.store.update(&config).await?;
        tracing::info!(deployment = %config.deployment, "deploy pipeline finished");
        Ok(config)
    }

    /// Apply the infrastructure and return validated outputs. The driver is
    /// released on every exit path.
    async fn apply_infra(&mut self, config: &Config) -> Result<Metadata, DeployError> {
        let mut driver = self.infra_factory.create(config).await?;
        tracing::info!(region = %config.region, "applying infrastructure");
        let result = async {
            driver.apply(false).await?;
            driver.output().await
        }
        .await;
        if let Err(e) = driver.cleanup().await {
            tracing::warn!(error = %e, "infrastructure driver cleanup failed");
        }

        let metadata = result?;
        metadata.assert_valid()?;
        Ok(metadata)
    }

    /// Fresh-deploy path: the pipeline can only be configured after the
    /// first director deploy completes, because it requires a running CI
    /// web node.
    async fn deploy_and_configure(
        &mut self,
        config: &Config,
        metadata: &Metadata,
    ) -> Result<DeploySecrets, DeployError> {
        let secrets = director::deploy_director(
            self.store.as_ref(),
            self.director_factory.as_ref(),
            config,
            metadata,
            false,
        )
        .await?;

        let mut client = self
            .pipeline_factory
            .create(PipelineCredentials {
                target: config.deployment.clone(),
                api_url: format!("https://{}", config.domain),
                username: secrets.app_username.clone(),
                password: secrets.app_password.clone(),
            })
            .await?;
        let result = client.set_default_pipeline(&self.args, config, false).await;
        if let Err(e) = client.cleanup().await {
            tracing::warn!(error = %e, "pipeline client cleanup failed");
        }
        result?;

        write_success_message(config, &secrets, self.stdout.as_mut())?;
        Ok(secrets)
    }

    /// Self-update path: configure the pipeline first (the web node is
    /// already running), then trigger the director deploy detached and
    /// return as soon as submission succeeds.
    async fn update_and_detach(
        &mut self,
        config: &Config,
        metadata: &Metadata,
    ) -> Result<DeploySecrets, DeployError> {
        let mut client = self
            .pipeline_factory
            .create(PipelineCredentials {
                target: config.deployment.clone(),
                api_url: format!("https://{}", config.domain),
                username: config.app_username.clone(),
                password: config.app_password.clone(),
            })
            .await?;
        let result = async {
            if !client.can_connect().await? {
                return Err(DeployError::PreconditionFailed(
                    "self-update requested but the CI web node is not reachable".into(),
                ));
            }
            // The operator tooling may be newer than the running instance.
            client.set_default_pipeline(&self.args, config, true).await?;
            Ok(())
        }
        .await;
        if let Err(e) = client.cleanup().await {
            tracing::warn!(error = %e, "pipeline client cleanup failed");
        }
        result?;

        let secrets = director::deploy_director(
            self.store.as_ref(),
            self.director_factory.as_ref(),
            config,
            metadata,
            true,
        )
        .await?;

        writeln!(self.stdout, "\nUPGRADE RUNNING IN BACKGROUND\n")?;
        Ok(secrets)
    }
}

// ---------------------------------------------------------------------------
// Success message
// ---------------------------------------------------------------------------

const DEPLOY_SUCCESS_TEMPLATE: &str = "\
DEPLOY SUCCESSFUL. Log in with:
ci login --target {{ target }}{% if not user_provided_cert %} --insecure{% endif %} --url https://{{ domain }} --username {{ username }} --password {{ password }}

Metrics available at https://{{ domain }}:3000 using the same username and password

Log into the credential service with:
eval \"$(skyhook info {{ target }} --region {{ region }} --env)\"
";

/// Render the templated success message over finished config values.
fn write_success_message(
    config: &Config,
    secrets: &DeploySecrets,
    stdout: &mut dyn Write,
) -> Result<(), DeployError> {
    let mut env = minijinja::Environment::new();
    env.add_template("deploy-success", DEPLOY_SUCCESS_TEMPLATE)
        .map_err(anyhow::Error::from)?;
    let rendered = env
        .get_template("deploy-success")
        .map_err(anyhow::Error::from)?
        .render(minijinja::context! {
            target => &config.deployment,
            domain => &config.domain,
            region => &config.region,
            username => &secrets.app_username,
            password => &secrets.app_password,
            user_provided_cert => config.app_user_provided_cert,
        })
        .map_err(anyhow::Error::from)?;

    stdout.write_all(rendered.as_bytes())?;
    Ok(())
}
