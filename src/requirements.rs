use std::io::Write;

use crate::certs::{self, AppCerts, CertGenerator, DirectorCerts};
use crate::config::{Config, DeployArgs};
use crate::error::DeployError;
use crate::infra::{IaasClient, Metadata};

// ---------------------------------------------------------------------------
// Pre-infrastructure phase
// ---------------------------------------------------------------------------

/// Deltas that must be settled before the infrastructure apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreInfraRequirements {
    pub region: String,
    pub db_instance_class: String,
    pub source_access_ip: String,
    pub hosted_zone_id: String,
    pub hosted_zone_record_prefix: String,
    pub domain: String,
}

/// Resolve the pre-infrastructure requirements from the persisted config,
/// the requested changes, and live cloud lookups.
pub async fn resolve_pre_infra(
    config: &Config,
    args: &DeployArgs,
    iaas: &dyn IaasClient,
    stderr: &mut dyn Write,
) -> Result<PreInfraRequirements, DeployError> {
    let mut req = PreInfraRequirements {
        region: config.region.clone(),
        db_instance_class: config.db_instance_class.clone(),
        source_access_ip: config.source_access_ip.clone(),
        hosted_zone_id: config.hosted_zone_id.clone(),
        hosted_zone_record_prefix: config.hosted_zone_record_prefix.clone(),
        domain: config.domain.clone(),
    };

    // The region is immutable once persisted; fail before any infra call.
    if !config.region.is_empty() && config.region != args.region {
        return Err(DeployError::ConfigConflict {
            field: "region",
            existing: config.region.clone(),
            requested: args.region.clone(),
        });
    }
    req.region = args.region.clone();

    if let Some(size) = args.db_size {
        req.db_instance_class = size.instance_class().to_owned();
    }

    // In self-update mode the caller already has network access through the
    // existing deployment; redetecting would record the wrong address.
    if !args.self_update {
        req.source_access_ip = detect_source_ip(config, iaas, stderr).await?;
    }

    if let Some(zone) = resolve_hosted_zone(args, iaas, stderr).await? {
        req.hosted_zone_id = zone.hosted_zone_id;
        req.hosted_zone_record_prefix = zone.record_prefix;
        req.domain = zone.domain;
    }

    Ok(req)
}

async fn detect_source_ip(
    config: &Config,
    iaas: &dyn IaasClient,
    stderr: &mut dyn Write,
) -> Result<String, DeployError> {
    let detected = iaas.current_public_ip().await?;
    if detected != config.source_access_ip {
        writeln!(
            stderr,
            "\nWARNING: allowing access from local machine (address: {detected})"
        )?;
    }
    Ok(detected)
}

/// Hosted zone resolution result for an explicitly requested domain.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedZone {
    hosted_zone_id: String,
    record_prefix: String,
    domain: String,
}

async fn resolve_hosted_zone(
    args: &DeployArgs,
    iaas: &dyn IaasClient,
    stderr: &mut dyn Write,
) -> Result<Option<ResolvedZone>, DeployError> {
    let Some(domain) = args.domain.as_deref() else {
        return Ok(None);
    };

    let zone = iaas.find_longest_matching_hosted_zone(domain).await?;
    let record_prefix = domain
        .strip_suffix(&format!(".{}", zone.name))
        .unwrap_or(domain)
        .to_owned();

    writeln!(
        stderr,
        "\nWARNING: adding record {domain} to DNS hosted zone {} ID: {}",
        zone.name, zone.id
    )?;

    Ok(Some(ResolvedZone {
        hosted_zone_id: zone.id,
        record_prefix,
        domain: domain.to_owned(),
    }))
}

// ---------------------------------------------------------------------------
// Pre-deploy phase
// ---------------------------------------------------------------------------

/// Deltas that must be settled before the director deploy, including the
/// certificate lifecycle decisions.
#[derive(Debug, Clone, Default)]
pub struct PreDeployRequirements {
    pub domain: String,
    pub worker_count: u32,
    pub worker_size: String,
    pub web_size: String,
    pub director_public_ip: String,
    pub director_certs: DirectorCerts,
    pub app_certs: AppCerts,
}

/// Resolve the pre-deploy requirements against validated infrastructure
/// outputs.
pub async fn resolve_pre_deploy(
    generator: &dyn CertGenerator,
    args: &DeployArgs,
    domain_changed: bool,
    config: &Config,
    metadata: &Metadata,
    stdout: &mut dyn Write,
) -> Result<PreDeployRequirements, DeployError> {
    // Without a user-requested DNS name the web node is addressed by its
    // public IP.
    let domain = if args.domain.is_some() {
        config.domain.clone()
    } else {
        metadata.web_public_ip.clone()
    };

    let director_certs = certs::ensure_director_certs(
        generator,
        DirectorCerts::from_config(config),
        &config.deployment,
        &metadata.director_public_ip,
        stdout,
    )
    .await?;

    let app_certs = certs::ensure_app_certs(
        generator,
        args,
        domain_changed,
        AppCerts::from_config(config),
        &config.deployment,
        &domain,
    )
    .await?;

    Ok(PreDeployRequirements {
        domain,
        worker_count: args.worker_count,
        worker_size: args.worker_size.clone(),
        web_size: args.web_size.clone(),
        director_public_ip: metadata.director_public_ip.clone(),
        director_certs,
        app_certs,
    })
}
