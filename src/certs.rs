use std::io::Write;

use async_trait::async_trait;
use ::time::{Duration, OffsetDateTime};
use x509_parser::prelude::*;

use crate::config::{Config, DeployArgs};
use crate::error::DeployError;

/// Renew the CI web node certificate when less than this much validity
/// remains.
pub const RENEWAL_MARGIN: Duration = Duration::days(28);

/// Fixed internal address of the director, baked into its certificate.
pub const DIRECTOR_INTERNAL_IP: &str = "10.0.0.6";

// ---------------------------------------------------------------------------
// Generator contract
// ---------------------------------------------------------------------------

/// TLS material returned by the certificate generator.
#[derive(Debug, Clone, Default)]
pub struct GeneratedCerts {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
    pub ca_cert: Vec<u8>,
}

/// Issues certificates for one or more hostnames or IP addresses.
///
/// The issuance protocol (ACME or self-signed) lives behind this contract.
#[async_trait]
pub trait CertGenerator: Send + Sync {
    async fn generate(&self, deployment: &str, hosts: &[String])
    -> anyhow::Result<GeneratedCerts>;
}

// ---------------------------------------------------------------------------
// Director certificate
// ---------------------------------------------------------------------------

/// Director TLS material as carried in the config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorCerts {
    pub ca_cert: String,
    pub cert: String,
    pub key: String,
}

impl DirectorCerts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ca_cert: config.director_ca_cert.clone(),
            cert: config.director_cert.clone(),
            key: config.director_key.clone(),
        }
    }
}

/// Generate director TLS material exactly once in the lifetime of a
/// deployment.
///
/// If a director CA is already present the generator is never called again:
/// changing it forces a director redeploy even when nothing else changed.
/// Generation binds the certificate to the resolved public IP and the fixed
/// internal address.
pub async fn ensure_director_certs(
    generator: &dyn CertGenerator,
    current: DirectorCerts,
    deployment: &str,
    public_ip: &str,
    stdout: &mut dyn Write,
) -> Result<DirectorCerts, DeployError> {
    if !current.ca_cert.is_empty() {
        return Ok(current);
    }

    writeln!(
        stdout,
        "\nGENERATING DIRECTOR CERTIFICATE ({public_ip}, {DIRECTOR_INTERNAL_IP})"
    )?;

    let generated = generator
        .generate(
            deployment,
            &[public_ip.to_owned(), DIRECTOR_INTERNAL_IP.to_owned()],
        )
        .await?;

    Ok(DirectorCerts {
        ca_cert: String::from_utf8_lossy(&generated.ca_cert).into_owned(),
        cert: String::from_utf8_lossy(&generated.cert).into_owned(),
        key: String::from_utf8_lossy(&generated.key).into_owned(),
    })
}

// ---------------------------------------------------------------------------
// CI web node certificate
// ---------------------------------------------------------------------------

/// CI web node TLS material as carried in the config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppCerts {
    pub cert: String,
    pub key: String,
    pub ca_cert: String,
    pub user_provided: bool,
}

impl AppCerts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cert: config.app_cert.clone(),
            key: config.app_key.clone(),
            ca_cert: config.app_ca_cert.clone(),
            user_provided: config.app_user_provided_cert,
        }
    }
}

/// Decide whether the CI web node certificate must be (re)issued.
///
/// Ordered decision list: user-supplied material is stored verbatim and
/// marked user-provided; an existing certificate is reused when the domain
/// is unchanged and more than [`RENEWAL_MARGIN`] of validity remains;
/// otherwise a new certificate is generated bound to the resolved domain
/// (which defaults to the web node's public IP when no DNS name was
/// requested).
pub async fn ensure_app_certs(
    generator: &dyn CertGenerator,
    args: &DeployArgs,
    domain_changed: bool,
    current: AppCerts,
    deployment: &str,
    domain: &str,
) -> Result<AppCerts, DeployError> {
    let mut certs = current;

    if let Some(cert) = &args.tls_cert {
        certs.cert = cert.clone();
        certs.key = args.tls_key.clone().unwrap_or_default();
        certs.user_provided = true;
        return Ok(certs);
    }

    if !certs.cert.is_empty() && !domain_changed && time_till_expiry(&certs.cert) > RENEWAL_MARGIN
    {
        return Ok(certs);
    }

    let generated = generator.generate(deployment, &[domain.to_owned()]).await?;

    certs.cert = String::from_utf8_lossy(&generated.cert).into_owned();
    certs.key = String::from_utf8_lossy(&generated.key).into_owned();
    certs.ca_cert = String::from_utf8_lossy(&generated.ca_cert).into_owned();

    Ok(certs)
}

/// Remaining validity of a PEM-encoded certificate.
///
/// Any decode or parse failure yields zero, which callers treat the same as
/// "already expired".
pub fn time_till_expiry(cert_pem: &str) -> Duration {
    let mut reader = cert_pem.as_bytes();
    let Some(Ok(der)) = rustls_pemfile::certs(&mut reader).next() else {
        return Duration::ZERO;
    };
    let Ok((_, cert)) = X509Certificate::from_der(der.as_ref()) else {
        return Duration::ZERO;
    };
    let remaining = cert.validity().not_after.to_datetime() - OffsetDateTime::now_utc();
    remaining.max(Duration::ZERO)
}
