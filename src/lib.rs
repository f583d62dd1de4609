//! Deployment orchestration for a self-hosted CI control plane.
//!
//! The pipeline reconciles persisted state against requested state across
//! several independent external systems (infrastructure-as-code, a director,
//! a pipeline tool, a certificate issuer) with no transactional support
//! underneath; repeated invocations are idempotent and re-running after a
//! failure is the designed recovery path. External collaborators appear only
//! as trait contracts.

pub mod certs;
pub mod config;
pub mod deploy;
pub mod director;
pub mod error;
pub mod infra;
pub mod pipeline;
pub mod requirements;
pub mod store;
