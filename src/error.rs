/// Errors surfaced by the deploy pipeline.
///
/// Collaborator failures propagate verbatim through [`DeployError::Driver`];
/// there are no internal retries. Side effects already persisted by earlier
/// stages are retained — re-running the deploy is the recovery path.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// An immutable field of an existing deployment would change.
    #[error(
        "found previous deployment with {field} {existing:?}; refusing to deploy with \
         {field} {requested:?} as changing {field} for an existing deployment is not supported"
    )]
    ConfigConflict {
        field: &'static str,
        existing: String,
        requested: String,
    },

    /// A required precondition does not hold (e.g. self-update against an
    /// unreachable target).
    #[error("{0}")]
    PreconditionFailed(String),

    /// Infrastructure output is missing required fields.
    #[error("infrastructure output invalid: {0}")]
    InvalidMetadata(String),

    /// A director state or credential asset could not be persisted.
    #[error("failed to persist {asset}: {source}")]
    Persistence {
        asset: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The director credentials document could not be parsed.
    #[error("director credentials document malformed: {0}")]
    MalformedCreds(#[from] serde_yaml::Error),

    /// A collaborator (infrastructure, director, pipeline, certificate,
    /// store) failed; propagated verbatim.
    #[error(transparent)]
    Driver(#[from] anyhow::Error),

    /// Writing a progress or warning line to an output sink failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
