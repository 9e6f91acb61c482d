pub(crate) mod completion;
pub(crate) mod controller_ctx;
pub(crate) mod events;
pub mod invocation_action;
pub(crate) mod job_watcher;
pub(crate) mod object_cache;
pub(crate) mod resource_ident;
mod shared_test_utils;
pub(crate) mod test_job;

use thiserror::Error;

/// Failures of the Object Cache. `NotStaged`, `KindMismatch` and
/// `SingleViolation` are misuses of the cache and never go away on retry.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("lookup of {kind} {key} failed: {source}")]
    Lookup {
        kind: &'static str,
        key: String,
        #[source]
        source: kube::Error,
    },

    #[error("{kind} {key} was updated under {identity} before being created")]
    NotStaged {
        identity: &'static str,
        kind: &'static str,
        key: String,
    },

    #[error("identity {identity} holds {expected} objects, not {actual}")]
    KindMismatch {
        identity: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("identity {identity} is single and already holds {existing}, cannot add {key}")]
    SingleViolation {
        identity: &'static str,
        existing: String,
        key: String,
    },

    #[error("{kind} {key} was modified concurrently")]
    Conflict { kind: &'static str, key: String },

    #[error("writing {kind} {key} failed: {source}")]
    Flush {
        kind: &'static str,
        key: String,
        #[source]
        source: kube::Error,
    },

    #[error("{kind} {key} could not be (de)serialized: {source}")]
    Serialization {
        kind: &'static str,
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CacheError::Lookup { .. } | CacheError::Conflict { .. } | CacheError::Flush { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Application {namespace}/{name} not found")]
    ApplicationMissing { namespace: String, name: String },

    #[error("Environment {0} not found")]
    EnvironmentMissing(String),

    #[error("Application {namespace}/{name} is not ready")]
    ApplicationNotReady { namespace: String, name: String },

    #[error("Application {app} declares no job named {job}")]
    DefinitionMissing { app: String, job: String },

    #[error("test invocation {0} has no marker")]
    MissingMarker(String),

    #[error("configuration of Application {0} is missing or malformed")]
    UpstreamConfigMissing(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    KubeError(#[from] kube::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ControllerError {
    /// Whether the whole pass should be redone. Non-retryable errors wait
    /// for the JobInvocation or its dependencies to change.
    pub fn is_retryable(&self) -> bool {
        match self {
            ControllerError::ApplicationMissing { .. }
            | ControllerError::EnvironmentMissing(_)
            | ControllerError::ApplicationNotReady { .. }
            | ControllerError::UpstreamConfigMissing(_)
            | ControllerError::KubeError(_)
            | ControllerError::Other(_) => true,
            ControllerError::Cache(e) => e.is_retryable(),
            ControllerError::DefinitionMissing { .. }
            | ControllerError::MissingMarker(_)
            | ControllerError::Serialization(_) => false,
        }
    }

    /// Short label used for the error metric
    pub fn kind(&self) -> &'static str {
        match self {
            ControllerError::ApplicationMissing { .. } => "application_missing",
            ControllerError::EnvironmentMissing(_) => "environment_missing",
            ControllerError::ApplicationNotReady { .. } => "application_not_ready",
            ControllerError::DefinitionMissing { .. } => "definition_missing",
            ControllerError::MissingMarker(_) => "missing_marker",
            ControllerError::UpstreamConfigMissing(_) => "upstream_config_missing",
            ControllerError::Cache(CacheError::Conflict { .. }) => "conflict",
            ControllerError::Cache(_) => "cache",
            ControllerError::KubeError(_) => "kube",
            ControllerError::Serialization(_) => "serialization",
            ControllerError::Other(_) => "other",
        }
    }
}

pub type Result<T, E = ControllerError> = std::result::Result<T, E>;

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(ControllerError::ApplicationNotReady {
            namespace: "ns".to_string(),
            name: "puptoo".to_string()
        }
        .is_retryable());
        assert!(ControllerError::UpstreamConfigMissing("ingress".to_string()).is_retryable());
        assert!(ControllerError::Cache(CacheError::Conflict {
            kind: "Secret",
            key: "ns/run-1-iqe".to_string()
        })
        .is_retryable());
        assert!(!ControllerError::DefinitionMissing {
            app: "puptoo".to_string(),
            job: "nope".to_string()
        }
        .is_retryable());
        assert!(!ControllerError::MissingMarker("ns/run-2".to_string()).is_retryable());
        assert!(!ControllerError::Cache(CacheError::NotStaged {
            identity: "test_secret",
            kind: "Secret",
            key: "ns/run-1-iqe".to_string()
        })
        .is_retryable());
    }
}
