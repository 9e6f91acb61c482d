use std::sync::Arc;
use std::time::Duration;

use invoker_shared::invoker::{
    application::Application, environment::Environment, job_invocation::JobInvocation,
    metrics::DEFAULT_METRICS_PORT,
};
use invoker_shared::k8s::api::IntoApi;
use invoker_shared::os::env_var::{parse_env_var_or, EnvVarQuery};

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::RoleBinding;

use super::events::EventPublisher;
use super::resource_ident::ResourceIdentities;

pub const RETRY_DELAY_SECS_LABEL: &str = "RETRY_DELAY_SECS";
pub const TEST_IMAGE_PULL_SECRET_LABEL: &str = "TEST_IMAGE_PULL_SECRET";
pub const METRICS_PORT_LABEL: &str = "METRICS_PORT";
pub const CONTROLLER_NAME_LABEL: &str = "CONTROLLER_NAME";

const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
const DEFAULT_CONTROLLER_NAME: &str = "invoker-controller";

pub trait ControllerKubeClient:
    IntoApi<JobInvocation>
    + IntoApi<Application>
    + IntoApi<Environment>
    + IntoApi<Job>
    + IntoApi<Pod>
    + IntoApi<Secret>
    + IntoApi<ServiceAccount>
    + IntoApi<RoleBinding>
{
}

impl<
        T: IntoApi<JobInvocation>
            + IntoApi<Application>
            + IntoApi<Environment>
            + IntoApi<Job>
            + IntoApi<Pod>
            + IntoApi<Secret>
            + IntoApi<ServiceAccount>
            + IntoApi<RoleBinding>,
    > ControllerKubeClient for T
{
}

/// Settings read from the environment once at start
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Delay before a retryable failure is reconciled again
    pub retry_delay: Duration,
    /// Extra pull secret handed to integration test pods
    pub test_image_pull_secret: Option<String>,
    pub metrics_port: u16,
    /// Reporting component of published events
    pub controller_name: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            test_image_pull_secret: None,
            metrics_port: DEFAULT_METRICS_PORT,
            controller_name: DEFAULT_CONTROLLER_NAME.to_string(),
        }
    }
}

impl ControllerConfig {
    pub fn from_env(query: &dyn EnvVarQuery) -> anyhow::Result<Self> {
        let retry_delay_secs =
            parse_env_var_or(query, RETRY_DELAY_SECS_LABEL, DEFAULT_RETRY_DELAY_SECS)?;
        let test_image_pull_secret = query
            .get_env_var(TEST_IMAGE_PULL_SECRET_LABEL)
            .ok()
            .filter(|s| !s.is_empty());
        let metrics_port = parse_env_var_or(query, METRICS_PORT_LABEL, DEFAULT_METRICS_PORT)?;
        let controller_name = query
            .get_env_var(CONTROLLER_NAME_LABEL)
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTROLLER_NAME.to_string());
        Ok(ControllerConfig {
            retry_delay: Duration::from_secs(retry_delay_secs),
            test_image_pull_secret,
            metrics_port,
            controller_name,
        })
    }
}

pub struct ControllerContext {
    /// Kubernetes client
    pub client: Arc<dyn ControllerKubeClient>,
    pub identities: ResourceIdentities,
    pub publisher: Arc<dyn EventPublisher>,
    pub config: ControllerConfig,
}

impl ControllerContext {
    pub fn new(
        client: Arc<dyn ControllerKubeClient>,
        publisher: Arc<dyn EventPublisher>,
        config: ControllerConfig,
    ) -> Self {
        ControllerContext {
            client,
            identities: ResourceIdentities::new(),
            publisher,
            config,
        }
    }
}
