use k8s_openapi::api::core::v1::{EnvVar, ResourceRequirements, Volume, VolumeMount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;

/// Condition set by the Application controller once its own reconciliation succeeded
pub const RECONCILIATION_SUCCESSFUL_CONDITION: &str = "ReconciliationSuccessful";
/// Condition set by the Application controller once its deployments are available
pub const DEPLOYMENTS_READY_CONDITION: &str = "DeploymentsReady";
/// Key of the application configuration document in the Application's config Secret
pub const APP_CONFIG_SECRET_KEY: &str = "cdappconfig.json";

/// Defines the information in the Application CRD that the job
/// invocation controller reads.
///
/// An Application belongs to exactly one Environment and declares a set of
/// named job templates that a JobInvocation can ask for.  The Application's
/// configuration is materialized by its own controller into a Secret named
/// after the Application.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "invoker.sh",
    version = "v1alpha1",
    kind = "Application",
    namespaced,
    status = "ApplicationStatus"
)]
pub struct ApplicationSpec {
    /// Name of the Environment this Application runs in
    pub env_name: String,

    /// Job templates that can be invoked by name
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,

    #[serde(default)]
    pub testing: AppTestingSpec,
}

/// A named job template declared by an Application
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobDefinition {
    pub name: String,

    pub pod_spec: JobPodSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deadline_seconds: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_limit: Option<i32>,
}

/// The container portion of a job template
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobPodSpec {
    pub image: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Falls back to the Environment's resource defaults when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppTestingSpec {
    /// Test plugin identifier of the Application. Also used as the default
    /// test runner image tag.
    #[serde(default)]
    pub iqe_plugin: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Application {
    /// An Application is ready once its controller reports both a successful
    /// reconciliation and available deployments
    pub fn is_ready(&self) -> bool {
        let conditions = match &self.status {
            Some(status) => &status.conditions,
            None => return false,
        };
        let is_true = |type_: &str| {
            conditions
                .iter()
                .any(|c| c.type_ == type_ && c.status == "True")
        };
        is_true(RECONCILIATION_SUCCESSFUL_CONDITION) && is_true(DEPLOYMENTS_READY_CONDITION)
    }

    /// Looks up a job template by name
    pub fn job_definition(&self, name: &str) -> Option<&JobDefinition> {
        self.spec.jobs.iter().find(|j| j.name == name)
    }
}
