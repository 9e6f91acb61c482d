use crate::k8s::OwnershipInfo;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use std::collections::BTreeMap;

/// Defines the information in the JobInvocation CRD
///
/// A JobInvocation asks the controller to run a set of jobs that an
/// Application has declared, by name, and optionally one integration test
/// job. Each named job is invoked at most once over the lifetime of the
/// JobInvocation.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
// group = API_NAMESPACE and version = API_VERSION
#[kube(
    group = "invoker.sh",
    version = "v1alpha1",
    kind = "JobInvocation",
    namespaced,
    status = "JobInvocationStatus",
    shortname = "ji",
    printcolumn = r#"{"name":"Completed", "type":"boolean", "jsonPath":".status.completed"}"#
)]
pub struct JobInvocationSpec {
    /// Name of the Application that declares the jobs
    pub app_name: String,

    /// Names of the Application jobs to invoke, in order
    #[serde(default)]
    pub jobs: Vec<String>,

    /// Optional integration test job to run against the Application
    #[serde(default)]
    pub testing: JobTestingSpec,
}

/// Testing payload of a JobInvocation
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobTestingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iqe: Option<IqeJobSpec>,
}

/// Describes the test runner invocation
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IqeJobSpec {
    /// Overrides the image tag of the test runner. Defaults to the
    /// Application's test plugin.
    #[serde(default)]
    pub image_tag: String,

    /// Marker expression passed to the test runner with `-m`. Required.
    #[serde(default)]
    pub marker: String,

    /// Optional filter expression passed to the test runner with `-k`
    #[serde(default)]
    pub filter: String,

    /// Value of ENV_FOR_DYNACONF in the test container
    #[serde(default)]
    pub dynaconf_env_name: String,
}

/// Observed state of a JobInvocation. Only the controller writes it.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobInvocationStatus {
    /// True once every invoked job has either completed or failed past its
    /// backoff limit. Never goes back to false.
    #[serde(default)]
    pub completed: bool,

    /// Names of the managed jobs this JobInvocation created
    #[serde(default)]
    pub jobs: Vec<String>,

    /// Invoked job name to the name of the pod running it
    #[serde(default)]
    pub pod_names: BTreeMap<String, String>,
}

impl JobInvocation {
    /// Names of the jobs already invoked for this JobInvocation, empty if
    /// no status has been written yet
    pub fn invoked_jobs(&self) -> &[String] {
        self.status
            .as_ref()
            .map(|s| s.jobs.as_slice())
            .unwrap_or_default()
    }

    /// Whether the JobInvocation asks for an integration test job. An
    /// empty test payload asks for nothing.
    pub fn has_test_payload(&self) -> bool {
        self.spec
            .testing
            .iqe
            .as_ref()
            .is_some_and(|iqe| *iqe != IqeJobSpec::default())
    }

    /// Builds the controlling OwnerReference placed on every object created
    /// on behalf of this JobInvocation
    pub fn owner_reference(&self) -> OwnerReference {
        OwnershipInfo::new(
            "JobInvocation",
            self.name_any(),
            self.uid().unwrap_or_default(),
        )
        .to_owner_reference()
    }
}
