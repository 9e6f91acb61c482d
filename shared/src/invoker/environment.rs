use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::CustomResource;
use log::warn;
use schemars::JsonSchema;

/// Defines the information in the Environment CRD that the job
/// invocation controller reads.
///
/// An Environment is cluster scoped and is shared by every Application
/// that names it.  It decides which base image runs integration tests and
/// how much of the cluster and of the configuration those tests can reach.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(group = "invoker.sh", version = "v1alpha1", kind = "Environment")]
pub struct EnvironmentSpec {
    #[serde(default)]
    pub providers: EnvironmentProviders,

    /// Requests and limits applied to job containers that do not set any
    #[serde(default)]
    pub resource_defaults: ResourceRequirements,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentProviders {
    /// Image pull secrets made available to every Application namespace
    #[serde(default)]
    pub pull_secrets: Vec<NamespacedName>,

    #[serde(default)]
    pub testing: TestingConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, Hash, JsonSchema)]
pub struct NamespacedName {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestingConfig {
    /// Cluster access granted to test pods: `edit` or `view`
    #[serde(default, rename = "k8sAccessLevel")]
    pub k8s_access_level: String,

    /// Configuration mounted into test pods: `environment`, `app` or `none`
    #[serde(default)]
    pub config_access: String,

    #[serde(default)]
    pub iqe: IqeConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IqeConfig {
    /// Test runner image, without tag
    #[serde(default)]
    pub image_base: String,

    #[serde(default)]
    pub resources: ResourceRequirements,
}

/// Cluster access level of test pods
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterAccessLevel {
    /// Test pods get a dedicated service account bound to the `edit` role
    Edit,
    /// Test pods reuse the Application's service account
    View,
}

/// Configuration made available to test pods
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigAccessLevel {
    /// Every Application's configuration in the Environment, plus the
    /// owning Application's own
    Environment,
    /// Only the owning Application's configuration
    App,
    None,
}

/// One configuration mount of a test pod
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigMount {
    /// The aggregated Secret holding every sibling Application's configuration
    Aggregated,
    /// The owning Application's config Secret
    App,
}

impl ConfigAccessLevel {
    /// Mounts granted by this level. Each level is a superset of the levels below it.
    pub fn mounts(&self) -> &'static [ConfigMount] {
        match self {
            ConfigAccessLevel::Environment => &[ConfigMount::Aggregated, ConfigMount::App],
            ConfigAccessLevel::App => &[ConfigMount::App],
            ConfigAccessLevel::None => &[],
        }
    }
}

impl Environment {
    /// Parses the cluster access level. Unknown values give `None` so that
    /// test pods fall back to the namespace default service account.
    pub fn cluster_access_level(&self) -> Option<ClusterAccessLevel> {
        match self.spec.providers.testing.k8s_access_level.as_str() {
            "edit" => Some(ClusterAccessLevel::Edit),
            "view" => Some(ClusterAccessLevel::View),
            other => {
                warn!(
                    "cluster_access_level - unknown access level {:?}, leaving service account unset",
                    other
                );
                None
            }
        }
    }

    /// Parses the configuration access level. Unknown values mount nothing.
    pub fn config_access_level(&self) -> ConfigAccessLevel {
        match self.spec.providers.testing.config_access.as_str() {
            "environment" => ConfigAccessLevel::Environment,
            "app" => ConfigAccessLevel::App,
            "none" => ConfigAccessLevel::None,
            other => {
                warn!(
                    "config_access_level - unknown config access {:?}, mounting nothing",
                    other
                );
                ConfigAccessLevel::None
            }
        }
    }

    /// Names of the pull secrets, as they appear once copied into an
    /// Application namespace
    pub fn pull_secret_names(&self) -> Vec<String> {
        self.spec
            .providers
            .pull_secrets
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }
}
