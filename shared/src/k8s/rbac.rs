use super::{invocation_labels, pod::image_pull_secrets};
use crate::invoker::job_invocation::JobInvocation;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

/// ClusterRole granted to integration tests running with `edit` access
pub const EDIT_CLUSTER_ROLE: &str = "edit";
const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

fn invocation_meta(
    invocation: &JobInvocation,
    app_name: &str,
    name: &str,
) -> anyhow::Result<ObjectMeta> {
    let namespace = invocation.namespace().ok_or_else(|| {
        anyhow::anyhow!(
            "JobInvocation {} has no namespace",
            invocation.name_any()
        )
    })?;
    Ok(ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace),
        labels: Some(invocation_labels(app_name, &invocation.name_any())),
        owner_references: Some(vec![invocation.owner_reference()]),
        ..Default::default()
    })
}

/// Creates the dedicated service account of an integration test, able to
/// pull images with the given secrets
pub fn create_new_service_account(
    invocation: &JobInvocation,
    app_name: &str,
    name: &str,
    pull_secrets: &[String],
) -> anyhow::Result<ServiceAccount> {
    Ok(ServiceAccount {
        metadata: invocation_meta(invocation, app_name, name)?,
        image_pull_secrets: Some(image_pull_secrets(pull_secrets)),
        ..Default::default()
    })
}

/// Binds the service account of the same name to the `edit` ClusterRole,
/// within the JobInvocation's namespace
pub fn create_new_edit_role_binding(
    invocation: &JobInvocation,
    app_name: &str,
    name: &str,
) -> anyhow::Result<RoleBinding> {
    let metadata = invocation_meta(invocation, app_name, name)?;
    Ok(RoleBinding {
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: name.to_string(),
            namespace: metadata.namespace.clone(),
            ..Default::default()
        }]),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: EDIT_CLUSTER_ROLE.to_string(),
        },
        metadata,
    })
}
