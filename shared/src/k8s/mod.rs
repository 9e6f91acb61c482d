use super::invoker::{API_NAMESPACE, API_VERSION};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::collections::BTreeMap;

pub mod api;
pub mod job;
pub mod pod;
pub mod rbac;

pub const ERROR_NOT_FOUND: u16 = 404;
pub const ERROR_CONFLICT: u16 = 409;

/// Label carrying the owning Application's name
pub const APP_LABEL_ID: &str = "app";
/// Label identifying the controller that manages an object
pub const CONTROLLER_LABEL_ID: &str = "controller";
/// Label carrying the name of the JobInvocation an object was created for
pub const INVOCATION_LABEL_ID: &str = "invoker.sh/invocation";
/// Label the batch controller stamps on the pods of a Job
pub const JOB_NAME_LABEL_ID: &str = "job-name";

/// OwnershipInfo provides enough information to identify
/// the invoker custom resource an object depends on
#[derive(Clone, Debug)]
pub struct OwnershipInfo {
    object_kind: String,
    object_uid: String,
    object_name: String,
}

impl OwnershipInfo {
    pub fn new(object_kind: &str, object_name: String, object_uid: String) -> Self {
        OwnershipInfo {
            object_kind: object_kind.to_string(),
            object_uid,
            object_name,
        }
    }

    pub fn get_api_version(&self) -> String {
        format!("{}/{}", API_NAMESPACE, API_VERSION)
    }

    pub fn get_kind(&self) -> String {
        self.object_kind.clone()
    }

    pub fn get_name(&self) -> String {
        self.object_name.clone()
    }

    pub fn get_uid(&self) -> String {
        self.object_uid.clone()
    }

    /// Renders the controlling OwnerReference, so that the object is
    /// garbage collected along with its owner
    pub fn to_owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: self.get_api_version(),
            kind: self.get_kind(),
            controller: Some(true),
            block_owner_deletion: Some(true),
            name: self.get_name(),
            uid: self.get_uid(),
        }
    }
}

/// Labels stamped on every object created for a JobInvocation
pub fn invocation_labels(app_name: &str, invocation_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(APP_LABEL_ID.to_string(), app_name.to_string());
    labels.insert(
        INVOCATION_LABEL_ID.to_string(),
        invocation_name.to_string(),
    );
    labels.insert(CONTROLLER_LABEL_ID.to_string(), API_NAMESPACE.to_string());
    labels
}

/// Whether a kube error is an API error with the given status code
fn has_status_code(error: &kube::Error, code: u16) -> bool {
    matches!(error, kube::Error::Api(ae) if ae.code == code)
}

/// A conflict is returned both for a create of an existing name and for a
/// replace carrying a stale resourceVersion
pub fn is_conflict(error: &kube::Error) -> bool {
    has_status_code(error, ERROR_CONFLICT)
}

#[cfg(test)]
pub mod test_ownership {
    use super::*;
    use kube::core::ErrorResponse;

    #[test]
    fn test_ownership_from_invocation() {
        let name = "asdf";
        let uid = "zxcv";
        let ownership = OwnershipInfo::new("JobInvocation", name.to_string(), uid.to_string());
        assert_eq!(
            format!("{}/{}", API_NAMESPACE, API_VERSION),
            ownership.get_api_version()
        );
        assert_eq!("JobInvocation", &ownership.get_kind());
        let owner = ownership.to_owner_reference();
        assert_eq!(Some(true), owner.controller);
        assert_eq!(Some(true), owner.block_owner_deletion);
        assert_eq!(name, &owner.name);
        assert_eq!(uid, &owner.uid);
    }

    #[test]
    fn test_invocation_labels() {
        let labels = invocation_labels("puptoo", "run-1");
        assert_eq!(labels.get(APP_LABEL_ID).unwrap(), "puptoo");
        assert_eq!(labels.get(INVOCATION_LABEL_ID).unwrap(), "run-1");
        assert_eq!(labels.get(CONTROLLER_LABEL_ID).unwrap(), "invoker.sh");
    }

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "".to_string(),
            reason: "".to_string(),
            code,
        })
    }

    #[test]
    fn test_error_classification() {
        assert!(!is_conflict(&api_error(ERROR_NOT_FOUND)));
        assert!(is_conflict(&api_error(ERROR_CONFLICT)));
        assert!(!is_conflict(&api_error(500)));
    }
}
