use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use log::warn;

/// Publishes cluster Events about JobInvocations and Applications.
///
/// Publishing is fire-and-forget: a failure is logged and never fails the
/// reconciliation that emitted the Event.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

pub struct KubeEventPublisher {
    client: Client,
    reporter: Reporter,
}

impl KubeEventPublisher {
    pub fn new(client: Client, controller_name: &str) -> Self {
        KubeEventPublisher {
            client,
            reporter: Reporter {
                controller: controller_name.to_string(),
                instance: None,
            },
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let recorder = Recorder::new(
            self.client.clone(),
            self.reporter.clone(),
            resource_ref.clone(),
        );
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = recorder.publish(event).await {
            warn!(
                "publish - failed to publish {} event for {:?}/{:?}: {:?}",
                reason, resource_ref.namespace, resource_ref.name, e
            );
        }
    }
}

/// Event reasons, shown in the REASON column of `kubectl get events`
pub mod reasons {
    /// Every invoked job finished
    pub const INVOCATION_COMPLETED: &str = "JobInvocationComplete";
    /// Jobs were created for the JobInvocation
    pub const JOBS_INVOKED: &str = "JobsInvoked";
    pub const APPLICATION_MISSING: &str = "ApplicationMissing";
    pub const APPLICATION_NOT_READY: &str = "ApplicationNotReady";
    pub const ENVIRONMENT_MISSING: &str = "EnvironmentMissing";
    /// The JobInvocation names a job its Application does not declare
    pub const JOB_DEFINITION_MISSING: &str = "JobNameMissing";
    pub const MARKER_MISSING: &str = "IqeMarkerMissing";
    /// An Application's configuration Secret could not be read
    pub const APP_CONFIG_MISSING: &str = "AppConfigMissing";
    pub const INVOCATION_FAILED: &str = "InvocationFailed";
}

/// Event actions, shown in the ACTION column of `kubectl get events`
pub mod actions {
    pub const RECONCILE: &str = "Reconcile";
    pub const INVOKE: &str = "Invoke";
}
