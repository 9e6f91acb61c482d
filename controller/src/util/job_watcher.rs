use std::sync::Arc;

use invoker_shared::invoker::job_invocation::JobInvocation;
use k8s_openapi::api::batch::v1::Job;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::ResourceExt;
use log::trace;

/// Finds the JobInvocations that invoked `job`, so that a change to the Job
/// reconciles exactly those and nothing else
pub fn invocations_for_job(
    job: &Job,
    invocations: &[Arc<JobInvocation>],
) -> Vec<ObjectRef<JobInvocation>> {
    let job_name = job.name_any();
    let job_namespace = job.namespace();
    let affected: Vec<ObjectRef<JobInvocation>> = invocations
        .iter()
        .filter(|invocation| invocation.namespace() == job_namespace)
        .filter(|invocation| invocation.invoked_jobs().contains(&job_name))
        .map(|invocation| ObjectRef::from_obj(invocation.as_ref()))
        .collect();
    trace!(
        "invocations_for_job - Job {:?}/{} affects {} JobInvocations",
        job_namespace,
        job_name,
        affected.len()
    );
    affected
}

/// Maps Job events to JobInvocation reconciles using the controller's own
/// cache of JobInvocations
pub fn job_mapper(store: Store<JobInvocation>) -> impl Fn(Job) -> Vec<ObjectRef<JobInvocation>> {
    move |job| invocations_for_job(&job, &store.state())
}

#[cfg(test)]
mod job_watcher_tests {
    use super::super::shared_test_utils::config_for_tests::{invocation, job_with_condition};
    use super::*;
    use invoker_shared::invoker::job_invocation::JobInvocationStatus;

    fn invoked(name: &str, namespace: &str, jobs: &[&str]) -> Arc<JobInvocation> {
        let mut invocation = invocation();
        invocation.metadata.name = Some(name.to_string());
        invocation.metadata.namespace = Some(namespace.to_string());
        invocation.status = Some(JobInvocationStatus {
            jobs: jobs.iter().map(|j| j.to_string()).collect(),
            ..Default::default()
        });
        Arc::new(invocation)
    }

    #[test]
    fn test_routes_only_to_invoking_requests() {
        let _ = env_logger::builder().is_test(true).try_init();

        let invocations = vec![
            invoked("run-1", "ns", &["puptoo-hello-run-1", "puptoo-world-run-1"]),
            invoked("run-2", "ns", &["run-2-iqe"]),
            invoked("run-3", "ns", &[]),
            invoked("run-1", "ns-other", &["puptoo-hello-run-1"]),
        ];

        let job = job_with_condition("puptoo-world-run-1", "ns", Some("Complete"));
        let refs = invocations_for_job(&job, &invocations);
        assert_eq!(refs, vec![ObjectRef::new("run-1").within("ns")]);

        let job = job_with_condition("puptoo-hello-run-1", "ns-other", None);
        let refs = invocations_for_job(&job, &invocations);
        assert_eq!(refs, vec![ObjectRef::new("run-1").within("ns-other")]);
    }

    #[test]
    fn test_unrelated_job_routes_nowhere() {
        let _ = env_logger::builder().is_test(true).try_init();

        let invocations = vec![invoked("run-1", "ns", &["puptoo-hello-run-1"])];
        let job = job_with_condition("someone-elses-job", "ns", Some("Complete"));
        assert!(invocations_for_job(&job, &invocations).is_empty());
        assert!(invocations_for_job(&job, &[]).is_empty());
    }
}
