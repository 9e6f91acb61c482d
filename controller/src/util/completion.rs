use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;

const CONDITION_COMPLETE: &str = "Complete";
const CONDITION_FAILED: &str = "Failed";

/// Whether a Job has run to an end, successful or not. A Job without
/// conditions is still running.
pub fn is_finished(job: &Job) -> bool {
    job.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .and_then(|conditions| conditions.first())
        .map(|condition| {
            condition.type_ == CONDITION_COMPLETE || condition.type_ == CONDITION_FAILED
        })
        .unwrap_or(false)
}

/// Derives whether a JobInvocation is done from the live Jobs of its
/// namespace.
///
/// Nothing invoked means not done. With an explicit job list, every
/// requested job must be finished. Without one, the only job ever invoked is
/// the integration test, and its end ends the invocation.
pub fn evaluate(live_jobs: &[Job], invoked: &[String], requested_count: usize) -> bool {
    if invoked.is_empty() {
        return false;
    }
    let finished = live_jobs
        .iter()
        .filter(|job| invoked.contains(&job.name_any()) && is_finished(job))
        .count();
    if requested_count > 0 {
        finished == requested_count
    } else {
        finished > 0
    }
}
