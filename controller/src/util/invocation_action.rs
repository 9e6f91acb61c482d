use super::completion;
use super::controller_ctx::ControllerContext;
use super::events::{actions, reasons};
use super::job_watcher::job_mapper;
use super::object_cache::{NamespacedName, ObjectCache};
use super::test_job::stage_test_job;
use super::{ControllerError, Result};
use crate::{INVOKED_JOB_COUNT_METRIC, RECONCILE_ERROR_COUNT_METRIC};
use invoker_shared::invoker::{
    application::Application,
    environment::Environment,
    job_invocation::{JobInvocation, JobInvocationStatus},
    API_NAMESPACE,
};
use invoker_shared::k8s::{
    api::{Api, IntoApi},
    job::{create_new_job_from_definition, managed_job_name},
    pod::newest_pod_names,
    CONTROLLER_LABEL_ID, INVOCATION_LABEL_ID,
};
use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{ListParams, ResourceExt},
    runtime::{
        controller::{Action, Controller},
        events::EventType,
        watcher::Config,
    },
    Resource,
};
use log::{error, info, trace, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Initialize the JobInvocation controller. Besides JobInvocations, it
/// watches the Jobs it created and routes their changes back to the
/// JobInvocations that invoked them.
pub async fn run(ctx: Arc<ControllerContext>) -> anyhow::Result<()> {
    let api = IntoApi::<JobInvocation>::all(ctx.client.as_ref()).as_inner();
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("JobInvocation CRD is not queryable; {e:?}. Is the CRD installed?");
        return Err(e.into());
    }
    let jobs = IntoApi::<Job>::all(ctx.client.as_ref()).as_inner();
    let managed_jobs =
        Config::default().labels(&format!("{}={}", CONTROLLER_LABEL_ID, API_NAMESPACE));

    let controller = Controller::new(api, Config::default().any_semantic());
    let mapper = job_mapper(controller.store());
    controller
        .watches(jobs, managed_jobs, mapper)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| {
            match result {
                Ok((invocation, _)) => trace!("run - reconciled {}", invocation),
                Err(e) => trace!("run - reconcile failed: {:?}", e),
            }
            futures::future::ready(())
        })
        .await;
    Ok(())
}

pub(crate) fn error_policy(
    invocation: Arc<JobInvocation>,
    error: &ControllerError,
    ctx: Arc<ControllerContext>,
) -> Action {
    RECONCILE_ERROR_COUNT_METRIC
        .with_label_values(&[error.kind()])
        .inc();
    if error.is_retryable() {
        warn!(
            "reconcile of {:?}/{} failed, retrying: {}",
            invocation.namespace(),
            invocation.name_any(),
            error
        );
        Action::requeue(ctx.config.retry_delay)
    } else {
        error!(
            "reconcile of {:?}/{} failed until the JobInvocation changes: {}",
            invocation.namespace(),
            invocation.name_any(),
            error
        );
        Action::await_change()
    }
}

/// This function is the main Reconcile function for JobInvocation resources.
/// It is called for every change to a JobInvocation, for every change to a
/// Job a JobInvocation invoked, and for every existing JobInvocation on
/// startup. Each step is derived from the current state of the cluster, so
/// any number of repeated calls converge on the same result.
///
///   | --> JobInvocation gone => Do nothing
///   | --> Refresh `completed` and `podNames` from the live Jobs
///   | --> Completed => Do nothing
///   | --> Jobs already invoked => Do nothing
///   | --> Otherwise => Create the requested Jobs (and the test Job) once
pub async fn reconcile(
    invocation: Arc<JobInvocation>,
    ctx: Arc<ControllerContext>,
) -> Result<Action> {
    let namespace = invocation.namespace().ok_or_else(|| {
        anyhow::anyhow!("JobInvocation {} has no namespace", invocation.name_any())
    })?;
    let name = invocation.name_any();
    trace!("reconcile - JobInvocation {}/{}", namespace, name);

    // The watch may be behind, so work from the current object
    let api = IntoApi::<JobInvocation>::namespaced(ctx.client.as_ref(), &namespace);
    let current = match api.get(&name).await? {
        Some(current) => current,
        None => {
            trace!("reconcile - JobInvocation {}/{} is gone", namespace, name);
            return Ok(Action::await_change());
        }
    };
    let resource_ref = current.object_ref(&());
    let result = reconcile_invocation(&ctx, api.as_ref(), current).await;
    if let Err(e) = &result {
        ctx.publisher
            .publish(
                &resource_ref,
                EventType::Warning,
                failure_reason(e),
                actions::RECONCILE,
                Some(e.to_string()),
            )
            .await;
    }
    result
}

fn failure_reason(error: &ControllerError) -> &'static str {
    match error {
        ControllerError::ApplicationMissing { .. } => reasons::APPLICATION_MISSING,
        ControllerError::ApplicationNotReady { .. } => reasons::APPLICATION_NOT_READY,
        ControllerError::EnvironmentMissing(_) => reasons::ENVIRONMENT_MISSING,
        ControllerError::DefinitionMissing { .. } => reasons::JOB_DEFINITION_MISSING,
        ControllerError::MissingMarker(_) => reasons::MARKER_MISSING,
        ControllerError::UpstreamConfigMissing(_) => reasons::APP_CONFIG_MISSING,
        _ => reasons::INVOCATION_FAILED,
    }
}

/// Number of distinct jobs a JobInvocation asks for
fn requested_count(invocation: &JobInvocation) -> usize {
    let mut requested: Vec<&String> = invocation.spec.jobs.iter().collect();
    requested.sort();
    requested.dedup();
    requested.len()
}

/// Maps invoked Jobs to their newest pod. Failures keep the previous mapping.
async fn observed_pod_names(
    ctx: &ControllerContext,
    invocation: &JobInvocation,
    namespace: &str,
    invoked: &[String],
    previous: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    if invoked.is_empty() {
        return previous;
    }
    let selector = format!("{}={}", INVOCATION_LABEL_ID, invocation.name_any());
    let pods = IntoApi::<Pod>::namespaced(ctx.client.as_ref(), namespace);
    match pods.list(&ListParams::default().labels(&selector)).await {
        Ok(pods) => newest_pod_names(&pods.items, invoked),
        Err(e) => {
            warn!(
                "observed_pod_names - listing pods of {}/{} failed: {:?}",
                namespace,
                invocation.name_any(),
                e
            );
            previous
        }
    }
}

/// Writes the status when it differs from the stored one. An unchanged
/// status is not written, so that the write does not trigger another pass.
async fn persist_status(
    api: &dyn Api<JobInvocation>,
    mut invocation: JobInvocation,
    status: JobInvocationStatus,
) -> Result<JobInvocation> {
    if invocation.status.clone().unwrap_or_default() == status {
        return Ok(invocation);
    }
    trace!(
        "persist_status - {}: completed={} jobs={:?}",
        invocation.name_any(),
        status.completed,
        status.jobs
    );
    invocation.status = Some(status);
    Ok(api.replace_status(&invocation).await?)
}

async fn reconcile_invocation(
    ctx: &ControllerContext,
    api: &dyn Api<JobInvocation>,
    invocation: JobInvocation,
) -> Result<Action> {
    let namespace = invocation.namespace().unwrap_or_default();
    let name = invocation.name_any();
    let requested = requested_count(&invocation);

    // Completion never goes back to false
    let live_jobs = IntoApi::<Job>::namespaced(ctx.client.as_ref(), &namespace)
        .list(&ListParams::default())
        .await?
        .items;
    let prior = invocation.status.clone().unwrap_or_default();
    let mut status = JobInvocationStatus {
        completed: prior.completed || completion::evaluate(&live_jobs, &prior.jobs, requested),
        jobs: prior.jobs.clone(),
        pod_names: observed_pod_names(ctx, &invocation, &namespace, &prior.jobs, prior.pod_names)
            .await,
    };
    let invocation = persist_status(api, invocation, status.clone()).await?;

    if status.completed {
        info!("reconcile - JobInvocation {}/{} is complete", namespace, name);
        ctx.publisher
            .publish(
                &invocation.object_ref(&()),
                EventType::Normal,
                reasons::INVOCATION_COMPLETED,
                actions::RECONCILE,
                Some(format!("JobInvocation [{}] has completed all jobs", name)),
            )
            .await;
        return Ok(Action::await_change());
    }
    if !status.jobs.is_empty() {
        trace!(
            "reconcile - JobInvocation {}/{} already invoked {:?}",
            namespace,
            name,
            status.jobs
        );
        return Ok(Action::await_change());
    }

    let app_name = invocation.spec.app_name.clone();
    let app = IntoApi::<Application>::namespaced(ctx.client.as_ref(), &namespace)
        .get(&app_name)
        .await?
        .ok_or_else(|| ControllerError::ApplicationMissing {
            namespace: namespace.clone(),
            name: app_name.clone(),
        })?;
    if !app.is_ready() {
        return Err(ControllerError::ApplicationNotReady {
            namespace: namespace.clone(),
            name: app_name,
        });
    }
    let env = IntoApi::<Environment>::all(ctx.client.as_ref())
        .get(&app.spec.env_name)
        .await?
        .ok_or_else(|| ControllerError::EnvironmentMissing(app.spec.env_name.clone()))?;

    let mut cache = ObjectCache::new(ctx.client.clone());
    let mut invoked: Vec<String> = Vec::new();
    for job_name in &invocation.spec.jobs {
        let definition = match app.job_definition(job_name) {
            Some(definition) => definition,
            None => {
                ctx.publisher
                    .publish(
                        &app.object_ref(&()),
                        EventType::Warning,
                        reasons::JOB_DEFINITION_MISSING,
                        actions::INVOKE,
                        Some(format!("Job [{}] not found in Application", job_name)),
                    )
                    .await;
                return Err(ControllerError::DefinitionMissing {
                    app: app_name,
                    job: job_name.clone(),
                });
            }
        };
        let managed_name = managed_job_name(&app_name, &definition.name, &name);
        if invoked.contains(&managed_name) {
            continue;
        }
        let mut job = create_new_job_from_definition(&invocation, &app, definition, &env)?;
        let key = NamespacedName::new(&namespace, &managed_name);
        cache
            .create(&ctx.identities.invoked_job, &key, &mut job)
            .await?;
        invoked.push(managed_name);
    }

    if invocation.has_test_payload() {
        let test_job = stage_test_job(ctx, &mut cache, &invocation, &app, &env).await?;
        invoked.push(test_job);
    }

    if invoked.is_empty() {
        trace!(
            "reconcile - JobInvocation {}/{} requests no jobs",
            namespace,
            name
        );
        return Ok(Action::await_change());
    }

    // Jobs adopted from an earlier, unrecorded pass may have finished since
    // the first listing
    let live_jobs = IntoApi::<Job>::namespaced(ctx.client.as_ref(), &namespace)
        .list(&ListParams::default())
        .await?
        .items;
    status.completed = completion::evaluate(&live_jobs, &invoked, requested);
    status.jobs = invoked;

    cache.apply_all().await?;
    INVOKED_JOB_COUNT_METRIC
        .with_label_values(&[namespace.as_str(), app_name.as_str()])
        .inc_by(status.jobs.len() as u64);
    info!(
        "reconcile - JobInvocation {}/{} invoked {:?}",
        namespace, name, status.jobs
    );
    let invocation = persist_status(api, invocation, status.clone()).await?;
    ctx.publisher
        .publish(
            &invocation.object_ref(&()),
            EventType::Normal,
            reasons::JOBS_INVOKED,
            actions::INVOKE,
            Some(format!("Invoked jobs {:?}", status.jobs)),
        )
        .await;
    Ok(Action::await_change())
}
