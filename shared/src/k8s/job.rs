use super::{
    invocation_labels,
    pod::{
        image_pull_secrets, resolve_resources, secret_volume, APP_CONFIG_MOUNT_PATH,
        APP_CONFIG_VOLUME_NAME,
    },
};
use crate::invoker::{
    application::{Application, JobDefinition, APP_CONFIG_SECRET_KEY},
    environment::Environment,
    job_invocation::JobInvocation,
};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use log::trace;

/// Restart policy of every pod created by the invoker
pub const RESTART_POLICY_NEVER: &str = "Never";
/// Environment variable pointing a container at its Application configuration
pub const APP_CONFIG_ENV_VAR: &str = "ACG_CONFIG";
/// Suffix of every object created for the integration test of a JobInvocation
pub const TEST_SUFFIX: &str = "iqe";

/// Name of the Job created for one of an Application's job definitions.
///
/// The name is a pure function of its inputs, which is what keeps an
/// invocation from ever creating the same job twice.
pub fn managed_job_name(app_name: &str, definition_name: &str, invocation_name: &str) -> String {
    format!("{}-{}-{}", app_name, definition_name, invocation_name)
}

/// Name of the integration test Job of a JobInvocation. The aggregated
/// configuration Secret and the test service account share it.
pub fn test_job_name(invocation_name: &str) -> String {
    format!("{}-{}", invocation_name, TEST_SUFFIX)
}

/// Path of the Application configuration document once mounted
pub fn app_config_path() -> String {
    format!("{}/{}", APP_CONFIG_MOUNT_PATH, APP_CONFIG_SECRET_KEY)
}

/// Creates the skeleton of a Job owned by a JobInvocation: name, namespace,
/// labels, owner reference and a pod template that never restarts. The
/// caller fills in containers and volumes.
pub fn new_invocation_job(
    invocation: &JobInvocation,
    app_name: &str,
    job_name: &str,
) -> anyhow::Result<Job> {
    let namespace = invocation.namespace().ok_or_else(|| {
        anyhow::anyhow!(
            "JobInvocation {} has no namespace",
            invocation.name_any()
        )
    })?;
    let labels = invocation_labels(app_name, &invocation.name_any());
    Ok(Job {
        metadata: ObjectMeta {
            name: Some(job_name.to_string()),
            namespace: Some(namespace),
            labels: Some(labels.clone()),
            owner_references: Some(vec![invocation.owner_reference()]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some(RESTART_POLICY_NEVER.to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Create the Kubernetes Job for one of an Application's job definitions.
///
/// Example:
///
/// ```no_run
/// use invoker_shared::invoker::{
///     application::{Application, ApplicationSpec},
///     environment::{Environment, EnvironmentSpec},
///     job_invocation::{JobInvocation, JobInvocationSpec},
/// };
/// use invoker_shared::k8s::job;
///
/// let mut invocation = JobInvocation::new("run-1", JobInvocationSpec::default());
/// invocation.metadata.namespace = Some("default".to_string());
/// let app = Application::new("puptoo", ApplicationSpec::default());
/// let env = Environment::new("env-a", EnvironmentSpec::default());
/// let definition = Default::default();
/// let job = job::create_new_job_from_definition(&invocation, &app, &definition, &env).unwrap();
/// ```
pub fn create_new_job_from_definition(
    invocation: &JobInvocation,
    app: &Application,
    definition: &JobDefinition,
    env: &Environment,
) -> anyhow::Result<Job> {
    trace!("create_new_job_from_definition enter");
    let app_name = app.name_any();
    let job_name = managed_job_name(&app_name, &definition.name, &invocation.name_any());
    let mut job = new_invocation_job(invocation, &app_name, &job_name)?;

    let pod = &definition.pod_spec;
    let (config_volume, config_mount) =
        secret_volume(APP_CONFIG_VOLUME_NAME, &app_name, APP_CONFIG_MOUNT_PATH);

    let mut env_vars = pod.env.clone();
    env_vars.push(EnvVar {
        name: APP_CONFIG_ENV_VAR.to_string(),
        value: Some(app_config_path()),
        ..Default::default()
    });
    let mut volume_mounts = pod.volume_mounts.clone();
    volume_mounts.push(config_mount);
    let mut volumes = pod.volumes.clone();
    volumes.push(config_volume);

    let container = Container {
        name: definition.name.clone(),
        image: Some(pod.image.clone()),
        command: (!pod.command.is_empty()).then(|| pod.command.clone()),
        args: (!pod.args.is_empty()).then(|| pod.args.clone()),
        env: Some(env_vars),
        resources: Some(resolve_resources(
            pod.resources.as_ref(),
            &env.spec.resource_defaults,
        )),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };

    if let Some(spec) = job.spec.as_mut() {
        spec.active_deadline_seconds = definition.active_deadline_seconds;
        spec.backoff_limit = definition.backoff_limit;
        if let Some(pod_spec) = spec.template.spec.as_mut() {
            pod_spec.containers = vec![container];
            pod_spec.volumes = Some(volumes);
            pod_spec.service_account_name = Some(app_name);
            pod_spec.image_pull_secrets = Some(image_pull_secrets(env.pull_secret_names()));
        }
    }

    trace!("create_new_job_from_definition return");
    Ok(job)
}
