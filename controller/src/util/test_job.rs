use std::collections::BTreeMap;

use invoker_shared::invoker::{
    application::{Application, APP_CONFIG_SECRET_KEY},
    environment::{ClusterAccessLevel, ConfigMount, Environment},
    job_invocation::{IqeJobSpec, JobInvocation},
};
use invoker_shared::k8s::{
    api::IntoApi,
    invocation_labels,
    job::{app_config_path, new_invocation_job, test_job_name, APP_CONFIG_ENV_VAR},
    pod::{
        image_pull_secrets, resolve_resources, secret_volume, APP_CONFIG_MOUNT_PATH,
        APP_CONFIG_VOLUME_NAME, ENV_CONFIG_MOUNT_PATH, ENV_CONFIG_VOLUME_NAME,
    },
    rbac::{create_new_edit_role_binding, create_new_service_account},
};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Container, EnvVar, Secret};
use k8s_openapi::ByteString;
use kube::{api::ListParams, runtime::events::EventType, Resource, ResourceExt};
use log::{info, trace, warn};
use serde_json::{Map, Value};

use super::controller_ctx::{ControllerConfig, ControllerContext, ControllerKubeClient};
use super::events::{actions, reasons};
use super::object_cache::{NamespacedName, ObjectCache};
use super::{ControllerError, Result};

/// Key of the aggregated configuration document in the test Secret
pub const AGGREGATED_CONFIG_KEY: &str = "aggregated-config.json";
/// Top level key of the aggregated configuration document
pub const AGGREGATED_CONFIG_ROOT: &str = "cdappconfigs";
const TEST_IMAGE_PULL_POLICY: &str = "Always";

/// Builds the test runner command line. The plugin name is turned into a
/// module name and the filter is only passed when set.
pub fn construct_iqe_command(
    invocation_key: &str,
    plugin: &str,
    iqe: &IqeJobSpec,
) -> Result<Vec<String>> {
    if iqe.marker.is_empty() {
        return Err(ControllerError::MissingMarker(invocation_key.to_string()));
    }
    let mut command: Vec<String> = ["iqe", "tests", "plugin"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    command.push(plugin.replace('-', "_"));
    command.push("-m".to_string());
    command.push(iqe.marker.clone());
    if !iqe.filter.is_empty() {
        command.push("-k".to_string());
        command.push(iqe.filter.clone());
    }
    Ok(command)
}

/// Test runner image: the Environment's base with the requested tag, or the
/// Application's plugin as tag
pub fn test_image(env: &Environment, app: &Application, iqe: &IqeJobSpec) -> String {
    let tag = if iqe.image_tag.is_empty() {
        &app.spec.testing.iqe_plugin
    } else {
        &iqe.image_tag
    };
    format!("{}:{}", env.spec.providers.testing.iqe.image_base, tag)
}

/// Service account the test pod runs as, `None` for the namespace default
pub fn test_service_account(
    level: Option<ClusterAccessLevel>,
    invocation_name: &str,
    app_name: &str,
) -> Option<String> {
    match level {
        Some(ClusterAccessLevel::Edit) => Some(test_job_name(invocation_name)),
        Some(ClusterAccessLevel::View) => Some(app_name.to_string()),
        None => None,
    }
}

/// Builds the integration test Job of a JobInvocation. Pure: staging the
/// objects it depends on is left to the caller.
pub fn build_test_job(
    invocation: &JobInvocation,
    app: &Application,
    env: &Environment,
    iqe: &IqeJobSpec,
    config: &ControllerConfig,
) -> Result<Job> {
    let invocation_name = invocation.name_any();
    let namespace = invocation.namespace().unwrap_or_default();
    let app_name = app.name_any();
    let job_name = test_job_name(&invocation_name);
    let command = construct_iqe_command(
        &format!("{}/{}", namespace, invocation_name),
        &app.spec.testing.iqe_plugin,
        iqe,
    )?;

    let mut job = new_invocation_job(invocation, &app_name, &job_name)?;

    let mut volumes = Vec::new();
    let mut volume_mounts = Vec::new();
    for mount in env.config_access_level().mounts() {
        let (volume, volume_mount) = match mount {
            ConfigMount::Aggregated => {
                secret_volume(ENV_CONFIG_VOLUME_NAME, &job_name, ENV_CONFIG_MOUNT_PATH)
            }
            ConfigMount::App => {
                secret_volume(APP_CONFIG_VOLUME_NAME, &app_name, APP_CONFIG_MOUNT_PATH)
            }
        };
        volumes.push(volume);
        volume_mounts.push(volume_mount);
    }

    let env_var = |name: &str, value: &str| EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    };
    let container = Container {
        name: job_name.clone(),
        image: Some(test_image(env, app, iqe)),
        command: Some(command),
        env: Some(vec![
            env_var(APP_CONFIG_ENV_VAR, &app_config_path()),
            env_var("ENV_FOR_DYNACONF", &iqe.dynaconf_env_name),
            env_var("NAMESPACE", &namespace),
        ]),
        resources: Some(resolve_resources(
            Some(&env.spec.providers.testing.iqe.resources),
            &env.spec.resource_defaults,
        )),
        volume_mounts: Some(volume_mounts),
        // plugin tags are not pinned, so a cached image may be stale
        image_pull_policy: Some(TEST_IMAGE_PULL_POLICY.to_string()),
        ..Default::default()
    };

    let mut pull_secrets = env.pull_secret_names();
    pull_secrets.extend(config.test_image_pull_secret.clone());

    if let Some(pod_spec) = job
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
    {
        pod_spec.containers = vec![container];
        pod_spec.volumes = Some(volumes);
        pod_spec.image_pull_secrets = Some(image_pull_secrets(pull_secrets));
        pod_spec.service_account_name = test_service_account(
            env.cluster_access_level(),
            &invocation_name,
            &app_name,
        );
    }
    Ok(job)
}

/// Reads the configuration document an Application's controller
/// materialized into the Secret named after the Application
async fn fetch_app_config(
    client: &dyn ControllerKubeClient,
    app: &Application,
) -> Result<Option<Value>> {
    let namespace = app.namespace().unwrap_or_default();
    let secrets = IntoApi::<Secret>::namespaced(client, &namespace);
    let secret = match secrets.get(&app.name_any()).await? {
        Some(secret) => secret,
        None => return Ok(None),
    };
    let document = secret
        .data
        .as_ref()
        .and_then(|data| data.get(APP_CONFIG_SECRET_KEY))
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes.0).ok())
        .filter(Value::is_object);
    Ok(document)
}

/// Collects the configuration of every Application in the same Environment
/// as `app`, keyed by Application name. Fails if any of them is missing, so
/// that a partial aggregate is never produced.
pub async fn aggregate_app_configs(ctx: &ControllerContext, app: &Application) -> Result<Value> {
    let apps = IntoApi::<Application>::all(ctx.client.as_ref())
        .list(&ListParams::default())
        .await?;
    let mut configs = Map::new();
    for sibling in apps
        .items
        .iter()
        .filter(|a| a.spec.env_name == app.spec.env_name)
    {
        let sibling_name = sibling.name_any();
        match fetch_app_config(ctx.client.as_ref(), sibling).await? {
            Some(config) => {
                configs.insert(sibling_name, config);
            }
            None => {
                warn!(
                    "aggregate_app_configs - configuration of Application {:?}/{} is missing or malformed",
                    sibling.namespace(),
                    sibling_name
                );
                ctx.publisher
                    .publish(
                        &sibling.object_ref(&()),
                        EventType::Warning,
                        reasons::APP_CONFIG_MISSING,
                        actions::INVOKE,
                        Some(format!("app config [{}] missing", sibling_name)),
                    )
                    .await;
                return Err(ControllerError::UpstreamConfigMissing(sibling_name));
            }
        }
    }
    trace!(
        "aggregate_app_configs - aggregated {} configurations for Environment {}",
        configs.len(),
        app.spec.env_name
    );
    let mut root = Map::new();
    root.insert(AGGREGATED_CONFIG_ROOT.to_string(), Value::Object(configs));
    Ok(Value::Object(root))
}

/// Stages the integration test Job of a JobInvocation along with what it
/// depends on: the aggregated configuration Secret for `environment` config
/// access and the service account and role binding for `edit` cluster
/// access. Returns the name of the test Job.
pub async fn stage_test_job(
    ctx: &ControllerContext,
    cache: &mut ObjectCache,
    invocation: &JobInvocation,
    app: &Application,
    env: &Environment,
) -> Result<String> {
    let iqe = invocation.spec.testing.iqe.clone().unwrap_or_default();
    let invocation_name = invocation.name_any();
    let namespace = invocation.namespace().unwrap_or_default();
    let app_name = app.name_any();
    let job_name = test_job_name(&invocation_name);
    let key = NamespacedName::new(&namespace, &job_name);
    let ids = &ctx.identities;

    // Fails on a missing marker before anything is staged
    let mut job = build_test_job(invocation, app, env, &iqe, &ctx.config)?;

    if env
        .config_access_level()
        .mounts()
        .contains(&ConfigMount::Aggregated)
    {
        let document = aggregate_app_configs(ctx, app).await?;
        let mut secret = Secret::default();
        cache.create(&ids.test_secret, &key, &mut secret).await?;
        let mut data = BTreeMap::new();
        data.insert(
            AGGREGATED_CONFIG_KEY.to_string(),
            ByteString(serde_json::to_vec(&document)?),
        );
        secret.data = Some(data);
        secret.metadata.labels = Some(invocation_labels(&app_name, &invocation_name));
        secret.metadata.owner_references = Some(vec![invocation.owner_reference()]);
        cache.update(&ids.test_secret, &secret)?;
    } else {
        info!(
            "stage_test_job - no aggregated configuration for {}",
            key
        );
    }

    if env.cluster_access_level() == Some(ClusterAccessLevel::Edit) {
        let mut service_account = create_new_service_account(
            invocation,
            &app_name,
            &job_name,
            &env.pull_secret_names(),
        )?;
        cache
            .create(&ids.test_service_account, &key, &mut service_account)
            .await?;
        let mut role_binding = create_new_edit_role_binding(invocation, &app_name, &job_name)?;
        cache
            .create(&ids.test_role_binding, &key, &mut role_binding)
            .await?;
    }

    cache.create(&ids.test_job, &key, &mut job).await?;
    Ok(job_name)
}
