use super::JOB_NAME_LABEL_ID;
use k8s_openapi::api::core::v1::{
    LocalObjectReference, Pod, ResourceRequirements, SecretVolumeSource, Volume, VolumeMount,
};
use kube::ResourceExt;
use log::trace;
use std::collections::BTreeMap;

/// Name of the volume carrying the owning Application's configuration
pub const APP_CONFIG_VOLUME_NAME: &str = "config-secret";
/// Mount path of the owning Application's configuration
pub const APP_CONFIG_MOUNT_PATH: &str = "/cdapp";
/// Name of the volume carrying the aggregated Environment configuration
pub const ENV_CONFIG_VOLUME_NAME: &str = "cdenvconfig";
/// Mount path of the aggregated Environment configuration
pub const ENV_CONFIG_MOUNT_PATH: &str = "/cdenv";

/// Turns secret names into the references a PodSpec expects, dropping
/// duplicates and empty names while keeping the first-seen order
pub fn image_pull_secrets<I, S>(names: I) -> Vec<LocalObjectReference>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut refs: Vec<LocalObjectReference> = Vec::new();
    for name in names {
        let name = name.as_ref();
        if name.is_empty() || refs.iter().any(|r| r.name.as_deref() == Some(name)) {
            continue;
        }
        refs.push(LocalObjectReference {
            name: Some(name.to_string()),
        });
    }
    refs
}

/// Builds a volume backed by a Secret together with the mount that exposes it
pub fn secret_volume(
    volume_name: &str,
    secret_name: &str,
    mount_path: &str,
) -> (Volume, VolumeMount) {
    let volume = Volume {
        name: volume_name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let mount = VolumeMount {
        name: volume_name.to_string(),
        mount_path: mount_path.to_string(),
        ..Default::default()
    };
    (volume, mount)
}

/// Resolves a container's resources: limits and requests each fall back to
/// the defaults when the container leaves them unset or empty
pub fn resolve_resources(
    requested: Option<&ResourceRequirements>,
    defaults: &ResourceRequirements,
) -> ResourceRequirements {
    let requested = requested.cloned().unwrap_or_default();
    let pick = |own: Option<BTreeMap<_, _>>, fallback: &Option<BTreeMap<_, _>>| match own {
        Some(map) if !map.is_empty() => Some(map),
        _ => fallback.clone(),
    };
    ResourceRequirements {
        limits: pick(requested.limits, &defaults.limits),
        requests: pick(requested.requests, &defaults.requests),
        ..Default::default()
    }
}

/// Maps each of the given Job names to the newest pod the batch controller
/// created for it. Jobs with no pod yet are left out.
pub fn newest_pod_names(pods: &[Pod], job_names: &[String]) -> BTreeMap<String, String> {
    let mut newest: BTreeMap<String, &Pod> = BTreeMap::new();
    for pod in pods {
        let job_name = match pod.labels().get(JOB_NAME_LABEL_ID) {
            Some(job_name) if job_names.contains(job_name) => job_name,
            _ => continue,
        };
        let replace = match newest.get(job_name) {
            Some(current) => {
                pod.metadata.creation_timestamp > current.metadata.creation_timestamp
            }
            None => true,
        };
        if replace {
            newest.insert(job_name.clone(), pod);
        }
    }
    trace!("newest_pod_names - found pods for {} jobs", newest.len());
    newest
        .into_iter()
        .map(|(job, pod)| (job, pod.name_any()))
        .collect()
}

#[cfg(test)]
mod pod_helper_tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use k8s_openapi::chrono::{TimeZone, Utc};

    fn quantities(cpu: &str) -> BTreeMap<String, Quantity> {
        let mut map = BTreeMap::new();
        map.insert("cpu".to_string(), Quantity(cpu.to_string()));
        map
    }

    #[test]
    fn test_image_pull_secrets_dedup() {
        let _ = env_logger::builder().is_test(true).try_init();

        let refs = image_pull_secrets(["quay-pull", "", "extra", "quay-pull"]);
        let names: Vec<_> = refs.iter().map(|r| r.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["quay-pull", "extra"]);
    }

    #[test]
    fn test_secret_volume() {
        let _ = env_logger::builder().is_test(true).try_init();

        let (volume, mount) = secret_volume(APP_CONFIG_VOLUME_NAME, "puptoo", APP_CONFIG_MOUNT_PATH);
        assert_eq!(volume.name, mount.name);
        assert_eq!(
            volume.secret.unwrap().secret_name,
            Some("puptoo".to_string())
        );
        assert_eq!(mount.mount_path, "/cdapp");
    }

    #[test]
    fn test_resolve_resources() {
        let _ = env_logger::builder().is_test(true).try_init();

        let defaults = ResourceRequirements {
            limits: Some(quantities("1")),
            requests: Some(quantities("100m")),
            ..Default::default()
        };

        let resolved = resolve_resources(None, &defaults);
        assert_eq!(resolved.limits, defaults.limits);
        assert_eq!(resolved.requests, defaults.requests);

        let own = ResourceRequirements {
            limits: Some(quantities("2")),
            requests: Some(BTreeMap::new()),
            ..Default::default()
        };
        let resolved = resolve_resources(Some(&own), &defaults);
        assert_eq!(resolved.limits, Some(quantities("2")));
        assert_eq!(resolved.requests, Some(quantities("100m")));
    }

    fn pod(name: &str, job_name: &str, minute: u32) -> Pod {
        let mut labels = BTreeMap::new();
        labels.insert(JOB_NAME_LABEL_ID.to_string(), job_name.to_string());
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                creation_timestamp: Some(Time(
                    Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(),
                )),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_newest_pod_names() {
        let _ = env_logger::builder().is_test(true).try_init();

        let pods = vec![
            pod("a-1", "job-a", 1),
            pod("a-2", "job-a", 5),
            pod("a-0", "job-a", 0),
            pod("b-1", "job-b", 1),
            pod("other", "unrelated", 9),
        ];
        let names = newest_pod_names(&pods, &["job-a".to_string(), "job-b".to_string()]);
        assert_eq!(names.len(), 2);
        assert_eq!(names.get("job-a").unwrap(), "a-2");
        assert_eq!(names.get("job-b").unwrap(), "b-1");

        assert!(newest_pod_names(&pods, &[]).is_empty());
    }
}
