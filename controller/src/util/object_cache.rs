//! Per-pass staging of the objects a reconciliation creates or updates.
//!
//! Every `create` first looks the object up in the cluster (once per key and
//! pass) and either adopts the live object or stages a creation. `update`
//! only applies to objects staged by a prior `create`. Nothing is written to
//! the cluster until `apply_all`, which attempts every staged write and
//! reports the first failure.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use invoker_shared::k8s::{
    api::{Api, IntoApi},
    is_conflict,
};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::{Resource, ResourceExt};
use log::{error, info, trace};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::controller_ctx::ControllerKubeClient;
use super::resource_ident::{ResourceIdentity, ResourceKind};
use super::CacheError;

/// Namespace and name of a cached object
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: &str, name: &str) -> Self {
        NamespacedName {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    fn of<K: Resource>(object: &K) -> Self {
        NamespacedName {
            namespace: object.namespace().unwrap_or_default(),
            name: object.name_any(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Kinds of objects the cache can stage
pub trait CachedKind:
    Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: ResourceKind;

    fn api(client: &dyn ControllerKubeClient, namespace: &str) -> Box<dyn Api<Self>>;
}

impl CachedKind for Job {
    const KIND: ResourceKind = ResourceKind::Job;

    fn api(client: &dyn ControllerKubeClient, namespace: &str) -> Box<dyn Api<Self>> {
        IntoApi::<Job>::namespaced(client, namespace)
    }
}

impl CachedKind for Secret {
    const KIND: ResourceKind = ResourceKind::Secret;

    fn api(client: &dyn ControllerKubeClient, namespace: &str) -> Box<dyn Api<Self>> {
        IntoApi::<Secret>::namespaced(client, namespace)
    }
}

impl CachedKind for ServiceAccount {
    const KIND: ResourceKind = ResourceKind::ServiceAccount;

    fn api(client: &dyn ControllerKubeClient, namespace: &str) -> Box<dyn Api<Self>> {
        IntoApi::<ServiceAccount>::namespaced(client, namespace)
    }
}

impl CachedKind for RoleBinding {
    const KIND: ResourceKind = ResourceKind::RoleBinding;

    fn api(client: &dyn ControllerKubeClient, namespace: &str) -> Box<dyn Api<Self>> {
        IntoApi::<RoleBinding>::namespaced(client, namespace)
    }
}

/// Where a cached object came from, which decides what `apply_all` does
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Absent from the cluster, created on flush
    Created,
    /// Found in the cluster and left untouched
    Fetched,
    /// Found in the cluster and replaced on flush
    ToUpdate,
}

struct CacheEntry {
    identity: ResourceIdentity,
    key: NamespacedName,
    object: Value,
    origin: Origin,
}

pub struct ObjectCache {
    client: Arc<dyn ControllerKubeClient>,
    entries: Vec<CacheEntry>,
    index: HashMap<(&'static str, NamespacedName), usize>,
}

impl ObjectCache {
    pub fn new(client: Arc<dyn ControllerKubeClient>) -> Self {
        ObjectCache {
            client,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn check_kind<K: CachedKind>(identity: &ResourceIdentity) -> Result<(), CacheError> {
        if identity.kind() != K::KIND {
            return Err(CacheError::KindMismatch {
                identity: identity.logical_name(),
                expected: identity.kind().as_str(),
                actual: K::KIND.as_str(),
            });
        }
        Ok(())
    }

    fn to_value<K: CachedKind>(key: &NamespacedName, object: &K) -> Result<Value, CacheError> {
        serde_json::to_value(object).map_err(|source| CacheError::Serialization {
            kind: K::KIND.as_str(),
            key: key.to_string(),
            source,
        })
    }

    fn from_value<K: CachedKind>(key: &NamespacedName, value: &Value) -> Result<K, CacheError> {
        K::deserialize(value).map_err(|source| CacheError::Serialization {
            kind: K::KIND.as_str(),
            key: key.to_string(),
            source,
        })
    }

    /// Stages `object` under `identity` unless it already exists.
    ///
    /// When the object exists in the cluster (or was staged earlier in this
    /// pass) its current state is copied into `object` and nothing new is
    /// staged. Otherwise `object`, named after `key`, is staged for creation.
    pub async fn create<K: CachedKind>(
        &mut self,
        identity: &ResourceIdentity,
        key: &NamespacedName,
        object: &mut K,
    ) -> Result<(), CacheError> {
        Self::check_kind::<K>(identity)?;
        let index_key = (identity.logical_name(), key.clone());
        if let Some(&position) = self.index.get(&index_key) {
            trace!("create - {} {} already cached", K::KIND, key);
            *object = Self::from_value(key, &self.entries[position].object)?;
            return Ok(());
        }
        if identity.is_single() {
            if let Some(existing) = self
                .entries
                .iter()
                .find(|e| e.identity == *identity && e.key != *key)
            {
                return Err(CacheError::SingleViolation {
                    identity: identity.logical_name(),
                    existing: existing.key.to_string(),
                    key: key.to_string(),
                });
            }
        }

        let api = K::api(self.client.as_ref(), &key.namespace);
        let origin = match api.get(&key.name).await {
            Ok(Some(live)) => {
                trace!("create - {} {} exists, adopting it", K::KIND, key);
                *object = live;
                Origin::Fetched
            }
            Ok(None) => {
                trace!("create - {} {} absent, staging creation", K::KIND, key);
                let meta = object.meta_mut();
                meta.name = Some(key.name.clone());
                meta.namespace = Some(key.namespace.clone());
                Origin::Created
            }
            Err(source) => {
                error!("create - lookup of {} {} failed: {:?}", K::KIND, key, source);
                return Err(CacheError::Lookup {
                    kind: K::KIND.as_str(),
                    key: key.to_string(),
                    source,
                });
            }
        };
        let value = Self::to_value(key, &*object)?;
        self.index.insert(index_key, self.entries.len());
        self.entries.push(CacheEntry {
            identity: *identity,
            key: key.clone(),
            object: value,
            origin,
        });
        Ok(())
    }

    /// Stages new desired state for an object already established by
    /// `create` under the same identity
    pub fn update<K: CachedKind>(
        &mut self,
        identity: &ResourceIdentity,
        object: &K,
    ) -> Result<(), CacheError> {
        Self::check_kind::<K>(identity)?;
        let key = NamespacedName::of(object);
        let position = match self.index.get(&(identity.logical_name(), key.clone())) {
            Some(&position) => position,
            None => {
                return Err(CacheError::NotStaged {
                    identity: identity.logical_name(),
                    kind: K::KIND.as_str(),
                    key: key.to_string(),
                })
            }
        };
        let value = Self::to_value(&key, object)?;
        let entry = &mut self.entries[position];
        entry.object = value;
        if entry.origin == Origin::Fetched {
            entry.origin = Origin::ToUpdate;
        }
        trace!("update - {} {} staged as {:?}", K::KIND, key, entry.origin);
        Ok(())
    }

    /// Reads back the staged state of an object
    pub fn get<K: CachedKind>(
        &self,
        identity: &ResourceIdentity,
        key: &NamespacedName,
    ) -> Result<Option<K>, CacheError> {
        Self::check_kind::<K>(identity)?;
        match self.index.get(&(identity.logical_name(), key.clone())) {
            Some(&position) => Self::from_value(key, &self.entries[position].object).map(Some),
            None => Ok(None),
        }
    }

    /// Origin of a staged object, `None` when nothing is staged under the key
    pub fn origin(&self, identity: &ResourceIdentity, key: &NamespacedName) -> Option<Origin> {
        self.index
            .get(&(identity.logical_name(), key.clone()))
            .map(|&position| self.entries[position].origin)
    }

    /// Whether anything is staged under the identity
    pub fn holds(&self, identity: &ResourceIdentity) -> bool {
        self.entries.iter().any(|e| e.identity == *identity)
    }

    /// Writes every staged creation and update to the cluster, in staging
    /// order. Every entry is attempted; the first failure is returned.
    pub async fn apply_all(self) -> Result<(), CacheError> {
        let mut first_error = None;
        for entry in &self.entries {
            let result = match entry.identity.kind() {
                ResourceKind::Job => self.flush::<Job>(entry).await,
                ResourceKind::Secret => self.flush::<Secret>(entry).await,
                ResourceKind::ServiceAccount => self.flush::<ServiceAccount>(entry).await,
                ResourceKind::RoleBinding => self.flush::<RoleBinding>(entry).await,
            };
            if let Err(e) = result {
                error!("apply_all - {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn flush<K: CachedKind>(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let object: K = Self::from_value(&entry.key, &entry.object)?;
        let api = K::api(self.client.as_ref(), &entry.key.namespace);
        match entry.origin {
            Origin::Fetched => Ok(()),
            Origin::Created => match api.create(&object).await {
                Ok(_) => {
                    info!("apply_all - created {} {}", K::KIND, entry.key);
                    Ok(())
                }
                Err(e) if is_conflict(&e) => {
                    // created since the lookup, by an earlier pass that did not record it
                    trace!("apply_all - {} {} already exists", K::KIND, entry.key);
                    Ok(())
                }
                Err(source) => Err(CacheError::Flush {
                    kind: K::KIND.as_str(),
                    key: entry.key.to_string(),
                    source,
                }),
            },
            Origin::ToUpdate => match api.replace(&object).await {
                Ok(_) => {
                    info!("apply_all - updated {} {}", K::KIND, entry.key);
                    Ok(())
                }
                Err(e) if is_conflict(&e) => Err(CacheError::Conflict {
                    kind: K::KIND.as_str(),
                    key: entry.key.to_string(),
                }),
                Err(source) => Err(CacheError::Flush {
                    kind: K::KIND.as_str(),
                    key: entry.key.to_string(),
                    source,
                }),
            },
        }
    }
}
