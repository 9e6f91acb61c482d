use std::fmt::Debug;

use async_trait::async_trait;
use kube::{
    api::{ListParams, PostParams},
    core::ObjectList,
    Error, Resource, ResourceExt,
};
use mockall::automock;
use serde::de::DeserializeOwned;

#[automock]
#[async_trait]
pub trait Api<T: Clone + Send + Sync + Resource>: Send + Sync {
    fn as_inner(&self) -> kube::Api<T>;
    /// Gets an object by name, `None` when it does not exist
    async fn get(&self, name: &str) -> Result<Option<T>, Error>;
    async fn list(&self, lp: &ListParams) -> Result<ObjectList<T>, Error>;
    async fn create(&self, obj: &T) -> Result<T, Error>;
    /// Replaces an object. A stale resourceVersion yields a 409 Conflict.
    async fn replace(&self, obj: &T) -> Result<T, Error>;
    async fn replace_status(&self, obj: &T) -> Result<T, Error>;
}

#[async_trait]
impl<T> Api<T> for kube::Api<T>
where
    T: Clone
        + DeserializeOwned
        + Debug
        + Resource<DynamicType = ()>
        + serde::Serialize
        + Send
        + Sync,
{
    fn as_inner(&self) -> kube::Api<T> {
        self.to_owned()
    }
    async fn get(&self, name: &str) -> Result<Option<T>, Error> {
        self.get_opt(name).await
    }
    async fn list(&self, lp: &ListParams) -> Result<ObjectList<T>, Error> {
        kube::Api::list(self, lp).await
    }
    async fn create(&self, obj: &T) -> Result<T, Error> {
        kube::Api::create(self, &PostParams::default(), obj).await
    }
    async fn replace(&self, obj: &T) -> Result<T, Error> {
        kube::Api::replace(self, &obj.name_any(), &PostParams::default(), obj).await
    }
    async fn replace_status(&self, obj: &T) -> Result<T, Error> {
        let data = serde_json::to_vec(obj).map_err(Error::SerdeError)?;
        kube::Api::replace_status(self, &obj.name_any(), &PostParams::default(), data).await
    }
}

#[automock]
#[allow(clippy::multiple_bound_locations)]
pub trait IntoApi<T: Resource + 'static + Send + Sync>: Send + Sync {
    fn all(&self) -> Box<dyn Api<T>>;
    fn namespaced(&self, namespace: &str) -> Box<dyn Api<T>>
    where
        T: Resource<Scope = k8s_openapi::NamespaceResourceScope>;
    fn default_namespaced(&self) -> Box<dyn Api<T>>
    where
        T: Resource<Scope = k8s_openapi::NamespaceResourceScope>;
}

impl<T> IntoApi<T> for kube::Client
where
    T: Resource<DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + serde::Serialize
        + Send
        + Sync
        + 'static,
{
    fn all(&self) -> Box<dyn Api<T>> {
        Box::new(kube::Api::all(self.clone()))
    }

    fn namespaced(&self, namespace: &str) -> Box<dyn Api<T>>
    where
        T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    {
        Box::new(kube::Api::namespaced(self.clone(), namespace))
    }

    fn default_namespaced(&self) -> Box<dyn Api<T>>
    where
        T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    {
        Box::new(kube::Api::default_namespaced(self.clone()))
    }
}
