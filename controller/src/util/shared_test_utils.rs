
#[cfg(test)]
pub mod mock_client {
    use invoker_shared::invoker::{
        application::Application, environment::Environment, job_invocation::JobInvocation,
    };
    use invoker_shared::k8s::api::{Api, IntoApi, MockIntoApi};
    use k8s_openapi::api::batch::v1::Job;
    use k8s_openapi::api::core::v1::{Pod, Secret, ServiceAccount};
    use k8s_openapi::api::rbac::v1::RoleBinding;

    #[derive(Default)]
    pub struct MockControllerKubeClient {
        pub invocation: MockIntoApi<JobInvocation>,
        pub application: MockIntoApi<Application>,
        pub environment: MockIntoApi<Environment>,
        pub job: MockIntoApi<Job>,
        pub pod: MockIntoApi<Pod>,
        pub secret: MockIntoApi<Secret>,
        pub service_account: MockIntoApi<ServiceAccount>,
        pub role_binding: MockIntoApi<RoleBinding>,
    }

    macro_rules! delegate_namespaced {
        ($kind:ty, $field:ident) => {
            impl IntoApi<$kind> for MockControllerKubeClient {
                fn all(&self) -> Box<dyn Api<$kind>> {
                    self.$field.all()
                }

                fn namespaced(&self, namespace: &str) -> Box<dyn Api<$kind>> {
                    self.$field.namespaced(namespace)
                }

                fn default_namespaced(&self) -> Box<dyn Api<$kind>> {
                    self.$field.default_namespaced()
                }
            }
        };
    }

    delegate_namespaced!(JobInvocation, invocation);
    delegate_namespaced!(Application, application);
    delegate_namespaced!(Job, job);
    delegate_namespaced!(Pod, pod);
    delegate_namespaced!(Secret, secret);
    delegate_namespaced!(ServiceAccount, service_account);
    delegate_namespaced!(RoleBinding, role_binding);

    impl IntoApi<Environment> for MockControllerKubeClient {
        fn all(&self) -> Box<dyn Api<Environment>> {
            self.environment.all()
        }

        fn namespaced(&self, _namespace: &str) -> Box<dyn Api<Environment>> {
            // Environments are cluster scoped
            self.environment.all()
        }

        fn default_namespaced(&self) -> Box<dyn Api<Environment>> {
            self.environment.all()
        }
    }
}

/// An in-memory cluster for multi-pass tests: every kind is a map shared by
/// mock APIs, so objects created by one pass are seen by the next.
#[cfg(test)]
pub mod fake_cluster {
    use super::config_for_tests::api_error;
    use super::mock_client::MockControllerKubeClient;
    use invoker_shared::invoker::{
        application::Application, environment::Environment, job_invocation::JobInvocation,
    };
    use invoker_shared::k8s::{
        api::{MockApi, MockIntoApi},
        ERROR_CONFLICT, ERROR_NOT_FOUND,
    };
    use k8s_openapi::api::batch::v1::Job;
    use k8s_openapi::api::core::v1::{Pod, Secret, ServiceAccount};
    use k8s_openapi::api::rbac::v1::RoleBinding;
    use kube::{api::ListParams, core::ObjectList, Resource, ResourceExt};
    use std::collections::{BTreeMap, HashMap};
    use std::sync::{Arc, Mutex};

    type Key = (String, String);

    struct StoreState<T> {
        objects: BTreeMap<Key, T>,
        next_version: u64,
        created: Vec<String>,
        replaced: Vec<String>,
        get_errors: HashMap<String, u16>,
        create_errors: HashMap<String, u16>,
        replace_errors: HashMap<String, u16>,
    }

    impl<T> Default for StoreState<T> {
        fn default() -> Self {
            StoreState {
                objects: BTreeMap::new(),
                next_version: 1,
                created: Vec::new(),
                replaced: Vec::new(),
                get_errors: HashMap::new(),
                create_errors: HashMap::new(),
                replace_errors: HashMap::new(),
            }
        }
    }

    /// Objects of one kind, keyed by namespace and name. Cluster scoped
    /// objects use an empty namespace.
    pub struct FakeStore<T> {
        state: Arc<Mutex<StoreState<T>>>,
    }

    impl<T> Clone for FakeStore<T> {
        fn clone(&self) -> Self {
            FakeStore {
                state: self.state.clone(),
            }
        }
    }

    impl<T> Default for FakeStore<T> {
        fn default() -> Self {
            FakeStore {
                state: Arc::new(Mutex::new(StoreState::default())),
            }
        }
    }

    fn matches_selector(labels: &BTreeMap<String, String>, selector: Option<&String>) -> bool {
        let selector = match selector {
            Some(s) if !s.is_empty() => s,
            _ => return true,
        };
        selector.split(',').all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k.trim()).map(String::as_str) == Some(v.trim()),
            None => false,
        })
    }

    impl<T> FakeStore<T>
    where
        T: Resource + Clone + Send + Sync + 'static,
    {
        fn key(namespace: Option<&str>, obj: &T) -> Key {
            (
                obj.namespace()
                    .or_else(|| namespace.map(str::to_string))
                    .unwrap_or_default(),
                obj.name_any(),
            )
        }

        /// Seeds an object as if it already existed in the cluster
        pub fn insert(&self, mut obj: T) {
            let mut state = self.state.lock().unwrap();
            let version = state.next_version;
            state.next_version += 1;
            obj.meta_mut().resource_version = Some(version.to_string());
            let key = Self::key(None, &obj);
            state.objects.insert(key, obj);
        }

        pub fn get(&self, namespace: &str, name: &str) -> Option<T> {
            self.state
                .lock()
                .unwrap()
                .objects
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
        }

        pub fn remove(&self, namespace: &str, name: &str) -> Option<T> {
            self.state
                .lock()
                .unwrap()
                .objects
                .remove(&(namespace.to_string(), name.to_string()))
        }

        pub fn objects(&self) -> Vec<T> {
            self.state.lock().unwrap().objects.values().cloned().collect()
        }

        /// Names of the objects created through the API, in order
        pub fn created(&self) -> Vec<String> {
            self.state.lock().unwrap().created.clone()
        }

        /// Names of the objects replaced through the API, in order
        pub fn replaced(&self) -> Vec<String> {
            self.state.lock().unwrap().replaced.clone()
        }

        pub fn fail_get(&self, name: &str, code: u16) {
            self.state
                .lock()
                .unwrap()
                .get_errors
                .insert(name.to_string(), code);
        }

        pub fn fail_create(&self, name: &str, code: u16) {
            self.state
                .lock()
                .unwrap()
                .create_errors
                .insert(name.to_string(), code);
        }

        pub fn fail_replace(&self, name: &str, code: u16) {
            self.state
                .lock()
                .unwrap()
                .replace_errors
                .insert(name.to_string(), code);
        }

        fn api_get(&self, namespace: Option<&str>, name: &str) -> Result<Option<T>, kube::Error> {
            let state = self.state.lock().unwrap();
            if let Some(code) = state.get_errors.get(name) {
                return Err(api_error(*code, "injected get failure"));
            }
            let key = (namespace.unwrap_or_default().to_string(), name.to_string());
            Ok(state.objects.get(&key).cloned())
        }

        fn api_list(
            &self,
            namespace: Option<&str>,
            lp: &ListParams,
        ) -> Result<ObjectList<T>, kube::Error> {
            let state = self.state.lock().unwrap();
            let items = state
                .objects
                .iter()
                .filter(|((ns, _), _)| namespace.map_or(true, |n| n == ns))
                .filter(|(_, obj)| matches_selector(obj.labels(), lp.label_selector.as_ref()))
                .map(|(_, obj)| obj.clone())
                .collect();
            Ok(ObjectList {
                types: Default::default(),
                metadata: Default::default(),
                items,
            })
        }

        fn api_create(&self, namespace: Option<&str>, obj: &T) -> Result<T, kube::Error> {
            let mut state = self.state.lock().unwrap();
            let key = Self::key(namespace, obj);
            if let Some(code) = state.create_errors.get(&key.1) {
                return Err(api_error(*code, "injected create failure"));
            }
            if state.objects.contains_key(&key) {
                return Err(api_error(ERROR_CONFLICT, "already exists"));
            }
            let mut created = obj.clone();
            created.meta_mut().namespace = Some(key.0.clone()).filter(|ns| !ns.is_empty());
            created.meta_mut().resource_version = Some(state.next_version.to_string());
            if created.meta().uid.is_none() {
                created.meta_mut().uid = Some(format!("uid-{}", key.1));
            }
            state.next_version += 1;
            state.created.push(key.1.clone());
            state.objects.insert(key, created.clone());
            Ok(created)
        }

        fn api_replace(&self, namespace: Option<&str>, obj: &T) -> Result<T, kube::Error> {
            let mut state = self.state.lock().unwrap();
            let key = Self::key(namespace, obj);
            if let Some(code) = state.replace_errors.get(&key.1) {
                return Err(api_error(*code, "injected replace failure"));
            }
            let stored_version = match state.objects.get(&key) {
                Some(stored) => stored.resource_version(),
                None => return Err(api_error(ERROR_NOT_FOUND, "not found")),
            };
            if obj.resource_version().is_some() && obj.resource_version() != stored_version {
                return Err(api_error(ERROR_CONFLICT, "the object has been modified"));
            }
            let mut replaced = obj.clone();
            replaced.meta_mut().resource_version = Some(state.next_version.to_string());
            state.next_version += 1;
            state.replaced.push(key.1.clone());
            state.objects.insert(key, replaced.clone());
            Ok(replaced)
        }

        /// A mock API over this store, scoped to a namespace or to the
        /// whole cluster
        pub fn api(&self, namespace: Option<String>) -> MockApi<T> {
            let mut api: MockApi<T> = MockApi::new();
            let (store, ns) = (self.clone(), namespace.clone());
            api.expect_get()
                .returning(move |name| store.api_get(ns.as_deref(), name));
            let (store, ns) = (self.clone(), namespace.clone());
            api.expect_list()
                .returning(move |lp| store.api_list(ns.as_deref(), lp));
            let (store, ns) = (self.clone(), namespace.clone());
            api.expect_create()
                .returning(move |obj| store.api_create(ns.as_deref(), obj));
            let (store, ns) = (self.clone(), namespace.clone());
            api.expect_replace()
                .returning(move |obj| store.api_replace(ns.as_deref(), obj));
            let (store, ns) = (self.clone(), namespace);
            api.expect_replace_status()
                .returning(move |obj| store.api_replace(ns.as_deref(), obj));
            api
        }
    }

    fn wire_namespaced<T>(into_api: &mut MockIntoApi<T>, store: &FakeStore<T>)
    where
        T: Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + Send
            + Sync
            + 'static,
    {
        let all = store.clone();
        into_api
            .expect_all()
            .returning(move || Box::new(all.api(None)));
        let namespaced = store.clone();
        into_api
            .expect_namespaced()
            .returning(move |ns| Box::new(namespaced.api(Some(ns.to_string()))));
    }

    #[derive(Default)]
    pub struct FakeCluster {
        pub invocations: FakeStore<JobInvocation>,
        pub applications: FakeStore<Application>,
        pub environments: FakeStore<Environment>,
        pub jobs: FakeStore<Job>,
        pub pods: FakeStore<Pod>,
        pub secrets: FakeStore<Secret>,
        pub service_accounts: FakeStore<ServiceAccount>,
        pub role_bindings: FakeStore<RoleBinding>,
    }

    impl FakeCluster {
        /// A client whose APIs all read and write this cluster
        pub fn client(&self) -> MockControllerKubeClient {
            let mut client = MockControllerKubeClient::default();
            wire_namespaced(&mut client.invocation, &self.invocations);
            wire_namespaced(&mut client.application, &self.applications);
            wire_namespaced(&mut client.job, &self.jobs);
            wire_namespaced(&mut client.pod, &self.pods);
            wire_namespaced(&mut client.secret, &self.secrets);
            wire_namespaced(&mut client.service_account, &self.service_accounts);
            wire_namespaced(&mut client.role_binding, &self.role_bindings);
            let environments = self.environments.clone();
            client
                .environment
                .expect_all()
                .returning(move || Box::new(environments.api(None)));
            client
        }
    }
}
