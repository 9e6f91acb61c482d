use std::fmt;

/// Kinds of objects the controller stages through the Object Cache
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Job,
    Secret,
    ServiceAccount,
    RoleBinding,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Job => "Job",
            ResourceKind::Secret => "Secret",
            ResourceKind::ServiceAccount => "ServiceAccount",
            ResourceKind::RoleBinding => "RoleBinding",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many objects an identity may hold for one owner
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// At most one object per owner
    Single,
    /// A family of objects, each addressed by its own name
    Multi,
}

/// Logical name of a kind of managed object, used as the Object Cache key.
/// Never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceIdentity {
    logical_name: &'static str,
    kind: ResourceKind,
    cardinality: Cardinality,
}

impl ResourceIdentity {
    pub const fn declare(
        logical_name: &'static str,
        kind: ResourceKind,
        cardinality: Cardinality,
    ) -> Self {
        ResourceIdentity {
            logical_name,
            kind,
            cardinality,
        }
    }

    pub fn logical_name(&self) -> &'static str {
        self.logical_name
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn is_single(&self) -> bool {
        self.cardinality == Cardinality::Single
    }
}

/// Every identity the controller stages objects under. Built once at start
/// and shared through the controller context.
#[derive(Clone, Debug)]
pub struct ResourceIdentities {
    /// Jobs created from an Application's job definitions
    pub invoked_job: ResourceIdentity,
    pub test_job: ResourceIdentity,
    /// Aggregated configuration of every Application in the Environment
    pub test_secret: ResourceIdentity,
    pub test_service_account: ResourceIdentity,
    pub test_role_binding: ResourceIdentity,
}

impl ResourceIdentities {
    pub fn new() -> Self {
        ResourceIdentities {
            invoked_job: ResourceIdentity::declare(
                "invoked_job",
                ResourceKind::Job,
                Cardinality::Multi,
            ),
            test_job: ResourceIdentity::declare("test_job", ResourceKind::Job, Cardinality::Single),
            test_secret: ResourceIdentity::declare(
                "test_secret",
                ResourceKind::Secret,
                Cardinality::Single,
            ),
            test_service_account: ResourceIdentity::declare(
                "test_service_account",
                ResourceKind::ServiceAccount,
                Cardinality::Single,
            ),
            test_role_binding: ResourceIdentity::declare(
                "test_role_binding",
                ResourceKind::RoleBinding,
                Cardinality::Single,
            ),
        }
    }
}

impl Default for ResourceIdentities {
    fn default() -> Self {
        Self::new()
    }
}
