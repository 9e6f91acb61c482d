/// Invoker API Version
pub const API_VERSION: &str = "v1alpha1";
/// Invoker CRD Namespace
pub const API_NAMESPACE: &str = "invoker.sh";

pub mod application;
pub mod environment;
pub mod job_invocation;
pub mod metrics;
