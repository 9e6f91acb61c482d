#[macro_use]
extern crate lazy_static;
mod util;

use invoker_shared::invoker::{metrics::run_metrics_server, API_NAMESPACE};
use invoker_shared::os::env_var::ActualEnvVarQuery;
use prometheus::IntCounterVec;
use std::sync::Arc;
use util::{
    controller_ctx::{ControllerConfig, ControllerContext},
    events::KubeEventPublisher,
    invocation_action,
};

lazy_static! {
    // Reports the number of Jobs invoked, grouped by namespace and Application
    pub static ref INVOKED_JOB_COUNT_METRIC: IntCounterVec = prometheus::register_int_counter_vec!("invoker_invoked_job_count", "Invoker Invoked Job Count", &["namespace", "application"]).unwrap();
    // Reports failed reconciliations, grouped by error kind
    pub static ref RECONCILE_ERROR_COUNT_METRIC: IntCounterVec = prometheus::register_int_counter_vec!("invoker_reconcile_error_count", "Invoker Reconcile Error Count", &["kind"]).unwrap();
}

/// This is the entry point for the controller.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    println!("{} Controller start", API_NAMESPACE);

    env_logger::try_init()?;
    log::info!("{} Controller logging started", API_NAMESPACE);

    let config = ControllerConfig::from_env(&ActualEnvVarQuery)?;
    log::info!("{} Controller config {:?}", API_NAMESPACE, config);
    let client = kube::Client::try_default().await?;
    let publisher = Arc::new(KubeEventPublisher::new(
        client.clone(),
        &config.controller_name,
    ));
    let metrics_port = config.metrics_port;
    let ctx = Arc::new(ControllerContext::new(
        Arc::new(client),
        publisher,
        config,
    ));

    let mut tasks = Vec::new();

    // Start server for prometheus metrics
    tasks.push(tokio::spawn(async move {
        if let Err(e) = run_metrics_server(metrics_port).await {
            log::error!("metrics server failed: {:?}", e);
        }
    }));

    // Reconcile JobInvocations until shutdown
    tasks.push(tokio::spawn(async move {
        if let Err(e) = invocation_action::run(ctx).await {
            log::error!("JobInvocation controller failed: {:?}", e);
            std::process::exit(1);
        }
    }));

    futures::future::try_join_all(tasks).await?;

    log::info!("{} Controller end", API_NAMESPACE);
    Ok(())
}
