use log::{error, info};
use prometheus::Encoder;
use warp::{http::StatusCode, Filter, Rejection, Reply};

/// Default port of the metrics server
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Renders every metric of the default Prometheus registry, which includes
/// the process metrics (process_cpu_seconds_total, process_open_fds, ...)
/// alongside the controller's own counters.
fn render_metrics() -> Result<String, anyhow::Error> {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    match render_metrics() {
        Ok(body) => Ok(warp::reply::with_status(body, StatusCode::OK)),
        Err(e) => {
            error!("metrics_handler - could not render metrics: {:?}", e);
            Ok(warp::reply::with_status(
                String::new(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}

/// Serves prometheus metrics over a web service at /metrics
pub async fn run_metrics_server(port: u16) -> anyhow::Result<()> {
    info!("starting metrics server on port {} at /metrics", port);
    let metrics_route = warp::path!("metrics").and_then(metrics_handler);
    warp::serve(metrics_route).run(([0, 0, 0, 0], port)).await;
    Ok(())
}
