//! PVC Autoresizer Operator
//!
//! Watches `AutoResizePolicy` resources and grows the PersistentVolumeClaims
//! they select once reported usage reaches the policy threshold.

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pvc_autoresizer_operator::adapters::{KubeClaimStore, KubeEventSink};
use pvc_autoresizer_operator::controller::{self, Context};
use pvc_autoresizer_operator::domain::ports::UsageSourceRef;
use pvc_autoresizer_operator::{
    AnnotationUsageSource, Error, Metrics, OperatorConfig, PrometheusConfig,
    PrometheusUsageSource, ReconciliationEngine, Result,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// PVC Autoresizer Operator - grows PersistentVolumeClaims ahead of usage
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Seconds between passes for an unchanged policy
    #[arg(long, env = "RESYNC_INTERVAL", default_value = "60")]
    resync_interval_secs: u64,

    /// Annotation carrying the usage percentage of a claim
    #[arg(long, env = "USAGE_ANNOTATION", default_value = "pvc.gary.io/usage")]
    usage_annotation: String,

    /// Read usage from this Prometheus server instead of the annotation
    #[arg(long, env = "PROMETHEUS_URL")]
    prometheus_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn to_config(&self) -> Result<OperatorConfig> {
        let config = OperatorConfig {
            health_addr: parse_addr("health", &self.health_addr)?,
            metrics_addr: parse_addr("metrics", &self.metrics_addr)?,
            resync_interval: Duration::from_secs(self.resync_interval_secs),
            usage_annotation: self.usage_annotation.clone(),
            prometheus: self.prometheus_url.as_ref().map(|url| PrometheusConfig {
                url: url.clone(),
                ..Default::default()
            }),
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_addr(name: &str, addr: &str) -> Result<SocketAddr> {
    addr.parse()
        .map_err(|e| Error::Configuration(format!("Invalid {} address {}: {}", name, addr, e)))
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = args.to_config()?;

    info!("Starting PVC Autoresizer Operator");
    info!("  Version: {}", pvc_autoresizer_operator::VERSION);
    info!("  Resync interval: {:?}", config.resync_interval);
    match &config.prometheus {
        Some(p) => info!("  Usage source: prometheus ({})", p.url),
        None => info!("  Usage source: annotation ({})", config.usage_annotation),
    }

    let client = kube::Client::try_default().await?;
    let metrics = Metrics::new()?;
    let cancel = CancellationToken::new();

    let usage: UsageSourceRef = match &config.prometheus {
        Some(p) => Arc::new(PrometheusUsageSource::new(p.clone())?),
        None => Arc::new(AnnotationUsageSource::new(config.usage_annotation.clone())),
    };
    let store = KubeClaimStore::new(client.clone()).with_field_manager(config.field_manager.clone());
    let engine = ReconciliationEngine::new(
        Arc::new(store),
        usage,
        Arc::new(KubeEventSink::new(client.clone())),
    );

    // Start health server
    let health_addr = config.health_addr;
    tokio::spawn(async move {
        if let Err(e) = run_health_server(health_addr).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = config.metrics_addr;
    let exported = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(metrics_addr, exported).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Cancel in-flight passes on shutdown
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    let ctx = Context::new(engine, metrics, config, cancel);
    controller::run(client, ctx).await?;

    info!("Operator shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!("Unable to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn", "rustls=warn"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: SocketAddr) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let (status, body) = match req.uri().path() {
                "/healthz" | "/livez" | "/readyz" => (StatusCode::OK, "ok"),
                _ => (StatusCode::NOT_FOUND, "not found"),
            };
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: SocketAddr, metrics: Metrics) -> Result<()> {
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let mut response = Response::new(Body::empty());
                    match (req.uri().path(), metrics.encode()) {
                        ("/metrics", Ok((content_type, buffer))) => {
                            if let Ok(value) = HeaderValue::from_str(&content_type) {
                                response.headers_mut().insert(CONTENT_TYPE, value);
                            }
                            *response.body_mut() = Body::from(buffer);
                        }
                        ("/metrics", Err(e)) => {
                            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                            *response.body_mut() = Body::from(e.to_string());
                        }
                        _ => {
                            *response.status_mut() = StatusCode::NOT_FOUND;
                            *response.body_mut() = Body::from("not found");
                        }
                    }
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
