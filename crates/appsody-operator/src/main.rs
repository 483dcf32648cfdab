//! Appsody application operator binary

use anyhow::{Context, Result};
use appsody_operator::{AppsodyApplication, OperatorBuilder};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Kubernetes operator for AppsodyApplication resources
#[derive(Parser, Debug)]
#[command(name = "appsody-operator")]
#[command(version)]
struct Args {
    /// Namespace to watch (empty for cluster-wide)
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    watch_namespace: String,

    /// Namespace holding the operator ConfigMaps
    #[arg(long, env = "OPERATOR_NAMESPACE", default_value = "")]
    operator_namespace: String,

    /// Metrics server address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,

    /// Health probe address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: SocketAddr,

    /// Seconds between reconciles of a healthy application
    #[arg(long, env = "RESYNC_SECONDS", default_value_t = appsody_operator::DEFAULT_RESYNC_SECONDS)]
    resync_seconds: u64,

    /// Log filter, e.g. `info` or `appsody_operator=debug,kube=warn`
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON log format
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,

    /// Print CRD YAML and exit
    #[arg(long)]
    print_crd: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_crd {
        return print_crd();
    }

    init_logging(&args)?;

    let manager = OperatorBuilder::new()
        .watch_namespace(Some(args.watch_namespace))
        .operator_namespace(Some(args.operator_namespace))
        .resync_interval(Duration::from_secs(args.resync_seconds))
        .health_addr(args.health_addr)
        .metrics_addr(args.metrics_addr)
        .build()
        .await
        .context("Failed to create Kubernetes client")?;

    info!(config = ?manager.config(), "Operator configured");

    manager.run().await.context("Operator failed")?;
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_new(&args.log_level)
        .with_context(|| format!("Invalid log filter {:?}", args.log_level))?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
    Ok(())
}

fn print_crd() -> Result<()> {
    use kube::CustomResourceExt;

    let yaml = serde_yaml::to_string(&AppsodyApplication::crd())?;
    println!("{}", yaml);
    Ok(())
}
