//! Terraform Provider for Kubernetes
//!
//! Maps Terraform resource configuration (cluster role bindings, stateful
//! sets) onto Kubernetes API objects. The host drives the provider over a
//! line-delimited JSON-RPC stream on stdin/stdout; logs go to stderr.

mod client;
mod id;
mod metadata;
mod provider;
mod resources;
mod schema;
mod value;

use clap::Parser;
use provider::KubernetesProvider;
use std::io::{self, BufRead, Write};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Terraform Provider for Kubernetes
#[derive(Parser, Debug)]
#[command(name = "terraform-provider-kubernetes")]
#[command(about = "Terraform provider for Kubernetes cluster role bindings and stateful sets")]
struct Args {
    /// Enable debug mode
    #[arg(long, env = "TF_LOG")]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let _args = Args::parse();

    tracing::info!("starting Terraform provider for Kubernetes");

    let provider = KubernetesProvider::new()?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();

    for line in stdin.lock().lines() {
        let input = line?;
        let response = provider.handle_request(&input);
        writeln!(stdout_lock, "{}", response)?;
        stdout_lock.flush()?;
    }

    tracing::info!("Terraform provider shutting down");
    Ok(())
}
