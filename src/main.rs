use tokio::io::AsyncReadExt;
use tracing::{error, info};

use nmapply::Result;
use nmapply::exec::NmcliExecutor;
use nmapply::inventory::Inventory;
use nmapply::reconcile;
use nmapply::spec::ConnectionSpec;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nmapply=info".parse().unwrap()),
        )
        .init();

    match run().await {
        Ok(failed) => {
            if failed {
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("fatal: {e}");
            std::process::exit(1);
        }
    }
}

/// Reconcile one connection spec; returns whether actuation failed.
async fn run() -> Result<bool> {
    let mut check_mode = false;
    let mut spec_path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--check" => check_mode = true,
            _ => spec_path = Some(arg),
        }
    }

    let raw = match &spec_path {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };
    let spec: ConnectionSpec = serde_json::from_str(&raw)?;

    info!(
        conn_name = %spec.conn_name,
        state = ?spec.state,
        check_mode,
        "reconciling connection profile"
    );

    let executor = NmcliExecutor::locate()?;
    let bus = zbus::Connection::system().await?;
    let inventory = Inventory::new(bus);
    let records = inventory.list().await?;

    let report = reconcile::reconcile(&spec, &records, &executor, check_mode).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.failed())
}
