//! iOS device unit
//!
//! Drives one device through WebDriverAgent, watches the MJPEG socket for
//! liveness and captures device logs while the device is in a group.
//! Facts are written to stdout as JSON lines; inbound messages are read
//! from stdin, one JSON object per line. Logs go to stderr.
//!
//! ```bash
//! ios-device-unit --serial 00008030-001A --wda-port 8100 --connect-port 9100
//! RUST_LOG=wda_bridge=debug ios-device-unit --config unit.toml
//! ```

mod bus;
mod config;
mod group;
mod lifecycle;
mod notifier;
mod router;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tracing::{info, warn};
use wda_bridge::{
    EscalationPolicy, Gateway, HttpTransport, LogCaptureManager, SessionManager, TcpConnector,
    Watchdog,
};

use bus::FactBus;
use config::CliOverrides;
use group::LocalGroup;
use lifecycle::ProcessLifecycle;
use notifier::BusNotifier;
use router::Router;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Device serial (UDID)
    #[arg(long)]
    serial: Option<String>,

    /// Host running WebDriverAgent
    #[arg(long)]
    wda_host: Option<String>,

    /// WebDriverAgent HTTP port
    #[arg(long)]
    wda_port: Option<u16>,

    /// WDA MJPEG port watched for liveness
    #[arg(long)]
    connect_port: Option<u16>,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device log tailing command (`--udid <serial> <bundle>` is appended)
    #[arg(long)]
    log_command: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = config::resolve(
        args.config.as_deref(),
        CliOverrides {
            serial: args.serial,
            wda_host: args.wda_host,
            wda_port: args.wda_port,
            connect_port: args.connect_port,
            log_command: args.log_command,
        },
    )?;
    info!(
        serial = %config.serial,
        wda = %config.base_url(),
        mjpeg = %config.stream_addr(),
        "iOS device unit starting"
    );

    let bus = FactBus::stdout().shared();
    let escalation = EscalationPolicy::new(
        Arc::new(BusNotifier::new(&config.serial, bus.clone())),
        Arc::new(ProcessLifecycle::new()),
    )
    .shared();

    let transport = HttpTransport::new(config.base_url(), config.request_timeout())
        .context("Failed to build WDA HTTP client")?;
    let gateway = Gateway::new(Arc::new(transport), escalation.clone());

    let (watchdog, watchdog_task) = Watchdog::new(
        TcpConnector::new(config.stream_addr()),
        config.watchdog.clone(),
        escalation.clone(),
    )
    .spawn();

    let session = SessionManager::new(&config.serial, gateway, bus.clone()).shared();
    session.attach_watchdog(watchdog.clone());

    let group = LocalGroup::new().shared();
    let logs = LogCaptureManager::new(
        &config.serial,
        config.log_capture.clone(),
        bus.clone(),
        group.clone(),
    );
    let group_watch = logs.watch_group_events(group.subscribe());

    match session.start_session().await {
        Ok(size) => info!(width = size.width, height = size.height, "WDA session ready"),
        Err(e) if e.is_fatal() => return Err(e).context("WDA session start failed"),
        Err(e) => warn!("WDA session start failed: {e}"),
    }

    let router = Router::new(session.clone(), logs.clone(), group, bus.clone());
    router
        .serve(BufReader::new(tokio::io::stdin()))
        .await
        .context("Inbound message loop failed")?;

    info!("Inbound stream closed; shutting down");
    logs.stop().await;
    if let Err(e) = session.stop_session().await {
        warn!("Failed to stop WDA session: {e}");
    }
    watchdog.disconnect();
    if let Ok(exit) = watchdog_task.await {
        info!(?exit, "Watchdog stopped");
    }
    group_watch.abort();

    Ok(())
}
