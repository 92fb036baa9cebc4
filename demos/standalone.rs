//! Standalone devtools host.
//!
//! Listens on `localhost:8097` (override with `DEVTOOLS_PORT`), serves the
//! bootstrap script named by `DEVTOOLS_BOOTSTRAP` to plain HTTP requests,
//! and prints every event the attached target sends.
//!
//! Run with: RUST_LOG=devtools_bridge=debug cargo run --example standalone

use std::sync::Arc;

use devtools_bridge::server::DEFAULT_PORT;
use devtools_bridge::{
    BootstrapSource, Bridge, ConnectionHost, Container, MemoryContainer, MountHandle, Reconciler,
    Renderer, Result, SessionController,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Console UI
// ============================================================================

/// Prints the container transitions instead of rendering them.
struct ConsoleRenderer;

struct ConsoleMount;

impl Renderer for ConsoleRenderer {
    fn mount(
        &self,
        container: &Arc<dyn Container>,
        _bridge: &Bridge,
        _reconciler: &Arc<dyn Reconciler>,
    ) -> Box<dyn MountHandle> {
        container.set_inner_html("<div id=\"devtools\"></div>");
        println!("[ui] mounted");
        Box::new(ConsoleMount)
    }
}

impl MountHandle for ConsoleMount {
    fn unmount(self: Box<Self>) {
        println!("[ui] unmounted");
    }
}

/// Logs every event it is told about.
struct EventLog;

impl Reconciler for EventLog {
    fn detach(&self) {
        println!("[store] detached");
    }
}

fn attach_event_log(bridge: &Bridge) -> Arc<dyn Reconciler> {
    for event in ["operations", "backendVersion", "bridgeProtocol", "shutdown"] {
        let _ = bridge.subscribe(event, move |message| {
            println!("[{event}] {}", message.payload());
            Ok(())
        });
    }
    Arc::new(EventLog)
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = std::env::var("DEVTOOLS_PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let bootstrap = std::env::var("DEVTOOLS_BOOTSTRAP")
        .map(BootstrapSource::file)
        .unwrap_or_default();

    let container = Arc::new(MemoryContainer::new("<p>Waiting for a target to connect...</p>"));
    let host = ConnectionHost::new(Arc::new(ConsoleRenderer), Arc::new(attach_event_log));
    host.set_container(container.clone());

    let controller = SessionController::builder()
        .port(port)
        .bootstrap(bootstrap)
        .bootstrap_connect_call(true)
        .status_listener(|status| println!("[status] {status}"))
        .observer(Arc::new(host.clone()))
        .build()?;

    controller.start();
    info!(port, "Waiting for Ctrl+C");

    tokio::signal::ctrl_c().await?;
    controller.stop();
    info!(state = %host.state(), "Shut down");
    Ok(())
}
