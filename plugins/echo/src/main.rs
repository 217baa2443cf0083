//! Echo Plugin
//!
//! Minimal plugin process built on the rpcplugin bootstrap. A host spawns
//! this binary, reads the handshake line from stdout, connects over TLS
//! with the advertised certificate pinned, and calls the echo service
//! until it issues a controller shutdown.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `RPCPLUGIN_PORT`: requested port, `0` for OS-assigned (default: 0)
//! - `RUST_LOG`: logging level (default: info), written to stderr

use rpcplugin::PluginServer;
use tracing::info;

mod service;

// Include generated protobuf code
pub mod proto {
    tonic::include_proto!("echo");
}

use proto::echo_server::EchoServer;
use service::EchoService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout is reserved for the handshake line
    rpcplugin::tracing::init();

    let port_hint = std::env::var("RPCPLUGIN_PORT").unwrap_or_else(|_| "0".to_string());

    let plugin = PluginServer::bind(&port_hint)
        .await?
        .add_service(EchoServer::new(EchoService));

    info!(port = plugin.port(), "echo plugin ready");

    // Emits the handshake line, then serves until the host shuts us down
    plugin.run().await?;

    Ok(())
}
