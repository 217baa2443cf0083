//! # rpcplugin
//!
//! Bootstrap layer for gRPC plugin processes driven by a controlling host:
//! - **cert**: ephemeral TLS identity (self-signed, single process lifetime)
//! - **handshake**: the `1|6|tcp|127.0.0.1:<port>|grpc|<cert>` stdout line
//! - **server**: loopback TLS listener with controller + health services
//! - **error**: common error types
//! - **tracing**: logging setup (stderr; stdout belongs to the handshake)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rpcplugin::PluginServer;
//!
//! let plugin = PluginServer::bind("0").await?;
//! let plugin = plugin.add_service(MyServiceServer::new(my_service));
//! plugin.run().await?;
//! ```

pub mod cert;
pub mod error;
pub mod handshake;
pub mod server;
pub mod tracing;

pub mod proto {
    //! Compiled protobuf definitions.

    pub mod controller {
        //! `plugin.GRPCController` - host-driven graceful shutdown.
        tonic::include_proto!("plugin");
    }

    pub mod health {
        //! Standard gRPC health checking protocol.
        tonic::include_proto!("grpc.health.v1");
    }
}

// Re-export commonly used items at crate root
pub use cert::{encode_certificate, generate_identity, ServerIdentity};
pub use error::{Error, Result};
pub use handshake::HandshakeLine;
pub use server::{PluginServer, ServerHandle, ShutdownTrigger};
