//! Common error types for the plugin bootstrap.
//!
//! Every failure in the bootstrap sequence is terminal: either the server
//! is fully bound and the handshake line is emitted, or the process exits
//! non-zero before serving any RPC. Restart policy belongs to the host.

use thiserror::Error;

/// Errors raised while bootstrapping a plugin server.
#[derive(Error, Debug)]
pub enum Error {
    /// Key pair or certificate generation failed
    #[error("certificate generation failed: {0}")]
    Crypto(#[from] rcgen::Error),

    /// The requested or ephemeral port could not be bound
    #[error("failed to bind 127.0.0.1:{port_hint}: {source}")]
    Bind {
        port_hint: String,
        source: std::io::Error,
    },

    /// TLS server credential assembly failed
    #[error("tls configuration failed: {0}")]
    TlsConfig(tonic::transport::Error),

    /// The handshake line could not be written to stdout
    #[error("failed to write handshake line: {0}")]
    HandshakeWrite(std::io::Error),

    /// gRPC transport error while serving
    #[error("grpc transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Result type alias using the bootstrap [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
