//! Secure server bootstrap.
//!
//! The bootstrap sequence is strictly sequential: generate identity,
//! encode it, bind the loopback TLS listener, then emit the handshake
//! line. The listener is bound inside [`start`] but connections are only
//! accepted once the caller invokes [`ServerHandle::serve`]; the OS
//! backlog holds anything that arrives in between, so the host may
//! connect the moment it reads the handshake.

mod controller;
mod health;
mod shutdown;

pub use controller::CoreController;
pub use health::{HealthService, PLUGIN_SERVICE};
pub use shutdown::{shutdown_signal, ShutdownTrigger};

use std::convert::Infallible;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::server::NamedService;
use tonic::transport::server::Router;
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tracing::{debug, info};

use crate::cert::{encode_certificate, generate_identity, ServerIdentity};
use crate::error::{Error, Result};
use crate::handshake::{HandshakeLine, LOOPBACK_ADDR};
use crate::proto::controller::grpc_controller_server::GrpcControllerServer;
use crate::proto::health::health_server::HealthServer;

/// Concurrency limit per control-plane connection. Sized for the light
/// controller/health traffic, not the business RPCs.
pub const CONTROL_PLANE_CONCURRENCY: usize = 10;

/// Default server factory: a transport builder with the bounded
/// control-plane concurrency limit applied.
pub fn default_server_factory() -> Server {
    Server::builder().concurrency_limit_per_connection(CONTROL_PLANE_CONCURRENCY)
}

/// Default health configurer: the standard health service with the
/// `plugin` name marked SERVING.
pub fn default_health_service() -> HealthServer<HealthService> {
    let health = HealthService::new();
    health.set_serving(PLUGIN_SERVICE);
    HealthServer::new(health)
}

/// Default controller factory: the library's shutdown controller.
pub fn default_controller(trigger: ShutdownTrigger) -> GrpcControllerServer<CoreController> {
    GrpcControllerServer::new(CoreController::new(trigger))
}

/// A bound, not-yet-serving plugin server.
///
/// Owns the loopback listener, the registered services, and the shutdown
/// trigger. Exactly one exists per process lifetime; [`serve`] consumes it
/// and runs until the trigger fires.
///
/// [`serve`]: ServerHandle::serve
pub struct ServerHandle {
    port: u16,
    listener: TcpListener,
    router: Router,
    trigger: ShutdownTrigger,
    stop_rx: watch::Receiver<bool>,
}

impl ServerHandle {
    /// The resolved port the listener is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Handle that stops the serve loop when fired.
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    /// Register the plugin's business service before serving.
    pub fn add_service<S>(mut self, svc: S) -> Self
    where
        S: tonic::codegen::Service<
                http::Request<tonic::body::BoxBody>,
                Response = http::Response<tonic::body::BoxBody>,
                Error = Infallible,
            > + NamedService
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        self.router = self.router.add_service(svc);
        self
    }

    /// Accept connections until shutdown is triggered.
    ///
    /// In-flight requests drain before the future resolves.
    pub async fn serve(self) -> Result<()> {
        let port = self.port;
        let incoming = TcpListenerStream::new(self.listener);
        self.router
            .serve_with_incoming_shutdown(incoming, shutdown::triggered(self.stop_rx))
            .await?;
        info!(port, "plugin server stopped");
        Ok(())
    }
}

/// Build and bind a secure plugin server from its three collaborators.
///
/// - `port_hint`: `"0"` requests an OS-assigned ephemeral port, anything
///   else the literal port. Unparseable or unbindable hints fail with
///   [`Error::Bind`]; there is no fallback port.
/// - `server_factory`: constructs the empty transport builder.
/// - `controller_factory`: given the shutdown trigger, returns the
///   control service to register.
/// - `health_configurer`: returns the health service to register.
///
/// TLS credentials come from `identity`; clients are not asked for
/// certificates, since trust runs through the handshake line.
pub async fn start<C, H>(
    port_hint: &str,
    identity: &ServerIdentity,
    server_factory: impl FnOnce() -> Server,
    controller_factory: impl FnOnce(ShutdownTrigger) -> C,
    health_configurer: impl FnOnce() -> H,
) -> Result<ServerHandle>
where
    C: tonic::codegen::Service<
            http::Request<tonic::body::BoxBody>,
            Response = http::Response<tonic::body::BoxBody>,
            Error = Infallible,
        > + NamedService
        + Clone
        + Send
        + 'static,
    C::Future: Send + 'static,
    H: tonic::codegen::Service<
            http::Request<tonic::body::BoxBody>,
            Response = http::Response<tonic::body::BoxBody>,
            Error = Infallible,
        > + NamedService
        + Clone
        + Send
        + 'static,
    H::Future: Send + 'static,
{
    let (trigger, stop_rx) = shutdown::shutdown_channel();

    let server = server_factory();
    let controller = controller_factory(trigger.clone());

    let tls = ServerTlsConfig::new()
        .identity(Identity::from_pem(identity.cert_pem(), identity.key_pem()));
    let mut server = server.tls_config(tls).map_err(Error::TlsConfig)?;

    let requested: u16 = port_hint.parse().map_err(|_| Error::Bind {
        port_hint: port_hint.to_string(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "port hint is not a valid port number",
        ),
    })?;
    let listener = TcpListener::bind((LOOPBACK_ADDR, requested))
        .await
        .map_err(|source| Error::Bind {
            port_hint: port_hint.to_string(),
            source,
        })?;
    let port = listener
        .local_addr()
        .map_err(|source| Error::Bind {
            port_hint: port_hint.to_string(),
            source,
        })?
        .port();

    let health = health_configurer();
    let router = server.add_service(controller).add_service(health);

    debug!(port, "secure loopback listener bound");

    Ok(ServerHandle {
        port,
        listener,
        router,
        trigger,
        stop_rx,
    })
}

/// A fully bootstrapped plugin server: identity generated, listener
/// bound, handshake line prepared.
///
/// Composes the whole sequence the way a plugin process runs it:
///
/// ```rust,ignore
/// rpcplugin::tracing::init();
/// let plugin = PluginServer::bind("0").await?;
/// let plugin = plugin.add_service(EchoServer::new(EchoService::default()));
/// plugin.run().await?;
/// ```
pub struct PluginServer {
    handle: ServerHandle,
    handshake: HandshakeLine,
}

impl PluginServer {
    /// Bootstrap with the library's default collaborators.
    pub async fn bind(port_hint: &str) -> Result<Self> {
        Self::bind_with(
            port_hint,
            default_server_factory,
            default_controller,
            default_health_service,
        )
        .await
    }

    /// Bootstrap with caller-provided collaborators.
    ///
    /// Generates the identity, encodes it, and binds the listener; the
    /// handshake line is prepared but not emitted until [`run`].
    ///
    /// [`run`]: PluginServer::run
    pub async fn bind_with<C, H>(
        port_hint: &str,
        server_factory: impl FnOnce() -> Server,
        controller_factory: impl FnOnce(ShutdownTrigger) -> C,
        health_configurer: impl FnOnce() -> H,
    ) -> Result<Self>
    where
        C: tonic::codegen::Service<
                http::Request<tonic::body::BoxBody>,
                Response = http::Response<tonic::body::BoxBody>,
                Error = Infallible,
            > + NamedService
            + Clone
            + Send
            + 'static,
        C::Future: Send + 'static,
        H: tonic::codegen::Service<
                http::Request<tonic::body::BoxBody>,
                Response = http::Response<tonic::body::BoxBody>,
                Error = Infallible,
            > + NamedService
            + Clone
            + Send
            + 'static,
        H::Future: Send + 'static,
    {
        let identity = generate_identity()?;
        let cert_b64 = encode_certificate(identity.cert_der());

        let handle = start(
            port_hint,
            &identity,
            server_factory,
            controller_factory,
            health_configurer,
        )
        .await?;

        let handshake = HandshakeLine::new(handle.port(), cert_b64);
        info!(port = handle.port(), "plugin server bootstrapped");

        Ok(Self { handle, handshake })
    }

    /// The resolved port the listener is bound to.
    pub fn port(&self) -> u16 {
        self.handle.port()
    }

    /// The handshake line this server will announce.
    pub fn handshake(&self) -> &HandshakeLine {
        &self.handshake
    }

    /// Handle that stops the serve loop when fired.
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.handle.shutdown_trigger()
    }

    /// Register the plugin's business service before serving.
    pub fn add_service<S>(mut self, svc: S) -> Self
    where
        S: tonic::codegen::Service<
                http::Request<tonic::body::BoxBody>,
                Response = http::Response<tonic::body::BoxBody>,
                Error = Infallible,
            > + NamedService
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        self.handle = self.handle.add_service(svc);
        self
    }

    /// Emit the handshake line on stdout, then serve until the host
    /// requests shutdown or the process receives a termination signal.
    pub async fn run(self) -> Result<()> {
        self.handshake.emit()?;

        let signal_trigger = self.handle.shutdown_trigger();
        tokio::spawn(async move {
            shutdown_signal().await;
            signal_trigger.trigger();
        });

        self.handle.serve().await
    }

    /// Serve without emitting the handshake line.
    ///
    /// For callers that announce through a different channel, and for
    /// tests that must not touch stdout.
    pub async fn serve(self) -> Result<()> {
        self.handle.serve().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ephemeral_ports_are_bound_and_distinct() {
        let a = PluginServer::bind("0").await.unwrap();
        let b = PluginServer::bind("0").await.unwrap();
        assert_ne!(a.port(), 0);
        assert_ne!(b.port(), 0);
        assert_ne!(a.port(), b.port());
    }

    #[tokio::test]
    async fn explicit_free_port_is_bound_exactly() {
        // Grab a free port from the OS, release it, then request it
        let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = reserved.local_addr().unwrap().port();
        drop(reserved);

        let plugin = PluginServer::bind(&port.to_string()).await.unwrap();
        assert_eq!(plugin.port(), port);
    }

    #[tokio::test]
    async fn occupied_port_fails_without_fallback() {
        let occupier = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupier.local_addr().unwrap().port();

        let err = PluginServer::bind(&port.to_string())
            .await
            .err()
            .expect("occupied port must not bind");
        assert!(matches!(err, Error::Bind { .. }));
    }

    #[tokio::test]
    async fn garbage_port_hint_fails_to_bind() {
        let err = PluginServer::bind("not-a-port")
            .await
            .err()
            .expect("non-numeric hint must not bind");
        assert!(matches!(err, Error::Bind { .. }));
    }

    #[tokio::test]
    async fn handshake_port_matches_handle_port() {
        let plugin = PluginServer::bind("0").await.unwrap();
        assert_eq!(plugin.handshake().port(), plugin.port());
        let line = plugin.handshake().to_string();
        assert!(line.contains(&format!("127.0.0.1:{}", plugin.port())));
    }

    #[tokio::test]
    async fn shutdown_trigger_stops_serve() {
        let plugin = PluginServer::bind("0").await.unwrap();
        let trigger = plugin.shutdown_trigger();

        let serving = tokio::spawn(plugin.serve());
        trigger.trigger();

        tokio::time::timeout(std::time::Duration::from_secs(5), serving)
            .await
            .expect("serve should stop after trigger")
            .expect("serve task should not panic")
            .expect("serve should return Ok");
    }
}
