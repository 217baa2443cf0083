//! `plugin.GRPCController` implementation.
//!
//! The host calls `Shutdown` when it no longer needs the plugin; the
//! response is sent before the serve loop drains and stops.

use tonic::{Request, Response, Status};
use tracing::info;

use super::shutdown::ShutdownTrigger;
use crate::proto::controller::grpc_controller_server::GrpcController;
use crate::proto::controller::Empty;

/// Shutdown-control service registered on every plugin server.
pub struct CoreController {
    shutdown: ShutdownTrigger,
}

impl CoreController {
    pub fn new(shutdown: ShutdownTrigger) -> Self {
        Self { shutdown }
    }
}

#[tonic::async_trait]
impl GrpcController for CoreController {
    async fn shutdown(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        info!("host requested shutdown");
        self.shutdown.trigger();
        Ok(Response::new(Empty {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::shutdown::{shutdown_channel, triggered};

    #[tokio::test]
    async fn shutdown_rpc_fires_the_trigger() {
        let (trigger, rx) = shutdown_channel();
        let controller = CoreController::new(trigger);

        controller
            .shutdown(Request::new(Empty {}))
            .await
            .expect("shutdown rpc should succeed");

        triggered(rx).await;
    }
}
