//! gRPC service implementation for the echo business service.

use tonic::{Request, Response, Status};
use tracing::debug;

use crate::proto::echo_server::Echo;
use crate::proto::{EchoRequest, EchoResponse};

/// Trivial business service: returns the request payload unchanged.
#[derive(Default)]
pub struct EchoService;

#[tonic::async_trait]
impl Echo for EchoService {
    async fn echo(&self, request: Request<EchoRequest>) -> Result<Response<EchoResponse>, Status> {
        let payload = request.into_inner().payload;
        debug!(len = payload.len(), "echoing payload");
        Ok(Response::new(EchoResponse { payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_payload_unchanged() {
        let service = EchoService;
        let resp = service
            .echo(Request::new(EchoRequest {
                payload: "ping".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.payload, "ping");
    }
}
