//! Standard gRPC health checking service (`grpc.health.v1`).
//!
//! Hosts probe the `plugin` service name to decide whether the plugin
//! process is alive; the empty service name reports the server itself.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::pin::Pin;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};

use crate::proto::health::health_check_response::ServingStatus;
use crate::proto::health::health_server::Health;
use crate::proto::health::{HealthCheckRequest, HealthCheckResponse};

/// Service name the host health-checks on a plugin server.
pub const PLUGIN_SERVICE: &str = "plugin";

/// In-process health registry with watch-based status broadcast.
pub struct HealthService {
    // One watch channel per registered service so Watch streams see updates
    statuses: RwLock<HashMap<String, watch::Sender<ServingStatus>>>,
}

impl HealthService {
    /// New registry; the server-wide status (empty name) starts SERVING.
    pub fn new() -> Self {
        let service = Self {
            statuses: RwLock::new(HashMap::new()),
        };
        service.set(String::new(), ServingStatus::Serving);
        service
    }

    /// Mark a service as SERVING, registering it if unknown.
    pub fn set_serving(&self, service: impl Into<String>) {
        self.set(service.into(), ServingStatus::Serving);
    }

    /// Mark a service as NOT_SERVING, registering it if unknown.
    pub fn set_not_serving(&self, service: impl Into<String>) {
        self.set(service.into(), ServingStatus::NotServing);
    }

    fn set(&self, service: String, status: ServingStatus) {
        let mut statuses = self.statuses.write();
        match statuses.entry(service) {
            Entry::Occupied(entry) => {
                entry.get().send_replace(status);
            }
            Entry::Vacant(entry) => {
                let (tx, _rx) = watch::channel(status);
                entry.insert(tx);
            }
        }
    }
}

impl Default for HealthService {
    fn default() -> Self {
        Self::new()
    }
}

#[tonic::async_trait]
impl Health for HealthService {
    async fn check(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        let service = request.into_inner().service;
        let statuses = self.statuses.read();
        match statuses.get(&service) {
            Some(tx) => {
                let status: ServingStatus = *tx.borrow();
                Ok(Response::new(HealthCheckResponse {
                    status: status.into(),
                }))
            }
            // Health protocol: Check on an unregistered service is NOT_FOUND
            None => Err(Status::not_found(format!("unknown service: {service}"))),
        }
    }

    type WatchStream =
        Pin<Box<dyn Stream<Item = Result<HealthCheckResponse, Status>> + Send + 'static>>;

    async fn watch(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        let service = request.into_inner().service;
        let rx = {
            let mut statuses = self.statuses.write();
            match statuses.entry(service) {
                Entry::Occupied(entry) => entry.get().subscribe(),
                Entry::Vacant(entry) => {
                    // Watch on an unknown service streams SERVICE_UNKNOWN
                    // until someone registers it
                    let (tx, rx) = watch::channel(ServingStatus::ServiceUnknown);
                    entry.insert(tx);
                    rx
                }
            }
        };

        let stream = tokio_stream::wrappers::WatchStream::new(rx).map(|status| {
            Ok(HealthCheckResponse {
                status: status.into(),
            })
        });
        Ok(Response::new(Box::pin(stream)))
    }
}
