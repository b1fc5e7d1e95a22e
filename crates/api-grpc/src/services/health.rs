//! `grpc.health.v1.Health` service with error and route reporting.
//!
//! `Check` runs through the unary interceptor and `Watch` through the
//! streaming interceptor, so both show up in route stats and failures are
//! reported as notices.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_server::Health;
use tonic_health::pb::{HealthCheckRequest, HealthCheckResponse};
use tracing::debug;

use crate::interceptors::{
    ChannelServerStream, ServerStream, StreamServerInfo, StreamServerInterceptor, UnaryServerInfo,
    UnaryServerInterceptor,
};

pub const CHECK_METHOD: &str = "/grpc.health.v1.Health/Check";
pub const WATCH_METHOD: &str = "/grpc.health.v1.Health/Watch";

const WATCH_CHANNEL_CAPACITY: usize = 4;

struct HealthState {
    statuses: watch::Sender<HashMap<String, ServingStatus>>,
}

impl HealthState {
    fn status(&self, service: &str) -> Option<ServingStatus> {
        self.statuses.borrow().get(service).copied()
    }
}

/// Health service whose calls are intercepted for reporting.
///
/// The overall server status is registered under the empty service name
/// and starts as `SERVING`. Clones share their status table.
#[derive(Clone)]
pub struct MonitoredHealthService {
    state: Arc<HealthState>,
    unary: UnaryServerInterceptor,
    streaming: StreamServerInterceptor,
}

impl MonitoredHealthService {
    pub fn new(unary: UnaryServerInterceptor, streaming: StreamServerInterceptor) -> Self {
        let mut statuses = HashMap::new();
        statuses.insert(String::new(), ServingStatus::Serving);
        let (tx, _) = watch::channel(statuses);

        Self {
            state: Arc::new(HealthState { statuses: tx }),
            unary,
            streaming,
        }
    }

    /// Set the serving status of `service`, notifying active watchers
    pub fn set_status(&self, service: impl Into<String>, status: ServingStatus) {
        let service = service.into();
        self.state.statuses.send_if_modified(|statuses| {
            let previous = statuses.insert(service.clone(), status);
            previous != Some(status)
        });
        debug!(service = %service, status = ?status, "Health status updated");
    }

    /// Current serving status of `service`, if registered
    pub fn status(&self, service: &str) -> Option<ServingStatus> {
        self.state.status(service)
    }
}

#[async_trait]
impl Health for MonitoredHealthService {
    async fn check(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        let info = UnaryServerInfo::new(CHECK_METHOD);
        let state = &self.state;

        self.unary
            .intercept_request(request, &info, |request| async move {
                let service = request.into_inner().service;
                match state.status(&service) {
                    Some(status) => Ok(Response::new(HealthCheckResponse {
                        status: status as i32,
                    })),
                    None => Err(Status::not_found(format!("unknown service: {}", service))),
                }
            })
            .await
    }

    type WatchStream = ReceiverStream<Result<HealthCheckResponse, Status>>;

    async fn watch(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let outbound = tx.clone();
        let stream = ChannelServerStream::from_request(request, tx);
        let interceptor = self.streaming.clone();
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            let info = StreamServerInfo::server_streaming(WATCH_METHOD);
            let call = interceptor.intercept(&*state, stream, &info, |state, stream| {
                watch_service(state, stream)
            });

            tokio::select! {
                result = call => {
                    if let Err(status) = result {
                        let _ = outbound.send(Err(status)).await;
                    }
                }
                _ = outbound.closed() => debug!("Health watcher disconnected"),
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

async fn watch_service<S>(state: &HealthState, mut stream: S) -> Result<(), Status>
where
    S: ServerStream<Inbound = HealthCheckRequest, Outbound = HealthCheckResponse>,
{
    let service = stream
        .recv()
        .await?
        .ok_or_else(|| Status::invalid_argument("missing health check request"))?
        .service;

    let mut updates = state.statuses.subscribe();
    let mut last_sent = None;

    loop {
        let status = updates
            .borrow_and_update()
            .get(&service)
            .copied()
            .unwrap_or(ServingStatus::ServiceUnknown);

        if last_sent != Some(status) {
            stream
                .send(HealthCheckResponse {
                    status: status as i32,
                })
                .await?;
            last_sent = Some(status);
        }

        if updates.changed().await.is_err() {
            return Ok(());
        }
    }
}
