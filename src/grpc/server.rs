//! gRPC server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;
use tracing::{error, info};

use super::proto::floodgate::admission::v1::admission_service_server::AdmissionServiceServer;
use super::service::AdmissionServiceImpl;
use crate::error::{FloodgateError, Result};
use crate::ratelimit::{GlobalRateLimiter, OperationRateLimiter};

/// gRPC server for the admission service.
pub struct GrpcServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Per-operation tier
    operations: Arc<OperationRateLimiter>,
    /// Per-address tier
    global: Arc<GlobalRateLimiter>,
}

impl GrpcServer {
    /// Create a new gRPC server over both limiters.
    pub fn new(
        addr: SocketAddr,
        operations: Arc<OperationRateLimiter>,
        global: Arc<GlobalRateLimiter>,
    ) -> Self {
        Self {
            addr,
            operations,
            global,
        }
    }

    fn service(&self) -> AdmissionServiceServer<AdmissionServiceImpl> {
        AdmissionServiceServer::new(AdmissionServiceImpl::new(
            Arc::clone(&self.operations),
            Arc::clone(&self.global),
        ))
    }

    /// Start the gRPC server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        info!(addr = %self.addr, "Starting gRPC server for AdmissionService");

        Server::builder()
            .add_service(self.service())
            .serve(self.addr)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                FloodgateError::Grpc(e)
            })
    }

    /// Start the gRPC server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        info!(
            addr = %self.addr,
            "Starting gRPC server for AdmissionService with graceful shutdown"
        );

        Server::builder()
            .add_service(self.service())
            .serve_with_shutdown(self.addr, signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                FloodgateError::Grpc(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::ConfigResolver;

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let operations = Arc::new(OperationRateLimiter::new(ConfigResolver::default()));
        let global = Arc::new(GlobalRateLimiter::default());
        let _server = GrpcServer::new(addr, operations, global);
    }

    #[tokio::test]
    async fn test_serve_with_immediate_shutdown() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let operations = Arc::new(OperationRateLimiter::new(ConfigResolver::default()));
        let global = Arc::new(GlobalRateLimiter::default());
        let server = GrpcServer::new(addr, operations, global);

        let result = server.serve_with_shutdown(async {}).await;
        assert!(result.is_ok());
    }
}
