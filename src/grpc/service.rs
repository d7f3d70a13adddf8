//! Admission service implementation.

use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, info, instrument};

use super::proto::floodgate::admission::v1::{
    admission_service_server::AdmissionService, check_response::Code,
    CallerContext as ProtoCallerContext, CheckAddressRequest, CheckOperationRequest,
    CheckResponse, OperationDescriptor as ProtoOperationDescriptor,
};
use crate::ratelimit::{
    AddressHints, AdmissionDenied, CallerContext, GlobalRateLimiter, OperationDescriptor,
    OperationRateLimiter,
};

/// Implementation of the AdmissionService gRPC interface.
pub struct AdmissionServiceImpl {
    /// Per-operation tier
    operations: Arc<OperationRateLimiter>,
    /// Per-address tier
    global: Arc<GlobalRateLimiter>,
}

impl AdmissionServiceImpl {
    /// Create a new service over both limiters.
    pub fn new(operations: Arc<OperationRateLimiter>, global: Arc<GlobalRateLimiter>) -> Self {
        Self { operations, global }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<ProtoCallerContext> for CallerContext {
    fn from(caller: ProtoCallerContext) -> Self {
        CallerContext {
            hints: AddressHints {
                forwarded_for: non_empty(caller.forwarded_for),
                real_ip: non_empty(caller.real_ip),
                peer_addr: non_empty(caller.peer_addr),
                ip: non_empty(caller.ip),
            },
            user_id: non_empty(caller.user_id),
        }
    }
}

impl From<ProtoOperationDescriptor> for OperationDescriptor {
    fn from(operation: ProtoOperationDescriptor) -> Self {
        OperationDescriptor {
            operation_type: operation.operation_type,
            operation_name: operation.operation_name,
        }
    }
}

fn to_response(result: Result<(), AdmissionDenied>) -> CheckResponse {
    match result {
        Ok(()) => CheckResponse {
            code: Code::Ok.into(),
            ..Default::default()
        },
        Err(denied) => CheckResponse {
            code: Code::OverLimit.into(),
            status_code: u32::from(denied.status_code),
            raw_body: denied.to_json().into_bytes(),
            retry_after: denied.retry_after,
            message: denied.message,
        },
    }
}

#[tonic::async_trait]
impl AdmissionService for AdmissionServiceImpl {
    /// Check a single operation against the per-operation tier.
    #[instrument(
        skip(self, request),
        fields(
            has_operation = request.get_ref().operation.is_some(),
            has_caller = request.get_ref().caller.is_some()
        )
    )]
    async fn check_operation(
        &self,
        request: Request<CheckOperationRequest>,
    ) -> Result<Response<CheckResponse>, Status> {
        let req = request.into_inner();

        debug!(operation = ?req.operation, "Processing operation admission request");

        let operation = req.operation.map(OperationDescriptor::from);
        let caller = req.caller.map(CallerContext::from);

        let result = self.operations.check(operation.as_ref(), caller.as_ref());
        if let Err(denied) = &result {
            info!(
                operation = ?operation,
                retry_after = ?denied.retry_after,
                "Operation rejected"
            );
        }

        Ok(Response::new(to_response(result)))
    }

    /// Check a caller against the global per-address tier.
    #[instrument(skip(self, request), fields(has_caller = request.get_ref().caller.is_some()))]
    async fn check_address(
        &self,
        request: Request<CheckAddressRequest>,
    ) -> Result<Response<CheckResponse>, Status> {
        let caller = request.into_inner().caller.map(CallerContext::from);

        let result = self.global.check(caller.as_ref());
        if result.is_err() {
            info!(
                address = %caller.as_ref().map(CallerContext::address).unwrap_or_default(),
                "Address rejected"
            );
        }

        Ok(Response::new(to_response(result)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{ConfigResolver, HandlerRegistry, RateLimitConfig, RateLimitDefaults};

    fn service(global_limit: u64) -> AdmissionServiceImpl {
        let mut registry = HandlerRegistry::new();
        registry.register_handler("Query:feed", RateLimitConfig::new(2, 60));
        let operations = Arc::new(OperationRateLimiter::new(ConfigResolver::new(
            registry,
            RateLimitDefaults::builtin(),
        )));
        let global = Arc::new(GlobalRateLimiter::new(global_limit, 60).unwrap());
        AdmissionServiceImpl::new(operations, global)
    }

    fn caller(forwarded_for: &str) -> ProtoCallerContext {
        ProtoCallerContext {
            forwarded_for: Some(forwarded_for.to_string()),
            ..Default::default()
        }
    }

    fn feed_request() -> CheckOperationRequest {
        CheckOperationRequest {
            operation: Some(ProtoOperationDescriptor {
                operation_type: "Query".to_string(),
                operation_name: "feed".to_string(),
            }),
            caller: Some(caller("1.2.3.4, 10.0.0.1")),
        }
    }

    #[tokio::test]
    async fn test_operation_admitted_then_rejected() {
        let service = service(100);

        for _ in 0..2 {
            let response = service
                .check_operation(Request::new(feed_request()))
                .await
                .unwrap()
                .into_inner();
            assert_eq!(response.code(), Code::Ok);
            assert_eq!(response.status_code, 0);
            assert!(response.raw_body.is_empty());
        }

        let response = service
            .check_operation(Request::new(feed_request()))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.code(), Code::OverLimit);
        assert_eq!(response.status_code, 429);
        assert_eq!(response.retry_after, Some(60));

        let body: serde_json::Value = serde_json::from_slice(&response.raw_body).unwrap();
        assert_eq!(body["statusCode"], 429);
        assert_eq!(body["retryAfter"], 60);
        assert_eq!(body["message"], response.message.as_str());
    }

    #[tokio::test]
    async fn test_missing_operation_fails_open() {
        let service = service(100);
        let request = CheckOperationRequest {
            operation: None,
            caller: Some(caller("1.2.3.4")),
        };

        let response = service
            .check_operation(Request::new(request))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.code(), Code::Ok);
    }

    #[tokio::test]
    async fn test_address_rejected_without_retry_hint() {
        let service = service(1);
        let request = || CheckAddressRequest {
            caller: Some(caller("1.2.3.4")),
        };

        let response = service.check_address(Request::new(request())).await.unwrap().into_inner();
        assert_eq!(response.code(), Code::Ok);

        let response = service.check_address(Request::new(request())).await.unwrap().into_inner();
        assert_eq!(response.code(), Code::OverLimit);
        assert_eq!(response.status_code, 429);
        assert_eq!(response.message, "Too many requests from this IP address.");
        assert_eq!(response.retry_after, None);
    }

    #[test]
    fn test_empty_proto_fields_are_absent() {
        let caller = CallerContext::from(ProtoCallerContext {
            forwarded_for: Some(String::new()),
            real_ip: Some("9.9.9.9".to_string()),
            user_id: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(caller.hints.forwarded_for, None);
        assert_eq!(caller.address(), "9.9.9.9");
        assert!(!caller.is_authenticated());
    }
}
