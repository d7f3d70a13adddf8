//! gRPC admission service.

mod server;
mod service;

pub use server::GrpcServer;
pub use service::AdmissionServiceImpl;

// Include the generated protobuf code
pub mod proto {
    pub mod floodgate {
        pub mod admission {
            pub mod v1 {
                tonic::include_proto!("floodgate.admission.v1");
            }
        }
    }
}

// Re-export commonly used types
pub use proto::floodgate::admission::v1::{
    admission_service_server::AdmissionServiceServer, CheckAddressRequest, CheckOperationRequest,
    CheckResponse,
};
