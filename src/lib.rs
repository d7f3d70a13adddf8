//! Floodgate - Admission Control Service
//!
//! This crate protects a multi-tenant API server from overuse with two
//! independent fixed-window rate limiters: one per client and operation with
//! tiered configuration, and a coarse one per client address. Both can be
//! embedded as a library or run behind the bundled gRPC service.

pub mod config;
pub mod error;
pub mod grpc;
pub mod ratelimit;
