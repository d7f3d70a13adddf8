//! Admission control: per-operation and per-address rate limiting.

mod cleanup;
mod client;
mod counter;
mod descriptor;
mod global;
mod limiter;
mod rejection;
mod resolver;
mod rules;

pub use cleanup::{CleanupScheduler, DEFAULT_CLEANUP_INTERVAL};
pub use client::{resolve_client_address, AddressHints, UNKNOWN_ADDRESS};
pub use counter::{CounterEntry, Decision, WindowCounterStore};
pub use descriptor::{
    global_counter_key, operation_counter_key, CallerContext, OperationDescriptor, OperationKey,
    ANONYMOUS_IDENTITY,
};
pub use global::{GlobalRateLimiter, DEFAULT_GLOBAL_LIMIT, DEFAULT_GLOBAL_WINDOW};
pub use limiter::OperationRateLimiter;
pub use rejection::{AdmissionDenied, GLOBAL_REJECTION_MESSAGE, TOO_MANY_REQUESTS};
pub use resolver::{ConfigResolver, ConfigSource};
pub use rules::{
    DefaultsOverrides, GroupRules, HandlerRegistry, RateLimitConfig, RateLimitDefaults,
    RateLimitRules, MAX_WINDOW_SECS,
};
