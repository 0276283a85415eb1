// Common types and utilities shared across PonPulse agent crates
// Wire shapes mirror the control-plane JSON schemas

pub mod buffer;
pub mod circuit_breaker;
pub mod error;
pub mod pusher;
pub mod registry;
pub mod retry;
pub mod types;

pub use buffer::{BoundedRetryBuffer, BufferConfig, BufferedBatch};
pub use circuit_breaker::{BreakerStats, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::{AgentError, Result};
pub use pusher::{MetricsPusher, PushResponse, PusherConfig, PusherStats, ResilientPusher};
pub use registry::EquipmentRegistry;
pub use retry::RetryPolicy;
pub use types::*;
