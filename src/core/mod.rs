//! Core functionality for the chat gateway.
//!
//! - Configuration management
//! - Error handling
//! - Logging context
//! - Metrics collection
//! - Stream cancellation

pub mod cancel;
pub mod config;
pub mod error;
pub mod error_types;
pub mod logging;
pub mod metrics;

// Re-export commonly used types
pub use cancel::StreamCancelHandle;
pub use config::{
    GatewayConfig, ModelCatalog, ModelConfig, ProviderSettings, ProvidersConfig, ServerConfig,
    WireFormat,
};
pub use error::{GatewayError, Result};
pub use logging::{generate_request_id, get_request_id, ContextStream};
pub use metrics::{get_metrics, init_metrics, Metrics};
