//! Request-processing services.
//!
//! - [`normalizer`]: inbound messages → canonical `{sender, content}`
//! - [`router`]: model identifier → provider
//! - [`pipeline`]: one chat request end to end
//! - [`fallback`]: simulated reply when the provider is unreachable

pub mod fallback;
pub mod normalizer;
pub mod pipeline;
pub mod router;

// Re-export commonly used types
pub use fallback::FallbackEmitter;
pub use normalizer::normalize_messages;
pub use pipeline::{ChatPipeline, ChatStream, RelayStream};
pub use router::{ModelRouter, Route, RouteMatch};
