//! Validation and forwarding of `/api/` requests to the posts upstream.
//!
//! # Data Flow
//!
//! ```text
//! inbound request
//!     → resolver.rs  (path → target URL + shape, or rejection)
//!     → policy.rs    (shape → allowed methods)
//!     → upstream.rs  (one outbound call, bodies streamed both ways)
//!     → handler.rs   (relay status, headers, body back to the caller)
//! ```

pub mod handler;
pub mod policy;
pub mod resolver;
pub mod upstream;

pub use handler::ProxyHandler;
pub use policy::{MethodSet, allowed_methods};
pub use resolver::{API_PREFIX, Rejection, Shape, TargetResolution, resolve};
pub use upstream::{
    HttpUpstream, ProxyRequest, ProxyResponse, RecordedRequest, ScriptedOutcome,
    ScriptedUpstream, UpstreamClient,
};
