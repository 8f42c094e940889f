//! HTTP middleware.
//!
//! # Architecture
//!
//! ```text
//! Request → Request Logger → Timeout → Handler → Response
//!               ↓               ↓
//!        RequestContext    408 Request Timeout
//!        started/completed
//! ```
//!
//! The request logger is outermost so the completed line reports the status
//! the caller actually received, timeouts included.

pub mod request_logger;

pub use request_logger::{
    RequestContext, RequestContextExt, RequestLoggerLayer, RequestLoggerService,
};
