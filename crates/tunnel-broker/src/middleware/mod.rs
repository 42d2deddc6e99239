//! Middleware for the public router.
//!
//! Layer order: Request → Tracing → Handler (body limit applied in the handler)

pub mod tracing;

pub use tracing::TracingLayer;
