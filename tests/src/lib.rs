//! # Inlets Broker Test Suite
//!
//! Cross-crate tests: the broker, the worker and the shared wire format
//! driven together.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── harness.rs        # Broker + in-memory worker fixtures
//! └── integration/
//!     ├── flows.rs      # Router-level flows over an in-memory tunnel
//!     └── sockets.rs    # Real TCP listener + tungstenite worker
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p tunnel-tests
//! cargo test -p tunnel-tests integration::sockets::
//! ```

#![allow(dead_code)]

pub mod harness;
pub mod integration;
