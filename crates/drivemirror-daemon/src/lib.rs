//! DriveMirror service
//!
//! The daemon owns the process lifecycle: it loads the configuration, sets
//! up tracing, wires the adapters into the engine [`Services`], starts the
//! token refresh sweep and serves the HTTP API until SIGINT or SIGTERM.
//!
//! The library half exposes the HTTP layer so it can be exercised without
//! binding a socket.
//!
//! [`Services`]: drivemirror_sync::Services

pub mod api;
pub mod logging;

pub use api::{router, AppState};
