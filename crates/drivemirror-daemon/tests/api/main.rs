//! HTTP API tests
//!
//! Requests go through the real router with `tower::ServiceExt::oneshot`;
//! Drive and OAuth are in-memory fakes.


mod test_accounts;
mod test_sync;
