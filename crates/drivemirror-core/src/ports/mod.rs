//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the engine depends on,
//! but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteStorage`] - Per-account file operations (Google Drive)
//! - [`ITokenProvider`] - OAuth code exchange, refresh, validation, revocation
//! - [`IStateRepository`] - Persistent storage for accounts and file records

pub mod remote_storage;
pub mod state_repository;
pub mod token_provider;

pub use remote_storage::{
    ByteStream, IRemoteStorage, RemoteDownload, RemoteError, RemoteObject, UploadBody,
    UploadedObject, FOLDER_MIME_TYPE,
};
pub use state_repository::{IStateRepository, RecordFilter};
pub use token_provider::{ITokenProvider, TokenError, Tokens, UserInfo};
