//! Domain entities and business logic
//!
//! This module contains the core domain types for DriveMirror:
//! - Newtypes for type-safe identifiers and validated values
//! - Linked Drive accounts and their OAuth credentials
//! - File records (the logical files offered for download)
//! - The closed category taxonomy and per-account folder hierarchy
//! - Domain-specific error types

pub mod account;
pub mod category;
pub mod errors;
pub mod file_record;
pub mod newtypes;

// Re-export commonly used types
pub use account::{Account, Credentials};
pub use category::{Category, FolderHierarchy};
pub use errors::DomainError;
pub use file_record::{FileRecord, NewFileRecord};
pub use newtypes::*;
