//! DriveMirror Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Account`, `FileRecord`, `Category`, `FolderHierarchy`
//! - **Port definitions** - Traits for adapters: `IRemoteStorage`, `ITokenProvider`,
//!   `IStateRepository`
//! - **Credential cipher** - At-rest encryption of OAuth credentials
//! - **Configuration** - Typed YAML configuration with validation
//!
//! # Architecture
//!
//! The domain module contains pure business rules with no I/O.
//! Ports define trait interfaces that adapter crates (`drivemirror-drive`,
//! `drivemirror-cache`) implement, and the engine crate (`drivemirror-sync`)
//! orchestrates domain entities exclusively through those ports.

pub mod config;
pub mod credentials;
pub mod domain;
pub mod ports;
