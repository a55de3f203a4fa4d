//! Google Drive convenience wrapper for drivekit.
//!
//! This crate provides a small set of Drive operations behind a credential
//! flow that prefers a cached token:
//! - Stored `authorized_user` token reused on every call when well-formed
//! - Browser consent with a loopback redirect when it is not
//! - Read, upload, list and create-folder calls against the Drive v3 API
//!
//! # Example
//! ```no_run
//! use drivekit_common::FileId;
//! use drivekit_drive::{DriveConfig, DriveService};
//!
//! # async fn run() -> drivekit_common::Result<()> {
//! let config = DriveConfig::new("token.json").with_credentials("client_secret.json");
//! let service = DriveService::new(config);
//! for entry in service.list_files(&FileId::root()).await? {
//!     println!("{} {}", entry.id, entry.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod client;
pub mod config;
pub mod consent;
pub mod credential;
pub mod handle;
pub mod keyfile;
pub mod manager;
pub mod mime;
pub mod service;

pub use client::{ContentStream, DriveClient, DriveEntry};
pub use config::{DriveConfig, DriveEndpoints};
pub use consent::{Authenticator, LoopbackAuthenticator, DRIVE_SCOPE};
pub use credential::{StoredCredential, TokenFile};
pub use handle::AuthorizationHandle;
pub use keyfile::ClientKeyfile;
pub use manager::CredentialManager;
pub use service::DriveService;
