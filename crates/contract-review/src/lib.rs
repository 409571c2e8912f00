//! `contract-review` - Backend of a contract review application
//!
//! Uploaded Word, PDF and text contracts are stored on disk, converted to
//! Markdown and recorded in SQLite. An HTTP API serves them back together
//! with audit rules, risk findings, payment terms and exportable reports.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod locate;
pub mod logging;
pub mod model;
pub mod server;
pub mod storage;
pub mod transfer;
pub mod upload;

pub use config::Config;
pub use convert::{DocumentConverter, DocumentKind, RemoteConverter, TextOnlyConverter};
pub use error::{Error, Result};
pub use locate::{MatchKind, TextLocator, TextMatch};
pub use logging::init_logging;
pub use server::{build_router, serve, AppState};
pub use storage::{Storage, StorageStats};
pub use upload::{StoredFile, UploadStore};
