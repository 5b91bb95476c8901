//! Port definitions (trait abstractions) the worker runtime is wired with.
//!
//! Ports define what the supervision core expects from its collaborators.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No process or I/O types in any signature
//! - [`Authenticator`] is implemented by embedding applications and driven
//!   on the supervisor side of the process boundary
//! - [`DownloadEngine`] is implemented by the actual downloader and driven
//!   inside the worker process

pub mod authenticator;
pub mod engine;

pub use authenticator::Authenticator;
pub use engine::{DownloadEngine, EngineError};
