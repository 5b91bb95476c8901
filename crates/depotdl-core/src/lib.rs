//! Domain types, wire protocol, and port definitions for depotdl.
//!
//! depotdl runs download workloads in an isolated worker process and talks to
//! it over an in-band control channel. This crate holds everything both sides
//! of that boundary agree on: the request types that cross it, the control
//! message codec, the value marshaller, the exit-code error taxonomy, and the
//! ports (`Authenticator`, `DownloadEngine`) the runtime crate wires up.
//!
//! No I/O happens here. Process supervision lives in `depotdl-runtime`.

#![deny(unused_crate_dependencies)]

pub mod error;
pub mod marshal;
pub mod output;
pub mod ports;
pub mod protocol;
pub mod request;

// Re-export commonly used types for convenience
pub use error::{WorkerError, exit_code};
pub use marshal::{MarshalError, from_wire, to_wire};
pub use output::{OutputLine, StreamOrigin};
pub use ports::{Authenticator, DownloadEngine, EngineError};
pub use protocol::{ControlMessage, DELIMITER, DecodeError, EncodeError, MAGIC_MARKER, try_decode};
pub use request::{
    AppDownloadRequest, BuildIdRequest, DEFAULT_BRANCH, DEFAULT_MAX_DOWNLOADS, DownloadSettings,
    PublishedFileRequest, UgcDownloadRequest, WorkerRequest,
};
