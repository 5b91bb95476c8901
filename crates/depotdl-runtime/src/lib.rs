//! Out-of-process worker supervision for depotdl.
//!
//! A download runs in its own worker process so that crashes, hangs, and
//! global state stay contained. This crate owns both sides of that boundary:
//!
//! - supervisor side: [`WorkerRunner`] spawns the worker, streams its
//!   output, relays interactive authentication through the control channel,
//!   and maps the exit code to a [`depotdl_core::WorkerError`];
//! - worker side: [`run_if_worker`] turns the current process into a worker
//!   when it was spawned with the sentinel argument, driving a
//!   [`depotdl_core::DownloadEngine`] against the decoded request.
//!
//! The two consumption shapes, callback-driven
//! ([`WorkerRunner::download_app`]) and stream-driven
//! ([`WorkerRunner::download_app_stream`]), share one session
//! implementation, so classification, bridging, and error mapping are
//! identical in both.

#![deny(unsafe_code)]

mod bridge;
mod command;
mod runner;
mod session;
mod shutdown;
mod watchdog;
pub mod worker;

pub use command::{WORKER_SENTINEL, WorkerCommand};
pub use runner::{LineHandler, RunOptions, WorkerRunner};
pub use shutdown::terminate;
pub use worker::{is_worker_invocation, run_if_worker};
