//! Concurrent child-process orchestration.
//!
//! **procreact** lets a parent program fork many children, capture their
//! exit status and/or their stdout through an anonymous pipe, and compose
//! those results into higher-level synchronous or asynchronous values,
//! without deadlocking against pipe back-pressure.
//!
//! It's a Rust reimagining of the fork/wait/pipe core of libprocreact —
//! design note §9's recommendation replaces that library's four
//! function-pointer callbacks plus `void*` with the [`PidJobSource`] /
//! [`FutureJobSource`] traits, and its `pid == 0` discriminator with
//! [`FutureBranch`].
//!
//! ```no_run
//! use procreact::{create_string_decoder, Future, FutureBranch};
//! use nix::unistd;
//!
//! let (result, status) = match Future::spawn(create_string_decoder()) {
//!     FutureBranch::Parent(future) => future.get(),
//!     FutureBranch::Child(child) => child.finish(|fd| {
//!         let _ = unistd::write(fd, b"Hello Sander van der Burg!");
//!         std::process::exit(0);
//!     }),
//! };
//! assert!(status.is_ok());
//! ```
//!
//! Out of scope by design (§1 Non-goals): cross-host distribution,
//! cancellation mid-run, stdin injection into children, capturing child
//! stderr, and pooling reusable worker processes. Every job forks a fresh
//! child and runs it to completion.

#![cfg(unix)]
#![warn(missing_debug_implementations, unused_import_braces, unused_qualifications)]

pub mod decoder;
pub mod future;
pub mod job;
pub mod reaper;
pub mod retriever;
pub mod spawn;
pub mod status;
pub mod strategy;

pub use decoder::{
	create_boolean_decoder, create_custom_decoder, create_string_array_decoder,
	create_string_decoder, DecodedValue, Decoder,
};
pub use future::{ChildSide, Future, FutureBranch, SpawnError};
pub use job::{FutureIterator, FutureJobSource, PidIterator, PidJobSource};
pub use reaper::{register_signal_handler, Reaper};
pub use retriever::{retrieve_boolean, retrieve_exit_status};
pub use spawn::{fork, spawn_pid, ForkResult};
pub use status::{RawStatus, Status};
pub use strategy::{
	parallel_bounded_futures, parallel_bounded_pids, parallel_unlimited_futures,
	parallel_unlimited_pids, sequential_futures, sequential_pids, spawn_next,
};
