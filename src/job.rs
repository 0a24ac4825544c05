//! The `JobSource` capability traits and the two iterator drivers built over
//! them (§4.D).
//!
//! Design note §9 replaces the original C library's four function pointers
//! plus `void*` with a small trait per iterator kind, carrying the caller's
//! state by ownership rather than through an opaque pointer.

use std::collections::HashMap;

use nix::unistd::Pid;

use crate::decoder::DecodedValue;
use crate::future::Future;
use crate::status::{RawStatus, Status};

/// A generator of bare-pid jobs plus a sink for their completions.
///
/// `next_pid` is expected to `fork()` (directly, or via
/// [`crate::spawn::spawn_pid`]) and return the child's pid; the library never
/// forks on this trait's behalf, since a pid-iterator job has no pipe for the
/// library to wire up.
pub trait PidJobSource {
	/// Are there more jobs to spawn?
	fn has_next(&mut self) -> bool;
	/// Spawn the next job, returning its pid.
	fn next_pid(&mut self) -> Pid;
	/// Deliver a settled job: its pid, its tri-valued [`Status`], and the
	/// `int` produced by the iterator's bound result retriever (see
	/// [`crate::retriever`]) from the raw wait status.
	fn on_complete(&mut self, pid: Pid, status: Status, result: i32);
}

/// A generator of [`Future`] jobs plus a sink for their completions.
pub trait FutureJobSource {
	/// Are there more jobs to spawn?
	fn has_next(&mut self) -> bool;
	/// Spawn the next job, returning its [`Future`] (parent side only — job
	/// sources run entirely in the parent process; the child branch is
	/// handled inside whatever constructs the future, via
	/// [`crate::future::FutureBranch`]).
	fn next_future(&mut self) -> Future;
	/// Deliver a settled job: its pid (`-1` if it never got further than a
	/// setup failure), its decoded result, and its [`Status`].
	fn on_complete(&mut self, pid: Pid, result: DecodedValue, status: Status);
}

/// Driver over a [`PidJobSource`]: eagerly spawns jobs up to whatever cap a
/// strategy in [`crate::strategy`] enforces, and tracks which pids are still
/// outstanding.
#[derive(Debug)]
pub struct PidIterator<S: PidJobSource> {
	pub(crate) source: S,
	pub(crate) retriever: fn(RawStatus) -> i32,
	pub(crate) running: HashMap<i32, Pid>,
}

impl<S: PidJobSource> PidIterator<S> {
	/// Construct an iterator over `source`, using `retriever` to turn each
	/// child's raw wait status into the `result` passed to `on_complete`.
	pub fn new(source: S, retriever: fn(RawStatus) -> i32) -> Self {
		PidIterator { source, retriever, running: HashMap::new() }
	}

	/// Are there more jobs the source hasn't produced yet?
	pub fn has_next(&mut self) -> bool {
		self.source.has_next()
	}

	/// How many spawned jobs haven't been delivered to `on_complete` yet.
	pub fn running_count(&self) -> usize {
		self.running.len()
	}

	/// Spawn the next job and track it as outstanding.
	pub fn spawn_next(&mut self) -> Pid {
		let pid = self.source.next_pid();
		self.running.insert(pid.as_raw(), pid);
		pid
	}

	/// Deliver a reaped status for `pid` to the source, removing it from the
	/// outstanding set. No-op if `pid` isn't outstanding (e.g. a stray
	/// `SIGCHLD` for an untracked process).
	pub fn deliver(&mut self, pid: Pid, raw: RawStatus) {
		if self.running.remove(&pid.as_raw()).is_none() {
			return;
		}
		let status = Status::from_raw(raw);
		let result = (self.retriever)(raw);
		self.source.on_complete(pid, status, result);
	}

	/// Consume the iterator, returning the wrapped source.
	pub fn into_source(self) -> S {
		self.source
	}
}

/// Driver over a [`FutureJobSource`]: owns the `running_set` of live
/// [`Future`]s, keyed by raw pid, so strategies can build a poll set out of
/// them.
#[derive(Debug)]
pub struct FutureIterator<S: FutureJobSource> {
	pub(crate) source: S,
	pub(crate) running: HashMap<i32, Future>,
}

impl<S: FutureJobSource> FutureIterator<S> {
	/// Construct an iterator over `source`.
	pub fn new(source: S) -> Self {
		FutureIterator { source, running: HashMap::new() }
	}

	/// Are there more jobs the source hasn't produced yet?
	pub fn has_next(&mut self) -> bool {
		self.source.has_next()
	}

	/// How many spawned futures haven't settled yet.
	pub fn running_count(&self) -> usize {
		self.running.len()
	}

	/// Spawn the next future. If it failed during setup (§4.C), it's settled
	/// and delivered immediately since there's no pid to track or pipe to
	/// drain; otherwise it's recorded as outstanding and its pid returned.
	pub fn spawn_next(&mut self) -> Option<Pid> {
		let future = self.source.next_future();
		if future.is_failed() {
			let (result, status) = future.get();
			self.source.on_complete(Pid::from_raw(-1), result, status);
			None
		} else {
			let pid = future.pid();
			self.running.insert(pid.as_raw(), future);
			Some(pid)
		}
	}

	/// Settle the outstanding future for `pid` with `status` and deliver it.
	/// No-op if `pid` isn't outstanding.
	pub fn settle(&mut self, pid_raw: i32, status: Status) {
		if let Some(future) = self.running.remove(&pid_raw) {
			let (result, status) = future.settle(status);
			self.source.on_complete(Pid::from_raw(pid_raw), result, status);
		}
	}

	/// Consume the iterator, returning the wrapped source.
	pub fn into_source(self) -> S {
		self.source
	}
}
