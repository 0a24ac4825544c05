//! The per-child handle: pid, pipe read-end, accumulating buffer, bound decoder
//! and eventual typed result (§4.C).

use std::fmt;
use std::os::unix::io::RawFd;

use nix::errno::Errno;
use nix::poll::{self, PollFd, PollFlags};
use nix::sys::wait::{self, WaitPidFlag};
use nix::unistd;
use nix::unistd::Pid;
use thiserror::Error;

use crate::decoder::{DecodedValue, Decoder};
use crate::reaper::Reaper;
use crate::spawn;
use crate::status::Status;

/// Recommended chunk size for non-blocking reads off a future's pipe (§4.C).
const READ_CHUNK: usize = 4096;

/// A setup failure that prevented a future's child from ever being spawned.
///
/// Surfaced alongside the degraded `Future` (`pid == -1`, `status ==
/// Abnormal`) spec §4.C calls for, rather than in place of it — see
/// [`Future::setup_error`].
#[derive(Debug, Error)]
pub enum SpawnError {
	/// Pipe creation failed.
	#[error("failed to create the future's pipe: {0}")]
	Pipe(#[source] nix::Error),
	/// `fork()` failed.
	#[error("failed to fork the future's child: {0}")]
	Fork(#[source] nix::Error),
}

/// Which side of a freshly spawned future this process is.
///
/// Replaces the original C library's `future.pid == 0` discriminator (design
/// note §9, option a) with a type the compiler enforces: there's no way to
/// observe [`ChildSide`] after acting on it, because [`ChildSide::finish`]
/// diverges.
#[derive(Debug)]
pub enum FutureBranch {
	/// This process is the parent; supervise the returned [`Future`].
	Parent(Future),
	/// This process is the freshly forked child; call [`ChildSide::finish`].
	Child(ChildSide),
}

/// The child branch of a freshly spawned future, holding the pipe write-end
/// that must be wired up to stdout before exec'ing or running arbitrary code.
pub struct ChildSide {
	fd: RawFd,
}

impl fmt::Debug for ChildSide {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ChildSide").field("fd", &self.fd).finish()
	}
}

impl ChildSide {
	/// The pipe's write end, in case `job` wants it directly (e.g. to `dprintf`
	/// into it without going through fd 1).
	pub fn fd(&self) -> RawFd {
		self.fd
	}

	/// Duplicate the write end onto stdout, then hand control to `job`, which
	/// must never return (it's expected to `_exit`, `execvp`, or otherwise
	/// terminate the process). This is the Rust equivalent of every
	/// `original_source/tests/*.c` child branch's `dup2(future.fd, 1);
	/// execvp(...); _exit(1);`.
	pub fn finish(self, job: impl FnOnce(RawFd) -> !) -> ! {
		if unistd::dup2(self.fd, libc::STDOUT_FILENO).is_err() {
			std::process::exit(1);
		}
		job(self.fd)
	}
}

/// The orchestration record for one spawned child (§3 `Future`).
#[derive(Debug)]
pub struct Future {
	pid: Pid,
	fd: RawFd,
	buffer: Vec<u8>,
	decoder: Decoder,
	/// The decoded result, populated exactly once when the future settles.
	/// `Absent` until then.
	pub result: DecodedValue,
	/// The child's outcome, populated exactly once when the future settles.
	pub status: Option<Status>,
	setup_error: Option<SpawnError>,
}

impl Future {
	/// Allocate a pipe, fork, and return which branch this process is on.
	///
	/// On pipe or fork failure, returns `FutureBranch::Parent` with a future
	/// whose `pid` is `-1` and whose `status` is already `Abnormal` (§4.C
	/// "Failure modes"); inspect [`Future::setup_error`] for the cause.
	pub fn spawn(decoder: Decoder) -> FutureBranch {
		let (read, write) = match spawn::pipe() {
			Ok(pair) => pair,
			Err(e) => {
				log::warn!("procreact: pipe() failed while spawning a future: {}", e);
				return FutureBranch::Parent(Future::failed(decoder, SpawnError::Pipe(e)));
			}
		};
		match spawn::fork() {
			Ok(spawn::ForkResult::Parent(pid)) => {
				let _ = unistd::close(write);
				if let Err(e) = spawn::set_nonblocking(read) {
					log::warn!("procreact: failed to set O_NONBLOCK on future's read end: {}", e);
				}
				log::trace!("procreact: spawned future pid {}", pid);
				FutureBranch::Parent(Future {
					pid,
					fd: read,
					buffer: Vec::new(),
					decoder,
					result: DecodedValue::Absent,
					status: None,
					setup_error: None,
				})
			}
			Ok(spawn::ForkResult::Child) => {
				let _ = unistd::close(read);
				FutureBranch::Child(ChildSide { fd: write })
			}
			Err(e) => {
				let _ = unistd::close(read);
				let _ = unistd::close(write);
				log::warn!("procreact: fork() failed while spawning a future: {}", e);
				FutureBranch::Parent(Future::failed(decoder, SpawnError::Fork(e)))
			}
		}
	}

	fn failed(decoder: Decoder, error: SpawnError) -> Future {
		Future {
			pid: Pid::from_raw(-1),
			fd: -1,
			buffer: Vec::new(),
			decoder,
			result: DecodedValue::Absent,
			status: Some(Status::Abnormal(None)),
			setup_error: Some(error),
		}
	}

	/// The child's pid, or `-1` if setup failed before forking.
	pub fn pid(&self) -> Pid {
		self.pid
	}

	/// The parent's read-end fd, or `-1` if setup failed before forking.
	pub fn fd(&self) -> RawFd {
		self.fd
	}

	/// Whether this future failed during setup (pipe or fork) and was never
	/// actually spawned.
	pub fn is_failed(&self) -> bool {
		self.pid.as_raw() < 0
	}

	/// The setup failure that produced this future, if [`Future::is_failed`].
	pub fn setup_error(&self) -> Option<&SpawnError> {
		self.setup_error.as_ref()
	}

	/// Whether this future has already settled (both a status and a decoded
	/// result are available). `status` and `result` are always assigned
	/// together by [`Future::settle`], so checking `status` suffices.
	pub fn is_settled(&self) -> bool {
		self.status.is_some()
	}

	/// Read all currently-available bytes off the pipe without blocking.
	/// Returns `true` if EOF (or an unrecoverable read error) was observed.
	///
	/// Used both by [`Future::get`] and by the multiplexed drain loops in
	/// [`crate::strategy`]; reads in [`READ_CHUNK`]-sized chunks per §4.C.
	pub fn drain_available(&mut self) -> bool {
		if self.is_failed() || self.fd < 0 {
			return true;
		}
		let mut chunk = [0u8; READ_CHUNK];
		loop {
			match unistd::read(self.fd, &mut chunk) {
				Ok(0) => return true,
				Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
				Err(Errno::EWOULDBLOCK) => return false,
				Err(Errno::EINTR) => continue,
				Err(e) => {
					log::warn!("procreact: read error on future pid {}: {}", self.pid, e);
					self.status = Some(Status::Abnormal(None));
					return true;
				}
			}
		}
	}

	/// Block until the read end is readable or hung up, or `timeout_ms`
	/// elapses (`-1` blocks indefinitely). Returns `true` if the fd is ready.
	pub fn wait_readable(&self, timeout_ms: i32) -> nix::Result<bool> {
		if self.is_failed() || self.fd < 0 {
			return Ok(true);
		}
		let mut fds = [PollFd::new(self.fd, PollFlags::POLLIN)];
		let n = poll::poll(&mut fds, timeout_ms)?;
		Ok(n > 0)
	}

	/// Fold a status obtained by the caller (from the reaper, or a direct
	/// blocking wait) into this future, invoke its decoder, and close its
	/// read-end. Consumes the future, matching spec's "once settled it is
	/// immutable".
	pub fn settle(mut self, status: Status) -> (DecodedValue, Status) {
		if self.fd >= 0 {
			let _ = unistd::close(self.fd);
			self.fd = -1;
		}
		// A read error may have already forced Abnormal; that takes priority
		// over whatever status the caller observed for the exit itself, since
		// it reflects data loss the caller doesn't otherwise see.
		let status = self.status.unwrap_or(status);
		let buffer = std::mem::take(&mut self.buffer);
		let result = self.decoder.decode(buffer, status);
		self.result = result.clone();
		self.status = Some(status);
		(result, status)
	}

	/// The synchronous façade (§4.C `future_get`): block until settled by
	/// alternately reading all available bytes and, on EOF, waiting on the
	/// pid.
	///
	/// Correct even if the child writes more than the pipe's kernel buffer,
	/// because the read loop never stops draining before the wait: the child
	/// can only block in `write()` while we're inside `wait_readable`, and
	/// that's exactly when it has nothing further to hand us yet.
	pub fn get(mut self) -> (DecodedValue, Status) {
		if self.is_failed() {
			let status = self.status.unwrap_or(Status::Abnormal(None));
			return self.settle(status);
		}
		loop {
			if self.drain_available() {
				break;
			}
			if let Err(e) = self.wait_readable(-1) {
				log::warn!("procreact: poll() failed while waiting on future pid {}: {}", self.pid, e);
				self.status = Some(Status::Abnormal(None));
				break;
			}
		}
		let status = wait_blocking(self.pid);
		self.settle(status)
	}
}

impl Drop for Future {
	fn drop(&mut self) {
		if self.fd >= 0 {
			let _ = unistd::close(self.fd);
			self.fd = -1;
		}
	}
}

/// Obtain a child's status: via the reaper if one is registered and hasn't
/// overflowed, falling back to a direct blocking `waitpid` otherwise (spec
/// §4.B "unregistered mode simply uses direct per-pid blocking waits").
pub fn reap_status(pid: Pid) -> Status {
	let reaper = Reaper::global();
	if !reaper.is_registered() || reaper.has_overflowed() {
		return wait_blocking(pid);
	}
	// Both the signal handler and a direct wait race to reap the same child;
	// only one of them can succeed. If the handler wins first, a direct
	// `waitpid` here sees `ECHILD` even though the status is sitting in the
	// table — so on `ECHILD` we go back and check the table rather than
	// treating it as a real error.
	loop {
		if let Some(raw) = reaper.try_take(pid) {
			return Status::from_raw(raw);
		}
		match try_wait(pid) {
			Ok(Some(status)) => return status,
			Ok(None) => std::thread::yield_now(),
			Err(Errno::ECHILD) => std::thread::yield_now(),
			Err(e) => {
				log::warn!("procreact: waitpid failed for pid {}: {}", pid, e);
				return Status::Abnormal(None);
			}
		}
	}
}

fn wait_blocking(pid: Pid) -> Status {
	if pid.as_raw() < 0 {
		return Status::Abnormal(None);
	}
	loop {
		match wait::waitpid(pid, None) {
			Ok(raw) => return Status::from_raw(raw),
			Err(Errno::EINTR) => continue,
			Err(e) => {
				log::warn!("procreact: waitpid failed for pid {}: {}", pid, e);
				return Status::Abnormal(None);
			}
		}
	}
}

/// Non-blocking variant of [`wait_blocking`], used by the drain loops once a
/// future's pipe has hit EOF but the reaper hasn't (yet) reported its exit.
pub fn try_wait(pid: Pid) -> nix::Result<Option<Status>> {
	match wait::waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
		Ok(wait::WaitStatus::StillAlive) => Ok(None),
		Ok(raw) => Ok(Some(Status::from_raw(raw))),
		Err(Errno::EINTR) => Ok(None),
		Err(e) => Err(e),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::decoder::create_string_decoder;

	#[test]
	fn say_hello_succeeds() {
		let (result, status) = match Future::spawn(create_string_decoder()) {
			FutureBranch::Parent(future) => future.get(),
			FutureBranch::Child(child) => child.finish(|fd| {
				let _ = unistd::write(fd, b"Hello Sander van der Burg!");
				std::process::exit(0);
			}),
		};
		assert_eq!(status, Status::Ok);
		assert_eq!(result, DecodedValue::String(b"Hello Sander van der Burg!".to_vec()));
	}

	#[test]
	fn say_hello_fail_yields_absent() {
		let (result, status) = match Future::spawn(create_string_decoder()) {
			FutureBranch::Parent(future) => future.get(),
			FutureBranch::Child(child) => child.finish(|fd| {
				let _ = unistd::write(fd, b"Hello Sander van der Burg!");
				std::process::exit(1);
			}),
		};
		assert_eq!(status, Status::NonZero(1));
		assert_eq!(result, DecodedValue::Absent);
	}

	#[test]
	fn large_output_is_not_truncated() {
		const ALPHABET: &str = "abcdefghijklmnopqrstuvxyz";
		const REPEATS: usize = 100;
		let (result, status) = match Future::spawn(create_string_decoder()) {
			FutureBranch::Parent(future) => future.get(),
			FutureBranch::Child(child) => child.finish(|fd| {
				for _ in 0..REPEATS {
					let _ = unistd::write(fd, ALPHABET.as_bytes());
				}
				std::process::exit(0);
			}),
		};
		assert_eq!(status, Status::Ok);
		let expected = ALPHABET.repeat(REPEATS);
		assert_eq!(result, DecodedValue::String(expected.into_bytes()));
	}
}
