//! The tri-valued outcome of a supervised child, and the raw wait-status it's derived from.

use nix::sys::wait;
use nix::unistd::Pid;

/// Raw wait status as returned by `waitpid`/the reaper, before it's folded into [`Status`].
///
/// Kept distinct from [`Status`] because the pid-iterator result retrievers (see
/// [`crate::retriever`]) operate on the raw status, not on the already-decoded tri-value.
pub type RawStatus = wait::WaitStatus;

/// The outcome of a child process that has been fully reaped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
	/// The child exited normally with exit code `0`.
	Ok,
	/// The child exited normally with a non-zero exit code.
	NonZero(i32),
	/// The child terminated abnormally: killed by a signal, or some other
	/// condition (e.g. a failed `wait`) prevented a clean exit from being
	/// observed.
	Abnormal(Option<i32>),
}

impl Status {
	/// Fold a raw `waitpid` status into a [`Status`].
	///
	/// `WaitStatus::Exited(_, 0)` becomes `Ok`, any other exit code becomes
	/// `NonZero`, and everything else (signalled, stopped, ptrace events,
	/// `StillAlive`) becomes `Abnormal`, carrying the signal number when one
	/// is available.
	pub fn from_raw(raw: RawStatus) -> Self {
		match raw {
			wait::WaitStatus::Exited(_, 0) => Status::Ok,
			wait::WaitStatus::Exited(_, code) => Status::NonZero(code),
			wait::WaitStatus::Signaled(_, signal, _) => Status::Abnormal(Some(signal as i32)),
			_ => Status::Abnormal(None),
		}
	}

	/// `true` iff the child exited with code `0`.
	pub fn is_ok(&self) -> bool {
		matches!(self, Status::Ok)
	}

	/// The pid a raw status refers to, where one is available.
	pub fn pid_of(raw: RawStatus) -> Option<Pid> {
		raw.pid()
	}
}
