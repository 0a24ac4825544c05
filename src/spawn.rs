//! Low-level fork and pipe plumbing shared by [`crate::future::Future`] and the
//! pid-only spawn helper.
//!
//! Grounded in `palaver::file::pipe` and `palaver::process::fork`, trimmed down
//! to what this crate's orchestration core actually needs: a single
//! non-atomic-where-unavoidable `pipe2`, and a plain `fork` with no FreeBSD
//! process-descriptor or orphan-reparenting machinery (those solve problems this
//! spec declares out of scope — no pooling, no cross-host distribution).

use std::os::unix::io::RawFd;

use nix::fcntl::{self, FcntlArg, OFlag};
use nix::unistd;
use nix::unistd::Pid;

/// The outcome of [`fork`]: either the parent, holding the child's pid, or the
/// child.
#[derive(Debug)]
pub enum ForkResult {
	/// The parent process, with the newly forked child's pid.
	Parent(Pid),
	/// The child process.
	Child,
}

/// Fork the current process.
///
/// # Safety
/// Shares all of `fork(2)`'s hazards: in the child, only async-signal-safe
/// operations are well-defined until an `exec` or `_exit`. Callers running
/// arbitrary Rust in the child branch (allocating, taking locks, using
/// anything that might have been mid-mutation in another thread at the moment
/// of fork) do so at their own risk, same as the original C library's
/// documented child branch.
pub fn fork() -> nix::Result<ForkResult> {
	match unsafe { unistd::fork() }? {
		unistd::ForkResult::Parent { child, .. } => Ok(ForkResult::Parent(child)),
		unistd::ForkResult::Child => Ok(ForkResult::Child),
	}
}

/// Fork and run `child` in the child branch, which must never return (it's
/// expected to end in `_exit`/`execvp`/a panic). Returns the child's pid in the
/// parent.
///
/// This is the "accept a job-description value and encapsulate fork+exec
/// entirely inside the library" option from design note §9, offered alongside
/// [`crate::future::Future::spawn`]'s "child-or-parent variant type" for the
/// pid-only iterators that don't need captured output.
pub fn spawn_pid<F>(child: F) -> nix::Result<Pid>
where
	F: FnOnce() -> !,
{
	match fork()? {
		ForkResult::Parent(pid) => Ok(pid),
		ForkResult::Child => child(),
	}
}

/// Create a pipe whose ends are close-on-exec by default (the child must
/// explicitly `dup2` the write end onto the fd it wants, which clears
/// `CLOEXEC` on the target fd).
pub fn pipe() -> nix::Result<(RawFd, RawFd)> {
	#[cfg(any(target_os = "android", target_os = "linux", target_os = "freebsd"))]
	{
		unistd::pipe2(OFlag::O_CLOEXEC)
	}
	#[cfg(not(any(target_os = "android", target_os = "linux", target_os = "freebsd")))]
	{
		let (read, write) = unistd::pipe()?;
		set_cloexec(read)?;
		set_cloexec(write)?;
		Ok((read, write))
	}
}

#[cfg(not(any(target_os = "android", target_os = "linux", target_os = "freebsd")))]
fn set_cloexec(fd: RawFd) -> nix::Result<()> {
	let flags = fcntl::FdFlag::from_bits_truncate(fcntl::fcntl(fd, FcntlArg::F_GETFD)?);
	fcntl::fcntl(fd, FcntlArg::F_SETFD(flags | fcntl::FdFlag::FD_CLOEXEC)).map(drop)
}

/// Set `O_NONBLOCK` on `fd`. Used on the parent's read-end so the drain loops
/// in [`crate::strategy`] can poll many futures without any one of them
/// blocking the others (spec §4.C: "non-blocking reads of bounded chunk
/// size").
pub fn set_nonblocking(fd: RawFd) -> nix::Result<()> {
	let flags = OFlag::from_bits_truncate(fcntl::fcntl(fd, FcntlArg::F_GETFL)?);
	fcntl::fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).map(drop)
}
