//! The signal-safe reaper: an optional SIGCHLD handler plus a lock-free table of
//! reaped `{pid → raw exit status}` pairs, so the supervision loops in
//! [`crate::strategy`] don't have to block on a specific pid to learn that it
//! exited.
//!
//! Registration is idempotent and optional (design note §9's open question is
//! resolved here: strategies never auto-register, callers must opt in via
//! [`register_signal_handler`]); every strategy works correctly whether or not a
//! reaper is registered, falling back to direct blocking `waitpid` calls when it
//! isn't, or when the ring has overflowed.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use lazy_static::lazy_static;
use nix::sys::signal::{self, SigAction, SigHandler, SaFlags, SigSet, Signal};
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

/// Recommended minimum ring capacity from spec §4.B.
const CHILD_SLOTS: usize = 1024;

const UNOCCUPIED: i32 = 0;
const OCCUPIED: i32 = 1;

struct Slot {
	/// 0 = free, 1 = holds a reaped (pid, status) pair.
	state: AtomicI32,
	pid: AtomicI32,
	raw_status: AtomicI32,
}

impl Slot {
	const fn new() -> Self {
		Slot { state: AtomicI32::new(UNOCCUPIED), pid: AtomicI32::new(0), raw_status: AtomicI32::new(0) }
	}
}

/// The process-wide reaped-children table.
///
/// A single instance is installed behind [`lazy_static`], mirroring the
/// teacher's "process-wide state with init-once lifecycle" pattern for
/// singletons it must coordinate across a signal handler and mainline code.
pub struct Reaper {
	slots: [Slot; CHILD_SLOTS],
	overflowed: AtomicBool,
	registered: AtomicBool,
}

lazy_static! {
	static ref REAPER: Reaper = Reaper::new();
}

impl fmt::Debug for Reaper {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Reaper")
			.field("slots", &CHILD_SLOTS)
			.field("overflowed", &self.overflowed.load(Ordering::SeqCst))
			.field("registered", &self.registered.load(Ordering::SeqCst))
			.finish()
	}
}

impl Reaper {
	fn new() -> Self {
		Reaper {
			slots: std::array::from_fn(|_| Slot::new()),
			overflowed: AtomicBool::new(false),
			registered: AtomicBool::new(false),
		}
	}

	/// The process-wide reaper instance.
	pub fn global() -> &'static Reaper {
		&REAPER
	}

	/// Install the SIGCHLD handler. Idempotent: calling this more than once is
	/// harmless (the second `sigaction` call simply reinstalls the same
	/// handler).
	///
	/// # Errors
	/// Returns the underlying `sigaction(2)` error if installation fails.
	pub fn register(&'static self) -> nix::Result<()> {
		let action = SigAction::new(
			SigHandler::Handler(handle_sigchld),
			SaFlags::SA_RESTART,
			SigSet::empty(),
		);
		unsafe { signal::sigaction(Signal::SIGCHLD, &action) }?;
		self.registered.store(true, Ordering::SeqCst);
		Ok(())
	}

	/// Whether [`Reaper::register`] has been called successfully.
	pub fn is_registered(&self) -> bool {
		self.registered.load(Ordering::SeqCst)
	}

	/// Whether the ring has dropped a reaped status because it was full.
	///
	/// Once set this is sticky: callers that observe it should fall back to
	/// direct blocking waits for the remainder of the run, per spec §4.B.
	pub fn has_overflowed(&self) -> bool {
		self.overflowed.load(Ordering::SeqCst)
	}

	/// Atomically remove and return the recorded status for `pid`, or `None` if
	/// nothing has been reaped for it yet.
	pub fn try_take(&self, pid: Pid) -> Option<WaitStatus> {
		let target = pid.as_raw();
		for slot in &self.slots {
			if slot.state.load(Ordering::SeqCst) != OCCUPIED {
				continue;
			}
			if slot.pid.load(Ordering::SeqCst) != target {
				continue;
			}
			// Re-check occupancy under a CAS so a concurrent signal delivery
			// reusing this slot after we read it can't race us.
			if slot
				.state
				.compare_exchange(OCCUPIED, UNOCCUPIED, Ordering::SeqCst, Ordering::SeqCst)
				.is_ok()
			{
				let raw_status = slot.raw_status.load(Ordering::SeqCst);
				return WaitStatus::from_raw(pid, raw_status).ok();
			}
		}
		None
	}

	/// Record a reaped `(pid, raw_status)` pair into the first free slot, or set
	/// the overflow flag if the ring is full.
	///
	/// Called only from [`handle_sigchld`]; safe to call from signal context
	/// because it performs no allocation and no blocking locks.
	fn record(&self, pid: i32, raw_status: i32) {
		for slot in &self.slots {
			if slot
				.state
				.compare_exchange(UNOCCUPIED, OCCUPIED, Ordering::SeqCst, Ordering::SeqCst)
				.is_ok()
			{
				slot.pid.store(pid, Ordering::SeqCst);
				slot.raw_status.store(raw_status, Ordering::SeqCst);
				return;
			}
		}
		self.overflowed.store(true, Ordering::SeqCst);
	}
}

/// Install the process-wide SIGCHLD handler.
///
/// Must be called explicitly by the caller; no strategy in [`crate::strategy`]
/// calls this automatically (design note §9's open question is resolved in
/// favour of preserving the original's opt-in contract).
pub fn register_signal_handler() -> nix::Result<()> {
	Reaper::global().register()
}

/// Async-signal-safe SIGCHLD handler: repeatedly reaps with a non-blocking
/// wait-any until no more zombies remain, recording each `(pid, raw status)`
/// into the preallocated ring.
///
/// This calls `libc::waitpid` directly rather than `nix::sys::wait::waitpid`,
/// because we need the raw status word to store atomically; decoding it into
/// `nix::sys::wait::WaitStatus` happens later, outside signal context, in
/// [`Reaper::try_take`].
extern "C" fn handle_sigchld(_signum: libc::c_int) {
	loop {
		let mut raw_status: libc::c_int = 0;
		let pid = unsafe { libc::waitpid(-1, &mut raw_status, libc::WNOHANG) };
		if pid <= 0 {
			break;
		}
		Reaper::global().record(pid, raw_status);
	}
}
