//! Execution strategies (§4.E): spawn-and-reap loops built over
//! [`crate::job::PidIterator`]/[`crate::job::FutureIterator`].
//!
//! The three parallel strategies (unlimited, bounded-N, sequential) share one
//! engine parameterised by the concurrency cap, matching the original's
//! `procreact_fork_and_wait_in_parallel_limit` / `..._unlimited` split being a
//! difference of one argument, not of algorithm.

use std::time::Duration;

use nix::errno::Errno;
use nix::sys::wait::{self, WaitStatus};
use nix::unistd::Pid;

use crate::job::{FutureIterator, FutureJobSource, PidIterator, PidJobSource};
use crate::reaper::Reaper;
use crate::status::Status;

/// Poll timeout recommended by §4.E, so a missed/coalesced signal delivery
/// can't wedge a drain loop forever.
const DRAIN_TIMEOUT_MS: i32 = 1000;

/// Interval between reaper-table polls when draining a pid iterator with no
/// pipes to multiplex on.
const REAPER_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Single step: if the source has another job, spawn it and return `true`;
/// otherwise return `false`. Pid-iterator only — callers who want to
/// batch-spawn then manually drive completion use this directly instead of a
/// full strategy.
pub fn spawn_next<S: PidJobSource>(iter: &mut PidIterator<S>) -> bool {
	if iter.has_next() {
		let _ = iter.spawn_next();
		true
	} else {
		false
	}
}

/// Spawn every job from the source back-to-back, then drain until all have
/// settled. No concurrency cap.
pub fn parallel_unlimited_pids<S: PidJobSource>(iter: &mut PidIterator<S>) {
	parallel_bounded_pids(iter, usize::MAX)
}

/// Spawn every job from the source back-to-back, then drain until all have
/// settled, buffering each future's stdout as it goes. No concurrency cap.
pub fn parallel_unlimited_futures<S: FutureJobSource>(iter: &mut FutureIterator<S>) {
	parallel_bounded_futures(iter, usize::MAX)
}

/// Maintain at most `limit` outstanding children at once, pulling the next job
/// from the source as soon as one completes.
pub fn parallel_bounded_pids<S: PidJobSource>(iter: &mut PidIterator<S>, limit: usize) {
	log::debug!("procreact: pid strategy starting, limit={}", limit);
	while iter.running_count() < limit && spawn_next(iter) {}
	while iter.running_count() > 0 || iter.has_next() {
		if iter.running_count() < limit {
			if spawn_next(iter) {
				continue;
			}
		}
		if let Some((pid, raw)) = reap_any_tracked(&iter.running) {
			iter.deliver(pid, raw);
			// Keep the cap full: pull in the next job now that a slot freed up.
			if iter.running_count() < limit {
				let _ = spawn_next(iter);
			}
		}
	}
	log::debug!("procreact: pid strategy finished");
}

/// Maintain at most `limit` outstanding futures at once, draining their pipes
/// and pulling the next job from the source as soon as one settles.
pub fn parallel_bounded_futures<S: FutureJobSource>(iter: &mut FutureIterator<S>, limit: usize) {
	log::debug!("procreact: future strategy starting, limit={}", limit);
	while iter.running_count() < limit && iter.has_next() {
		iter.spawn_next();
	}
	while iter.running_count() > 0 || iter.has_next() {
		if iter.running_count() < limit && iter.has_next() {
			iter.spawn_next();
			continue;
		}
		drain_one_future(iter);
	}
	log::debug!("procreact: future strategy finished");
}

/// Sequential execution: equivalent to [`parallel_bounded_pids`] with
/// `limit == 1`, which by construction delivers completions in strict spawn
/// order (§4.E "Ordering guarantees").
pub fn sequential_pids<S: PidJobSource>(iter: &mut PidIterator<S>) {
	parallel_bounded_pids(iter, 1)
}

/// Sequential execution over futures: equivalent to
/// [`parallel_bounded_futures`] with `limit == 1`.
pub fn sequential_futures<S: FutureJobSource>(iter: &mut FutureIterator<S>) {
	parallel_bounded_futures(iter, 1)
}

/// Wait for any one of the pids in `running` to become reapable, returning its
/// pid and raw status. Prefers the reaper table (polled on a short interval)
/// when one is registered and hasn't overflowed, per §4.B; otherwise blocks
/// directly on `waitpid(-1, ...)`, which is safe here because pid-iterator
/// jobs have no pipe to create back-pressure against.
fn reap_any_tracked(running: &std::collections::HashMap<i32, Pid>) -> Option<(Pid, WaitStatus)> {
	if running.is_empty() {
		return None;
	}
	let reaper = Reaper::global();
	if reaper.is_registered() && !reaper.has_overflowed() {
		loop {
			for &pid_raw in running.keys() {
				if let Some(raw) = reaper.try_take(Pid::from_raw(pid_raw)) {
					return Some((Pid::from_raw(pid_raw), raw));
				}
			}
			std::thread::sleep(REAPER_POLL_INTERVAL);
		}
	}
	loop {
		match wait::waitpid(Pid::from_raw(-1), None) {
			Ok(raw) => {
				if let Some(pid) = raw.pid() {
					if running.contains_key(&pid.as_raw()) {
						return Some((pid, raw));
					}
					// Some other child of this process, not ours; keep waiting.
					continue;
				}
				continue;
			}
			Err(Errno::EINTR) => continue,
			Err(_e) => return None,
		}
	}
}

/// One iteration of the future-iterator drain loop (§4.E "drain loop"):
/// builds the multiplex set of all live futures' read-ends, waits for
/// readiness with [`DRAIN_TIMEOUT_MS`], drains every ready descriptor, and
/// settles any future that hit EOF.
fn drain_one_future<S: FutureJobSource>(iter: &mut FutureIterator<S>) {
	if iter.running.is_empty() {
		return;
	}
	let mut pollfds: Vec<nix::poll::PollFd> = iter
		.running
		.values()
		.map(|f| nix::poll::PollFd::new(f.fd(), nix::poll::PollFlags::POLLIN))
		.collect();
	let ready = match nix::poll::poll(&mut pollfds, DRAIN_TIMEOUT_MS) {
		Ok(n) => n,
		Err(Errno::EINTR) => return,
		Err(e) => {
			log::warn!("procreact: poll() failed in drain loop: {}", e);
			0
		}
	};
	let mut eofed = Vec::new();
	if ready > 0 {
		let pids: Vec<i32> = iter.running.keys().copied().collect();
		for (pid_raw, pollfd) in pids.into_iter().zip(pollfds.iter()) {
			let revents = pollfd.revents().unwrap_or_else(nix::poll::PollFlags::empty);
			if revents.is_empty() {
				continue;
			}
			if let Some(future) = iter.running.get_mut(&pid_raw) {
				if future.drain_available() {
					eofed.push(pid_raw);
				}
			}
		}
	}
	for pid_raw in eofed {
		settle_eofed(iter, pid_raw);
	}
}

/// A future's pipe has hit EOF; obtain its exit status (reaper if available,
/// else a direct wait — non-blocking first, falling back to a blocking wait
/// since the child closing its pipe and exiting are not atomic, but the
/// latter should follow almost immediately) and deliver it.
fn settle_eofed<S: FutureJobSource>(iter: &mut FutureIterator<S>, pid_raw: i32) {
	let pid = Pid::from_raw(pid_raw);
	let reaper = Reaper::global();
	let status = if reaper.is_registered() && !reaper.has_overflowed() {
		crate::future::reap_status(pid)
	} else {
		match crate::future::try_wait(pid) {
			Ok(Some(status)) => status,
			Ok(None) => blocking_wait(pid),
			Err(_e) => blocking_wait(pid),
		}
	};
	iter.settle(pid_raw, status);
}

fn blocking_wait(pid: Pid) -> Status {
	loop {
		match wait::waitpid(pid, None) {
			Ok(raw) => return Status::from_raw(raw),
			Err(Errno::EINTR) => continue,
			Err(_e) => return Status::Abnormal(None),
		}
	}
}
