//! Result retrievers for the pid iterator (§6): pure functions from a raw wait
//! status to the `int` a [`crate::job::PidJobSource::on_complete`] callback
//! receives as `result`.

use crate::status::{RawStatus, Status};

/// `1` if the child exited with code `0`, else `0`.
pub fn retrieve_boolean(raw: RawStatus) -> i32 {
	if Status::from_raw(raw).is_ok() {
		1
	} else {
		0
	}
}

/// The child's raw exit code (the low 8 bits of its `_exit`/`exit` argument),
/// or `-1` if it didn't exit normally.
pub fn retrieve_exit_status(raw: RawStatus) -> i32 {
	match raw {
		nix::sys::wait::WaitStatus::Exited(_, code) => code,
		_ => -1,
	}
}
