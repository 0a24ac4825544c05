//! Spec §8 scenario 5 ("Collect-parallel(5) under bounded(1)") and its
//! higher-concurrency variants: a future iterator whose children each print a
//! count, collected through bounded and sequential strategies, plus the
//! descriptor-conservation invariant that rides along with any future-based
//! run.

#![cfg(unix)]

use nix::unistd;
use nix::unistd::Pid;

use procreact::{
	create_string_decoder, parallel_bounded_futures, sequential_futures, DecodedValue, Future,
	FutureBranch, FutureIterator, FutureJobSource, Status,
};

fn open_fd_count() -> usize {
	std::fs::read_dir("/proc/self/fd").map(|d| d.count()).unwrap_or(0)
}

struct Counts {
	index: u32,
	amount: u32,
	results: Vec<String>,
	all_ok: bool,
}
impl FutureJobSource for Counts {
	fn has_next(&mut self) -> bool {
		self.index < self.amount
	}
	fn next_future(&mut self) -> Future {
		self.index += 1;
		let n = self.index;
		match Future::spawn(create_string_decoder()) {
			FutureBranch::Parent(future) => future,
			FutureBranch::Child(child) => child.finish(move |fd| {
				let s = n.to_string();
				let _ = unistd::write(fd, s.as_bytes());
				std::process::exit(0);
			}),
		}
	}
	fn on_complete(&mut self, _pid: Pid, result: DecodedValue, status: Status) {
		if status == Status::Ok {
			if let DecodedValue::String(bytes) = result {
				self.results.push(String::from_utf8(bytes).unwrap());
				return;
			}
		}
		self.all_ok = false;
	}
}

#[test]
fn collect_parallel_bounded_one_preserves_spawn_order() {
	let source = Counts { index: 0, amount: 5, results: Vec::new(), all_ok: true };
	let mut iter = FutureIterator::new(source);
	sequential_futures(&mut iter);
	let source = iter.into_source();
	assert!(source.all_ok);
	assert_eq!(source.results, vec!["1", "2", "3", "4", "5"]);
}

#[test]
fn collect_parallel_bounded_three_delivers_all_five_unordered() {
	let source = Counts { index: 0, amount: 5, results: Vec::new(), all_ok: true };
	let mut iter = FutureIterator::new(source);
	parallel_bounded_futures(&mut iter, 3);
	let mut source = iter.into_source();
	assert!(source.all_ok);
	source.results.sort();
	assert_eq!(source.results, vec!["1", "2", "3", "4", "5"]);
}

#[test]
fn descriptor_conservation_across_a_bounded_run() {
	let before = open_fd_count();
	let source = Counts { index: 0, amount: 8, results: Vec::new(), all_ok: true };
	let mut iter = FutureIterator::new(source);
	parallel_bounded_futures(&mut iter, 3);
	let source = iter.into_source();
	assert!(source.all_ok);
	let after = open_fd_count();
	assert_eq!(before, after, "every future's pipe read-end must be closed on settle");
}
