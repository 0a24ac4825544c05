//! Spec §8 scenario 6 ("Large-output"): a child whose output exceeds the
//! OS's default pipe buffer, exercising the interleaved read-then-wait loop
//! [`procreact::Future::get`] relies on for back-pressure correctness.

#![cfg(unix)]

use nix::unistd;
use rand::Rng;

use procreact::{create_string_decoder, DecodedValue, Future, FutureBranch, Status};

#[test]
fn alphabet_times_one_hundred_is_not_truncated() {
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
	assert_eq!(result, DecodedValue::String(ALPHABET.repeat(REPEATS).into_bytes()));
}

#[test]
fn one_mebibyte_of_output_is_not_truncated() {
	const SIZE: usize = 1024 * 1024;
	let (result, status) = match Future::spawn(create_string_decoder()) {
		FutureBranch::Parent(future) => future.get(),
		FutureBranch::Child(child) => child.finish(|fd| {
			let chunk = vec![b'x'; 64 * 1024];
			let mut written = 0;
			while written < SIZE {
				match unistd::write(fd, &chunk) {
					Ok(n) => written += n,
					Err(nix::errno::Errno::EINTR) => continue,
					Err(_) => std::process::exit(1),
				}
			}
			std::process::exit(0);
		}),
	};
	assert_eq!(status, Status::Ok);
	match result {
		DecodedValue::String(bytes) => assert_eq!(bytes.len(), SIZE),
		other => panic!("expected a full 1 MiB string, got {:?}", other),
	}
}

/// Buffer correctness (§8 "universal invariants"): the bytes delivered
/// through a future's decoder equal the bytes the child wrote, byte-for-byte,
/// across a handful of randomly sized payloads straddling the default Linux
/// pipe buffer (64 KiB).
#[test]
fn random_sized_payloads_round_trip_exactly() {
	let mut rng = rand::thread_rng();
	for _ in 0..5 {
		let size: usize = rng.gen_range(1..200_000);
		let payload: Vec<u8> = (0..size).map(|_| rng.gen::<u8>()).collect();
		let expected = payload.clone();
		let (result, status) = match Future::spawn(create_string_decoder()) {
			FutureBranch::Parent(future) => future.get(),
			FutureBranch::Child(child) => child.finish(move |fd| {
				let mut written = 0;
				while written < payload.len() {
					match unistd::write(fd, &payload[written..]) {
						Ok(n) => written += n,
						Err(nix::errno::Errno::EINTR) => continue,
						Err(_) => std::process::exit(1),
					}
				}
				std::process::exit(0);
			}),
		};
		assert_eq!(status, Status::Ok);
		assert_eq!(result, DecodedValue::String(expected));
	}
}
