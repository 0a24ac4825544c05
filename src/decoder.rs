//! Type decoders: pure functions from a captured byte buffer and a [`Status`] to a
//! typed [`DecodedValue`].

use std::fmt;
use std::sync::Arc;

use crate::status::Status;

/// A tagged union over the result shapes a [`crate::future::Future`] can decode its
/// captured stdout into.
///
/// Decoding happens exactly once, when a future settles (§4.C); `Absent` is the
/// observable "no value" case, produced either by an unsuccessful child or by a
/// decoder that declines to decode non-`Ok` output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedValue {
	/// Whether the child succeeded, independent of anything it wrote.
	Boolean(bool),
	/// The raw captured bytes, interpreted as an owned byte string.
	String(Vec<u8>),
	/// The captured bytes, split on a configured delimiter.
	StringArray(Vec<Vec<u8>>),
	/// Decoding failed, or the child failed before its output could be decoded.
	Absent,
}

impl DecodedValue {
	/// The `String` case as UTF-8, if this value is one and is valid UTF-8.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			DecodedValue::String(bytes) => std::str::from_utf8(bytes).ok(),
			_ => None,
		}
	}
}

type CustomDecodeFn = dyn Fn(Vec<u8>, Status) -> DecodedValue + Send + Sync;

/// A decoder bound to a [`crate::future::Future`] at construction time.
///
/// Decoders are deterministic, side-effect free, and must not block; the three
/// built-in variants satisfy this trivially, and [`Decoder::Custom`] is the
/// escape hatch design note §9 calls for ("open to extension by the user
/// providing their own closure-based decoder").
#[derive(Clone)]
pub enum Decoder {
	/// Ignores the buffer; decodes purely from [`Status`].
	Boolean,
	/// Decodes the whole buffer as an owned byte string on success.
	String,
	/// Splits the buffer on `delim` on success.
	StringArray {
		/// The single-byte delimiter to split on.
		delim: u8,
	},
	/// A user-supplied decode function.
	Custom(Arc<CustomDecodeFn>),
}

impl fmt::Debug for Decoder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Decoder::Boolean => f.write_str("Decoder::Boolean"),
			Decoder::String => f.write_str("Decoder::String"),
			Decoder::StringArray { delim } => {
				f.debug_struct("Decoder::StringArray").field("delim", delim).finish()
			}
			Decoder::Custom(_) => f.write_str("Decoder::Custom(..)"),
		}
	}
}

impl Decoder {
	/// Decode a captured buffer given the child's final [`Status`].
	///
	/// The buffer is consumed; decoders see it exactly once and are free to
	/// steal it rather than copy it.
	pub fn decode(&self, buffer: Vec<u8>, status: Status) -> DecodedValue {
		match self {
			Decoder::Boolean => DecodedValue::Boolean(status.is_ok()),
			Decoder::String => {
				if status.is_ok() {
					DecodedValue::String(buffer)
				} else {
					DecodedValue::Absent
				}
			}
			Decoder::StringArray { delim } => {
				if status.is_ok() {
					DecodedValue::StringArray(split_strip_trailing(&buffer, *delim))
				} else {
					DecodedValue::Absent
				}
			}
			Decoder::Custom(f) => f(buffer, status),
		}
	}
}

/// Split `buffer` on every occurrence of `delim`, stripping a single trailing
/// delimiter if present (a trailing delimiter does not produce a trailing empty
/// element).
fn split_strip_trailing(buffer: &[u8], delim: u8) -> Vec<Vec<u8>> {
	let buffer = if buffer.last() == Some(&delim) {
		&buffer[..buffer.len() - 1]
	} else {
		buffer
	};
	if buffer.is_empty() {
		return Vec::new();
	}
	buffer.split(|&b| b == delim).map(|chunk| chunk.to_vec()).collect()
}

/// Decoder that reports success/failure as a `Boolean`, ignoring any captured output.
pub fn create_boolean_decoder() -> Decoder {
	Decoder::Boolean
}

/// Decoder that captures stdout as an owned byte string on success.
pub fn create_string_decoder() -> Decoder {
	Decoder::String
}

/// Decoder that splits captured stdout on `delim` on success.
pub fn create_string_array_decoder(delim: u8) -> Decoder {
	Decoder::StringArray { delim }
}

/// Build a decoder from an arbitrary closure, per design note §9.
pub fn create_custom_decoder<F>(f: F) -> Decoder
where
	F: Fn(Vec<u8>, Status) -> DecodedValue + Send + Sync + 'static,
{
	Decoder::Custom(Arc::new(f))
}
