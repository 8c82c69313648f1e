//! The Vorbis packet type tag (§ 4.2.1 of the spec).

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Represents a Vorbis packet type, defined in the Vorbis I specification, § 4.2.1.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[repr(u8)]
pub enum PacketType {
	/// An audio packet, which encodes an audio frame composed of samples.
	Audio = 0,
	/// The Vorbis identification header packet, that marks a stream as Vorbis and contains
	/// some basic metadata about it.
	IdentificationHeader = 1,
	/// The Vorbis comment header packet, which contains a list of comment key-value pairs meant
	/// for tagging and stream metadata that does not affect decoding.
	CommentHeader = 3,
	/// The Vorbis setup header packet, whose data sets up the codec setup data structures used
	/// for decoding audio packets.
	SetupHeader = 5
}

impl Display for PacketType {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Self::Audio => "audio packet",
			Self::IdentificationHeader => "identification header packet",
			Self::CommentHeader => "comment header packet",
			Self::SetupHeader => "setup header packet"
		})
	}
}

/// The error type for a fallible conversion from an integer to a [`PacketType`].
#[derive(Debug)]
pub struct TryPacketTypeFromInt(u8);

impl Display for TryPacketTypeFromInt {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Error for TryPacketTypeFromInt {}

impl TryPacketTypeFromInt {
	/// Returns the integer whose conversion failed.
	pub const fn integer(&self) -> u8 {
		self.0
	}
}

impl TryFrom<u8> for PacketType {
	type Error = TryPacketTypeFromInt;

	fn try_from(value: u8) -> Result<Self, Self::Error> {
		match value {
			0 => Ok(Self::Audio),
			1 => Ok(Self::IdentificationHeader),
			3 => Ok(Self::CommentHeader),
			5 => Ok(Self::SetupHeader),
			other => Err(TryPacketTypeFromInt(other))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_known_packet_types() {
		for (value, expected) in [
			(0u8, PacketType::Audio),
			(1, PacketType::IdentificationHeader),
			(3, PacketType::CommentHeader),
			(5, PacketType::SetupHeader)
		] {
			assert_eq!(PacketType::try_from(value).unwrap(), expected);
		}
	}

	#[test]
	fn rejects_unknown_packet_types() {
		let error = PacketType::try_from(2).unwrap_err();
		assert_eq!(error.integer(), 2);
	}
}
