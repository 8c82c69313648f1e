//! The decoder's error taxonomy.
//!
//! Errors are split along the severity lines drawn by the specification: [`SetupError`]
//! is fatal and aborts [`open`](crate::Decoder::open); [`FrameError`] is recoverable and
//! only discards the current audio frame; [`DecoderError`] is the union type returned by
//! the public API, which also carries the I/O and seek failure cases.

use std::io;
use std::num::TryFromIntError;

use thiserror::Error;

use crate::packet::PacketType;

/// Errors that can occur while parsing the three Vorbis header packets. All of these are
/// fatal: a handle that fails to open cannot be recovered, matching § 7.1 of the spec.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SetupError {
	/// A Vorbis packet header does not carry the expected packet type tag.
	#[error("unexpected Vorbis packet type: got {actual:?}, expected {expected:?}")]
	UnexpectedPacketType {
		/// The packet type the caller expected to find.
		expected: PacketType,
		/// The packet type actually found.
		actual: PacketType
	},
	/// A Vorbis packet is too small to hold the fields it is required to have.
	#[error("too small Vorbis packet of {0} bytes")]
	TooSmallPacket(usize),
	/// A fixed pattern (signature, sync or framing bit) did not match its expected value.
	#[error("invalid Vorbis packet signature, sync pattern, or framing bit")]
	InvalidPattern,
	/// The stream declares an unsupported version of the Vorbis codec.
	#[error("unsupported Vorbis codec version {0}")]
	UnsupportedVersion(u32),
	/// The channel count in the identification header is zero.
	#[error("invalid channel count: {0}")]
	InvalidChannelCount(u8),
	/// The sample rate in the identification header is zero.
	#[error("invalid sample rate: {0}")]
	InvalidSampleRate(u32),
	/// The blocksize pair in the identification header is out of range or unordered.
	#[error("invalid blocksizes: {0}, {1}")]
	InvalidBlocksizes(u16, u16),
	/// A value read while decoding the setup header does not fit on this platform.
	#[error("value too large for this platform: {0}")]
	TooBigInteger(#[from] TryFromIntError),
	/// An ordered codebook's codeword length ran past the admissible 32-bit width without
	/// exhausting its entries, which would otherwise loop forever accumulating length.
	#[error("a codeword length exceeded the 32-bit limit")]
	TooBigCodewordLength,
	/// An ordered codebook declared more entries at some length than remained to assign.
	#[error("ordered codebook {0} declares more codewords than it has entries")]
	TooManyCodewordsAtLength(u16),
	/// A codebook's entry count times its dimension count, needed to size its
	/// vector-quantization lookup table, overflows what this platform can address.
	#[error("codebook {0} vector lookup table would need more entries than addressable")]
	TooManyLookupValues(u16),
	/// The codeword lengths of a codebook describe an invalid (over- or under-specified)
	/// Huffman tree, outside of the single 1-bit degenerate case the spec carves out.
	#[error("codebook {codebook_number} has invalid codeword lengths: {reason}")]
	InvalidCodebookCodewords {
		/// The codebook that failed to build.
		codebook_number: u16,
		/// Human-readable explanation.
		reason: &'static str
	},
	/// A codebook lookup type field held a reserved value.
	#[error("reserved codebook vector lookup type: {0}")]
	ReservedLookupType(u8),
	/// An unsupported floor type was declared (only 0 and 1 exist).
	#[error("unsupported floor type: {0}")]
	UnsupportedFloorType(u16),
	/// An unsupported residue type was declared (only 0, 1 and 2 exist).
	#[error("unsupported residue type: {0}")]
	UnsupportedResidueType(u16),
	/// A mode declared a non-zero window or transform type, both reserved for future use.
	#[error("unsupported window or transform type: {0}")]
	UnsupportedWindowOrTransformType(u32),
	/// A floor, residue, mapping, or mode referenced a codebook that does not exist.
	#[error("referenced invalid codebook number: {0}")]
	InvalidCodebookNumber(u16),
	/// A Floor 1 configuration listed more than the 65 points the spec allows.
	#[error("floor {0} has more than 65 X points")]
	TooManyFloor1Points(u8),
	/// A Floor 1 configuration repeats an X coordinate, which the spec forbids.
	#[error("floor {0} has repeated X points")]
	RepeatedFloor1Point(u8),
	/// A residue configuration referenced a classbook with too few entries to cover
	/// every classification symbol.
	#[error("residue {residue} classbook {classbook} has too few entries for {classifications} classifications")]
	ClassbookTooSmall {
		/// The residue configuration index.
		residue: u16,
		/// The classbook index.
		classbook: u8,
		/// The number of classifications the residue declares.
		classifications: u8
	},
	/// A channel mapping's magnitude/angle pair is degenerate or out of range.
	#[error(
		"invalid channel mapping: magnitude channel {magnitude}, angle channel {angle}, {channels} channel(s) total"
	)]
	InvalidChannelMapping {
		/// The magnitude channel index.
		magnitude: u8,
		/// The angle channel index.
		angle: u8,
		/// The total channel count of the stream.
		channels: u8
	},
	/// A mapping's channel-to-submap multiplexing table references an undefined submap.
	#[error("invalid channel multiplexing submap {submap} ({submap_count} submap(s) defined)")]
	InvalidChannelMultiplexing {
		/// The submap index referenced.
		submap: u8,
		/// The number of defined submaps.
		submap_count: u8
	},
	/// A mapping type field held a reserved value (only type 0 is defined).
	#[error("reserved mapping type: {0}")]
	ReservedMappingType(u16),
	/// A mapping referenced an undefined floor number.
	#[error("referenced invalid floor number: {0}")]
	InvalidFloorNumber(u8),
	/// A mapping referenced an undefined residue number.
	#[error("referenced invalid residue number: {0}")]
	InvalidResidueNumber(u8),
	/// A mode referenced an undefined mapping number.
	#[error("referenced invalid mapping number: {0}")]
	InvalidMappingNumber(u8),
	/// An I/O error occurred while reading header packets from the byte source.
	#[error("I/O error while reading setup data: {0}")]
	Io(#[from] io::Error),
	/// The Ogg container framing around the header packets is malformed.
	#[error("Ogg framing error while locating header packets: {0}")]
	Framing(#[from] crate::ogg::OggError)
}

/// Errors that can occur while decoding a single audio frame. Per § 7.2, these are
/// recoverable: the caller discards the frame's output and the decoder keeps going.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameError {
	/// The bit reader reached the end of the packet before a field could be read.
	#[error("end of packet while decoding an audio frame")]
	EndOfPacket,
	/// The packet type bit indicated a header packet where an audio packet was expected.
	#[error("non-audio packet encountered where an audio packet was expected")]
	NotAudioPacket,
	/// The mode number read from the packet is out of range.
	#[error("invalid mode number: {0}")]
	InvalidModeNumber(u32),
	/// A Huffman decode walked into an underspecified region of a codebook's tree.
	#[error("underspecified codebook {0} used during decode")]
	UnderspecifiedCodebook(u16),
	/// The unsupported Floor 0 synthesis path was reached (parsing is supported; decode is
	/// not, per the spec's explicit non-goal).
	#[error("Floor 0 synthesis is not supported")]
	UnsupportedFloor0Synthesis
}

/// The top-level error type returned by the public decoder API.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecoderError {
	/// Header parsing failed; the handle could not be opened.
	#[error("decoder setup failed: {0}")]
	Setup(#[from] SetupError),
	/// An operation that is only valid on a seekable stream was attempted on one that
	/// isn't, or vice versa.
	#[error("invalid operation for this stream: {0}")]
	InvalidOperation(&'static str),
	/// A short read was reported by a seekable byte source, which the spec (§ 6) treats
	/// as a fatal I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),
	/// The stream reported insufficient resources (an allocation size overflowed or
	/// exceeded practical limits).
	#[error("insufficient resources: {0}")]
	InsufficientResources(&'static str)
}

impl From<FrameError> for DecoderError {
	fn from(_: FrameError) -> Self {
		// Frame errors never escape the frame assembler as fatal errors; this
		// conversion only exists so `?` composes in code paths that are statically
		// known to be unreachable in practice (e.g. shared helper functions).
		DecoderError::InvalidOperation("unexpected unrecovered frame error")
	}
}
