//! Parses the three Vorbis header packets into the data structures the frame assembler
//! needs (§ 4.2, § 4.4, and parts of § 9 of the spec).
//!
//! The identification and setup headers are parsed eagerly when a [`Decoder`](crate::Decoder)
//! is opened; a malformed header packet is always a fatal [`SetupError`], matching the
//! severity the spec assigns to header failures (there is no meaningful way to play back a
//! stream whose codec setup could not be understood).

use log::{debug, info, trace};

use crate::bitreader::BitReader;
use crate::codebook::{Codebook, VectorLookup};
use crate::error::SetupError;
use crate::mdct::MdctTables;
use crate::packet::PacketType;

/// Checks the common Vorbis header packet prelude (§ 4.2.1): packet type tag, followed by
/// the 6-byte `"vorbis"` signature. Returns the remainder of the packet past that prelude.
pub(crate) fn common_header_validation(
	header_packet: &[u8],
	expected_type: PacketType
) -> Result<&[u8], SetupError> {
	let header_length = header_packet.len();
	if header_length < 7 {
		return Err(SetupError::TooSmallPacket(header_length));
	}

	let packet_type = PacketType::try_from(header_packet[0])
		.map_err(|_| SetupError::UnexpectedPacketType {
			expected: expected_type,
			actual: PacketType::Audio
		})?;
	if packet_type != expected_type {
		return Err(SetupError::UnexpectedPacketType {
			expected: expected_type,
			actual: packet_type
		});
	}

	if &header_packet[1..7] != b"vorbis" {
		return Err(SetupError::InvalidPattern);
	}

	Ok(&header_packet[7..])
}

/// The Vorbis I `ilog` function (§ 9.2.1): the position of the highest set bit, plus one, or
/// zero for non-positive inputs. Equivalently, the number of bits needed to represent `n` in
/// `[0, n]` when `n >= 0`.
pub(crate) const fn ilog(n: i32) -> u32 {
	if n > 0 {
		32 - n.leading_zeros()
	} else {
		0
	}
}

/// Relevant fields of the Vorbis identification header (§ 4.2.2), the first packet of any
/// Vorbis stream.
#[derive(Debug, Clone)]
pub(crate) struct IdentificationHeader {
	pub(crate) channels: u8,
	pub(crate) sample_rate: u32,
	pub(crate) maximum_bitrate: i32,
	pub(crate) nominal_bitrate: i32,
	pub(crate) minimum_bitrate: i32,
	pub(crate) blocksize_0: u16,
	pub(crate) blocksize_1: u16
}

impl IdentificationHeader {
	pub(crate) fn parse(packet: &[u8]) -> Result<Self, SetupError> {
		trace!("Parsing identification header");

		let body = common_header_validation(packet, PacketType::IdentificationHeader)?;
		if body.len() < 23 {
			return Err(SetupError::TooSmallPacket(packet.len()));
		}

		let vorbis_version = u32::from_le_bytes(body[0..4].try_into().unwrap());
		if vorbis_version != 0 {
			return Err(SetupError::UnsupportedVersion(vorbis_version));
		}

		let channels = body[4];
		if channels == 0 {
			return Err(SetupError::InvalidChannelCount(channels));
		}

		let sample_rate = u32::from_le_bytes(body[5..9].try_into().unwrap());
		if sample_rate == 0 {
			return Err(SetupError::InvalidSampleRate(sample_rate));
		}

		let maximum_bitrate = i32::from_le_bytes(body[9..13].try_into().unwrap());
		let nominal_bitrate = i32::from_le_bytes(body[13..17].try_into().unwrap());
		let minimum_bitrate = i32::from_le_bytes(body[17..21].try_into().unwrap());

		let blocksize_0 = 1u16 << (body[21] & 0x0F);
		let blocksize_1 = 1u16 << (body[21] >> 4);

		const fn in_range(blocksize: u16) -> bool {
			blocksize >= 64 && blocksize <= 8192
		}

		if !in_range(blocksize_0) || !in_range(blocksize_1) || blocksize_0 > blocksize_1 {
			return Err(SetupError::InvalidBlocksizes(blocksize_0, blocksize_1));
		}

		// Framing bit (body[22] & 1) is not checked: broken encoders routinely get this
		// wrong, and there is nothing further in this packet to desynchronize from

		info!(
			"Identification header: {channels} channel(s), {sample_rate} Hz, blocksizes {blocksize_0}/{blocksize_1}"
		);

		Ok(Self {
			channels,
			sample_rate,
			maximum_bitrate,
			nominal_bitrate,
			minimum_bitrate,
			blocksize_0,
			blocksize_1
		})
	}
}

/// A Floor 0 configuration (§ 7.1). Parsing is fully supported; audio synthesis through a
/// Floor 0 curve is a declared non-goal, so [`FloorConfig::Floor0`] carries no further state
/// once parsed beyond what's needed to validate the setup header.
#[derive(Debug, Clone)]
pub(crate) struct Floor0Config {
	pub(crate) order: u8,
	pub(crate) rate: u16,
	pub(crate) bark_map_size: u16,
	pub(crate) amplitude_bits: u8,
	pub(crate) amplitude_offset: u8,
	pub(crate) books: Vec<u8>
}

/// A Floor 1 configuration (§ 7.2): a piecewise linear curve over `x_list.len()` points, with
/// per-partition-class Huffman-coded amplitude residuals.
#[derive(Debug, Clone)]
pub(crate) struct Floor1Config {
	pub(crate) partition_class_list: Vec<u8>,
	pub(crate) class_dimensions: Vec<u8>,
	pub(crate) class_subclasses: Vec<u8>,
	pub(crate) class_masterbooks: Vec<u8>,
	/// `[class][subclass]`, `None` where a subclass has no book (short codebook bits = 0).
	pub(crate) subclass_books: Vec<Vec<Option<u16>>>,
	pub(crate) multiplier: u8,
	/// X coordinates in declaration order, including the two implicit endpoints at index 0
	/// and 1.
	pub(crate) x_list: Vec<u16>
}

#[derive(Debug, Clone)]
pub(crate) enum FloorConfig {
	Floor0(Floor0Config),
	Floor1(Floor1Config)
}

impl FloorConfig {
	fn parse(reader: &mut BitReader<'_>, codebook_count: u32, floor_number: u16) -> Result<Self, SetupError> {
		let floor_type = reader.get_bits(16) as u16;

		match floor_type {
			0 => {
				let order = reader.get_bits(8) as u8;
				let rate = reader.get_bits(16) as u16;
				let bark_map_size = reader.get_bits(16) as u16;
				let amplitude_bits = reader.get_bits(6) as u8;
				let amplitude_offset = reader.get_bits(8) as u8;
				let book_count = reader.get_bits(4) as u8 + 1;
				let mut books = Vec::with_capacity(book_count as usize);
				for _ in 0..book_count {
					let book = reader.get_bits(8) as u16;
					books.push(validated_codebook_number(book, codebook_count)?);
				}
				Ok(Self::Floor0(Floor0Config {
					order,
					rate,
					bark_map_size,
					amplitude_bits,
					amplitude_offset,
					books
				}))
			}
			1 => {
				let partitions = reader.get_bits(5) as usize;
				let mut partition_class_list = Vec::with_capacity(partitions);
				let mut maximum_class: i32 = -1;
				for _ in 0..partitions {
					let class = reader.get_bits(4) as u8;
					maximum_class = maximum_class.max(class as i32);
					partition_class_list.push(class);
				}

				let class_count = (maximum_class + 1).max(0) as usize;
				let mut class_dimensions = vec![0u8; class_count];
				let mut class_subclasses = vec![0u8; class_count];
				let mut class_masterbooks = vec![0u8; class_count];
				let mut subclass_books = vec![Vec::new(); class_count];

				for class in 0..class_count {
					class_dimensions[class] = reader.get_bits(3) as u8 + 1;
					let subclasses = reader.get_bits(2) as u8;
					class_subclasses[class] = subclasses;

					if subclasses != 0 {
						let masterbook = reader.get_bits(8) as u16;
						class_masterbooks[class] = validated_codebook_number(masterbook, codebook_count)? as u8;
					}

					let book_count = 1usize << subclasses;
					let mut books = Vec::with_capacity(book_count);
					for _ in 0..book_count {
						let raw = reader.get_bits(8) as i32 - 1;
						books.push(if raw < 0 {
							None
						} else {
							Some(validated_codebook_number(raw as u16, codebook_count)?)
						});
					}
					subclass_books[class] = books;
				}

				let multiplier = reader.get_bits(2) as u8 + 1;
				let range_bits = reader.get_bits(4);

				let mut x_list = vec![0u16, 1u16 << range_bits];
				for &class in &partition_class_list {
					let dims = class_dimensions[class as usize];
					for _ in 0..dims {
						x_list.push(reader.get_bits(range_bits) as u16);
					}
				}

				if x_list.len() > 65 {
					return Err(SetupError::TooManyFloor1Points(floor_number as u8));
				}

				let mut sorted = x_list.clone();
				sorted.sort_unstable();
				if sorted.windows(2).any(|w| w[0] == w[1]) {
					return Err(SetupError::RepeatedFloor1Point(floor_number as u8));
				}

				Ok(Self::Floor1(Floor1Config {
					partition_class_list,
					class_dimensions,
					class_subclasses,
					class_masterbooks,
					subclass_books,
					multiplier,
					x_list
				}))
			}
			other => Err(SetupError::UnsupportedFloorType(other))
		}
	}
}

/// A residue configuration (§ 8.6).
#[derive(Debug, Clone)]
pub(crate) struct ResidueConfig {
	pub(crate) residue_type: u16,
	pub(crate) begin: u32,
	pub(crate) end: u32,
	pub(crate) partition_size: u32,
	pub(crate) classifications: u8,
	pub(crate) classbook: u16,
	/// `[classification][pass]`, `None` where the cascade bitmap has that pass bit clear.
	pub(crate) books: Vec<[Option<u16>; 8]>
}

impl ResidueConfig {
	fn parse(reader: &mut BitReader<'_>, codebooks: &[Codebook], residue_number: u16) -> Result<Self, SetupError> {
		let codebook_count = codebooks.len() as u32;

		let residue_type = reader.get_bits(16) as u16;
		if residue_type > 2 {
			return Err(SetupError::UnsupportedResidueType(residue_type));
		}

		let begin = reader.get_bits(24);
		let end = reader.get_bits(24);
		let partition_size = reader.get_bits(24) + 1;
		let classifications = reader.get_bits(6) as u8 + 1;
		let classbook = validated_codebook_number(reader.get_bits(8) as u16, codebook_count)?;

		if codebooks[classbook as usize].entries < classifications as u32 {
			return Err(SetupError::ClassbookTooSmall {
				residue: residue_number,
				classbook: classbook as u8,
				classifications
			});
		}

		let mut cascade = vec![0u8; classifications as usize];
		for entry in cascade.iter_mut() {
			let low_bits = reader.get_bits(3) as u8;
			let has_high_bits = reader.get_flag();
			let high_bits = if has_high_bits { reader.get_bits(5) as u8 } else { 0 };
			*entry = low_bits | (high_bits << 3);
		}

		let mut books = vec![[None; 8]; classifications as usize];
		for (classification, bitmap) in cascade.iter().enumerate() {
			for pass in 0..8u8 {
				if bitmap & (1 << pass) != 0 {
					let book = reader.get_bits(8) as u16;
					books[classification][pass as usize] = Some(validated_codebook_number(book, codebook_count)?);
				}
			}
		}

		Ok(Self {
			residue_type,
			begin,
			end,
			partition_size,
			classifications,
			classbook,
			books
		})
	}
}

/// A channel mapping configuration (§ 8.7), tying floors and residues to specific channels.
#[derive(Debug, Clone)]
pub(crate) struct Mapping {
	/// Magnitude/angle channel pairs, decoded as inverse polar coupling before IMDCT output
	/// (§ 4.7).
	pub(crate) coupling_steps: Vec<(u8, u8)>,
	/// One submap index per channel.
	pub(crate) channel_mux: Vec<u8>,
	/// One floor number per submap.
	pub(crate) submap_floor: Vec<u8>,
	/// One residue number per submap.
	pub(crate) submap_residue: Vec<u8>
}

impl Mapping {
	fn parse(
		reader: &mut BitReader<'_>,
		channels: u8,
		floor_count: u32,
		residue_count: u32
	) -> Result<Self, SetupError> {
		let mapping_type = reader.get_bits(16) as u16;
		if mapping_type != 0 {
			return Err(SetupError::ReservedMappingType(mapping_type));
		}

		let submaps = if reader.get_flag() {
			reader.get_bits(4) as u8 + 1
		} else {
			1
		};

		let mut coupling_steps = Vec::new();
		if reader.get_flag() {
			let steps = reader.get_bits(8) + 1;
			let channel_bits = ilog(channels as i32 - 1);
			for _ in 0..steps {
				let magnitude = reader.get_bits(channel_bits) as u8;
				let angle = reader.get_bits(channel_bits) as u8;
				if magnitude == angle || magnitude >= channels || angle >= channels {
					return Err(SetupError::InvalidChannelMapping {
						magnitude,
						angle,
						channels
					});
				}
				coupling_steps.push((magnitude, angle));
			}
		}

		let reserved = reader.get_bits(2);
		debug_assert_eq!(reserved, 0, "reserved mapping bits should be zero");

		let mut channel_mux = vec![0u8; channels as usize];
		if submaps > 1 {
			for slot in channel_mux.iter_mut() {
				let submap = reader.get_bits(4) as u8;
				if submap >= submaps {
					return Err(SetupError::InvalidChannelMultiplexing {
						submap,
						submap_count: submaps
					});
				}
				*slot = submap;
			}
		}

		let mut submap_floor = Vec::with_capacity(submaps as usize);
		let mut submap_residue = Vec::with_capacity(submaps as usize);
		for _ in 0..submaps {
			let _unused_time_config = reader.get_bits(8);
			let floor = reader.get_bits(8) as u8;
			if floor as u32 >= floor_count {
				return Err(SetupError::InvalidFloorNumber(floor));
			}
			let residue = reader.get_bits(8) as u8;
			if residue as u32 >= residue_count {
				return Err(SetupError::InvalidResidueNumber(residue));
			}
			submap_floor.push(floor);
			submap_residue.push(residue);
		}

		Ok(Self {
			coupling_steps,
			channel_mux,
			submap_floor,
			submap_residue
		})
	}
}

/// A decode mode (§ 8.8): selects a window size and the mapping used for a given packet.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Mode {
	pub(crate) blockflag: bool,
	pub(crate) mapping: u8
}

impl Mode {
	fn parse(reader: &mut BitReader<'_>, mapping_count: u32) -> Result<Self, SetupError> {
		let blockflag = reader.get_flag();
		let windowtype = reader.get_bits(16);
		let transformtype = reader.get_bits(16);
		if windowtype != 0 || transformtype != 0 {
			return Err(SetupError::UnsupportedWindowOrTransformType(windowtype.max(transformtype)));
		}
		let mapping = reader.get_bits(8) as u8;
		if mapping as u32 >= mapping_count {
			return Err(SetupError::InvalidMappingNumber(mapping));
		}
		Ok(Self { blockflag, mapping })
	}
}

/// The full codec setup (§ 4.2.4 and § 9), produced by parsing the setup header against an
/// already-parsed identification header.
pub(crate) struct Setup {
	pub(crate) codebooks: Vec<Codebook>,
	pub(crate) floors: Vec<FloorConfig>,
	pub(crate) residues: Vec<ResidueConfig>,
	pub(crate) mappings: Vec<Mapping>,
	pub(crate) modes: Vec<Mode>,
	/// Twiddle-factor and bit-reversal tables for the inverse MDCT, indexed by blockflag: `[0]`
	/// for `blocksize_0` blocks, `[1]` for `blocksize_1` blocks (§ 4.4). Built once here rather
	/// than once per block, since they only depend on the stream's two fixed blocksizes.
	pub(crate) mdct_tables: [MdctTables; 2]
}

impl Setup {
	pub(crate) fn parse(packet: &[u8], identification: &IdentificationHeader) -> Result<Self, SetupError> {
		trace!("Parsing setup header");

		let body = common_header_validation(packet, PacketType::SetupHeader)?;
		let mut reader = BitReader::new(body);

		let codebooks = parse_codebooks(&mut reader)?;
		let codebook_count = codebooks.len() as u32;

		// Time domain transform configurations: always zero count placeholders, present
		// for forward compatibility with transform types Vorbis I never defines
		let time_count = reader.get_bits(6) + 1;
		for _ in 0..time_count {
			let placeholder = reader.get_bits(16);
			debug_assert_eq!(placeholder, 0, "reserved time domain transform type");
		}

		let floor_count = reader.get_bits(6) + 1;
		let mut floors = Vec::with_capacity(floor_count as usize);
		for floor_number in 0..floor_count {
			floors.push(FloorConfig::parse(&mut reader, codebook_count, floor_number as u16)?);
		}

		let residue_count = reader.get_bits(6) + 1;
		let mut residues = Vec::with_capacity(residue_count as usize);
		for residue_number in 0..residue_count {
			residues.push(ResidueConfig::parse(&mut reader, &codebooks, residue_number as u16)?);
		}

		let mapping_count = reader.get_bits(6) + 1;
		let mut mappings = Vec::with_capacity(mapping_count as usize);
		for _ in 0..mapping_count {
			mappings.push(Mapping::parse(
				&mut reader,
				identification.channels,
				floor_count,
				residue_count
			)?);
		}

		let mode_count = reader.get_bits(6) + 1;
		let mut modes = Vec::with_capacity(mode_count as usize);
		for _ in 0..mode_count {
			modes.push(Mode::parse(&mut reader, mapping_count)?);
		}

		if reader.at_end() {
			return Err(SetupError::TooSmallPacket(packet.len()));
		}

		debug!(
			"Setup header: {codebook_count} codebook(s), {floor_count} floor(s), \
			{residue_count} residue(s), {mapping_count} mapping(s), {mode_count} mode(s)"
		);

		let mdct_tables = [
			MdctTables::compute(identification.blocksize_0 as usize),
			MdctTables::compute(identification.blocksize_1 as usize)
		];

		Ok(Self {
			codebooks,
			floors,
			residues,
			mappings,
			modes,
			mdct_tables
		})
	}
}

fn validated_codebook_number(number: u16, codebook_count: u32) -> Result<u16, SetupError> {
	if (number as u32) >= codebook_count {
		Err(SetupError::InvalidCodebookNumber(number))
	} else {
		Ok(number)
	}
}

fn parse_codebooks(reader: &mut BitReader<'_>) -> Result<Vec<Codebook>, SetupError> {
	let codebook_count = reader.get_bits(8) + 1;
	let mut codebooks = Vec::with_capacity(codebook_count as usize);

	for codebook_number in 0..codebook_count {
		let sync = reader.get_bits(24);
		if sync != 0x564342 {
			return Err(SetupError::InvalidPattern);
		}

		let dimensions = reader.get_bits(16) as u16;
		let entries = reader.get_bits(24);

		let ordered = reader.get_flag();
		let mut codeword_lengths = vec![0u8; entries as usize];
		let sparse;

		if ordered {
			sparse = false;
			let mut current_entry = 0u32;
			let mut current_length = reader.get_bits(5) as u32 + 1;
			while current_entry < entries {
				// A stream that never advances current_entry (by repeatedly declaring zero
				// codewords of the current length) would otherwise grow current_length
				// forever; 32 is the widest codeword this format admits
				if current_length > 32 {
					return Err(SetupError::TooBigCodewordLength);
				}

				let remaining = entries - current_entry;
				let bits = ilog(remaining as i32);
				let number = reader.get_bits(bits);

				let next_entry = current_entry + number;
				if next_entry > entries {
					return Err(SetupError::TooManyCodewordsAtLength(codebook_number as u16));
				}

				for length in codeword_lengths
					.iter_mut()
					.skip(current_entry as usize)
					.take(number as usize)
				{
					*length = current_length as u8;
				}
				current_entry = next_entry;
				current_length += 1;
			}
		} else {
			sparse = reader.get_flag();
			for length in codeword_lengths.iter_mut() {
				if sparse {
					if reader.get_flag() {
						*length = reader.get_bits(5) as u8 + 1;
					}
				} else {
					*length = reader.get_bits(5) as u8 + 1;
				}
			}
		}

		let lookup_type = reader.get_bits(4) as u8;
		let lookup = match lookup_type {
			0 => VectorLookup::None,
			1 | 2 => {
				let minimum_value = float32_unpack(reader.get_bits(32));
				let delta_value = float32_unpack(reader.get_bits(32));
				let value_bits = reader.get_bits(4) + 1;
				let sequence_p = reader.get_flag();

				let quant_values = if lookup_type == 1 {
					lookup1_values(entries, dimensions as u32)
				} else {
					// `entries` and `dimensions` are independently bounded (24 and 16 bits
					// respectively), but their product is not; widen before multiplying so
					// an adversarial header overflows a typed error instead of wrapping a
					// u32 into a small, silently wrong table size
					u32::try_from(entries as u64 * dimensions as u64)
						.map_err(|_| SetupError::TooManyLookupValues(codebook_number as u16))?
				};

				let multiplicands = (0..quant_values)
					.map(|_| reader.get_bits(value_bits) as u16)
					.collect();

				VectorLookup::Table {
					dimensions,
					minimum_value,
					delta_value,
					sequence_p,
					multiplicands
				}
			}
			other => return Err(SetupError::ReservedLookupType(other))
		};

		let codebook = Codebook::new(&codeword_lengths, sparse, lookup).map_err(|_| {
			SetupError::InvalidCodebookCodewords {
				codebook_number: codebook_number as u16,
				reason: "overspecified Huffman tree"
			}
		})?;

		codebooks.push(codebook);
	}

	Ok(codebooks)
}

/// `lookup1_values` (§ 9.2.3): the largest integer `v` such that `v^dimensions <= entries`.
fn lookup1_values(entries: u32, dimensions: u32) -> u32 {
	if dimensions == 0 {
		return 0;
	}
	let mut value = (entries as f64).powf(1.0 / dimensions as f64).floor() as u32;
	while (value + 1).checked_pow(dimensions).is_some_and(|p| p <= entries) {
		value += 1;
	}
	while value > 0 && value.pow(dimensions) > entries {
		value -= 1;
	}
	value
}

/// Unpacks the Vorbis custom 32-bit float format (§ 9.2.2): a sign bit, a 10-bit biased
/// exponent, and a 21-bit mantissa, with no implicit bit and no special values.
fn float32_unpack(x: u32) -> f64 {
	let mantissa = (x & 0x1f_ffff) as f64;
	let mantissa = if x & 0x8000_0000 != 0 { -mantissa } else { mantissa };
	let exponent = ((x & 0x7fe0_0000) >> 21) as i32 - 788;
	mantissa * 2f64.powi(exponent)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ilog_matches_spec_examples() {
		assert_eq!(ilog(0), 0);
		assert_eq!(ilog(1), 1);
		assert_eq!(ilog(2), 2);
		assert_eq!(ilog(3), 2);
		assert_eq!(ilog(4), 3);
		assert_eq!(ilog(7), 3);
	}

	#[test]
	fn lookup1_values_matches_known_cases() {
		assert_eq!(lookup1_values(4, 2), 2);
		assert_eq!(lookup1_values(1, 1), 1);
		assert_eq!(lookup1_values(256, 4), 4);
	}

	#[test]
	fn float32_unpack_round_trips_simple_values() {
		// Exponent bias 788 means an exponent field of 788 represents 2^0
		let encoded = (788u32 << 21) | 1;
		assert_eq!(float32_unpack(encoded), 1.0);
	}
}
