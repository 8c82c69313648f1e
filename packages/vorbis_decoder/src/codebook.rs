//! Codebook decode: Huffman entry lookup and vector quantization expansion (§ 4.3).
//!
//! Each codebook exposes two decode paths, chosen per-codeword by its length:
//!
//! - A **fast table** of `2^FAST_LENGTH` entries, direct-indexed by the next `FAST_LENGTH`
//!   peeked bits, for every codeword no longer than `FAST_LENGTH` bits.
//! - A **sorted table**, binary-searched, for longer codewords (or every codeword, for
//!   sparse codebooks).
//!
//! Decode-time codewords are matched against the bit reader's accumulator after
//! bit-reversing it, following the spec. Sorted-table entries are stored bit-reversed and
//! left-justified in a `u32` so plain integer comparisons implement prefix matching: any
//! two codewords in a prefix code remain correctly ordered after zero-extension, which only
//! holds in this left-justified, MSB-first representation (not in the LSB-first layout the
//! bit reader's accumulator naturally produces, hence the reversal at decode time).
//!
//! [`Codebook::decode_entry_number`] returns `None` on the bit reader's sticky end-of-packet
//! state, which callers must treat as a frame-terminating condition per § 4.1.

use crate::bitreader::BitReader;
use crate::huffman_tree::{self, CodewordAssignmentError};

/// Direct-index table length. A larger value speeds up decode of longer codewords at the
/// cost of `2^FAST_LENGTH` table entries per codebook; 10 is the customary choice, matching
/// stb_vorbis-derived decoders.
const FAST_LENGTH: u32 = 10;

/// A decode-time Huffman codebook, optionally paired with a vector quantization multiplicand
/// table.
pub(crate) struct Codebook {
	pub(crate) entries: u32,
	pub(crate) dimensions: u16,
	fast_table: Box<[FastEntry]>,
	sorted_table: Box<[SortedEntry]>,
	/// Per-entry VQ vectors for lookup types 1 (pre-expanded) and 2, empty for type 0.
	vq_vectors: Box<[Box<[f32]>]>
}

#[derive(Clone, Copy)]
struct FastEntry {
	/// `symbol + 1`, so that 0 doubles as "no codeword this short maps here".
	symbol_plus_one: u32,
	length: u8
}

impl Default for FastEntry {
	fn default() -> Self {
		Self {
			symbol_plus_one: 0,
			length: 0
		}
	}
}

struct SortedEntry {
	left_justified_codeword: u32,
	length: u8,
	symbol: u32
}

impl Codebook {
	/// Builds a codebook's decode tables from its codeword lengths (0 marks an unused,
	/// sparse entry) and raw lookup parameters, as read from the setup header (§ 4.4).
	pub(crate) fn new(
		codeword_lengths: &[u8],
		sparse: bool,
		lookup: VectorLookup
	) -> Result<Self, CodewordAssignmentError> {
		let assignments = huffman_tree::assign_codewords(codeword_lengths)?;

		let mut fast_table = vec![FastEntry::default(); 1 << FAST_LENGTH].into_boxed_slice();
		let mut sorted_table = Vec::new();

		for (symbol, assignment) in assignments.iter().enumerate() {
			let Some((reversed_codeword, length)) = *assignment else {
				continue;
			};
			let symbol = symbol as u32;

			if !sparse && length as u32 <= FAST_LENGTH {
				// Populate every fast-table slot whose low `length` bits match this
				// codeword; the remaining high bits are free for longer codewords that
				// share this prefix
				let step = 1usize << length;
				let mut index = reversed_codeword as usize;
				while index < fast_table.len() {
					fast_table[index] = FastEntry {
						symbol_plus_one: symbol + 1,
						length
					};
					index += step;
				}
			} else {
				sorted_table.push(SortedEntry {
					left_justified_codeword: reversed_codeword.reverse_bits(),
					length,
					symbol
				});
			}
		}

		sorted_table.sort_unstable_by_key(|entry| entry.left_justified_codeword);

		let vq_vectors = match lookup {
			VectorLookup::None => Box::new([]) as Box<[_]>,
			VectorLookup::Table {
				dimensions,
				minimum_value,
				delta_value,
				sequence_p,
				multiplicands
			} => expand_vq_vectors(
				codeword_lengths.len() as u32,
				dimensions,
				minimum_value,
				delta_value,
				sequence_p,
				&multiplicands
			)
		};

		Ok(Self {
			entries: codeword_lengths.len() as u32,
			dimensions: match &lookup_dimensions(&vq_vectors) {
				Some(d) => *d,
				None => 0
			},
			fast_table,
			sorted_table: sorted_table.into_boxed_slice(),
			vq_vectors
		})
	}

	/// Decodes a single entry number, consuming bits from `reader`. Returns `None` on
	/// end-of-packet (§ 4.1's EOP sentinel) or if the bits decode into an underspecified
	/// region of the tree (a corrupt or adversarial stream).
	pub(crate) fn decode_entry_number(&self, reader: &mut BitReader<'_>) -> Option<u32> {
		let peeked = reader.peek_bits(FAST_LENGTH);
		let fast = self.fast_table[peeked as usize];
		if fast.length != 0 {
			reader.get_bits(fast.length as u32);
			return Some(fast.symbol_plus_one - 1);
		}

		let reversed_accumulator = reader.peek_bits(32).reverse_bits();

		let search_result = self
			.sorted_table
			.partition_point(|entry| entry.left_justified_codeword <= reversed_accumulator);

		// `search_result` points one past the largest codeword <= the accumulator; that
		// candidate is the only one that could possibly be a valid prefix match
		let candidate = search_result.checked_sub(1).map(|i| &self.sorted_table[i])?;

		let shift = 32 - candidate.length as u32;
		if (reversed_accumulator ^ candidate.left_justified_codeword) >> shift != 0 {
			return None;
		}

		reader.get_bits(candidate.length as u32);
		if reader.at_end() {
			return None;
		}

		Some(candidate.symbol)
	}

	/// Returns the VQ vector for `entry`, or `None` if this codebook has no vector lookup
	/// table (lookup type 0) or `entry` is out of range.
	pub(crate) fn vq_vector(&self, entry: u32) -> Option<&[f32]> {
		self.vq_vectors.get(entry as usize).map(|v| &**v)
	}

	/// True if this codebook has a vector quantization table, i.e. can be used in a
	/// residue vector context rather than only a scalar one.
	pub(crate) fn has_vq_table(&self) -> bool {
		!self.vq_vectors.is_empty()
	}
}

fn lookup_dimensions(vq_vectors: &[Box<[f32]>]) -> Option<u16> {
	vq_vectors.first().map(|v| v.len() as u16)
}

/// Raw vector quantization lookup parameters, as read verbatim from the setup header.
pub(crate) enum VectorLookup {
	/// Lookup type 0: this codebook is scalar-only.
	None,
	Table {
		dimensions: u16,
		minimum_value: f64,
		delta_value: f64,
		sequence_p: bool,
		/// Raw multiplicand table: `lookup1_values(entries, dimensions)` entries for
		/// lookup type 1, or `entries * dimensions` entries for lookup type 2.
		multiplicands: Vec<u16>
	}
}

/// Expands a codebook's raw VQ multiplicand table into one fully-materialized vector per
/// entry, per the Vorbis I specification § 9.2.3 - § 9.2.4.
fn expand_vq_vectors(
	entries: u32,
	dimensions: u16,
	minimum_value: f64,
	delta_value: f64,
	sequence_p: bool,
	multiplicands: &[u16]
) -> Box<[Box<[f32]>]> {
	if dimensions == 0 {
		return Box::new([]);
	}

	// Lookup type 2 stores one multiplicand directly per (entry, dimension) pair;
	// lookup type 1 stores `lookup1_values` entries and indexes into them via the
	// mixed-radix decomposition from § 9.2.3. Distinguish by comparing the table size.
	let is_explicit = multiplicands.len() as u64 == entries as u64 * dimensions as u64;

	(0..entries)
		.map(|entry| {
			let mut vector = vec![0f32; dimensions as usize];
			let mut last = 0.0;
			let mut residual = entry;

			for (j, component) in vector.iter_mut().enumerate() {
				let multiplicand = if is_explicit {
					multiplicands[entry as usize * dimensions as usize + j]
				} else {
					let v = multiplicands.len() as u32;
					let index = if v == 0 { 0 } else { residual % v };
					if v != 0 {
						residual /= v;
					}
					multiplicands[index as usize]
				};

				let mut value = multiplicand as f64 * delta_value + minimum_value;
				if sequence_p {
					value += last;
					last = value;
				}
				*component = value as f32;
			}

			vector.into_boxed_slice()
		})
		.collect::<Vec<_>>()
		.into_boxed_slice()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn reader_with_bits(bits: &[bool]) -> Vec<u8> {
		let mut bytes = vec![0u8; bits.len().div_ceil(8)];
		for (i, &bit) in bits.iter().enumerate() {
			if bit {
				bytes[i / 8] |= 1 << (i % 8);
			}
		}
		bytes
	}

	#[test]
	fn decodes_example_tree_from_spec() {
		// The Vorbis I specification, § 3.2.1 canonical example
		let codebook = Codebook::new(&[2, 4, 4, 4, 4, 2, 3, 3], false, VectorLookup::None).unwrap();

		let cases: &[(&[bool], u32)] = &[
			(&[false, false], 0),
			(&[false, true, false, false], 1),
			(&[false, true, false, true], 2),
			(&[false, true, true, false], 3),
			(&[false, true, true, true], 4),
			(&[true, false], 5),
			(&[true, true, false], 6),
			(&[true, true, true], 7)
		];

		for (bits, expected) in cases {
			let bytes = reader_with_bits(bits);
			let mut reader = BitReader::new(&bytes);
			assert_eq!(codebook.decode_entry_number(&mut reader), Some(*expected));
		}
	}

	#[test]
	fn single_entry_degenerate_codebook_decodes_either_bit() {
		let codebook = Codebook::new(&[1], false, VectorLookup::None).unwrap();

		for bit in [0u8, 1] {
			let mut reader = BitReader::new(&[bit]);
			assert_eq!(codebook.decode_entry_number(&mut reader), Some(0));
		}
	}

	#[test]
	fn long_codeword_uses_sorted_table() {
		// All codewords 12 bits, well above FAST_LENGTH, so only the sorted path is
		// exercised; every assigned codeword must still round-trip through decode
		let lengths = vec![12u8; 16];
		let codebook = Codebook::new(&lengths, false, VectorLookup::None).unwrap();
		let assignments = huffman_tree::assign_codewords(&lengths).unwrap();

		for (symbol, assignment) in assignments.iter().enumerate() {
			let (codeword, length) = assignment.unwrap();
			let bits: Vec<bool> = (0..length).map(|i| (codeword >> i) & 1 != 0).collect();
			let bytes = reader_with_bits(&bits);
			let mut reader = BitReader::new(&bytes);
			assert_eq!(codebook.decode_entry_number(&mut reader), Some(symbol as u32));
		}
	}

	#[test]
	fn type1_lookup_expands_via_mixed_radix() {
		// 4 entries, 2 dimensions, lookup1_values(4, 2) = 2
		let codebook = Codebook::new(
			&[1, 1, 1, 1],
			false,
			VectorLookup::Table {
				dimensions: 2,
				minimum_value: 0.0,
				delta_value: 1.0,
				sequence_p: false,
				multiplicands: vec![10, 20]
			}
		)
		.unwrap();

		assert_eq!(codebook.vq_vector(0), Some(&[10.0, 10.0][..]));
		assert_eq!(codebook.vq_vector(1), Some(&[20.0, 10.0][..]));
		assert_eq!(codebook.vq_vector(2), Some(&[10.0, 20.0][..]));
		assert_eq!(codebook.vq_vector(3), Some(&[20.0, 20.0][..]));
	}
}
