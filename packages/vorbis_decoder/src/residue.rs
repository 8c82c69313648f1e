//! Residue decode (§ 8 of the spec).
//!
//! The residue holds the part of a channel's spectrum the floor curve doesn't capture. It's
//! split into fixed-size partitions; a classbook-coded "classword" picks, for a run of
//! partitions at a time, which codebook (if any) decodes each one for each of up to 8
//! cascaded passes. Residue type 2 decodes several channels as a single virtually-interleaved
//! vector; this module decodes that combined vector and leaves de-interleaving to the caller,
//! since only the caller (the frame assembler) knows which channels were coupled together.

use tinyvec::TinyVec;

use crate::bitreader::BitReader;
use crate::codebook::Codebook;
use crate::error::FrameError;
use crate::setup::ResidueConfig;

/// Decodes one residue vector of `length` coefficients (already adjusted by the caller for
/// type 2's channel interleaving), or an all-zero vector if `skip` is set (the spec's
/// "do not decode" case, e.g. every channel feeding this vector had a silent floor).
pub(crate) fn decode_residue_vector(
	reader: &mut BitReader<'_>,
	config: &ResidueConfig,
	codebooks: &[Codebook],
	length: usize,
	skip: bool
) -> Result<Vec<f32>, FrameError> {
	let mut vector = vec![0.0f32; length];
	if skip || length == 0 {
		return Ok(vector);
	}

	let classbook = &codebooks[config.classbook as usize];
	let classwords_per_codeword = classbook.dimensions.max(1) as usize;

	let partition_size = config.partition_size as usize;
	let partition_count = length.div_ceil(partition_size);

	let mut classifications = vec![0u8; partition_count];
	// A classbook's dimension count, and hence the classword run length, is always small in
	// practice (real encoders use 1-8), so this stays on the stack rather than allocating
	let mut classword: TinyVec<[u32; 8]> = TinyVec::with_capacity(classwords_per_codeword);
	classword.resize(classwords_per_codeword, 0);

	for partition in 0..partition_count {
		if partition % classwords_per_codeword == 0 {
			let mut temp = classbook
				.decode_entry_number(reader)
				.ok_or(FrameError::EndOfPacket)?;
			for slot in classword.iter_mut().rev() {
				*slot = temp % config.classifications as u32;
				temp /= config.classifications as u32;
			}
		}
		classifications[partition] = classword[partition % classwords_per_codeword] as u8;
	}

	// The residue type determines only how decoded values are placed back into the output
	// vector: type 0 interleaves across the partition at a book-dimension stride, type 1
	// (and the type-2 combined vector, which is decoded as type 1) places them sequentially.
	let interleaved = config.residue_type == 0;

	for pass in 0..8u8 {
		for partition in 0..partition_count {
			let classification = classifications[partition] as usize;
			let Some(book_number) = config.books[classification][pass as usize] else {
				continue;
			};
			let book = &codebooks[book_number as usize];
			let dimensions = book.dimensions.max(1) as usize;

			let partition_start = config.begin as usize + partition * partition_size;
			let partition_end = (partition_start + partition_size).min(length);
			if partition_start >= length {
				continue;
			}

			let mut position = partition_start;
			while position < partition_end {
				let entry = book.decode_entry_number(reader).ok_or(FrameError::EndOfPacket)?;
				let values = book
					.vq_vector(entry)
					.ok_or(FrameError::UnderspecifiedCodebook(book_number))?;

				for (k, &value) in values.iter().enumerate() {
					let index = if interleaved {
						partition_start + (position - partition_start) + k * (partition_size / dimensions.max(1))
					} else {
						position + k
					};
					if index < partition_end && index < vector.len() {
						vector[index] += value;
					}
				}

				position += dimensions;
			}
		}
	}

	Ok(vector)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::codebook::VectorLookup;

	#[test]
	fn skipped_vector_is_all_zero() {
		let config = ResidueConfig {
			residue_type: 1,
			begin: 0,
			end: 8,
			partition_size: 4,
			classifications: 1,
			classbook: 0,
			books: vec![[None; 8]]
		};
		let codebooks = vec![Codebook::new(&[1], false, VectorLookup::None).unwrap()];
		let mut reader = BitReader::new(&[]);

		let vector = decode_residue_vector(&mut reader, &config, &codebooks, 8, true).unwrap();
		assert_eq!(vector, vec![0.0; 8]);
	}
}
