//! Random-access seeking (§ 4.10 of the spec).
//!
//! Seeking works in two stages. First a coarse search narrows down to a byte range of the
//! container whose pages bracket the target sample, using each probed page's granule
//! position (the sample count up to and including that page) as the bisection key. Then the
//! caller reopens packet reassembly at that byte offset and decodes forward, discarding
//! output samples, until it reaches the exact target — granule positions only bound a page,
//! they don't pinpoint a sample within it.

use std::io::{Read, Seek};

use crate::ogg::{find_next_page, read_page_at};

/// The byte range a seekable stream's Vorbis pages occupy, and the serial number identifying
/// its logical bitstream.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SeekBounds {
	pub(crate) serial_number: u32,
	pub(crate) data_start: u64,
	pub(crate) data_end: u64
}

/// Scans backward from the end of the stream for the last page of `serial_number`, returning
/// its granule position: the total sample count of the stream, per § 4.10's definition of
/// stream length.
pub(crate) fn total_samples<R: Read + Seek>(
	source: &mut R,
	bounds: SeekBounds
) -> Result<i64, crate::error::DecoderError> {
	// A single Ogg page is at most roughly 64 KiB (255 segments of 255 bytes, plus header);
	// scanning that much of the tail is enough to find the last page without walking the
	// whole file from the start.
	const TAIL_WINDOW: u64 = 128 * 1024;

	let scan_start = bounds.data_end.saturating_sub(TAIL_WINDOW).max(bounds.data_start);

	let mut cursor = scan_start;
	let mut last_granule = -1i64;

	while cursor < bounds.data_end {
		let Some(page_offset) = find_next_page(source, cursor)
			.map_err(|e| crate::error::DecoderError::InvalidOperation(describe_ogg_error(&e)))?
		else {
			break;
		};
		if page_offset >= bounds.data_end {
			break;
		}

		let Ok(page) = read_page_at(source, page_offset) else {
			cursor = page_offset + 1;
			continue;
		};

		if page.header.serial_number == bounds.serial_number && page.header.granule_position >= 0 {
			last_granule = page.header.granule_position;
		}

		cursor = page.end_offset.max(page_offset + 1);
	}

	Ok(last_granule)
}

/// Coarse seek search (§ 4.10): bisects the byte range for the page whose granule position
/// range brackets `target_sample`, returning that page's start offset. The caller must still
/// decode forward from there and discard samples before `target_sample`.
pub(crate) fn locate_page_for_sample<R: Read + Seek>(
	source: &mut R,
	bounds: SeekBounds,
	target_sample: i64
) -> Result<u64, crate::error::DecoderError> {
	let mut low = bounds.data_start;
	let mut high = bounds.data_end;
	let mut best_offset = bounds.data_start;

	// A handful of bisection steps is enough to narrow down to a small byte window even for
	// large files; each step at minimum halves the search range, and real Ogg pages are at
	// most a few tens of kilobytes, so 64 iterations vastly over-covers any realistic file.
	for _ in 0..64 {
		if high <= low {
			break;
		}

		let probe = low + (high - low) / 2;
		let Some(page_offset) = find_next_page(source, probe)
			.map_err(|e| crate::error::DecoderError::InvalidOperation(describe_ogg_error(&e)))?
		else {
			high = probe;
			continue;
		};
		if page_offset >= high {
			high = probe;
			continue;
		}

		let Ok(page) = read_page_at(source, page_offset) else {
			high = probe;
			continue;
		};

		if page.header.granule_position < 0 {
			low = page.end_offset;
			continue;
		}

		if page.header.granule_position <= target_sample {
			best_offset = page_offset;
			low = page.end_offset;
		} else {
			high = page_offset.max(bounds.data_start);
		}

		if high.saturating_sub(low) < 4096 {
			break;
		}
	}

	Ok(best_offset)
}

fn describe_ogg_error(_error: &crate::ogg::OggError) -> &'static str {
	"I/O error while seeking through Ogg pages"
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use super::*;

	const CAPTURE_PATTERN: [u8; 4] = *b"OggS";

	fn build_page(granule_position: i64, serial_number: u32, sequence_number: u32, payload: &[u8]) -> Vec<u8> {
		let segment_table: Vec<u8> = {
			let mut lacing = vec![255u8; payload.len() / 255];
			lacing.push((payload.len() % 255) as u8);
			lacing
		};

		let mut fixed = Vec::with_capacity(27);
		fixed.extend_from_slice(&CAPTURE_PATTERN);
		fixed.push(0); // version
		fixed.push(0); // header type, irrelevant to the seek engine
		fixed.extend_from_slice(&granule_position.to_le_bytes());
		fixed.extend_from_slice(&serial_number.to_le_bytes());
		fixed.extend_from_slice(&sequence_number.to_le_bytes());
		fixed.extend_from_slice(&[0u8; 4]); // CRC placeholder; the seek engine never validates it
		fixed.push(segment_table.len() as u8);

		let mut page = fixed;
		page.extend_from_slice(&segment_table);
		page.extend_from_slice(payload);
		page
	}

	/// Five pages, 100 samples of granule position apart, each with a 10-byte payload.
	fn build_stream(serial_number: u32) -> Vec<u8> {
		let mut stream = Vec::new();
		for page_index in 0..5u32 {
			let granule = (page_index as i64 + 1) * 100;
			stream.extend_from_slice(&build_page(granule, serial_number, page_index, &[0u8; 10]));
		}
		stream
	}

	fn bounds_for(stream: &[u8], serial_number: u32) -> SeekBounds {
		SeekBounds {
			serial_number,
			data_start: 0,
			data_end: stream.len() as u64
		}
	}

	#[test]
	fn total_samples_finds_last_pages_granule_position() {
		let stream = build_stream(1);
		let bounds = bounds_for(&stream, 1);
		let mut source = Cursor::new(stream);

		assert_eq!(total_samples(&mut source, bounds).unwrap(), 500);
	}

	#[test]
	fn total_samples_ignores_other_serial_numbers() {
		let mut stream = build_stream(1);
		stream.extend_from_slice(&build_page(9999, 2, 0, &[0u8; 10]));
		let bounds = bounds_for(&stream, 1);
		let mut source = Cursor::new(stream);

		assert_eq!(total_samples(&mut source, bounds).unwrap(), 500);
	}

	#[test]
	fn locate_page_for_sample_never_lands_past_the_target() {
		let stream = build_stream(1);
		let bounds = bounds_for(&stream, 1);
		let mut source = Cursor::new(stream.clone());

		// The seek contract only promises a safe starting point to decode forward from and
		// discard samples before the target, not the tightest possible page: the returned
		// page's own granule position must never already be past the target sample.
		let offset = locate_page_for_sample(&mut source, bounds, 250).unwrap();
		let located = read_page_at(&mut source, offset).unwrap();
		assert!(located.header.granule_position <= 250);

		// Decoding forward from there must still reach a page covering the target.
		let mut cursor = located.end_offset;
		let mut reached = located.header.granule_position >= 250;
		while !reached && cursor < bounds.data_end {
			let Some(page_offset) = find_next_page(&mut source, cursor).unwrap() else {
				break;
			};
			let page = read_page_at(&mut source, page_offset).unwrap();
			reached = page.header.granule_position >= 250;
			cursor = page.end_offset;
		}
		assert!(reached, "forward decode from the located page never reaches the target sample");
	}

	#[test]
	fn locate_page_for_sample_clamps_to_first_page_for_early_targets() {
		let stream = build_stream(1);
		let bounds = bounds_for(&stream, 1);
		let mut source = Cursor::new(stream);

		let offset = locate_page_for_sample(&mut source, bounds, 0).unwrap();
		assert_eq!(offset, bounds.data_start);
	}
}
