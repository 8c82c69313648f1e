//! Ogg page and packet framing (§ 4.2 of the spec).
//!
//! Vorbis packets are never read directly off the byte source; they travel inside Ogg
//! pages, interleaved with a CRC-32 checksum and a lacing (segment) table that both
//! delimits packet boundaries and splits packets larger than 255 bytes across segments.
//! A packet may also span multiple pages, when its final lacing value is exactly 255 (a
//! "continued" packet).
//!
//! [`PacketReader`] hides all of that: it hands back one fully reassembled packet at a
//! time, reading as many pages as the packet needs. The CRC table and page-header parsing
//! it's built on are also reused by the [seek engine](crate::seek), which needs to scan
//! forward for the next page boundary without going through packet reassembly.

use std::io::{self, Read, Seek, SeekFrom};

use thiserror::Error;

/// Ogg page and packet framing failures. All are fatal in the setup path; during sequential
/// decode a caller may instead choose to resynchronize by scanning for the next capture
/// pattern, per § 4.2's "non-strict" mode.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OggError {
	/// The 4-byte "OggS" capture pattern was not found where a page header was expected.
	#[error("missing Ogg page capture pattern")]
	MissingCapturePattern,
	/// The page declares a stream structure version this reader does not understand.
	#[error("unsupported Ogg stream structure version {0}")]
	UnsupportedVersion(u8),
	/// The page's CRC-32 checksum did not match its contents.
	#[error("Ogg page CRC mismatch")]
	CrcMismatch,
	/// The byte source ran out of data mid-page or mid-packet.
	#[error("unexpected end of stream while reading an Ogg page")]
	UnexpectedEof,
	/// A continued packet's first page did not have the "continuation" flag set, or vice
	/// versa, breaking the expected lacing sequence.
	#[error("inconsistent Ogg packet continuation flags")]
	InconsistentContinuation
}

impl From<io::Error> for OggError {
	fn from(_: io::Error) -> Self {
		// read_page only ever reads with read_exact, so any I/O error here means the
		// source ran dry mid-page; genuine device errors are surfaced separately by
		// callers that still hold the underlying io::Error from their own reads
		OggError::UnexpectedEof
	}
}

const CAPTURE_PATTERN: [u8; 4] = *b"OggS";

/// The header fields of a single Ogg page, with its lacing (segment) table.
pub(crate) struct PageHeader {
	pub(crate) header_type: u8,
	pub(crate) granule_position: i64,
	pub(crate) serial_number: u32,
	pub(crate) sequence_number: u32,
	pub(crate) segment_table: Vec<u8>
}

impl PageHeader {
	pub(crate) fn is_continued_packet(&self) -> bool {
		self.header_type & 0x01 != 0
	}

	pub(crate) fn is_first_page(&self) -> bool {
		self.header_type & 0x02 != 0
	}

	pub(crate) fn is_last_page(&self) -> bool {
		self.header_type & 0x04 != 0
	}

	/// Sum of this page's lacing values: the total payload byte count.
	pub(crate) fn payload_len(&self) -> usize {
		self.segment_table.iter().map(|&v| v as usize).sum()
	}
}

/// Reads one Ogg page header (and its following payload) from `source`, validating its CRC.
/// Returns the header and the raw payload bytes.
fn read_page<R: Read>(source: &mut R) -> Result<(PageHeader, Vec<u8>), OggError> {
	let mut fixed = [0u8; 27];
	source.read_exact(&mut fixed)?;

	if fixed[0..4] != CAPTURE_PATTERN {
		return Err(OggError::MissingCapturePattern);
	}
	let version = fixed[4];
	if version != 0 {
		return Err(OggError::UnsupportedVersion(version));
	}
	let header_type = fixed[5];
	let granule_position = i64::from_le_bytes(fixed[6..14].try_into().unwrap());
	let serial_number = u32::from_le_bytes(fixed[14..18].try_into().unwrap());
	let sequence_number = u32::from_le_bytes(fixed[18..22].try_into().unwrap());
	let declared_crc = u32::from_le_bytes(fixed[22..26].try_into().unwrap());
	let segment_count = fixed[26] as usize;

	let mut segment_table = vec![0u8; segment_count];
	source.read_exact(&mut segment_table)?;

	let payload_len: usize = segment_table.iter().map(|&v| v as usize).sum();
	let mut payload = vec![0u8; payload_len];
	source.read_exact(&mut payload)?;

	let mut crc_input = Vec::with_capacity(27 + segment_count + payload_len);
	crc_input.extend_from_slice(&fixed[0..22]);
	crc_input.extend_from_slice(&[0u8; 4]); // CRC field itself is zeroed for the computation
	crc_input.push(fixed[26]);
	crc_input.extend_from_slice(&segment_table);
	crc_input.extend_from_slice(&payload);

	if crc32(&crc_input) != declared_crc {
		return Err(OggError::CrcMismatch);
	}

	Ok((
		PageHeader {
			header_type,
			granule_position,
			serial_number,
			sequence_number,
			segment_table
		},
		payload
	))
}

/// Reassembles Vorbis packets out of a single logical Ogg bitstream (identified by its
/// first page's serial number), reading pages from `source` on demand.
pub(crate) struct PacketReader<R> {
	source: R,
	/// Serial number of the logical stream being followed; pages belonging to other
	/// interleaved streams are skipped. `None` until the first page has been read, at
	/// which point it locks onto that page's serial number.
	serial_number: Option<u32>,
	pending_page: Option<(PageHeader, Vec<u8>, usize)>,
	last_granule_position: i64,
	at_last_page: bool
}

impl<R: Read> PacketReader<R> {
	pub(crate) fn new(source: R) -> Self {
		Self {
			source,
			serial_number: None,
			pending_page: None,
			last_granule_position: -1,
			at_last_page: false
		}
	}

	/// The granule position of the most recently completed page, or -1 if none has been
	/// read yet or the page declared no granule position.
	pub(crate) fn last_granule_position(&self) -> i64 {
		self.last_granule_position
	}

	pub(crate) fn at_last_page(&self) -> bool {
		self.at_last_page
	}

	/// Reads the next page of this logical stream, skipping any interleaved pages that
	/// belong to a different serial number.
	fn next_own_page(&mut self) -> Result<(PageHeader, Vec<u8>), OggError> {
		loop {
			let (header, payload) = read_page(&mut self.source)?;
			match self.serial_number {
				None => {
					self.serial_number = Some(header.serial_number);
					return Ok((header, payload));
				}
				Some(serial) if serial == header.serial_number => return Ok((header, payload)),
				Some(_) => continue
			}
		}
	}

	/// Reads and reassembles the next packet, or `Ok(None)` at clean end of stream.
	pub(crate) fn next_packet(&mut self) -> Result<Option<Vec<u8>>, OggError> {
		if self.at_last_page && self.pending_page.is_none() {
			return Ok(None);
		}

		let mut packet = Vec::new();
		let mut expect_continuation = false;

		loop {
			if self.pending_page.is_none() {
				let (header, payload) = self.next_own_page()?;
				self.at_last_page = header.is_last_page();
				if header.granule_position >= 0 {
					self.last_granule_position = header.granule_position;
				}
				if expect_continuation && !header.is_continued_packet() {
					return Err(OggError::InconsistentContinuation);
				}
				self.pending_page = Some((header, payload, 0));
			}

			let (header, payload, segment_index) = self.pending_page.as_mut().unwrap();

			if *segment_index >= header.segment_table.len() {
				self.pending_page = None;
				if packet.is_empty() && self.at_last_page {
					return Ok(None);
				}
				expect_continuation = true;
				continue;
			}

			let offset = header.segment_table[..*segment_index]
				.iter()
				.map(|&v| v as usize)
				.sum::<usize>();
			let lacing_value = header.segment_table[*segment_index];
			*segment_index += 1;

			packet.extend_from_slice(&payload[offset..offset + lacing_value as usize]);

			if lacing_value < 255 {
				return Ok(Some(packet));
			}
			// A lacing value of exactly 255 means the packet continues, either in the
			// next segment of this same page or, if this was the page's last segment,
			// on the next page
		}
	}
}

impl<R: Read + Seek> PacketReader<R> {
	/// Grants the seek engine direct access to the underlying byte source, to probe page
	/// offsets without going through packet reassembly.
	pub(crate) fn source_mut(&mut self) -> &mut R {
		&mut self.source
	}

	/// Discards any in-progress packet reassembly and repositions the underlying source so
	/// the next call to [`next_packet`](Self::next_packet) starts reading fresh from the Ogg
	/// page beginning at `offset`. The locked-on serial number is preserved.
	pub(crate) fn reset_at(&mut self, offset: u64) {
		let _ = self.source.seek(SeekFrom::Start(offset));
		self.pending_page = None;
		self.at_last_page = false;
	}
}

/// A single parsed page, annotated with its byte extent in the underlying source. Used by the
/// [seek engine](crate::seek), which needs random access to individual pages rather than the
/// reassembled packet stream [`PacketReader`] produces.
pub(crate) struct LocatedPage {
	pub(crate) header: PageHeader,
	pub(crate) payload: Vec<u8>,
	/// Byte offset of this page's capture pattern.
	pub(crate) start_offset: u64,
	/// Byte offset one past this page's last payload byte; where the next page would start.
	pub(crate) end_offset: u64
}

/// Reads the Ogg page beginning exactly at `offset`, for sources that support seeking.
pub(crate) fn read_page_at<R: Read + Seek>(
	source: &mut R,
	offset: u64
) -> Result<LocatedPage, OggError> {
	source.seek(SeekFrom::Start(offset)).map_err(|_| OggError::UnexpectedEof)?;
	let (header, payload) = read_page(source)?;
	let end_offset = source.stream_position().map_err(|_| OggError::UnexpectedEof)?;

	Ok(LocatedPage {
		header,
		payload,
		start_offset: offset,
		end_offset
	})
}

/// Scans forward from `start` for the next byte offset at which a page's capture pattern
/// appears, without validating the page's CRC. Used to resynchronize after a corrupt page, or
/// to probe for page boundaries during seeking (§ 4.2's "non-strict" resynchronization mode,
/// and § 4.10's coarse seek search).
pub(crate) fn find_next_page<R: Read + Seek>(
	source: &mut R,
	start: u64
) -> Result<Option<u64>, OggError> {
	source.seek(SeekFrom::Start(start)).map_err(|_| OggError::UnexpectedEof)?;

	let mut window = [0u8; 4];
	let mut filled = 0usize;
	let mut position = start;

	loop {
		let mut byte = [0u8];
		match source.read(&mut byte) {
			Ok(0) => return Ok(None),
			Ok(_) => (),
			Err(_) => return Ok(None)
		}

		if filled < 4 {
			window[filled] = byte[0];
			filled += 1;
		} else {
			window.copy_within(1..4, 0);
			window[3] = byte[0];
		}

		if filled == 4 && window == CAPTURE_PATTERN {
			return Ok(Some(position + 1 - 4));
		}

		position += 1;
	}
}

/// The standard Ogg CRC-32 polynomial (0x04c11db7), reflected, precomputed as a 256-entry
/// table. Unlike the common zlib/PNG CRC-32, Ogg's variant has no input/output reflection
/// and no final XOR.
fn crc32(data: &[u8]) -> u32 {
	static TABLE: [u32; 256] = build_crc_table();

	let mut crc = 0u32;
	for &byte in data {
		crc = (crc << 8) ^ TABLE[(((crc >> 24) ^ byte as u32) & 0xff) as usize];
	}
	crc
}

const fn build_crc_table() -> [u32; 256] {
	let mut table = [0u32; 256];
	let mut i = 0;
	while i < 256 {
		let mut crc = (i as u32) << 24;
		let mut j = 0;
		while j < 8 {
			crc = if crc & 0x8000_0000 != 0 {
				(crc << 1) ^ 0x04c1_1db7
			} else {
				crc << 1
			};
			j += 1;
		}
		table[i] = crc;
		i += 1;
	}
	table
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use super::*;

	fn build_page(
		header_type: u8,
		granule_position: i64,
		serial_number: u32,
		sequence_number: u32,
		segments: &[&[u8]]
	) -> Vec<u8> {
		let segment_table: Vec<u8> = segments
			.iter()
			.flat_map(|segment| {
				let mut lacing = vec![255u8; segment.len() / 255];
				lacing.push((segment.len() % 255) as u8);
				lacing
			})
			.collect();

		let mut fixed = Vec::with_capacity(27);
		fixed.extend_from_slice(&CAPTURE_PATTERN);
		fixed.push(0); // version
		fixed.push(header_type);
		fixed.extend_from_slice(&granule_position.to_le_bytes());
		fixed.extend_from_slice(&serial_number.to_le_bytes());
		fixed.extend_from_slice(&sequence_number.to_le_bytes());
		fixed.extend_from_slice(&[0u8; 4]); // CRC placeholder
		fixed.push(segment_table.len() as u8);

		let mut page = fixed;
		page.extend_from_slice(&segment_table);
		for segment in segments {
			page.extend_from_slice(segment);
		}

		let crc = crc32(&page);
		page[22..26].copy_from_slice(&crc.to_le_bytes());
		page
	}

	#[test]
	fn reads_single_segment_packets() {
		let page = build_page(0x02, 0, 1, 0, &[b"abc", b"defgh"]);
		let mut reader = PacketReader::new(Cursor::new(page));

		assert_eq!(reader.next_packet().unwrap().as_deref(), Some(&b"abc"[..]));
		assert_eq!(reader.next_packet().unwrap().as_deref(), Some(&b"defgh"[..]));
	}

	#[test]
	fn reassembles_packet_spanning_pages() {
		let first_segment = vec![0xAAu8; 255];
		let page1 = build_page(0x02, -1, 1, 0, &[&first_segment]);
		let page2 = build_page(0x04, 10, 1, 1, &[b"tail"]);

		let mut combined = page1;
		combined.extend_from_slice(&page2);

		let mut reader = PacketReader::new(Cursor::new(combined));
		let packet = reader.next_packet().unwrap().unwrap();
		assert_eq!(packet.len(), 255 + 4);
		assert_eq!(&packet[255..], b"tail");
		assert_eq!(reader.last_granule_position(), 10);
	}

	#[test]
	fn rejects_bad_crc() {
		let mut page = build_page(0x02, 0, 1, 0, &[b"abc"]);
		let last = page.len() - 1;
		page[last] ^= 0xFF;

		let mut reader = PacketReader::new(Cursor::new(page));
		assert!(matches!(reader.next_packet(), Err(OggError::CrcMismatch)));
	}

	#[test]
	fn finds_next_page_after_leading_garbage() {
		let page = build_page(0x06, 5, 1, 0, &[b"mine"]);
		let mut combined = vec![0xDE, 0xAD, 0xBE, 0xEF];
		combined.extend_from_slice(&page);

		let mut source = Cursor::new(combined);
		let offset = find_next_page(&mut source, 0).unwrap();
		assert_eq!(offset, Some(4));
	}

	#[test]
	fn reads_page_at_located_offset() {
		let page = build_page(0x06, 5, 1, 0, &[b"mine"]);
		let mut source = Cursor::new(page.clone());

		let located = read_page_at(&mut source, 0).unwrap();
		assert_eq!(located.payload, b"mine");
		assert_eq!(located.end_offset, page.len() as u64);
	}

	#[test]
	fn skips_pages_from_other_streams() {
		let foreign = build_page(0x02, 0, 99, 0, &[b"ignored"]);
		let own = build_page(0x06, 5, 1, 0, &[b"mine"]);

		let mut combined = foreign;
		combined.extend_from_slice(&own);

		let mut reader = PacketReader::new(Cursor::new(combined));
		// The first page read locks onto serial 99 since it is the very first page seen;
		// simulate the framer already having locked onto stream 1 by constructing it
		// with that expectation up front instead
		reader.serial_number = Some(1);
		assert_eq!(reader.next_packet().unwrap().as_deref(), Some(&b"mine"[..]));
	}
}
