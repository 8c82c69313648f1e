//! Builds a minimal, synthetic Vorbis-in-Ogg stream bit by bit and checks that it opens.
//!
//! This exercises the whole header parsing pipeline end to end (identification, comment and
//! setup headers, wrapped in real Ogg pages with real CRCs) without depending on a binary
//! fixture file, which would otherwise need to be generated by an external encoder and
//! carried around as opaque bytes.

use std::io::Cursor;

use vorbis_bitpack::{BitpackWriter, bitpacked_integer_width};
use vorbis_decoder::OpenOptions;

const CAPTURE_PATTERN: [u8; 4] = *b"OggS";

fn crc32(data: &[u8]) -> u32 {
	let mut crc = 0u32;
	for &byte in data {
		crc = (crc << 8) ^ CRC_TABLE[(((crc >> 24) ^ byte as u32) & 0xff) as usize];
	}
	crc
}

static CRC_TABLE: [u32; 256] = build_crc_table();

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

fn build_page(header_type: u8, granule_position: i64, serial_number: u32, sequence_number: u32, packet: &[u8]) -> Vec<u8> {
	let mut lacing: Vec<u8> = vec![255u8; packet.len() / 255];
	lacing.push((packet.len() % 255) as u8);

	let mut fixed = Vec::with_capacity(27);
	fixed.extend_from_slice(&CAPTURE_PATTERN);
	fixed.push(0);
	fixed.push(header_type);
	fixed.extend_from_slice(&granule_position.to_le_bytes());
	fixed.extend_from_slice(&serial_number.to_le_bytes());
	fixed.extend_from_slice(&sequence_number.to_le_bytes());
	fixed.extend_from_slice(&[0u8; 4]);
	fixed.push(lacing.len() as u8);

	let mut page = fixed;
	page.extend_from_slice(&lacing);
	page.extend_from_slice(packet);

	let crc = crc32(&page);
	page[22..26].copy_from_slice(&crc.to_le_bytes());
	page
}

fn identification_packet() -> Vec<u8> {
	let mut packet = vec![1u8];
	packet.extend_from_slice(b"vorbis");
	packet.extend_from_slice(&0u32.to_le_bytes()); // version
	packet.push(1); // channels
	packet.extend_from_slice(&44_100u32.to_le_bytes()); // sample rate
	packet.extend_from_slice(&0i32.to_le_bytes()); // max bitrate
	packet.extend_from_slice(&0i32.to_le_bytes()); // nominal bitrate
	packet.extend_from_slice(&0i32.to_le_bytes()); // min bitrate
	packet.push(0x98); // blocksize_0 = 2^8 = 256, blocksize_1 = 2^9 = 512
	packet.push(1); // framing bit
	packet
}

fn comment_packet() -> Vec<u8> {
	let mut packet = vec![3u8];
	packet.extend_from_slice(b"vorbis");
	let vendor = b"integration test";
	packet.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
	packet.extend_from_slice(vendor);
	packet.extend_from_slice(&0u32.to_le_bytes()); // no user comments
	packet.push(1);
	packet
}

fn setup_packet() -> Vec<u8> {
	let mut body = Vec::new();
	{
		let mut w = BitpackWriter::new(&mut body);

		// One codebook: 1 entry, 1-bit codeword (the spec's single-entry degenerate case),
		// no vector quantization lookup.
		w.write_unsigned_integer(0, bitpacked_integer_width!(8)).unwrap(); // codebook count - 1
		w.write_unsigned_integer(0x56_4342, bitpacked_integer_width!(24)).unwrap(); // sync
		w.write_unsigned_integer(1, bitpacked_integer_width!(16)).unwrap(); // dimensions
		w.write_unsigned_integer(1, bitpacked_integer_width!(24)).unwrap(); // entries
		w.write_flag(true).unwrap(); // ordered
		w.write_unsigned_integer(0, bitpacked_integer_width!(5)).unwrap(); // initial length - 1
		w.write_unsigned_integer(1, bitpacked_integer_width!(1)).unwrap(); // run length
		w.write_unsigned_integer(0, bitpacked_integer_width!(4)).unwrap(); // lookup type

		w.write_unsigned_integer(0, bitpacked_integer_width!(6)).unwrap(); // time count - 1
		w.write_unsigned_integer(0, bitpacked_integer_width!(16)).unwrap(); // reserved placeholder

		// One Floor 1 with zero partitions: just the two implicit endpoint X values.
		w.write_unsigned_integer(0, bitpacked_integer_width!(6)).unwrap(); // floor count - 1
		w.write_unsigned_integer(1, bitpacked_integer_width!(16)).unwrap(); // floor type
		w.write_unsigned_integer(0, bitpacked_integer_width!(5)).unwrap(); // partitions
		w.write_unsigned_integer(0, bitpacked_integer_width!(2)).unwrap(); // multiplier - 1
		w.write_unsigned_integer(8, bitpacked_integer_width!(4)).unwrap(); // range bits

		// One residue, type 1, with no cascade bits set (every partition is skipped).
		w.write_unsigned_integer(0, bitpacked_integer_width!(6)).unwrap(); // residue count - 1
		w.write_unsigned_integer(1, bitpacked_integer_width!(16)).unwrap(); // residue type
		w.write_unsigned_integer(0, bitpacked_integer_width!(24)).unwrap(); // begin
		w.write_unsigned_integer(128, bitpacked_integer_width!(24)).unwrap(); // end
		w.write_unsigned_integer(7, bitpacked_integer_width!(24)).unwrap(); // partition size - 1
		w.write_unsigned_integer(0, bitpacked_integer_width!(6)).unwrap(); // classifications - 1
		w.write_unsigned_integer(0, bitpacked_integer_width!(8)).unwrap(); // classbook
		w.write_unsigned_integer(0, bitpacked_integer_width!(3)).unwrap(); // cascade low bits
		w.write_flag(false).unwrap(); // no cascade high bits

		// One mapping: one submap, no coupling.
		w.write_unsigned_integer(0, bitpacked_integer_width!(6)).unwrap(); // mapping count - 1
		w.write_unsigned_integer(0, bitpacked_integer_width!(16)).unwrap(); // mapping type
		w.write_flag(false).unwrap(); // submaps flag
		w.write_flag(false).unwrap(); // coupling flag
		w.write_unsigned_integer(0, bitpacked_integer_width!(2)).unwrap(); // reserved
		w.write_unsigned_integer(0, bitpacked_integer_width!(8)).unwrap(); // time config placeholder
		w.write_unsigned_integer(0, bitpacked_integer_width!(8)).unwrap(); // floor number
		w.write_unsigned_integer(0, bitpacked_integer_width!(8)).unwrap(); // residue number

		// One mode, always selecting the short blocksize.
		w.write_unsigned_integer(0, bitpacked_integer_width!(6)).unwrap(); // mode count - 1
		w.write_flag(false).unwrap(); // blockflag
		w.write_unsigned_integer(0, bitpacked_integer_width!(16)).unwrap(); // windowtype
		w.write_unsigned_integer(0, bitpacked_integer_width!(16)).unwrap(); // transformtype
		w.write_unsigned_integer(0, bitpacked_integer_width!(8)).unwrap(); // mapping number

		w.finalize().unwrap();
	}

	let mut packet = vec![5u8];
	packet.extend_from_slice(b"vorbis");
	packet.extend_from_slice(&body);
	packet
}

#[test]
fn opens_a_minimal_synthetic_stream() {
	let mut stream = Vec::new();
	stream.extend_from_slice(&build_page(0x02, 0, 42, 0, &identification_packet()));
	stream.extend_from_slice(&build_page(0x00, 0, 42, 1, &comment_packet()));
	stream.extend_from_slice(&build_page(0x04, 0, 42, 2, &setup_packet()));

	let decoder = OpenOptions::new().open(Cursor::new(stream)).unwrap();

	assert_eq!(decoder.channels(), 1);
	assert_eq!(decoder.sample_rate(), 44_100);
	assert_eq!(decoder.comment().vendor_string(), b"integration test");
}
