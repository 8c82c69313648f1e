use std::io::Cursor;

use vorbis_decoder::OpenOptions;

fn main() {
	afl::fuzz!(|data: &[u8]| {
		// Each fuzz run has to be pretty fast. Just check that no crashes happen while
		// opening the stream and decoding every audio packet it has to offer.
		if let Ok(mut decoder) = OpenOptions::new().open(Cursor::new(data)) {
			loop {
				match decoder.read_f32() {
					Ok(Some(_)) => continue,
					Ok(None) | Err(_) => break
				}
			}
		}
	})
}
