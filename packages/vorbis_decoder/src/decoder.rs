//! The public decoder handle (§ 6 of the spec).

use std::io::{Read, Seek};

use log::{debug, warn};

use crate::comment::CommentHeader;
use crate::error::{DecoderError, FrameError, SetupError};
use crate::frame::FrameAssembler;
use crate::ogg::PacketReader;
use crate::packet::PacketType;
use crate::seek::{self, SeekBounds};
use crate::setup::{IdentificationHeader, Setup};

/// Options controlling how a [`Decoder`] is opened.
///
/// Currently there is nothing to configure beyond the byte source itself; this builder exists
/// so future options (e.g. a stricter or more lenient resynchronization policy) can be added
/// without breaking [`Decoder::open`]'s signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
	_private: ()
}

impl OpenOptions {
	/// Creates a new, default set of open options.
	pub fn new() -> Self {
		Self::default()
	}

	/// Opens a Vorbis decoder over a non-seekable byte source. [`Decoder::seek_to_sample`] and
	/// [`Decoder::total_samples`] are unavailable on the resulting handle.
	pub fn open<R: Read>(self, source: R) -> Result<Decoder<R>, DecoderError> {
		Decoder::open_sequential(source)
	}

	/// Opens a Vorbis decoder over a seekable byte source, enabling random access.
	pub fn open_seekable<R: Read + Seek>(self, source: R) -> Result<Decoder<R>, DecoderError> {
		Decoder::open_seekable(source)
	}
}

/// A decoded Vorbis I audio stream.
///
/// Constructed with [`OpenOptions`]. Reads are sequential, one audio frame's worth of samples
/// at a time; frames vary in length depending on the encoder's choice of long or short
/// blocks.
pub struct Decoder<R> {
	packets: PacketReader<R>,
	setup: Setup,
	comment: CommentHeader,
	assembler: FrameAssembler,
	sample_rate: u32,
	channels: u8,
	blocksize_0: u16,
	blocksize_1: u16,
	/// Byte range and serial number needed to seek; `None` for non-seekable sources.
	seek_bounds: Option<SeekBounds>,
	samples_decoded: i64,
	eof: bool
}

impl<R: Read> Decoder<R> {
	fn open_sequential(source: R) -> Result<Self, DecoderError> {
		Self::open_with(source, None)
	}

	fn open_with(source: R, seek_bounds: Option<SeekBounds>) -> Result<Self, DecoderError> {
		let mut packets = PacketReader::new(source);

		let identification_packet = next_packet_or_eof(&mut packets)?;
		let identification = IdentificationHeader::parse(&identification_packet)?;

		let comment_packet = next_packet_or_eof(&mut packets)?;
		let comment = CommentHeader::parse(&comment_packet)?;

		let setup_packet = next_packet_or_eof(&mut packets)?;
		let setup = Setup::parse(&setup_packet, &identification)?;

		debug!(
			"Opened Vorbis stream: {} channel(s), {} Hz",
			identification.channels, identification.sample_rate
		);

		let assembler = FrameAssembler::new(
			identification.channels as usize,
			identification.blocksize_0,
			identification.blocksize_1
		);

		Ok(Self {
			packets,
			sample_rate: identification.sample_rate,
			channels: identification.channels,
			blocksize_0: identification.blocksize_0,
			blocksize_1: identification.blocksize_1,
			setup,
			comment,
			assembler,
			seek_bounds,
			samples_decoded: 0,
			eof: false
		})
	}

	/// The stream's channel count.
	pub fn channels(&self) -> u8 {
		self.channels
	}

	/// The stream's sample rate, in Hz.
	pub fn sample_rate(&self) -> u32 {
		self.sample_rate
	}

	/// The stream's comment metadata (vendor string and user comments).
	pub fn comment(&self) -> &CommentHeader {
		&self.comment
	}

	/// The number of samples decoded so far, per channel.
	pub fn samples_decoded(&self) -> i64 {
		self.samples_decoded
	}

	/// Decodes and returns the next block of interleaved `f32` samples, or `None` at the end
	/// of the stream. A recoverable per-frame decode error (§ 7.2) discards that frame and
	/// moves on to the next one rather than failing the whole stream.
	pub fn read_f32(&mut self) -> Result<Option<Vec<f32>>, DecoderError> {
		loop {
			if self.eof {
				return Ok(None);
			}

			let Some(packet) = self.packets.next_packet().map_err(|e| {
				DecoderError::Io(std::io::Error::other(e.to_string()))
			})?
			else {
				self.eof = true;
				return Ok(None);
			};

			match self.decode_audio_packet(&packet) {
				Ok(Some(samples)) => return Ok(Some(samples)),
				// An empty (zero-length) return means this was a legitimate frame that
				// contributed no new overlap-added output yet (e.g. the stream's first
				// block); keep reading rather than surfacing a spurious empty buffer
				Ok(None) => continue,
				Err(error) => {
					warn!("Discarding audio frame after recoverable decode error: {error}");
					self.assembler.discard_previous_tail();
					continue;
				}
			}
		}
	}

	/// Like [`read_f32`](Self::read_f32), but converts samples to `i16` by rounding and
	/// saturating to the representable range.
	pub fn read_i16(&mut self) -> Result<Option<Vec<i16>>, DecoderError> {
		Ok(self.read_f32()?.map(|samples| {
			samples
				.iter()
				.map(|&sample| {
					let scaled = (sample * i16::MAX as f32).round();
					scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
				})
				.collect()
		}))
	}

	fn decode_audio_packet(&mut self, packet: &[u8]) -> Result<Option<Vec<f32>>, FrameError> {
		let channel_blocks = self.assembler.decode_packet(packet, &self.setup)?;
		if channel_blocks.iter().all(Vec::is_empty) {
			return Ok(None);
		}

		let frame_count = channel_blocks.iter().map(Vec::len).max().unwrap_or(0);
		let frame_count = truncate_final_frame(
			frame_count,
			self.samples_decoded,
			self.packets.at_last_page(),
			self.packets.last_granule_position()
		);
		if frame_count == 0 {
			return Ok(None);
		}

		let mut interleaved = Vec::with_capacity(frame_count * self.channels as usize);
		for i in 0..frame_count {
			for channel in &channel_blocks {
				interleaved.push(channel.get(i).copied().unwrap_or(0.0));
			}
		}

		self.samples_decoded += frame_count as i64;
		Ok(Some(interleaved))
	}
}

impl<R: Read + Seek> Decoder<R> {
	fn open_seekable(mut source: R) -> Result<Self, DecoderError> {
		let data_end = source.stream_position().and_then(|start| {
			let end = source.seek(std::io::SeekFrom::End(0))?;
			source.seek(std::io::SeekFrom::Start(start))?;
			Ok(end)
		})?;

		let serial_number = {
			let first_page = crate::ogg::read_page_at(&mut source, 0)
				.map_err(|_| DecoderError::InvalidOperation("could not locate the first Ogg page"))?;
			source.seek(std::io::SeekFrom::Start(0))?;
			first_page.header.serial_number
		};

		let bounds = SeekBounds {
			serial_number,
			data_start: 0,
			data_end
		};

		Self::open_with(source, Some(bounds))
	}

	/// The total number of samples in the stream, per channel, if it could be determined from
	/// the final page's granule position.
	pub fn total_samples(&mut self) -> Result<i64, DecoderError> {
		let bounds = self
			.seek_bounds
			.ok_or(DecoderError::InvalidOperation("stream is not seekable"))?;
		seek::total_samples(self.packets.source_mut(), bounds)
	}

	/// Seeks so that the next call to [`read_f32`](Self::read_f32) resumes at `target_sample`.
	///
	/// This performs a coarse page-granularity seek followed by forward decoding of the
	/// intervening samples within the target page, since granule positions only bound a page
	/// rather than pinpointing a sample inside it (§ 4.10).
	pub fn seek_to_sample(&mut self, target_sample: i64) -> Result<(), DecoderError> {
		let bounds = self
			.seek_bounds
			.ok_or(DecoderError::InvalidOperation("stream is not seekable"))?;

		let page_offset = seek::locate_page_for_sample(self.packets.source_mut(), bounds, target_sample)?;

		self.packets.reset_at(page_offset);
		self.assembler = FrameAssembler::new(self.channels as usize, self.blocksize_0, self.blocksize_1);
		self.eof = false;

		// Decode forward from the located page, discarding samples before the target; the
		// first decoded block after a reset never overlaps cleanly anyway (no previous tail)
		let mut decoded = 0i64;
		while decoded < target_sample {
			match self.read_f32()? {
				Some(samples) => decoded += samples.len() as i64 / self.channels.max(1) as i64,
				None => break
			}
		}
		self.samples_decoded = decoded;

		Ok(())
	}

}

fn next_packet_or_eof<R: Read>(packets: &mut PacketReader<R>) -> Result<Vec<u8>, SetupError> {
	packets
		.next_packet()?
		.ok_or(SetupError::TooSmallPacket(0))
}

/// § 4.9 step 5: on the stream's last page, the granule position is the true sample count, so a
/// frame that would overrun it is truncated rather than emitting samples the encoder never
/// claimed. `last_granule < 0` means no page has declared a granule position yet, and a frame
/// count of `0` when already past the granule means this packet contributed nothing new.
fn truncate_final_frame(frame_count: usize, samples_decoded: i64, at_last_page: bool, last_granule: i64) -> usize {
	if !at_last_page || last_granule < 0 {
		return frame_count;
	}

	let total_after_frame = samples_decoded + frame_count as i64;
	if total_after_frame <= last_granule {
		return frame_count;
	}

	(last_granule - samples_decoded).max(0) as usize
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn full_final_frame_is_truncated_to_the_last_page_granule() {
		// A full final frame of 1024 samples, but the last page only declares 10 more samples
		// past what was already decoded.
		let truncated = truncate_final_frame(1024, 2048, true, 2058);
		assert_eq!(truncated, 10);
	}

	#[test]
	fn frame_fitting_entirely_within_the_granule_is_untouched() {
		assert_eq!(truncate_final_frame(1024, 2048, true, 4096), 1024);
	}

	#[test]
	fn unknown_granule_position_leaves_the_frame_untouched() {
		assert_eq!(truncate_final_frame(1024, 2048, true, -1), 1024);
	}

	#[test]
	fn non_final_page_is_never_truncated() {
		assert_eq!(truncate_final_frame(1024, 1_000_000, false, 2048), 1024);
	}

	#[test]
	fn granule_already_exceeded_yields_an_empty_frame() {
		assert_eq!(truncate_final_frame(1024, 5000, true, 4096), 0);
	}
}
