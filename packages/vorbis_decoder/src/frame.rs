//! Frame assembly (§ 4.3 and § 4.9 of the spec).
//!
//! Turns one audio packet into the block of per-channel PCM samples it contributes: mode and
//! window selection, per-channel floor and residue decode, forward nonzero propagation and
//! reverse inverse channel coupling (§ 4.7), the inverse MDCT, and windowed overlap-add with
//! the tail left over from the previous block.
//!
//! A long block adjacent to a short one only overlaps over the short block's half-length, so
//! its window's rising or falling slope is centered rather than pinned to the block's own
//! edges (`left_start`/`left_end`/`right_start`/`right_end`, § 4.9). Only the sample range
//! `[left_start, right_start)` is ever returned to the caller; the tail carried over for the
//! next block's overlap-add is `[right_start, right_end)`, and anything beyond `right_end` is
//! computed but discarded.

use crate::bitreader::BitReader;
use crate::error::FrameError;
use crate::floor::decode_floor1;
use crate::mdct::inverse_mdct;
use crate::residue;
use crate::setup::{FloorConfig, Mapping, Mode, ResidueConfig, Setup, ilog};
use crate::window::compute_window;

/// Per-channel state carried between successive audio packets: the windowed tail samples
/// awaiting overlap-add with the next block.
pub(crate) struct FrameAssembler {
	channels: usize,
	blocksize_0: u16,
	blocksize_1: u16,
	previous_tail: Vec<Vec<f32>>,
	has_previous_block: bool
}

impl FrameAssembler {
	pub(crate) fn new(channels: usize, blocksize_0: u16, blocksize_1: u16) -> Self {
		Self {
			channels,
			blocksize_0,
			blocksize_1,
			previous_tail: vec![Vec::new(); channels],
			has_previous_block: false
		}
	}

	/// Drops the carried-over tail from the previously decoded block.
	///
	/// Called after a recoverable decode error: a discarded frame may have desynchronized the
	/// bit position or window alignment the old tail assumed, so the next successfully decoded
	/// block must not be overlap-added against it (§ 4.9's "previous_length set to zero to
	/// prevent bleed-through").
	pub(crate) fn discard_previous_tail(&mut self) {
		self.has_previous_block = false;
		for tail in &mut self.previous_tail {
			tail.clear();
		}
	}

	/// Decodes one audio packet, returning `channels` vectors of interleavable f32 samples
	/// (empty for the very first block, which has no previous tail to overlap with).
	pub(crate) fn decode_packet(
		&mut self,
		packet: &[u8],
		setup: &Setup
	) -> Result<Vec<Vec<f32>>, FrameError> {
		let mut reader = BitReader::new(packet);

		// The leading packet type bit must be clear for audio packets (§ 4.2.1)
		if reader.get_flag() {
			return Err(FrameError::NotAudioPacket);
		}

		let mode_bits = ilog(setup.modes.len() as i32 - 1);
		let mode_number = reader.get_bits(mode_bits);
		let mode = setup
			.modes
			.get(mode_number as usize)
			.ok_or(FrameError::InvalidModeNumber(mode_number))?;

		let n = if mode.blockflag {
			self.blocksize_1
		} else {
			self.blocksize_0
		} as usize;
		let half = n / 2;

		let (previous_long, next_long) = if mode.blockflag {
			(reader.get_flag(), reader.get_flag())
		} else {
			(false, false)
		};
		let (left_start, left_end, right_start, right_end) =
			window_bounds(n, self.blocksize_0 as usize, mode.blockflag, previous_long, next_long);

		let mapping = &setup.mappings[mode.mapping as usize];

		let floors = self.decode_floors(&mut reader, mapping, setup, half)?;
		let needs_residue = propagate_nonzero(mapping, &floors);
		let residues = self.decode_residues(&mut reader, mapping, setup, half, &needs_residue)?;

		let mut spectra: Vec<Vec<f32>> = floors
			.iter()
			.zip(residues.iter())
			.map(|(floor, residue)| match floor {
				Some(floor) => floor.iter().zip(residue).map(|(f, r)| f * r).collect(),
				None => vec![0.0f32; half]
			})
			.collect();

		apply_inverse_coupling(mapping, &mut spectra);

		let window = compute_window(n, left_start, left_end, right_start, right_end);
		let mdct_tables = &setup.mdct_tables[mode.blockflag as usize];
		let mut output = vec![Vec::new(); self.channels];

		for channel in 0..self.channels {
			let time_domain = inverse_mdct(&spectra[channel], mdct_tables);
			let mut windowed: Vec<f32> = time_domain
				.iter()
				.zip(window.iter())
				.map(|(&sample, &w)| sample * w)
				.collect();

			let previous = &self.previous_tail[channel];
			let overlap = previous.len().min(left_end - left_start);
			for (i, sample) in previous.iter().take(overlap).enumerate() {
				windowed[left_start + i] += sample;
			}

			if self.has_previous_block {
				output[channel] = windowed[left_start..right_start].to_vec();
			}

			self.previous_tail[channel] = windowed[right_start..right_end].to_vec();
		}

		self.has_previous_block = true;
		Ok(output)
	}

	fn decode_floors(
		&self,
		reader: &mut BitReader<'_>,
		mapping: &Mapping,
		setup: &Setup,
		line_count: usize
	) -> Result<Vec<Option<Vec<f32>>>, FrameError> {
		let mut floors = Vec::with_capacity(self.channels);
		for channel in 0..self.channels {
			let submap = mapping.channel_mux[channel] as usize;
			let floor_number = mapping.submap_floor[submap] as usize;

			let curve = match &setup.floors[floor_number] {
				FloorConfig::Floor1(config) => {
					decode_floor1(reader, config, &setup.codebooks, line_count)?
				}
				FloorConfig::Floor0(_) => return Err(FrameError::UnsupportedFloor0Synthesis)
			};
			floors.push(curve);
		}
		Ok(floors)
	}

	fn decode_residues(
		&self,
		reader: &mut BitReader<'_>,
		mapping: &Mapping,
		setup: &Setup,
		line_count: usize,
		needs_residue: &[bool]
	) -> Result<Vec<Vec<f32>>, FrameError> {
		let mut residues = vec![Vec::new(); self.channels];

		let submap_count = mapping.submap_floor.len();
		for submap in 0..submap_count {
			let submap_channels: Vec<usize> = (0..self.channels)
				.filter(|&ch| mapping.channel_mux[ch] as usize == submap)
				.collect();
			if submap_channels.is_empty() {
				continue;
			}

			let residue_config = &setup.residues[mapping.submap_residue[submap] as usize];

			if residue_config.residue_type == 2 && submap_channels.len() > 1 {
				decode_type2_submap(
					reader,
					residue_config,
					setup,
					line_count,
					&submap_channels,
					needs_residue,
					&mut residues
				)?;
			} else {
				for &channel in &submap_channels {
					residues[channel] = residue::decode_residue_vector(
						reader,
						residue_config,
						&setup.codebooks,
						line_count,
						!needs_residue[channel]
					)?;
				}
			}
		}

		Ok(residues)
	}
}

/// Decodes a residue type 2 submap's virtually-interleaved combined vector and de-interleaves
/// it back out to each of its member channels.
fn decode_type2_submap(
	reader: &mut BitReader<'_>,
	residue_config: &ResidueConfig,
	setup: &Setup,
	line_count: usize,
	submap_channels: &[usize],
	needs_residue: &[bool],
	residues: &mut [Vec<f32>]
) -> Result<(), FrameError> {
	let skip = submap_channels.iter().all(|&ch| !needs_residue[ch]);
	let combined = residue::decode_residue_vector(
		reader,
		residue_config,
		&setup.codebooks,
		line_count * submap_channels.len(),
		skip
	)?;

	for (i, &channel) in submap_channels.iter().enumerate() {
		residues[channel] = combined
			.iter()
			.skip(i)
			.step_by(submap_channels.len())
			.copied()
			.collect();
	}

	Ok(())
}

/// § 4.9: the window-boundary offsets for a block of total length `n`. A long block only
/// tapers over the short blocksize's half-length when its neighbor on that side is short, and
/// that taper is centered in the long block rather than pinned to its own edges. A short
/// block's own window always spans its full length, so `is_long_block` false ignores
/// `previous_long`/`next_long` entirely. Returns `(left_start, left_end, right_start,
/// right_end)`.
fn window_bounds(
	n: usize,
	blocksize_0: usize,
	is_long_block: bool,
	previous_long: bool,
	next_long: bool
) -> (usize, usize, usize, usize) {
	let half = n / 2;

	if !is_long_block {
		return (0, half, half, n);
	}

	let (left_start, left_end) =
		if previous_long { (0, half) } else { ((n - blocksize_0) >> 2, (n + blocksize_0) >> 2) };
	let (right_start, right_end) =
		if next_long { (half, n) } else { ((n * 3 - blocksize_0) >> 2, (n * 3 + blocksize_0) >> 2) };

	(left_start, left_end, right_start, right_end)
}

/// Forward nonzero propagation (§ 4.7): a coupling pair needs its residue decoded for both
/// channels if either has a nonzero floor, so the decoded bitstream's channel ordering stays
/// in sync even though only one channel's floor was actually energetic.
fn propagate_nonzero(mapping: &Mapping, floors: &[Option<Vec<f32>>]) -> Vec<bool> {
	let mut needs = floors.iter().map(Option::is_some).collect::<Vec<_>>();
	for &(magnitude, angle) in &mapping.coupling_steps {
		let needed = needs[magnitude as usize] || needs[angle as usize];
		needs[magnitude as usize] = needed;
		needs[angle as usize] = needed;
	}
	needs
}

/// Inverse channel coupling (§ 4.7): walks coupling pairs in reverse declaration order,
/// turning each magnitude/angle polar pair back into the two channels' actual spectra.
fn apply_inverse_coupling(mapping: &Mapping, spectra: &mut [Vec<f32>]) {
	for &(magnitude, angle) in mapping.coupling_steps.iter().rev() {
		let (magnitude, angle) = (magnitude as usize, angle as usize);
		let len = spectra[magnitude].len().min(spectra[angle].len());

		for i in 0..len {
			let m = spectra[magnitude][i];
			let a = spectra[angle][i];

			let (left, right) = if m > 0.0 {
				if a > 0.0 { (m, m - a) } else { (m + a, m) }
			} else if a > 0.0 {
				(m, m + a)
			} else {
				(m - a, m)
			};

			spectra[magnitude][i] = left;
			spectra[angle][i] = right;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn short_block_window_spans_its_full_length() {
		assert_eq!(window_bounds(256, 256, false, true, true), (0, 128, 128, 256));
	}

	#[test]
	fn long_block_between_two_long_neighbors_is_uncentered() {
		assert_eq!(window_bounds(2048, 256, true, true, true), (0, 1024, 1024, 2048));
	}

	#[test]
	fn long_block_after_a_short_neighbor_centers_its_rising_slope() {
		let (left_start, left_end, right_start, right_end) = window_bounds(2048, 256, true, false, true);
		assert_eq!((left_start, left_end), ((2048 - 256) >> 2, (2048 + 256) >> 2));
		assert_eq!((right_start, right_end), (1024, 2048));
	}

	#[test]
	fn long_block_before_a_short_neighbor_centers_its_falling_slope() {
		let (left_start, left_end, right_start, right_end) = window_bounds(2048, 256, true, true, false);
		assert_eq!((left_start, left_end), (0, 1024));
		assert_eq!((right_start, right_end), ((2048 * 3 - 256) >> 2, (2048 * 3 + 256) >> 2));
	}

	#[test]
	fn propagate_nonzero_marks_both_sides_of_a_pair() {
		let mapping = Mapping {
			coupling_steps: vec![(0, 1)],
			channel_mux: vec![0, 0],
			submap_floor: vec![0],
			submap_residue: vec![0]
		};
		let floors = vec![Some(vec![1.0]), None];
		assert_eq!(propagate_nonzero(&mapping, &floors), vec![true, true]);
	}

	#[test]
	fn inverse_coupling_recovers_left_right_from_mid_side() {
		let mapping = Mapping {
			coupling_steps: vec![(0, 1)],
			channel_mux: vec![0, 0],
			submap_floor: vec![0],
			submap_residue: vec![0]
		};
		let mut spectra = vec![vec![4.0f32], vec![2.0f32]];
		apply_inverse_coupling(&mapping, &mut spectra);
		assert_eq!(spectra[0][0], 4.0);
		assert_eq!(spectra[1][0], 2.0);
	}
}
