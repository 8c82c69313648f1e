//! Floor curve decode (§ 7 of the spec).
//!
//! A floor curve is a coarse approximation of a channel's spectral envelope for one frame,
//! reconstructed from a handful of Huffman-coded amplitude points and then multiplied,
//! sample by sample, against the residue vector to recover the full spectrum. Floor 1 is the
//! type every real-world Vorbis I encoder emits; Floor 0 is parsed (so setup headers that use
//! it don't fail to open) but its synthesis is a declared non-goal, so decoding an audio
//! packet that selects it is a recoverable [`FrameError::UnsupportedFloor0Synthesis`].

use crate::bitreader::BitReader;
use crate::codebook::Codebook;
use crate::error::FrameError;
use crate::setup::Floor1Config;

/// The four multiplier ranges a Floor 1 curve's Y values are quantized to (§ 7.2.1).
const MULTIPLIER_RANGES: [i32; 4] = [256, 128, 86, 64];

/// Decodes a Floor 1 curve, or returns `None` if the frame's nonzero-energy flag is clear
/// (the whole curve, and hence this channel's spectrum, is silent for this frame).
pub(crate) fn decode_floor1(
	reader: &mut BitReader<'_>,
	config: &Floor1Config,
	codebooks: &[Codebook],
	line_count: usize
) -> Result<Option<Vec<f32>>, FrameError> {
	if !reader.get_flag() {
		return Ok(None);
	}

	let range = MULTIPLIER_RANGES[config.multiplier as usize - 1];
	let range_bits = crate::setup::ilog(range - 1);

	let points = config.x_list.len();
	let mut y = vec![0i32; points];
	y[0] = reader.get_bits(range_bits) as i32;
	y[1] = reader.get_bits(range_bits) as i32;

	let mut offset = 2;
	for &class in &config.partition_class_list {
		let class = class as usize;
		let dims = config.class_dimensions[class] as usize;
		let class_bits = config.class_subclasses[class];
		let subclass_mask = (1u32 << class_bits) - 1;

		let mut cval = if class_bits > 0 {
			let masterbook = &codebooks[config.class_masterbooks[class] as usize];
			masterbook
				.decode_entry_number(reader)
				.ok_or(FrameError::EndOfPacket)?
		} else {
			0
		};

		for j in 0..dims {
			let book = config.subclass_books[class][(cval & subclass_mask) as usize];
			cval >>= class_bits;

			let value = match book {
				Some(book) => codebooks[book as usize]
					.decode_entry_number(reader)
					.ok_or(FrameError::EndOfPacket)? as i32,
				None => 0
			};

			if offset + j < points {
				y[offset + j] = value;
			}
		}
		offset += dims;
	}

	let curve_positions = synthesize_amplitudes(&config.x_list, &y, range);
	Ok(Some(render_curve(&config.x_list, &curve_positions, line_count)))
}

/// Amplitude synthesis (§ 7.2.3): reconstructs the actual curve amplitude at each point from
/// its Huffman-coded residual and its two nearest already-placed neighbors.
fn synthesize_amplitudes(x_list: &[u16], y: &[i32], range: i32) -> Vec<i32> {
	let points = x_list.len();
	let mut step2_flag = vec![false; points];
	let mut final_y = vec![0i32; points];

	step2_flag[0] = true;
	step2_flag[1] = true;
	final_y[0] = y[0];
	final_y[1] = y[1];

	for i in 2..points {
		let low = low_neighbor(x_list, i);
		let high = high_neighbor(x_list, i);

		let predicted = render_point(
			x_list[low] as i32,
			final_y[low],
			x_list[high] as i32,
			final_y[high],
			x_list[i] as i32
		);

		let value = y[i];
		let highroom = range - predicted;
		let lowroom = predicted;
		let room = 2 * highroom.min(lowroom);

		if value != 0 {
			step2_flag[low] = true;
			step2_flag[high] = true;
			step2_flag[i] = true;

			final_y[i] = if value >= room {
				if highroom > lowroom {
					value - lowroom + predicted
				} else {
					predicted - value + highroom - 1
				}
			} else if value & 1 != 0 {
				predicted - value.div_euclid(2) - 1
			} else {
				predicted + value / 2
			};
		} else {
			final_y[i] = predicted;
		}
	}

	for (i, flag) in step2_flag.iter().enumerate() {
		if !flag {
			final_y[i] = -1;
		}
	}

	final_y
}

/// Finds the point with the greatest X coordinate less than `x_list[i]`, considering only
/// points decoded before it in declaration order (§ 7.2.3's neighbor definition).
fn low_neighbor(x_list: &[u16], i: usize) -> usize {
	(0..i)
		.max_by_key(|&j| (x_list[j] < x_list[i], x_list[j]))
		.unwrap_or(0)
}

/// Finds the point with the smallest X coordinate greater than `x_list[i]`, considering only
/// points decoded before it in declaration order.
fn high_neighbor(x_list: &[u16], i: usize) -> usize {
	(0..i)
		.min_by_key(|&j| (x_list[j] <= x_list[i], x_list[j]))
		.unwrap_or(0)
}

/// Linear interpolation between two points (§ 7.2.3), used both to predict an amplitude and
/// (per-sample) to rasterize the final curve.
fn render_point(x0: i32, y0: i32, x1: i32, y1: i32, x: i32) -> i32 {
	let dy = y1 - y0;
	let adx = (x1 - x0).max(1);
	let ady = dy.abs();
	let err = ady * (x - x0);
	let offset = err / adx;
	if dy < 0 { y0 - offset } else { y0 + offset }
}

/// Rasterizes the piecewise-linear curve across `line_count` spectral lines, converting each
/// dB-domain sample to a linear amplitude multiplier via [`INVERSE_DB_TABLE`].
fn render_curve(x_list: &[u16], final_y: &[i32], line_count: usize) -> Vec<f32> {
	let mut order: Vec<usize> = (0..x_list.len()).filter(|&i| final_y[i] >= 0).collect();
	order.sort_unstable_by_key(|&i| x_list[i]);

	let mut curve = vec![0.0f32; line_count];
	if order.is_empty() {
		return curve;
	}

	for window in order.windows(2) {
		let (i0, i1) = (window[0], window[1]);
		let (x0, x1) = (x_list[i0] as usize, x_list[i1] as usize);
		let (y0, y1) = (final_y[i0], final_y[i1]);

		for x in x0..x1.min(line_count) {
			let y = render_point(x0 as i32, y0, x1 as i32, y1, x as i32);
			curve[x] = inverse_db(y);
		}
	}

	if let Some(&last) = order.last() {
		let x_last = x_list[last] as usize;
		if x_last < line_count {
			curve[x_last] = inverse_db(final_y[last]);
		}
	}

	curve
}

/// Converts a quantized Floor 1 amplitude (clamped to `[0, 255]`) to a linear multiplier via
/// [`INVERSE_DB_TABLE`].
fn inverse_db(value: i32) -> f32 {
	INVERSE_DB_TABLE[value.clamp(0, 255) as usize]
}

/// The dB-to-linear lookup table mandated by § 7.2.4: quantized amplitude `y` maps to linear
/// multiplier `INVERSE_DB_TABLE[y]`. Block-copied from the specification; encoder and decoder
/// must agree on these exact values for the floor curve to be bit-exact.
#[rustfmt::skip]
const INVERSE_DB_TABLE: [f32; 256] = [
	1.0649863e-07, 1.1341951e-07, 1.2079015e-07, 1.2863978e-07,
	1.3699951e-07, 1.4590251e-07, 1.5538408e-07, 1.6548181e-07,
	1.7623575e-07, 1.8768855e-07, 1.9988561e-07, 2.1287530e-07,
	2.2670913e-07, 2.4144197e-07, 2.5713223e-07, 2.7384213e-07,
	2.9163793e-07, 3.1059021e-07, 3.3077411e-07, 3.5226968e-07,
	3.7516214e-07, 3.9954229e-07, 4.2550680e-07, 4.5315863e-07,
	4.8260743e-07, 5.1396998e-07, 5.4737065e-07, 5.8294187e-07,
	6.2082472e-07, 6.6116941e-07, 7.0413592e-07, 7.4989464e-07,
	7.9862701e-07, 8.5052630e-07, 9.0579828e-07, 9.6466216e-07,
	1.0273513e-06, 1.0941144e-06, 1.1652161e-06, 1.2409384e-06,
	1.3215816e-06, 1.4074654e-06, 1.4989305e-06, 1.5963394e-06,
	1.7000785e-06, 1.8105592e-06, 1.9282195e-06, 2.0535261e-06,
	2.1869758e-06, 2.3290978e-06, 2.4804557e-06, 2.6416497e-06,
	2.8133190e-06, 2.9961443e-06, 3.1908506e-06, 3.3982101e-06,
	3.6190449e-06, 3.8542308e-06, 4.1047004e-06, 4.3714470e-06,
	4.6555282e-06, 4.9580707e-06, 5.2802740e-06, 5.6234160e-06,
	5.9888572e-06, 6.3780469e-06, 6.7925283e-06, 7.2339451e-06,
	7.7040476e-06, 8.2047000e-06, 8.7378876e-06, 9.3057248e-06,
	9.9104632e-06, 1.0554501e-05, 1.1240392e-05, 1.1970856e-05,
	1.2748789e-05, 1.3577278e-05, 1.4459606e-05, 1.5399272e-05,
	1.6400004e-05, 1.7465768e-05, 1.8600792e-05, 1.9809576e-05,
	2.1096914e-05, 2.2467911e-05, 2.3928002e-05, 2.5482978e-05,
	2.7139006e-05, 2.8902651e-05, 3.0780908e-05, 3.2781225e-05,
	3.4911534e-05, 3.7180282e-05, 3.9596466e-05, 4.2169667e-05,
	4.4910090e-05, 4.7828601e-05, 5.0936773e-05, 5.4246931e-05,
	5.7772202e-05, 6.1526565e-05, 6.5524908e-05, 6.9783085e-05,
	7.4317983e-05, 7.9147585e-05, 8.4291040e-05, 8.9768747e-05,
	9.5602426e-05, 0.00010181521, 0.00010843174, 0.00011547824,
	0.00012298267, 0.00013097477, 0.00013948625, 0.00014855085,
	0.00015820453, 0.00016848555, 0.00017943469, 0.00019109536,
	0.00020351382, 0.00021673929, 0.00023082423, 0.00024582449,
	0.00026179955, 0.00027881276, 0.00029693158, 0.00031622787,
	0.00033677814, 0.00035866388, 0.00038197188, 0.00040679456,
	0.00043323036, 0.00046138411, 0.00049136745, 0.00052329927,
	0.00055730621, 0.00059352311, 0.00063209358, 0.00067317058,
	0.00071691700, 0.00076350630, 0.00081312324, 0.00086596457,
	0.00092223983, 0.00098217216, 0.0010459992, 0.0011139742,
	0.0011863665, 0.0012634633, 0.0013455702, 0.0014330129,
	0.0015261382, 0.0016253153, 0.0017309374, 0.0018434235,
	0.0019632195, 0.0020908006, 0.0022266726, 0.0023713743,
	0.0025254795, 0.0026895994, 0.0028643847, 0.0030505286,
	0.0032487691, 0.0034598925, 0.0036847358, 0.0039241906,
	0.0041792066, 0.0044507950, 0.0047400328, 0.0050480668,
	0.0053761186, 0.0057254891, 0.0060975636, 0.0064938176,
	0.0069158225, 0.0073652516, 0.0078438871, 0.0083536271,
	0.0088964928, 0.009474637,  0.010090352,  0.010746080,
	0.011444421,  0.012188144,  0.012980198,  0.013823725,
	0.014722068,  0.015678791,  0.016697687,  0.017782797,
	0.018938423,  0.020169149,  0.021479854,  0.022875735,
	0.024362330,  0.025945531,  0.027631618,  0.029427276,
	0.031339626,  0.033376252,  0.035545228,  0.037855157,
	0.040315199,  0.042935108,  0.045725273,  0.048696758,
	0.051861348,  0.055231591,  0.058820850,  0.062643361,
	0.066714279,  0.071049749,  0.075666962,  0.080584227,
	0.085821044,  0.091398179,  0.097337747,  0.10366330,
	0.11039993,   0.11757434,   0.12521498,   0.13335215,
	0.14201813,   0.15124727,   0.16107617,   0.17154380,
	0.18269168,   0.19456402,   0.20720788,   0.22067342,
	0.23501402,   0.25028656,   0.26655159,   0.28387361,
	0.30232132,   0.32196786,   0.34289114,   0.36517414,
	0.38890521,   0.41417847,   0.44109412,   0.46975890,
	0.50028648,   0.53279791,   0.56742212,   0.60429640,
	0.64356699,   0.68538959,   0.72993007,   0.77736504,
	0.82788260,   0.88168307,   0.9389798,    1.0
];

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn render_point_interpolates_linearly() {
		assert_eq!(render_point(0, 0, 10, 100, 5), 50);
		assert_eq!(render_point(0, 100, 10, 0, 5), 50);
	}

	#[test]
	fn inverse_db_is_monotonically_increasing() {
		assert!(inverse_db(0) < inverse_db(128));
		assert!(inverse_db(128) < inverse_db(255));
	}

	#[test]
	fn inverse_db_matches_the_table_endpoints_and_clamps() {
		assert_eq!(inverse_db(0), 1.0649863e-07);
		assert_eq!(inverse_db(255), 1.0);
		assert_eq!(inverse_db(-5), inverse_db(0));
		assert_eq!(inverse_db(1000), inverse_db(255));
	}

	#[test]
	fn low_and_high_neighbors_use_declaration_order() {
		let x_list = [0u16, 64, 32];
		assert_eq!(low_neighbor(&x_list, 2), 0);
		assert_eq!(high_neighbor(&x_list, 2), 1);
	}
}
