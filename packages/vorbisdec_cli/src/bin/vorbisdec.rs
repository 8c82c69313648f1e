use std::borrow::Cow;
use std::env;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write, stdout};
use std::path::Path;
use std::process::exit;
use std::time::Instant;

use getopts::{Matches, Options, ParsingStyle};
use log::info;
use stderrlog::ColorChoice;
use vorbis_decoder::{Decoder, OpenOptions};

fn main() {
	exit(match run() {
		Ok(_) => 0,
		Err(err) => {
			eprintln!("{}", err);
			1
		}
	})
}

fn run() -> Result<(), Cow<'static, str>> {
	let mut options = Options::new();

	options
		.optflag(
			"h",
			"help",
			"Prints information about the accepted command line arguments and exits."
		)
		.optflag(
			"",
			"version",
			"Prints version and copyright information, then exits."
		)
		.optflag(
			"q",
			"quiet",
			"When enabled, the program will only print error messages, unless -h is specified."
		)
		.optflagmulti(
			"v",
			"verbose",
			"Increases the verbosity of the messages. Can be repeated several times."
		)
		.optopt(
			"f",
			"format",
			"The output PCM sample format to decode to.\nAvailable formats: i16, f32",
			"FORMAT"
		)
		.optopt(
			"",
			"seek",
			"Seeks to the given sample position (per channel) before decoding starts. \
			Requires a seekable input file.",
			"SAMPLE"
		)
		.parsing_style(ParsingStyle::StopAtFirstFree);

	match options.parse(env::args().skip(1)) {
		Ok(matches) => {
			if matches.opt_present("h") {
				print_header();
				println!();
				println!("Usage:");
				print!(
					"    {} [OPTION]... <input file> <output file or ->",
					env!("CARGO_BIN_NAME")
				);
				println!("{}", options.usage(""));
			} else if matches.opt_present("version") {
				print_header();
			} else {
				let quiet_mode = matches.opt_present("q");

				if !quiet_mode {
					print_header();
					println!();
				}

				if matches.free.len() != 2 {
					return Err(format!(
						"Too many or few file arguments specified. Run {} -h to see command line argument help",
						env!("CARGO_BIN_NAME")
					))?;
				}

				init_logging(&matches, quiet_mode);

				let input_file_name = &*matches.free[0];
				let output_file_name = &*matches.free[1];

				let (mut output_stdout, mut output_file);
				let output_file: &mut dyn Write = match output_file_name {
					"-" => {
						output_stdout = stdout().lock();
						&mut output_stdout
					}
					file_path => {
						output_file = BufWriter::new(
							File::create(file_path)
								.map_err(|err| format!("Could not open output file: {}", err))?
						);
						&mut output_file
					}
				};

				let format = matches
					.opt_get::<SampleFormat>("format")?
					.or_else(|| guess_format(output_file_name))
					.unwrap_or(SampleFormat::I16);

				let seek_target = matches
					.opt_get::<i64>("seek")
					.map_err(|err| format!("Invalid value for --seek option: {}", err))?;

				let input_file = BufReader::new(
					File::open(input_file_name)
						.map_err(|err| format!("Could not open input file: {}", err))?
				);

				info!("Decoding {} to {}...", input_file_name, output_file_name);
				let decode_begin = Instant::now();
				decode(input_file, output_file, format, seek_target)?;
				info!(
					"Decoding completed in {:.3} s. Have a nice day!",
					decode_begin.elapsed().as_secs_f64()
				);
			}

			Ok(())
		}
		Err(parse_err) => Err(format!(
			"{}\nRun {} -h to see command line argument help",
			parse_err,
			env!("CARGO_BIN_NAME")
		))?
	}
}

fn decode<F: Read + Seek>(
	input_file: F,
	output_file: &mut dyn Write,
	format: SampleFormat,
	seek_target: Option<i64>
) -> Result<(), Cow<'static, str>> {
	let mut decoder = OpenOptions::new()
		.open_seekable(input_file)
		.map_err(|err| format!("Could not open Vorbis stream: {}", err))?;

	info!(
		"Stream has {} channel(s) at {} Hz, vendor '{}'",
		decoder.channels(),
		decoder.sample_rate(),
		String::from_utf8_lossy(decoder.comment().vendor_string())
	);

	if let Some(sample) = seek_target {
		decoder
			.seek_to_sample(sample)
			.map_err(|err| format!("Could not seek to sample {}: {}", sample, err))?;
	}

	write_wav_header_placeholder(output_file, &mut decoder, format)?;

	match format {
		SampleFormat::I16 => write_all_i16(&mut decoder, output_file),
		SampleFormat::F32 => write_all_f32(&mut decoder, output_file)
	}
}

/// Writes a canonical 44-byte PCM WAVE header with a zeroed, unknowable-in-advance data size
/// field, matching what streaming WAV writers commonly emit for pipe output; most players and
/// decoders tolerate this, falling back to reading until end of file.
fn write_wav_header_placeholder<R: Read + Seek>(
	output_file: &mut dyn Write,
	decoder: &mut Decoder<R>,
	format: SampleFormat
) -> Result<(), Cow<'static, str>> {
	let channels = decoder.channels() as u16;
	let sample_rate = decoder.sample_rate();
	let bits_per_sample: u16 = match format {
		SampleFormat::I16 => 16,
		SampleFormat::F32 => 32
	};
	let block_align = channels * (bits_per_sample / 8);
	let byte_rate = sample_rate * block_align as u32;
	let audio_format: u16 = match format {
		SampleFormat::I16 => 1,  // PCM
		SampleFormat::F32 => 3   // IEEE float
	};

	let mut header = Vec::with_capacity(44);
	header.extend_from_slice(b"RIFF");
	header.extend_from_slice(&0u32.to_le_bytes()); // overall size, unknown ahead of time
	header.extend_from_slice(b"WAVE");
	header.extend_from_slice(b"fmt ");
	header.extend_from_slice(&16u32.to_le_bytes());
	header.extend_from_slice(&audio_format.to_le_bytes());
	header.extend_from_slice(&channels.to_le_bytes());
	header.extend_from_slice(&sample_rate.to_le_bytes());
	header.extend_from_slice(&byte_rate.to_le_bytes());
	header.extend_from_slice(&block_align.to_le_bytes());
	header.extend_from_slice(&bits_per_sample.to_le_bytes());
	header.extend_from_slice(b"data");
	header.extend_from_slice(&0u32.to_le_bytes()); // data size, unknown ahead of time

	output_file
		.write_all(&header)
		.map_err(|err| format!("Could not write WAV header: {}", err))?;
	Ok(())
}

fn write_all_i16<R: Read>(decoder: &mut Decoder<R>, output_file: &mut dyn Write) -> Result<(), Cow<'static, str>> {
	while let Some(samples) = decoder
		.read_i16()
		.map_err(|err| format!("Decode error: {}", err))?
	{
		for sample in samples {
			output_file
				.write_all(&sample.to_le_bytes())
				.map_err(|err| format!("Could not write PCM data: {}", err))?;
		}
	}
	Ok(())
}

fn write_all_f32<R: Read>(decoder: &mut Decoder<R>, output_file: &mut dyn Write) -> Result<(), Cow<'static, str>> {
	while let Some(samples) = decoder
		.read_f32()
		.map_err(|err| format!("Decode error: {}", err))?
	{
		for sample in samples {
			output_file
				.write_all(&sample.to_le_bytes())
				.map_err(|err| format!("Could not write PCM data: {}", err))?;
		}
	}
	Ok(())
}

fn guess_format(output_file_name: &str) -> Option<SampleFormat> {
	match Path::new(output_file_name)
		.extension()
		.and_then(|extension| extension.to_str())
	{
		Some("wav" | "wave") => Some(SampleFormat::I16),
		_ => None
	}
}

fn init_logging(option_matches: &Matches, quiet_mode: bool) {
	let verbosity_level = option_matches.opt_count("v");

	stderrlog::new()
		.module("vorbisdec")
		.verbosity(2 + verbosity_level)
		.show_level(false)
		.quiet(quiet_mode)
		.color(ColorChoice::Never)
		.init()
		.unwrap();
}

fn print_header() {
	println!("{}", env!("CARGO_PKG_DESCRIPTION"));
	println!("Copyright (C) {}", env!("CARGO_PKG_AUTHORS"));
}

#[derive(Debug, Clone, Copy)]
enum SampleFormat {
	I16,
	F32
}

impl std::str::FromStr for SampleFormat {
	type Err = Cow<'static, str>;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"i16" => Ok(Self::I16),
			"f32" => Ok(Self::F32),
			_ => Err(format!("The specified sample format is not valid: {}", s).into())
		}
	}
}
