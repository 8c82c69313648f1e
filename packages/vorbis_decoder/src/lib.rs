//! `vorbis_decoder` is a Rust library that decodes Vorbis I audio streams, as defined in the
//! [Vorbis I specification], into interleaved PCM samples.
//!
//! Vorbis packets are not usually stored or transmitted raw: they travel inside a container,
//! almost always Ogg. This library reads Vorbis packets out of an Ogg container itself (see
//! the [`ogg`] module) rather than delegating to a separate container-parsing crate, because
//! the seek engine needs byte-level access to individual Ogg pages that a purely
//! packet-oriented API wouldn't expose.
//!
//! # Decoding
//!
//! [`Decoder`], built through [`OpenOptions`], is the entry point. It parses the three Vorbis
//! header packets eagerly on open ([`SetupError`] covers everything that can go wrong there,
//! and is always fatal), then decodes audio packets one at a time through
//! [`Decoder::read_f32`] or [`Decoder::read_i16`]. A single corrupt audio packet is
//! recoverable: it's logged and discarded, and decoding continues with the next packet,
//! matching the severity the specification assigns to in-stream decode errors.
//!
//! Streams opened over a seekable byte source additionally support [`Decoder::seek_to_sample`]
//! and [`Decoder::total_samples`].
//!
//! [Vorbis I specification]: https://xiph.org/vorbis/doc/Vorbis_I_spec.html

#![forbid(unsafe_code)]
#![forbid(unsafe_op_in_unsafe_fn)]
#![forbid(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]
#![deny(non_ascii_idents)]
#![deny(clippy::print_stdout)]
#![deny(clippy::unimplemented)]
#![warn(explicit_outlives_requirements)]
#![warn(noop_method_call)]
#![warn(unreachable_pub)]
#![warn(unused_import_braces)]
#![warn(unused_qualifications)]
#![warn(variant_size_differences)]
#![warn(clippy::empty_enum)]
#![warn(clippy::enum_glob_use)]
#![warn(clippy::float_cmp_const)]
#![warn(clippy::invalid_upcast_comparisons)]
#![warn(clippy::multiple_inherent_impl)]
#![warn(clippy::use_self)]
#![warn(clippy::used_underscore_binding)]
#![warn(clippy::redundant_feature_names)]

mod bitreader;
mod codebook;
mod comment;
mod decoder;
mod error;
mod floor;
mod frame;
mod huffman_tree;
mod mdct;
pub(crate) mod ogg;
mod packet;
mod residue;
mod seek;
mod setup;
mod window;

pub use comment::CommentHeader;
pub use decoder::{Decoder, OpenOptions};
pub use error::{DecoderError, FrameError, SetupError};
pub use packet::{PacketType, TryPacketTypeFromInt};
