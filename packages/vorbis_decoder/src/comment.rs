//! Comment header parsing (§ 4.2.3 and § 5.2 of the spec).
//!
//! The comment header carries a free-form vendor string plus a list of `KEY=value` pairs.
//! Neither is required for decoding audio; this module only exists so [`Decoder::comment`]
//! can expose them to callers without callers having to reparse the packet themselves.

use log::{info, trace, warn};

use crate::error::SetupError;
use crate::packet::PacketType;
use crate::setup::common_header_validation;

/// The vendor string and user comments carried by a stream's comment header.
///
/// Vorbis mandates UTF-8 for both the vendor string and the `KEY=value` comment entries, but
/// in-the-wild encoders do not always comply. Rather than lossily rewrite non-conformant
/// bytes, or fail to open an otherwise-decodable stream over a metadata quirk, both fields
/// are kept as opaque byte strings and exposed to the caller as such.
#[derive(Debug, Clone, Default)]
pub struct CommentHeader {
	vendor_string: Vec<u8>,
	user_comments: Vec<Vec<u8>>
}

impl CommentHeader {
	/// The encoder's self-reported vendor string, as raw bytes.
	pub fn vendor_string(&self) -> &[u8] {
		&self.vendor_string
	}

	/// The list of `KEY=value` user comments, each as raw bytes.
	pub fn user_comments(&self) -> &[Vec<u8>] {
		&self.user_comments
	}

	pub(crate) fn parse(packet: &[u8]) -> Result<Self, SetupError> {
		trace!("Parsing comment header");

		let body = common_header_validation(packet, PacketType::CommentHeader)?;

		macro_rules! get_checked {
			($index:expr) => {
				body.get($index)
					.ok_or(SetupError::TooSmallPacket(packet.len()))?
			};
		}

		let vendor_length = u32::from_le_bytes(get_checked!(..4).try_into().unwrap()) as usize;
		let vendor_string: Vec<u8> = get_checked!(4..4 + vendor_length).to_vec();

		info!(
			"Encoder vendor string: {}",
			String::from_utf8_lossy(&vendor_string)
		);

		let mut cursor = 4 + vendor_length;
		let comment_count = u32::from_le_bytes(get_checked!(cursor..cursor + 4).try_into().unwrap());
		cursor += 4;

		// Not pre-reserved for `comment_count` entries: that count is attacker-controlled and
		// unrelated to the packet's actual size, so it would let a tiny malformed packet
		// trigger a huge allocation
		let mut user_comments = Vec::new();
		for _ in 0..comment_count {
			let length = u32::from_le_bytes(get_checked!(cursor..cursor + 4).try_into().unwrap()) as usize;
			cursor += 4;
			let comment = get_checked!(cursor..cursor + length).to_vec();
			cursor += length;
			user_comments.push(comment);
		}

		// The framing bit is the final bit of the packet; a broken or truncated comment
		// header is recoverable here, since comments never affect audio decoding
		if body.get(cursor).is_none_or(|&b| b & 1 == 0) {
			warn!("Missing or invalid comment header framing bit");
		}

		Ok(Self {
			vendor_string,
			user_comments
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn build_comment_packet(vendor: &[u8], comments: &[&[u8]]) -> Vec<u8> {
		let mut packet = vec![3u8];
		packet.extend_from_slice(b"vorbis");
		packet.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
		packet.extend_from_slice(vendor);
		packet.extend_from_slice(&(comments.len() as u32).to_le_bytes());
		for comment in comments {
			packet.extend_from_slice(&(comment.len() as u32).to_le_bytes());
			packet.extend_from_slice(comment);
		}
		packet.push(1);
		packet
	}

	#[test]
	fn parses_vendor_string_and_comments() {
		let packet = build_comment_packet(b"test encoder", &[b"ARTIST=foo", b"TITLE=bar"]);
		let comment = CommentHeader::parse(&packet).unwrap();

		assert_eq!(comment.vendor_string(), b"test encoder");
		assert_eq!(
			comment.user_comments(),
			&[b"ARTIST=foo".to_vec(), b"TITLE=bar".to_vec()]
		);
	}

	#[test]
	fn rejects_wrong_packet_type() {
		let mut packet = build_comment_packet(b"v", &[]);
		packet[0] = 1;
		assert!(CommentHeader::parse(&packet).is_err());
	}
}
