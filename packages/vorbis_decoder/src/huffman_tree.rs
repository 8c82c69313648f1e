//! Builds canonical codeword assignments from a codebook's codeword length list.
//!
//! This mirrors the codeword assignment algorithm of the Vorbis I specification, § 3.2.1:
//! codewords are handed out by walking a binary tree left to right, depth first, assigning
//! the leftmost unused leaf at the requested depth to each entry in turn. A tree built this
//! way is complete (Kraft equality holds) only if the codeword lengths are consistent; an
//! attempt to assign a leaf beneath an already-occupied node means the lengths overspecify
//! the tree.
//!
//! The tree itself does not need to survive past codeword assignment: [`codebook`](crate::codebook)
//! only ever needs the resulting `(codeword, length)` pairs to build its fast and sorted
//! decode tables, so the tree is built and torn down within a single call.

use bumpalo::Bump;

/// The codeword lengths of a codebook overspecify or underspecify the binary tree they are
/// meant to describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CodewordAssignmentError {
	/// A leaf was required at a depth where an ancestor was already a leaf: there were too
	/// many codewords of some length, or a redundant short one.
	Overspecified
}

/// Assigns canonical codewords to every non-zero entry in `codeword_lengths`, returning
/// `None` for zero-length (unused, sparse) entries.
///
/// The one admissible degenerate case the spec carves out, a single-entry codebook using a
/// 1-bit code, is special-cased: both possible 1-bit inputs decode to the sole entry.
///
/// Returned codewords are already bit-reversed relative to the tree traversal order, so
/// that accumulating input bits LSB-first and comparing as plain integers against a
/// sorted list of these codewords works directly (see [`crate::codebook`]).
///
/// # Preconditions
/// Every length in `codeword_lengths` is at most 32, and the list has at most `u32::MAX`
/// entries.
pub(crate) fn assign_codewords(
	codeword_lengths: &[u8]
) -> Result<Vec<Option<(u32, u8)>>, CodewordAssignmentError> {
	if codeword_lengths == [1] {
		return Ok(vec![Some((0, 1))]);
	}

	let arena = Bump::new();
	let mut root = Node::default();
	let mut codewords = vec![None; codeword_lengths.len()];

	for (entry_number, codeword_length) in codeword_lengths.iter().copied().enumerate() {
		if codeword_length == 0 {
			continue;
		}

		let codeword = root
			.leftmost_free_leaf_at_depth(codeword_length, &arena)
			.ok_or(CodewordAssignmentError::Overspecified)?;

		codewords[entry_number] = Some((codeword, codeword_length));
	}

	Ok(codewords)
}

/// A node of the binary tree being built. Allocated out of a [`Bump`] arena for locality,
/// since setup parsing may build many small trees (one per codebook) in quick succession.
#[derive(Default)]
struct Node<'tree> {
	left: Option<&'tree mut Node<'tree>>,
	right: Option<&'tree mut Node<'tree>>,
	occupied: bool
}

impl<'tree> Node<'tree> {
	/// Finds the leftmost still-free leaf at `depth` below this node, marks it occupied,
	/// and returns the bit-reversed codeword that reaches it.
	fn leftmost_free_leaf_at_depth(&mut self, depth: u8, arena: &'tree Bump) -> Option<u32> {
		self.leftmost_free_leaf_at_depth_internal(depth, 0, arena)
			.map(|codeword| {
				// `codeword` is built up MSB-first while walking down; the Vorbis bitpack
				// convention reads codeword bits LSB-first, so reverse it into the low
				// `depth` bits before handing it back.
				let offset = u32::BITS - depth as u32;
				codeword.wrapping_shl(offset).reverse_bits()
			})
	}

	fn leftmost_free_leaf_at_depth_internal(
		&mut self,
		depth: u8,
		codeword_so_far: u32,
		arena: &'tree Bump
	) -> Option<u32> {
		if self.occupied {
			return None;
		}

		if depth == 0 {
			return if self.left.is_none() && self.right.is_none() {
				self.occupied = true;
				Some(codeword_so_far)
			} else {
				None
			};
		}

		self.left
			.get_or_insert_with(|| arena.alloc(Default::default()))
			.leftmost_free_leaf_at_depth_internal(depth - 1, codeword_so_far, arena)
			.or_else(|| {
				self.right
					.get_or_insert_with(|| arena.alloc(Default::default()))
					.leftmost_free_leaf_at_depth_internal(
						depth - 1,
						codeword_so_far | 1 << (depth - 1),
						arena
					)
			})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn codeword_lengths_list_is_assigned_expected_codewords() {
		// Example from the Vorbis I specification, § 3.2.1, with an unused entry added
		let codewords = assign_codewords(&[2, 4, 4, 4, 0, 4, 2, 3, 3]).unwrap();

		const EXPECTED: &[Option<(u32, u8)>] = &[
			Some((0b00, 2)),
			Some((0b0010, 4)),
			Some((0b1010, 4)),
			Some((0b0110, 4)),
			None,
			Some((0b1110, 4)),
			Some((0b01, 2)),
			Some((0b011, 3)),
			Some((0b111, 3))
		];

		assert_eq!(codewords, EXPECTED);
	}

	#[test]
	fn single_entry_one_bit_codebook_is_accepted() {
		assert_eq!(assign_codewords(&[1]).unwrap(), vec![Some((0, 1))]);
	}

	#[test]
	fn overspecified_tree_is_rejected() {
		assert_eq!(
			assign_codewords(&[2, 4, 4, 4, 4, 2, 3, 3, 32]),
			Err(CodewordAssignmentError::Overspecified)
		);
	}

	#[test]
	fn underspecified_tree_is_accepted_at_assignment_time() {
		// Missing the codeword for entry 4 relative to the canonical example: this does
		// not overspecify the tree, it just leaves part of it unused. Decode-time use of
		// the unused region is caught separately, by the Huffman decoder.
		assert!(assign_codewords(&[2, 4, 4, 4, 2, 3, 3]).is_ok());
	}
}
