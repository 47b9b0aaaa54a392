//! Index coalescing: turning per-submission local indices into indices into
//! the pipeline's merged vertex streams.

use crate::errors::{BatchError, Result};
use crate::renderer::shaders::ShaderType;

/// Appends `local` to `merged`, offset by `base_vertex`.
///
/// `base_vertex` must be the number of vertices already accumulated in every
/// stream of the pipeline (not the number of accumulated indices). Order is
/// preserved since it defines triangle winding.
pub fn append_offset_indices(merged: &mut Vec<u32>, base_vertex: u32, local: &[u32]) {
    merged.reserve(local.len());
    merged.extend(local.iter().map(|&index| index + base_vertex));
}

/// Pure form of [`append_offset_indices`].
pub fn merge_indices(existing: &[u32], existing_vertex_count: u32, local: &[u32]) -> Vec<u32> {
    let mut merged = Vec::with_capacity(existing.len() + local.len());
    merged.extend_from_slice(existing);
    append_offset_indices(&mut merged, existing_vertex_count, local);
    merged
}

/// Checks that every local index refers to one of the submission's own vertices.
pub fn validate_local_indices(
    shader: ShaderType,
    local: &[u32],
    vertex_count: usize,
) -> Result<()> {
    match local
        .iter()
        .enumerate()
        .find(|&(_, &index)| index as usize >= vertex_count)
    {
        Some((position, &index)) => Err(BatchError::IndexOutOfRange {
            shader,
            position,
            index,
            vertex_count,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHADER: ShaderType = ShaderType::AbsolutePositionWithSolidColor;

    #[test]
    fn offsets_by_vertex_count_not_index_count() {
        // A quad (4 vertices, 6 indices) followed by a triangle.
        let quad = merge_indices(&[], 0, &[0, 1, 2, 2, 3, 0]);
        let merged = merge_indices(&quad, 4, &[0, 1, 2]);

        assert_eq!(merged, vec![0, 1, 2, 2, 3, 0, 4, 5, 6]);
    }

    #[test]
    fn preserves_submission_order() {
        let merged = merge_indices(&[0, 1, 2], 3, &[2, 1, 0]);
        assert_eq!(merged, vec![0, 1, 2, 5, 4, 3]);
    }

    #[test]
    fn empty_submission_leaves_sequence_untouched() {
        let mut merged = vec![0, 1, 2];
        append_offset_indices(&mut merged, 3, &[]);
        assert_eq!(merged, vec![0, 1, 2]);
    }

    #[test]
    fn merging_in_steps_matches_merging_at_once() {
        let a = [0, 1, 2];
        let b = [0, 2, 1, 1, 2, 3];
        let c = [1, 0, 2];

        let step = merge_indices(&merge_indices(&merge_indices(&[], 0, &a), 3, &b), 7, &c);

        let mut at_once = Vec::new();
        for (base, local) in [(0, &a[..]), (3, &b[..]), (7, &c[..])] {
            append_offset_indices(&mut at_once, base, local);
        }

        assert_eq!(step, at_once);
        assert_eq!(step, vec![0, 1, 2, 3, 5, 4, 4, 5, 6, 8, 7, 9]);
    }

    #[test]
    fn rejects_index_past_submission_vertices() {
        let err = validate_local_indices(SHADER, &[0, 1, 5], 3).unwrap_err();
        assert!(matches!(
            err,
            BatchError::IndexOutOfRange {
                position: 2,
                index: 5,
                vertex_count: 3,
                ..
            }
        ));
    }

    #[test]
    fn accepts_empty_indices_without_vertices() {
        assert!(validate_local_indices(SHADER, &[], 0).is_ok());
    }

    #[test]
    fn rejects_any_index_when_no_vertices_are_submitted() {
        assert!(validate_local_indices(SHADER, &[0], 0).is_err());
    }
}
