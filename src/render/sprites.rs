use std::cmp::Ordering;

use glam::{Mat3, Vec2};

use crate::traits::render::ShaderId;
use crate::traits::scene::SpriteKey;

/// Extra margin added to the camera bounds before the sprite query, in
/// world units. Sprites can extend past their anchor point; widening the
/// query is cheaper than asking the index for exact visual bounds.
pub const SPRITE_BOUNDS_MARGIN: f32 = 5.0;

/// One sprite scheduled for drawing this frame. Built fresh from the
/// spatial query every frame and discarded after the entity pass.
#[derive(Debug, Clone, Copy)]
pub struct SpriteDrawEntry {
    pub key: SpriteKey,
    pub post_shader: Option<ShaderId>,
    pub world_matrix: Mat3,
    pub world_rotation: f32,
    pub world_position: Vec2,
    /// Primary sort key for the painter's algorithm.
    pub y_world_pos: f32,
}

/// Painter's-algorithm draw order for a top-down view: sprites higher up
/// the map (larger world Y) draw first, so sprites lower on the map paint
/// over them. Ties break on the query index, which makes the order a
/// deterministic total order; identical input always yields the identical
/// draw sequence.
pub fn draw_order(a: &SpriteDrawEntry, a_index: usize, b: &SpriteDrawEntry, b_index: usize) -> Ordering {
    b.y_world_pos
        .total_cmp(&a.y_world_pos)
        .then(a_index.cmp(&b_index))
}

/// Sort sprite indices by `draw_order` without moving the entries.
pub fn sort_draw_indices(entries: &[SpriteDrawEntry], indices: &mut Vec<usize>) {
    indices.clear();
    indices.extend(0..entries.len());
    // The comparator is already total (index tie-break), so an unstable
    // sort yields a stable result.
    indices.sort_unstable_by(|&a, &b| draw_order(&entries[a], a, &entries[b], b));
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec2;

    fn entry(y: f32) -> SpriteDrawEntry {
        SpriteDrawEntry {
            key: SpriteKey(0),
            post_shader: None,
            world_matrix: Mat3::IDENTITY,
            world_rotation: 0.0,
            world_position: vec2(0.0, y),
            y_world_pos: y,
        }
    }

    #[test]
    fn test_higher_y_draws_first() {
        let entries = [entry(1.0), entry(5.0), entry(3.0)];
        let mut indices = Vec::new();
        sort_draw_indices(&entries, &mut indices);
        assert_eq!(indices, vec![1, 2, 0]);
    }

    #[test]
    fn test_ties_keep_query_order() {
        let entries = [entry(2.0), entry(2.0), entry(2.0)];
        let mut indices = Vec::new();
        sort_draw_indices(&entries, &mut indices);
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_order_is_deterministic() {
        let entries: Vec<_> = [4.0, 1.0, 4.0, -2.0, 1.0, 0.0].iter().map(|&y| entry(y)).collect();
        let mut first = Vec::new();
        sort_draw_indices(&entries, &mut first);
        for _ in 0..10 {
            let mut again = Vec::new();
            sort_draw_indices(&entries, &mut again);
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_nan_y_still_total_order() {
        let entries = [entry(f32::NAN), entry(0.0), entry(f32::NAN)];
        let mut indices = Vec::new();
        sort_draw_indices(&entries, &mut indices);
        // total_cmp puts NaN above every number, so both NaN entries draw
        // first, in query order.
        assert_eq!(indices, vec![0, 2, 1]);
    }

    #[test]
    fn test_empty_entries() {
        let mut indices = vec![99];
        sort_draw_indices(&[], &mut indices);
        assert!(indices.is_empty());
    }
}
