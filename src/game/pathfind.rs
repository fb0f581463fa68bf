//! Flood Fill Pathfinding
//!
//! Breadth-first search over the tile grid with unit step cost. The
//! resulting frontier keeps every node that was looked at, tagged with
//! whether it is reachable, so callers can show "seen but blocked" tiles
//! and reconstruct paths to reachable ones.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::game::grid::{Tile, TileGrid};

/// Expansion order: up, right, down, left.
const DIRECTIONS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

/// One unit step of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStep {
    pub delta_x: i32,
    pub delta_y: i32,
}

/// A node of the search tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontierNode {
    /// Steps from the origin.
    pub g: u32,
    pub x: i32,
    pub y: i32,
    /// Index of the parent node in the frontier; `None` for the origin.
    pub parent: Option<usize>,
    pub is_valid: bool,
}

/// Search result, in discovery order.
///
/// A tile appears at most once as valid. Blocked approaches are recorded
/// each time they are tried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontier {
    nodes: Vec<FrontierNode>,
}

impl Frontier {
    pub fn nodes(&self) -> &[FrontierNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Reachable nodes only.
    pub fn valid_nodes(&self) -> impl Iterator<Item = &FrontierNode> {
        self.nodes.iter().filter(|n| n.is_valid)
    }

    /// Index of the first node recorded for a tile.
    pub fn find(&self, x: i32, y: i32) -> Option<usize> {
        self.nodes.iter().position(|node| node.x == x && node.y == y)
    }

    /// Node chain from `index` back to the origin (target first).
    pub fn flatten(&self, index: usize) -> Vec<FrontierNode> {
        let mut chain = Vec::new();
        let mut cursor = Some(index);
        while let Some(i) = cursor {
            let Some(node) = self.nodes.get(i) else {
                break;
            };
            chain.push(*node);
            cursor = node.parent;
        }
        chain
    }

    /// Unit-step deltas from the origin to a reachable tile, origin excluded.
    ///
    /// `None` if the tile was never reached or its first node is blocked.
    pub fn get_path(&self, x: i32, y: i32) -> Option<Vec<PathStep>> {
        let index = self.find(x, y)?;
        if !self.nodes[index].is_valid {
            return None;
        }

        let mut chain = self.flatten(index);
        chain.reverse();

        Some(
            chain
                .windows(2)
                .map(|pair| PathStep {
                    delta_x: pair[1].x - pair[0].x,
                    delta_y: pair[1].y - pair[0].y,
                })
                .collect(),
        )
    }
}

/// Flood fill from `(start_x, start_y)` up to `limit` steps.
///
/// `edge_valid(next, current)` decides whether the step from `current`
/// onto `next` is allowed. The origin is the first node. Blocked
/// neighbours are recorded but never expanded; nodes at `g == limit`
/// are recorded but never expanded either.
pub fn search<F>(grid: &TileGrid, start_x: i32, start_y: i32, limit: u32, mut edge_valid: F) -> Frontier
where
    F: FnMut(&Tile, &Tile) -> bool,
{
    if grid.tile(start_x, start_y).is_none() {
        return Frontier::default();
    }

    let mut nodes = vec![FrontierNode {
        g: 0,
        x: start_x,
        y: start_y,
        parent: None,
        is_valid: true,
    }];
    let mut reached = BTreeSet::from([(start_x, start_y)]);
    let mut open = VecDeque::from([0usize]);

    while let Some(current) = open.pop_front() {
        let node = nodes[current];
        if node.g >= limit {
            // g never decreases along the queue
            break;
        }
        let Some(tile) = grid.tile(node.x, node.y) else {
            continue;
        };

        for (dx, dy) in DIRECTIONS {
            let (nx, ny) = (node.x + dx, node.y + dy);
            let Some(next) = grid.tile(nx, ny) else {
                continue;
            };

            if reached.contains(&(nx, ny)) {
                continue;
            }

            let is_valid = edge_valid(next, tile);

            #[cfg(feature = "debug-tracing")]
            tracing::trace!(x = nx, y = ny, g = node.g + 1, is_valid, "frontier node");

            let index = nodes.len();
            nodes.push(FrontierNode {
                g: node.g + 1,
                x: nx,
                y: ny,
                parent: Some(current),
                is_valid,
            });

            if is_valid {
                reached.insert((nx, ny));
                open.push_back(index);
            }
        }
    }

    Frontier { nodes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::EntityId;
    use proptest::prelude::*;

    fn open_grid(width: usize, height: usize) -> TileGrid {
        TileGrid::new("test", width, height)
    }

    fn manhattan(a: (i32, i32), b: (i32, i32)) -> u32 {
        ((a.0 - b.0).abs() + (a.1 - b.1).abs()) as u32
    }

    #[test]
    fn test_center_range_two_reaches_diamond() {
        let grid = open_grid(5, 5);
        let frontier = search(&grid, 2, 2, 2, |_, _| true);

        assert_eq!(frontier.len(), 13);
        assert!(frontier.nodes().iter().all(|n| n.is_valid));
        assert!(frontier
            .nodes()
            .iter()
            .all(|n| manhattan((n.x, n.y), (2, 2)) <= 2));
    }

    #[test]
    fn test_corner_range_two() {
        let grid = open_grid(5, 5);
        let frontier = search(&grid, 0, 0, 2, |_, _| true);

        let mut tiles: Vec<_> = frontier.nodes().iter().map(|n| (n.x, n.y)).collect();
        tiles.sort();
        assert_eq!(tiles, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (2, 0)]);

        assert_eq!(
            frontier.get_path(0, 2),
            Some(vec![
                PathStep { delta_x: 0, delta_y: 1 },
                PathStep { delta_x: 0, delta_y: 1 },
            ])
        );
    }

    #[test]
    fn test_expansion_order_up_right_down_left() {
        let grid = open_grid(3, 3);
        let frontier = search(&grid, 1, 1, 1, |_, _| true);
        let order: Vec<_> = frontier.nodes().iter().map(|n| (n.x, n.y)).collect();
        assert_eq!(order, vec![(1, 1), (1, 0), (2, 1), (1, 2), (0, 1)]);
    }

    #[test]
    fn test_path_to_origin_is_empty() {
        let grid = open_grid(3, 3);
        let frontier = search(&grid, 1, 1, 2, |_, _| true);
        assert_eq!(frontier.get_path(1, 1), Some(vec![]));
    }

    #[test]
    fn test_blocked_tile_recorded_invalid() {
        let mut grid = open_grid(5, 5);
        grid.set_pointers(0, 1, 1, 1, &EntityId::new("enemy")).unwrap();

        let frontier = search(&grid, 0, 0, 2, |next, _| !next.is_occupied());

        let blocked = frontier.find(0, 1).unwrap();
        assert!(!frontier.nodes()[blocked].is_valid);
        assert_eq!(frontier.get_path(0, 1), None);
        // Reachable around the blocker only at a higher cost.
        assert_eq!(frontier.get_path(0, 2), None);
        assert!(frontier.get_path(1, 1).is_some());
    }

    #[test]
    fn test_never_reached_tile_has_no_path() {
        let grid = open_grid(5, 5);
        let frontier = search(&grid, 0, 0, 1, |_, _| true);
        assert_eq!(frontier.get_path(4, 4), None);
    }

    #[test]
    fn test_out_of_bounds_start() {
        let grid = open_grid(2, 2);
        assert!(search(&grid, 5, 5, 3, |_, _| true).is_empty());
    }

    #[test]
    fn test_zero_limit_only_origin() {
        let grid = open_grid(3, 3);
        let frontier = search(&grid, 1, 1, 0, |_, _| true);
        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn test_first_blocked_approach_decides_path() {
        // Stepping onto (1,0) is only allowed from row 1.
        let mut grid = open_grid(3, 2);
        grid.update_tiles(|tile, _, y| tile.team = y.to_string());
        grid.tile_mut(1, 0).unwrap().auto_capture = true;

        let frontier = search(&grid, 0, 0, 3, |next, current| {
            !next.auto_capture || current.team == "1"
        });

        let validity: Vec<_> = frontier
            .nodes()
            .iter()
            .filter(|n| (n.x, n.y) == (1, 0))
            .map(|n| n.is_valid)
            .collect();
        assert_eq!(validity, vec![false, true]);
        assert_eq!(frontier.find(1, 0), Some(1));
        assert_eq!(frontier.get_path(1, 0), None);
    }

    #[test]
    fn test_tile_left_from_hostile_source_is_unreachable() {
        let mut grid = open_grid(3, 3);
        grid.tile_mut(1, 0).unwrap().team = "X".into();

        let frontier = search(&grid, 0, 0, 2, |_, current| current.team != "X");

        let validity: Vec<_> = frontier
            .nodes()
            .iter()
            .filter(|n| (n.x, n.y) == (1, 1))
            .map(|n| n.is_valid)
            .collect();
        assert_eq!(validity, vec![false, true]);
        assert_eq!(frontier.get_path(1, 1), None);
        assert!(frontier.get_path(0, 2).is_some());
    }

    proptest! {
        #[test]
        fn prop_costs_bounded_and_match_chain(
            width in 1usize..8,
            height in 1usize..8,
            sx in 0i32..8,
            sy in 0i32..8,
            limit in 0u32..6,
            walls in proptest::collection::vec(any::<bool>(), 64),
        ) {
            let sx = sx % width as i32;
            let sy = sy % height as i32;
            let mut grid = open_grid(width, height);
            grid.update_tiles(|tile, x, y| {
                tile.has_border = walls[(y as usize * 8 + x as usize) % 64];
            });

            let frontier = search(&grid, sx, sy, limit, |next, _| !next.has_border);

            for (index, node) in frontier.nodes().iter().enumerate() {
                prop_assert!(node.g <= limit);
                let chain = frontier.flatten(index);
                prop_assert_eq!(chain.len() as u32, node.g + 1);
                let root = chain[chain.len() - 1];
                prop_assert_eq!((root.x, root.y), (sx, sy));
                for pair in chain.windows(2) {
                    prop_assert_eq!(manhattan((pair[0].x, pair[0].y), (pair[1].x, pair[1].y)), 1);
                }
            }
        }

        #[test]
        fn prop_path_replays_to_target(
            width in 1usize..8,
            height in 1usize..8,
            limit in 0u32..6,
            walls in proptest::collection::vec(any::<bool>(), 64),
        ) {
            let mut grid = open_grid(width, height);
            grid.update_tiles(|tile, x, y| {
                tile.has_border = walls[(y as usize * 8 + x as usize) % 64];
            });

            let frontier = search(&grid, 0, 0, limit, |next, _| !next.has_border);

            for node in frontier.valid_nodes() {
                let path = frontier.get_path(node.x, node.y);
                prop_assert!(path.is_some());
                let (mut x, mut y) = (0, 0);
                for step in path.unwrap_or_default() {
                    x += step.delta_x;
                    y += step.delta_y;
                }
                prop_assert_eq!((x, y), (node.x, node.y));
            }
        }
    }
}
