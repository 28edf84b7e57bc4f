/// Tile origins along one axis of length `size`: `0, step, 2 * step, ...` up to `size - ps`,
/// plus `size - ps` itself when the stride doesn't land on it.
///
/// Every origin appears once, so the trailing edge is covered without counting a tile twice.
///
/// # Returns
/// No origins at all if `size < ps`.
pub fn tile_origins(size: usize, ps: usize, step: usize) -> Vec<usize> {
    if size < ps || step == 0 {
        return Vec::new();
    }

    let last = size - ps;
    let mut origins: Vec<_> = (0..=last).step_by(step).collect();
    if origins.last() != Some(&last) {
        origins.push(last);
    }

    origins
}

/// The overlapping `ps x ps` tiles covering a `height x width` image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    pub ps: usize,
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
}

impl TileGrid {
    pub fn new(height: usize, width: usize, ps: usize, step: usize) -> Self {
        Self {
            ps,
            rows: tile_origins(height, ps, step),
            cols: tile_origins(width, ps, step),
        }
    }

    /// The amount of tiles in one orientation.
    pub fn len(&self) -> usize {
        self.rows.len() * self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
