//! Per-vertex visibility as seen by the displayed player.

/// Tri-state visibility of a single LOS vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Visibility {
    /// Never seen.
    #[default]
    Unexplored,
    /// Seen before but not currently in sight.
    Explored,
    /// Currently in sight.
    Visible,
}

impl Visibility {
    /// Bitmap intensity written for this state before blurring.
    #[must_use]
    pub fn intensity(self) -> u8 {
        match self {
            Visibility::Visible => 255,
            Visibility::Explored => 127,
            Visibility::Unexplored => 0,
        }
    }
}

/// Answers visibility queries over the map's LOS vertex grid.
///
/// The pipeline queries every vertex in `[0, n) x [0, n)` where `n` is
/// [`VisibilityOracle::vertices_per_side`] and performs no bounds checks of
/// its own.
pub trait VisibilityOracle {
    /// Number of LOS vertices along each side of the (square) map.
    fn vertices_per_side(&self) -> usize;

    /// Visibility of vertex `(i, j)`, with `i` along x and `j` along z.
    fn visibility(&self, i: usize, j: usize) -> Visibility;
}

impl<T: VisibilityOracle + ?Sized> VisibilityOracle for &T {
    fn vertices_per_side(&self) -> usize {
        (**self).vertices_per_side()
    }

    fn visibility(&self, i: usize, j: usize) -> Visibility {
        (**self).visibility(i, j)
    }
}

/// An owned, row-major visibility grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityGrid {
    size: usize,
    cells: Vec<Visibility>,
}

impl VisibilityGrid {
    /// Create a fully unexplored grid with `size` vertices per side.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self::filled(size, Visibility::Unexplored)
    }

    /// Create a grid with every vertex set to `state`.
    #[must_use]
    pub fn filled(size: usize, state: Visibility) -> Self {
        Self {
            size,
            cells: vec![state; size * size],
        }
    }

    /// Number of vertices per side.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Visibility at `(i, j)`, or `None` outside the grid.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> Option<Visibility> {
        if i < self.size && j < self.size {
            Some(self.cells[j * self.size + i])
        } else {
            None
        }
    }

    /// Set the visibility at `(i, j)`. Out-of-range writes are ignored.
    pub fn set(&mut self, i: usize, j: usize, state: Visibility) {
        if i < self.size && j < self.size {
            self.cells[j * self.size + i] = state;
        }
    }
}

impl VisibilityOracle for VisibilityGrid {
    fn vertices_per_side(&self) -> usize {
        self.size
    }

    fn visibility(&self, i: usize, j: usize) -> Visibility {
        self.get(i, j).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intensity() {
        assert_eq!(Visibility::Visible.intensity(), 255);
        assert_eq!(Visibility::Explored.intensity(), 127);
        assert_eq!(Visibility::Unexplored.intensity(), 0);
    }

    #[test]
    fn test_grid_get_set() {
        let mut grid = VisibilityGrid::new(4);
        assert_eq!(grid.get(3, 3), Some(Visibility::Unexplored));
        assert_eq!(grid.get(4, 0), None);

        grid.set(1, 2, Visibility::Visible);
        assert_eq!(grid.visibility(1, 2), Visibility::Visible);
        assert_eq!(grid.visibility(2, 1), Visibility::Unexplored);

        // Ignored.
        grid.set(9, 9, Visibility::Visible);
        assert_eq!(grid.visibility(9, 9), Visibility::Unexplored);
    }
}
