//! Padded visibility bitmap and the separable binomial blur.
//!
//! The bitmap holds one byte per LOS vertex, surrounded by `blur_size / 2`
//! bytes of zero padding on each side. The blur then runs in place: each
//! pass reads a window starting at the padded position and writes the result
//! back at the window's first byte, which shifts the image into the top-left
//! corner. After both passes the blurred map occupies `[0, width) x
//! [0, height)` with row stride `pitch`, ready for upload without a second
//! buffer.

use crate::config::LosConfig;
use crate::visibility::VisibilityOracle;

/// 7-tap binomial kernel, an integer approximation of a Gaussian.
pub const BINOMIAL_KERNEL: [u32; 7] = [1, 6, 15, 20, 15, 6, 1];

/// Sum of [`BINOMIAL_KERNEL`].
const KERNEL_SUM: u32 = 64;

/// Row pitch and total byte length of a padded bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapLayout {
    /// Bytes per row, including padding and alignment.
    pub pitch: usize,
    /// Total bytes, including the top and bottom padding rows.
    pub len: usize,
}

/// Compute the layout of a padded bitmap for a `width x height` map.
#[must_use]
pub fn bitmap_layout(width: usize, height: usize, config: &LosConfig) -> BitmapLayout {
    let pitch = round_up(width + config.blur_size - 1, config.sub_texture_alignment);
    BitmapLayout {
        pitch,
        len: pitch * (height + config.blur_size - 1),
    }
}

/// Round `value` up to a multiple of `multiple`.
#[must_use]
pub fn round_up(value: usize, multiple: usize) -> usize {
    value.div_ceil(multiple) * multiple
}

/// A visibility bitmap with zero padding around the map region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedBitmap {
    data: Vec<u8>,
    width: usize,
    height: usize,
    pitch: usize,
    radius: usize,
}

impl PaddedBitmap {
    /// Fill a bitmap from the oracle without blurring it.
    ///
    /// Vertex `(i, j)` is stored at padded position `(i + r, j + r)` where
    /// `r = blur_size / 2`. Everything else is zero.
    pub fn fill<O: VisibilityOracle + ?Sized>(
        oracle: &O,
        width: usize,
        height: usize,
        config: &LosConfig,
    ) -> Self {
        let layout = bitmap_layout(width, height, config);
        let radius = config.blur_radius();
        let mut data = vec![0u8; layout.len];

        for j in 0..height {
            let row = (j + radius) * layout.pitch + radius;
            for (i, texel) in data[row..row + width].iter_mut().enumerate() {
                *texel = oracle.visibility(i, j).intensity();
            }
        }

        Self {
            data,
            width,
            height,
            pitch: layout.pitch,
            radius,
        }
    }

    /// Run the horizontal pass over the map rows.
    ///
    /// Output column `i` of padded row `j` is the kernel applied to padded
    /// columns `i..i + 7` of the same row, so the left padding is consumed as
    /// context and the image moves left by the blur radius.
    pub fn blur_horizontal(&mut self) {
        let taps = BINOMIAL_KERNEL.len();
        for row in self.radius..self.height + self.radius {
            let base = row * self.pitch;
            for i in 0..self.width {
                let value = convolve(self.data[base + i..base + i + taps].iter().copied());
                self.data[base + i] = value;
            }
        }
    }

    /// Run the vertical pass, moving the image up by the blur radius.
    ///
    /// Must follow [`PaddedBitmap::blur_horizontal`].
    pub fn blur_vertical(&mut self) {
        let taps = BINOMIAL_KERNEL.len();
        let pitch = self.pitch;
        for j in 0..self.height {
            for i in 0..self.width {
                let value = convolve((0..taps).map(|k| self.data[(j + k) * pitch + i]));
                self.data[j * pitch + i] = value;
            }
        }
    }

    /// Map width in vertices.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Map height in vertices.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Bytes per row.
    #[must_use]
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    /// The whole backing buffer, padding included.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The rows holding the blurred map, with stride [`PaddedBitmap::pitch`].
    #[must_use]
    pub fn upload_bytes(&self) -> &[u8] {
        &self.data[..self.pitch * self.height]
    }

    /// Byte at unpadded position `(i, j)`; meaningful after both blur passes.
    #[must_use]
    pub fn value(&self, i: usize, j: usize) -> u8 {
        self.data[j * self.pitch + i]
    }

    /// Byte at padded storage position `(x, y)`.
    #[must_use]
    pub fn padded(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.pitch + x]
    }
}

/// Fill and blur a bitmap for a `width x height` map.
pub fn generate_bitmap<O: VisibilityOracle + ?Sized>(
    oracle: &O,
    width: usize,
    height: usize,
    config: &LosConfig,
) -> PaddedBitmap {
    let mut bitmap = PaddedBitmap::fill(oracle, width, height, config);
    bitmap.blur_horizontal();
    bitmap.blur_vertical();
    bitmap
}

fn convolve(taps: impl Iterator<Item = u8>) -> u8 {
    let sum: u32 = taps
        .zip(BINOMIAL_KERNEL)
        .map(|(texel, weight)| u32::from(texel) * weight)
        .sum();
    // At most 255 * 64 / 64.
    (sum / KERNEL_SUM) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::{Visibility, VisibilityGrid};

    fn single_visible_grid() -> VisibilityGrid {
        let mut grid = VisibilityGrid::new(9);
        grid.set(4, 4, Visibility::Visible);
        grid
    }

    #[test]
    fn test_layout_for_65_vertices() {
        let layout = bitmap_layout(65, 65, &LosConfig::default());
        assert_eq!(layout.pitch, 72);
        assert_eq!(layout.len, 72 * 71);
    }

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(0, 4), 0);
        assert_eq!(round_up(1, 4), 4);
        assert_eq!(round_up(71, 4), 72);
        assert_eq!(round_up(72, 4), 72);
    }

    #[test]
    fn test_kernel_sum() {
        assert_eq!(BINOMIAL_KERNEL.iter().sum::<u32>(), KERNEL_SUM);
    }

    #[test]
    fn test_fill_places_map_inside_padding() {
        let config = LosConfig::default();
        let mut grid = VisibilityGrid::new(2);
        grid.set(0, 0, Visibility::Visible);
        grid.set(1, 1, Visibility::Explored);

        let bitmap = PaddedBitmap::fill(&grid, 2, 2, &config);
        assert_eq!(bitmap.pitch(), 8);
        assert_eq!(bitmap.as_bytes().len(), 8 * 8);
        assert_eq!(bitmap.padded(3, 3), 255);
        assert_eq!(bitmap.padded(4, 4), 127);
        assert_eq!(bitmap.padded(4, 3), 0);
        assert_eq!(bitmap.as_bytes().iter().filter(|&&b| b != 0).count(), 2);
    }

    #[test]
    fn test_single_cell_horizontal_peak() {
        let mut bitmap = PaddedBitmap::fill(&single_visible_grid(), 9, 9, &LosConfig::default());
        bitmap.blur_horizontal();

        // Row 4 of the map lives at padded row 7; columns are already shifted.
        assert_eq!(bitmap.padded(4, 7), 79);
        assert_eq!(bitmap.padded(3, 7), 59);
        assert_eq!(bitmap.padded(2, 7), 23);
        assert_eq!(bitmap.padded(1, 7), 3);
        assert_eq!(bitmap.padded(0, 7), 0);
        assert_eq!(bitmap.padded(4, 6), 0);
    }

    #[test]
    fn test_single_cell_two_pass_golden() {
        let bitmap = generate_bitmap(&single_visible_grid(), 9, 9, &LosConfig::default());

        assert_eq!(bitmap.value(4, 4), 24);
        assert_eq!(bitmap.value(3, 4), 18);
        assert_eq!(bitmap.value(4, 3), 18);
        assert_eq!(bitmap.value(5, 5), 13);
        assert_eq!(bitmap.value(4, 1), 1);
        assert_eq!(bitmap.value(1, 4), 0);
        assert_eq!(bitmap.value(0, 0), 0);
        assert_eq!(bitmap.value(8, 8), 0);
    }

    #[test]
    fn test_unexplored_stays_black() {
        let grid = VisibilityGrid::new(12);
        let bitmap = generate_bitmap(&grid, 12, 12, &LosConfig::default());
        assert!(bitmap.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_visible_interior_is_exact() {
        let grid = VisibilityGrid::filled(16, Visibility::Visible);
        let bitmap = generate_bitmap(&grid, 16, 16, &LosConfig::default());

        for j in 3..13 {
            for i in 3..13 {
                assert_eq!(bitmap.value(i, j), 255, "({i}, {j})");
            }
        }
        // Edges fall off towards the padding.
        assert!(bitmap.value(0, 8) < 255);
        assert!(bitmap.value(8, 15) < 255);
    }

    #[test]
    fn test_upload_bytes_cover_map_rows() {
        let grid = VisibilityGrid::new(65);
        let bitmap = generate_bitmap(&grid, 65, 65, &LosConfig::default());
        assert_eq!(bitmap.upload_bytes().len(), 72 * 65);
    }
}
