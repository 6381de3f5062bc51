//! Tunables for the LOS texture pipeline.

use serde::{Deserialize, Serialize};

use crate::bitmap::BINOMIAL_KERNEL;
use crate::error::{Error, Result};

/// Default blur kernel width.
pub const DEFAULT_BLUR_SIZE: usize = 7;

/// Default alignment (in bytes) of bitmap rows passed to texture uploads.
///
/// Must be a multiple of the backend's unpack alignment. Multiples of 4 are
/// also friendlier to most drivers.
pub const DEFAULT_SUB_TEXTURE_ALIGNMENT: usize = 4;

/// Default world-space size of one LOS cell.
pub const DEFAULT_CELL_SIZE: f32 = 16.0;

/// Default multiplier applied to the frame delta to get the blend weight.
pub const DEFAULT_SMOOTHING_RATE: f32 = 4.0;

/// Default number of always-impassable cells along the map border.
pub const DEFAULT_IMPASSABLE_EDGE_CELLS: usize = 3;

/// Configuration for [`crate::LosTexture`].
///
/// `blur_size` and `impassable_edge_cells` are related: the blur smears
/// `blur_size / 2` cells of the map edge into the zero padding, so the map
/// must keep at least that many impassable border cells for the falloff to
/// stay outside the playable area. The relation is checked by
/// [`LosConfig::validate`] but only reported as a warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LosConfig {
    /// Width of the separable blur kernel. Must be odd.
    pub blur_size: usize,
    /// Row alignment of the bitmap in bytes.
    pub sub_texture_alignment: usize,
    /// World units covered by one LOS cell.
    pub cell_size: f32,
    /// Scale from frame delta (seconds) to blend weight.
    pub smoothing_rate: f32,
    /// Whether temporal smoothing is requested.
    pub smooth: bool,
    /// Number of impassable cells along each map edge.
    pub impassable_edge_cells: usize,
}

impl Default for LosConfig {
    fn default() -> Self {
        Self {
            blur_size: DEFAULT_BLUR_SIZE,
            sub_texture_alignment: DEFAULT_SUB_TEXTURE_ALIGNMENT,
            cell_size: DEFAULT_CELL_SIZE,
            smoothing_rate: DEFAULT_SMOOTHING_RATE,
            smooth: true,
            impassable_edge_cells: DEFAULT_IMPASSABLE_EDGE_CELLS,
        }
    }
}

impl LosConfig {
    /// Check the configuration for values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.blur_size % 2 == 0 {
            return Err(Error::InvalidConfig {
                field: "blur_size",
                detail: format!("must be odd, got {}", self.blur_size),
            });
        }
        if self.blur_size != BINOMIAL_KERNEL.len() {
            return Err(Error::InvalidConfig {
                field: "blur_size",
                detail: format!(
                    "only a {}-tap kernel is available, got {}",
                    BINOMIAL_KERNEL.len(),
                    self.blur_size
                ),
            });
        }
        if !self.sub_texture_alignment.is_power_of_two() {
            return Err(Error::InvalidConfig {
                field: "sub_texture_alignment",
                detail: format!(
                    "must be a non-zero power of two, got {}",
                    self.sub_texture_alignment
                ),
            });
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(Error::InvalidConfig {
                field: "cell_size",
                detail: format!("must be positive, got {}", self.cell_size),
            });
        }
        if !(self.smoothing_rate.is_finite() && self.smoothing_rate > 0.0) {
            return Err(Error::InvalidConfig {
                field: "smoothing_rate",
                detail: format!("must be positive, got {}", self.smoothing_rate),
            });
        }

        if self.impassable_edge_cells < self.blur_radius() {
            tracing::warn!(
                blur_size = self.blur_size,
                impassable_edge_cells = self.impassable_edge_cells,
                "LOS blur reaches past the impassable map border"
            );
        }

        Ok(())
    }

    /// Half the kernel width, i.e. the padding on each side of the bitmap.
    #[must_use]
    pub fn blur_radius(&self) -> usize {
        self.blur_size / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = LosConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.blur_radius(), 3);
    }

    #[test]
    fn test_even_blur_rejected() {
        let config = LosConfig {
            blur_size: 6,
            ..LosConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig {
                field: "blur_size",
                ..
            })
        ));
    }

    #[test]
    fn test_unsupported_kernel_width_rejected() {
        let config = LosConfig {
            blur_size: 5,
            ..LosConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_alignment_must_be_power_of_two() {
        for alignment in [0, 3, 12] {
            let config = LosConfig {
                sub_texture_alignment: alignment,
                ..LosConfig::default()
            };
            assert!(config.validate().is_err(), "alignment {alignment}");
        }
    }

    #[test]
    fn test_non_positive_rates_rejected() {
        let config = LosConfig {
            smoothing_rate: 0.0,
            ..LosConfig::default()
        };
        assert!(config.validate().is_err());

        let config = LosConfig {
            cell_size: f32::NAN,
            ..LosConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_narrow_border_is_only_a_warning() {
        let config = LosConfig {
            impassable_edge_cells: 1,
            ..LosConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LosConfig = serde_json::from_str(r#"{ "smooth": false }"#).unwrap();
        assert!(!config.smooth);
        assert_eq!(config.blur_size, DEFAULT_BLUR_SIZE);
        assert_eq!(config.cell_size, DEFAULT_CELL_SIZE);
    }
}
