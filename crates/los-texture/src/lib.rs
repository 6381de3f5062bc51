//! Fog-of-war (line of sight) texture pipeline.
//!
//! Converts per-vertex visibility of the displayed player into a blurred,
//! GPU-resident 8-bit texture used for fog-of-war shading in the scene and
//! for the minimap overlay.
//!
//! # Pipeline
//!
//! 1. [`generate_bitmap`] fills a zero-padded bitmap from a
//!    [`VisibilityOracle`] and blurs it in place with a 7-tap binomial kernel.
//! 2. [`TextureManager`] (re)builds a power-of-two texture for the map size
//!    and uploads the blurred region.
//! 3. [`TemporalSmoother`] blends the previous frame toward the new texture by
//!    rendering into one of two alternating buffers.
//! 4. [`LosTexture`] ties the steps together behind a dirty flag.
//!
//! Graphics APIs are reached through [`RenderBackend`];
//! [`software::SoftwareBackend`] runs everything on the CPU.
//!
//! # Example
//!
//! ```
//! use los_texture::software::SoftwareBackend;
//! use los_texture::{LosConfig, LosTexture, Visibility, VisibilityGrid};
//!
//! let mut backend = SoftwareBackend::new();
//! let mut los = LosTexture::new(LosConfig::default()).unwrap();
//!
//! let mut grid = VisibilityGrid::new(65);
//! grid.set(10, 10, Visibility::Visible);
//!
//! // Once per simulation tick.
//! los.make_dirty();
//! // Once per frame.
//! los.interpolate(&mut backend, Some(&grid), 1.0 / 60.0);
//!
//! assert!(los.texture_smooth().is_some());
//! assert_eq!(los.texture_size(), Some(128));
//! ```

pub mod backend;
pub mod bitmap;
pub mod config;
pub mod coords;
mod error;
mod los;
pub mod smoothing;
pub mod software;
pub mod textures;
pub mod visibility;

pub use backend::{
    AddressMode, Filter, FramebufferStatus, QUAD_TEXCOORDS, QUAD_VERTICES, RenderBackend,
    SamplerDesc, TextureDesc, TextureFormat, UploadRegion, Viewport,
};
pub use bitmap::{BINOMIAL_KERNEL, BitmapLayout, PaddedBitmap, bitmap_layout, generate_bitmap};
pub use config::LosConfig;
pub use coords::{CoordinateMatrices, texture_size};
pub use error::{Error, Result};
pub use los::LosTexture;
pub use smoothing::{SmoothingState, TemporalSmoother};
pub use textures::{LosTextures, SmoothingBuffers, TextureManager};
pub use visibility::{Visibility, VisibilityGrid, VisibilityOracle};
