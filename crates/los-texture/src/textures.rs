//! Ownership of the LOS texture, its smoothing buffers and framebuffers.

use crate::backend::{RenderBackend, SamplerDesc, TextureDesc, TextureFormat, UploadRegion};
use crate::bitmap::PaddedBitmap;
use crate::config::LosConfig;
use crate::coords::{CoordinateMatrices, texture_size};
use crate::error::Error;

/// The two render targets used by temporal smoothing.
///
/// Roles (previous result / render target) are assigned by index by the
/// smoother; the buffers themselves never move.
pub struct SmoothingBuffers<B: RenderBackend> {
    textures: [B::Texture; 2],
    framebuffers: [B::Framebuffer; 2],
}

impl<B: RenderBackend> SmoothingBuffers<B> {
    fn create(backend: &mut B, desc: &TextureDesc) -> Self {
        let textures = [backend.create_texture(desc), backend.create_texture(desc)];
        let framebuffers = [
            backend.create_framebuffer(&textures[0]),
            backend.create_framebuffer(&textures[1]),
        ];

        let first = backend.framebuffer_status(&framebuffers[0]);
        let second = backend.framebuffer_status(&framebuffers[1]);
        if !first.is_complete() || !second.is_complete() {
            tracing::warn!("{}", Error::FramebufferIncomplete { first, second });
        }

        Self {
            textures,
            framebuffers,
        }
    }

    fn destroy(self, backend: &mut B) {
        let [first_fb, second_fb] = self.framebuffers;
        backend.destroy_framebuffer(first_fb);
        backend.destroy_framebuffer(second_fb);

        let [first, second] = self.textures;
        backend.destroy_texture(first);
        backend.destroy_texture(second);
    }

    /// Smoothing texture `index` (0 or 1).
    #[must_use]
    pub fn texture(&self, index: usize) -> &B::Texture {
        &self.textures[index]
    }

    /// Framebuffer rendering into smoothing texture `index`.
    #[must_use]
    pub fn framebuffer(&self, index: usize) -> &B::Framebuffer {
        &self.framebuffers[index]
    }
}

/// The set of textures built for one map size.
pub struct LosTextures<B: RenderBackend> {
    primary: B::Texture,
    smoothing: Option<SmoothingBuffers<B>>,
    map_size: usize,
    texture_size: usize,
    matrices: CoordinateMatrices,
}

impl<B: RenderBackend> LosTextures<B> {
    fn construct(backend: &mut B, map_size: usize, config: &LosConfig, with_smoothing: bool) -> Self {
        let texture_size = texture_size(map_size, config);
        let side = texture_size as u32;
        let desc = TextureDesc {
            format: TextureFormat::A8,
            width: side,
            height: side,
            sampler: SamplerDesc::linear_clamp(),
        };

        // Everything starts unexplored; uploads only ever cover the map region.
        let clear = vec![0u8; texture_size * texture_size];

        let primary = backend.create_texture(&desc);
        backend.upload_texture(&primary, &clear);

        let smoothing = with_smoothing.then(|| {
            let buffers = SmoothingBuffers::create(backend, &desc);
            for texture in &buffers.textures {
                backend.upload_texture(texture, &clear);
            }
            buffers
        });

        tracing::debug!(
            map_size,
            texture_size,
            with_smoothing,
            "constructed LOS textures"
        );

        Self {
            primary,
            smoothing,
            map_size,
            texture_size,
            matrices: CoordinateMatrices::new(map_size, texture_size, config.cell_size),
        }
    }

    fn destroy(self, backend: &mut B) {
        if let Some(buffers) = self.smoothing {
            buffers.destroy(backend);
        }
        backend.destroy_texture(self.primary);
    }

    /// The texture holding the latest blurred bitmap.
    #[must_use]
    pub fn primary(&self) -> &B::Texture {
        &self.primary
    }

    /// The smoothing render targets, if smoothing was active at construction.
    #[must_use]
    pub fn smoothing(&self) -> Option<&SmoothingBuffers<B>> {
        self.smoothing.as_ref()
    }

    /// Vertices per side the textures were built for.
    #[must_use]
    pub fn map_size(&self) -> usize {
        self.map_size
    }

    /// Side length of every texture in the set.
    #[must_use]
    pub fn texture_size(&self) -> usize {
        self.texture_size
    }

    #[must_use]
    pub fn matrices(&self) -> &CoordinateMatrices {
        &self.matrices
    }
}

/// Builds, rebuilds and feeds the LOS textures.
pub struct TextureManager<B: RenderBackend> {
    config: LosConfig,
    textures: Option<LosTextures<B>>,
}

impl<B: RenderBackend> TextureManager<B> {
    #[must_use]
    pub fn new(config: LosConfig) -> Self {
        Self {
            config,
            textures: None,
        }
    }

    /// Make sure textures exist for `map_size`.
    ///
    /// Rebuilds from scratch when nothing is built yet, when the map size
    /// changed, or when smoothing buffers are needed but were not built.
    /// Returns `true` when the textures were (re)created, in which case their
    /// content is all zero.
    pub fn ensure(&mut self, backend: &mut B, map_size: usize, with_smoothing: bool) -> bool {
        if let Some(textures) = &self.textures {
            let stale = textures.map_size != map_size
                || (with_smoothing && textures.smoothing.is_none());
            if !stale {
                return false;
            }
            tracing::debug!(
                old_map_size = textures.map_size,
                map_size,
                "rebuilding LOS textures"
            );
            self.delete(backend);
        }

        self.textures = Some(LosTextures::construct(
            backend,
            map_size,
            &self.config,
            with_smoothing,
        ));
        true
    }

    /// Upload the blurred map region of `bitmap` into the primary texture.
    ///
    /// With `seed_smoothing`, the same region is also written to both
    /// smoothing buffers so the first blended frames start from the current
    /// state rather than from black.
    pub fn upload(&self, backend: &mut B, bitmap: &PaddedBitmap, seed_smoothing: bool) {
        let Some(textures) = &self.textures else {
            return;
        };

        let region = UploadRegion {
            x: 0,
            y: 0,
            width: bitmap.width() as u32,
            height: bitmap.height() as u32,
            stride: bitmap.pitch(),
        };
        let data = bitmap.upload_bytes();

        if seed_smoothing && let Some(buffers) = &textures.smoothing {
            for texture in &buffers.textures {
                backend.upload_texture_region(texture, &region, data);
            }
        }

        backend.upload_texture_region(&textures.primary, &region, data);
    }

    /// Destroy all textures and framebuffers.
    pub fn delete(&mut self, backend: &mut B) {
        if let Some(textures) = self.textures.take() {
            textures.destroy(backend);
        }
    }

    #[must_use]
    pub fn textures(&self) -> Option<&LosTextures<B>> {
        self.textures.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &LosConfig {
        &self.config
    }
}
