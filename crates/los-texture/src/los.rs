//! The LOS texture as seen by the renderer.

use glam::Mat4;

use crate::backend::RenderBackend;
use crate::bitmap::generate_bitmap;
use crate::config::LosConfig;
use crate::coords::CoordinateMatrices;
use crate::error::Result;
use crate::smoothing::TemporalSmoother;
use crate::textures::{LosTextures, TextureManager};
use crate::visibility::VisibilityOracle;

/// Maintains the fog-of-war texture used for scene shading and the minimap.
///
/// The simulation calls [`LosTexture::make_dirty`] after every update and the
/// renderer calls [`LosTexture::interpolate`] once per frame. Accessors may
/// only be used after an `interpolate` that followed the last `make_dirty`.
///
/// GPU resources are owned by the backend; call [`LosTexture::release`]
/// before dropping to free them.
pub struct LosTexture<B: RenderBackend> {
    config: LosConfig,
    dirty: bool,
    /// A recompute was skipped for lack of visibility data.
    pending: bool,
    smooth_enabled: bool,
    smoothing_active: bool,
    textures: TextureManager<B>,
    smoother: TemporalSmoother<B>,
    matrices: CoordinateMatrices,
}

impl<B: RenderBackend> LosTexture<B> {
    pub fn new(config: LosConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            smooth_enabled: config.smooth,
            textures: TextureManager::new(config.clone()),
            config,
            dirty: true,
            pending: false,
            smoothing_active: false,
            smoother: TemporalSmoother::new(),
            matrices: CoordinateMatrices::default(),
        })
    }

    /// Mark the texture as needing recomputation.
    pub fn make_dirty(&mut self) {
        self.dirty = true;
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn config(&self) -> &LosConfig {
        &self.config
    }

    /// Whether smoothing is currently requested and not permanently disabled.
    #[must_use]
    pub fn smoothing_enabled(&self) -> bool {
        self.smooth_enabled
    }

    /// Turn temporal smoothing on or off.
    ///
    /// Has no effect once the smoothing effect failed to load.
    pub fn set_smoothing_enabled(&mut self, enabled: bool) {
        if enabled && self.smoother.is_disabled() {
            tracing::debug!("LOS smoothing unavailable for this session");
            return;
        }
        self.smooth_enabled = enabled;
    }

    /// Advance one rendered frame.
    ///
    /// Recomputes the texture from `oracle` if dirty, then runs the smoothing
    /// pass. `None` for the oracle means the simulation has no visibility
    /// data; the recompute is skipped, existing textures are kept, and it is
    /// retried on the next frame that has an oracle.
    pub fn interpolate<O: VisibilityOracle + ?Sized>(
        &mut self,
        backend: &mut B,
        oracle: Option<&O>,
        frame_delta: f32,
    ) {
        let mut smoothing = self.smooth_enabled && backend.is_initialised();

        if smoothing && !self.smoother.is_ready() {
            if self.smoother.initialise(backend) {
                // Textures built without smoothing buffers get rebuilt by the
                // recompute once visibility data is available.
                self.dirty = true;
            } else {
                self.smooth_enabled = false;
                smoothing = false;
            }
        }
        self.smoothing_active = smoothing;

        if smoothing
            && self
                .textures
                .textures()
                .is_some_and(|textures| textures.smoothing().is_none())
        {
            self.dirty = true;
        }

        if self.dirty || self.pending {
            self.pending = !self.recompute(backend, oracle);
            self.dirty = false;
        }

        if !smoothing {
            return;
        }

        let Some(textures) = self.textures.textures() else {
            return;
        };
        let Some(buffers) = textures.smoothing() else {
            return;
        };

        let weight = frame_delta * self.config.smoothing_rate;
        self.smoother.step(backend, textures.primary(), buffers, weight);
    }

    /// Returns `false` if there was no oracle to recompute from.
    fn recompute<O: VisibilityOracle + ?Sized>(
        &mut self,
        backend: &mut B,
        oracle: Option<&O>,
    ) -> bool {
        let Some(oracle) = oracle else {
            tracing::debug!("no visibility data, skipping LOS recompute");
            return false;
        };

        let _span = tracing::trace_span!("recompute_los_texture").entered();

        let map_size = oracle.vertices_per_side();
        let recreated = self
            .textures
            .ensure(backend, map_size, self.smoothing_active);
        if let Some(textures) = self.textures.textures() {
            self.matrices = *textures.matrices();
        }

        let bitmap = generate_bitmap(oracle, map_size, map_size, &self.config);
        self.textures
            .upload(backend, &bitmap, recreated && self.smoothing_active);
        true
    }

    /// The raw (unsmoothed) LOS texture.
    ///
    /// # Panics
    ///
    /// Panics if called while dirty.
    #[must_use]
    pub fn texture(&self) -> Option<&B::Texture> {
        assert!(!self.dirty, "LOS texture read before interpolate");
        self.textures.textures().map(LosTextures::primary)
    }

    /// The texture to sample for rendering: the current smoothing buffer, or
    /// the raw texture when smoothing is off.
    ///
    /// # Panics
    ///
    /// Panics if called while dirty.
    #[must_use]
    pub fn texture_smooth(&self) -> Option<&B::Texture> {
        assert!(!self.dirty, "LOS texture read before interpolate");
        let textures = self.textures.textures()?;
        match textures.smoothing() {
            Some(buffers) if self.smoothing_active => Some(self.smoother.current(buffers)),
            _ => Some(textures.primary()),
        }
    }

    /// Matrix mapping world `(x, y, z)` to LOS texture `(u, v)`.
    ///
    /// # Panics
    ///
    /// Panics if called while dirty.
    #[must_use]
    pub fn texture_matrix(&self) -> &Mat4 {
        assert!(!self.dirty, "LOS texture matrix read before interpolate");
        &self.matrices.world_to_los
    }

    /// Matrix mapping minimap `(0, 0)-(1, 1)` to LOS texture `(u, v)`.
    ///
    /// # Panics
    ///
    /// Panics if called while dirty.
    #[must_use]
    pub fn minimap_texture_matrix(&self) -> &Mat4 {
        assert!(!self.dirty, "LOS minimap matrix read before interpolate");
        &self.matrices.los_to_minimap
    }

    /// Vertices per side of the built textures, if any.
    #[must_use]
    pub fn map_size(&self) -> Option<usize> {
        self.textures.textures().map(LosTextures::map_size)
    }

    /// Side length of the built textures, if any.
    #[must_use]
    pub fn texture_size(&self) -> Option<usize> {
        self.textures.textures().map(LosTextures::texture_size)
    }

    /// Destroy all GPU resources. The next dirty `interpolate` rebuilds them.
    pub fn release(&mut self, backend: &mut B) {
        self.textures.delete(backend);
        self.dirty = true;
    }
}
