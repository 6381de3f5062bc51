//! Temporal smoothing of the LOS texture.
//!
//! Each frame a full-screen pass blends the previous smoothed result toward
//! the raw LOS texture and writes into the other smoothing buffer, after which
//! the two buffers swap roles. With a blend weight proportional to the frame
//! time this gives an exponential approach to the latest visibility instead of
//! a hard cut.

use glam::Vec4;

use crate::backend::{QUAD_TEXCOORDS, QUAD_VERTICES, RenderBackend, Viewport};
use crate::textures::SmoothingBuffers;

/// Name of the blending effect.
pub const SMOOTH_EFFECT: &str = "los_interp";
/// Slot receiving the raw LOS texture.
pub const RAW_TEXTURE_SLOT: &str = "losTex1";
/// Slot receiving the previous smoothed result.
pub const PREVIOUS_TEXTURE_SLOT: &str = "losTex2";
/// Uniform carrying the blend weight in its first component.
pub const DELTA_UNIFORM: &str = "delta";

/// Lifecycle of the smoothing effect.
///
/// `Disabled` is terminal: once the effect failed to load, smoothing stays
/// off for the rest of the session.
pub enum SmoothingState<E> {
    Uninitialized,
    Ready(E),
    Disabled,
}

/// Ping-pongs between the two smoothing buffers.
pub struct TemporalSmoother<B: RenderBackend> {
    state: SmoothingState<B::Effect>,
    current: usize,
}

impl<B: RenderBackend> Default for TemporalSmoother<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: RenderBackend> TemporalSmoother<B> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SmoothingState::Uninitialized,
            current: 0,
        }
    }

    /// Load the blending effect if that has not been attempted yet.
    ///
    /// Returns `true` if this call moved the smoother to `Ready`.
    pub fn initialise(&mut self, backend: &mut B) -> bool {
        if !matches!(self.state, SmoothingState::Uninitialized) {
            return false;
        }

        match backend.load_effect(SMOOTH_EFFECT) {
            Ok(effect) => {
                tracing::debug!("loaded {SMOOTH_EFFECT} effect");
                self.state = SmoothingState::Ready(effect);
                true
            }
            Err(e) => {
                tracing::error!("Failed to load SmoothLOS shader, disabling: {e}");
                self.state = SmoothingState::Disabled;
                false
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> &SmoothingState<B::Effect> {
        &self.state
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, SmoothingState::Ready(_))
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        matches!(self.state, SmoothingState::Disabled)
    }

    /// Index of the buffer holding the latest smoothed result.
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// The buffer holding the latest smoothed result.
    #[must_use]
    pub fn current<'a>(&self, buffers: &'a SmoothingBuffers<B>) -> &'a B::Texture {
        buffers.texture(self.current)
    }

    /// Blend `raw` into the next buffer and make it current.
    ///
    /// `weight` is the blend factor toward `raw` (clamped to `[0, 1]` by the
    /// effect). Does nothing unless the smoother is `Ready`.
    pub fn step(
        &mut self,
        backend: &mut B,
        raw: &B::Texture,
        buffers: &SmoothingBuffers<B>,
        weight: f32,
    ) {
        let SmoothingState::Ready(effect) = &self.state else {
            return;
        };

        let next = 1 - self.current;
        let (width, height) = backend.texture_size(raw);

        backend.bind_framebuffer(Some(buffers.framebuffer(next)));
        backend.begin_pass(effect);

        backend.bind_texture(effect, RAW_TEXTURE_SLOT, raw);
        backend.bind_texture(effect, PREVIOUS_TEXTURE_SLOT, buffers.texture(self.current));
        backend.set_uniform(effect, DELTA_UNIFORM, Vec4::new(weight, 0.0, 0.0, 0.0));

        let old_viewport = backend.viewport();
        backend.set_viewport(Viewport {
            x: 0,
            y: 0,
            width: width as i32,
            height: height as i32,
        });

        backend.draw_quad(effect, &QUAD_VERTICES, &QUAD_TEXCOORDS);

        backend.set_viewport(old_viewport);
        backend.end_pass(effect);
        backend.bind_framebuffer(None);

        self.current = next;
    }
}
