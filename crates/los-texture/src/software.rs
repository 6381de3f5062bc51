//! CPU implementation of [`RenderBackend`].
//!
//! Textures are plain byte buffers and the smoothing effect is evaluated per
//! texel. Useful for headless minimap export, and for checking what the GPU
//! path would produce.

use std::collections::HashMap;

use glam::{Vec2, Vec4};

use crate::backend::{FramebufferStatus, RenderBackend, TextureDesc, UploadRegion, Viewport};
use crate::error::{Error, Result};
use crate::smoothing::{DELTA_UNIFORM, PREVIOUS_TEXTURE_SLOT, RAW_TEXTURE_SLOT, SMOOTH_EFFECT};

/// Blend `previous` toward `raw` by `weight`, writing into `out`.
///
/// This is the per-texel behaviour of the smoothing effect:
/// `mix(previous, raw, clamp(weight, 0, 1))`, rounded to the nearest byte.
pub fn blend_texels(previous: &[u8], raw: &[u8], weight: f32, out: &mut [u8]) {
    let weight = weight.clamp(0.0, 1.0);
    for ((out, &previous), &raw) in out.iter_mut().zip(previous).zip(raw) {
        let previous = f32::from(previous);
        let mixed = previous + (f32::from(raw) - previous) * weight;
        *out = mixed.round().clamp(0.0, 255.0) as u8;
    }
}

/// Handle to a software texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoftwareTexture(usize);

/// Handle to a software framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoftwareFramebuffer(usize);

/// A loaded software effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwareEffect {
    name: &'static str,
}

/// A recorded smoothing draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    /// Framebuffer bound when drawing.
    pub target: Option<SoftwareFramebuffer>,
    pub viewport: Viewport,
    /// The `delta` uniform at draw time.
    pub delta: Vec4,
}

struct TextureData {
    desc: TextureDesc,
    texels: Vec<u8>,
}

#[derive(Default)]
struct PassState {
    textures: HashMap<&'static str, SoftwareTexture>,
    uniforms: HashMap<&'static str, Vec4>,
}

/// CPU rendering backend.
pub struct SoftwareBackend {
    textures: Vec<Option<TextureData>>,
    framebuffers: Vec<Option<SoftwareTexture>>,
    bound_framebuffer: Option<SoftwareFramebuffer>,
    viewport: Viewport,
    initialised: bool,
    fail_effects: bool,
    status_override: Option<FramebufferStatus>,
    pass: Option<PassState>,
    draw_calls: Vec<DrawCall>,
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareBackend {
    /// Create an initialised backend with a 1024x768 default viewport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            textures: Vec::new(),
            framebuffers: Vec::new(),
            bound_framebuffer: None,
            viewport: Viewport {
                x: 0,
                y: 0,
                width: 1024,
                height: 768,
            },
            initialised: true,
            fail_effects: false,
            status_override: None,
            pass: None,
            draw_calls: Vec::new(),
        }
    }

    /// Make every [`RenderBackend::load_effect`] call fail.
    #[must_use]
    pub fn with_failing_effects(mut self) -> Self {
        self.fail_effects = true;
        self
    }

    /// Report `status` for every framebuffer.
    #[must_use]
    pub fn with_framebuffer_status(mut self, status: FramebufferStatus) -> Self {
        self.status_override = Some(status);
        self
    }

    /// Toggle whether the renderer counts as initialised.
    pub fn set_initialised(&mut self, initialised: bool) {
        self.initialised = initialised;
    }

    /// Texel data of `texture`, row-major with no padding.
    ///
    /// # Panics
    ///
    /// Panics if the texture was destroyed.
    #[must_use]
    pub fn texels(&self, texture: &SoftwareTexture) -> &[u8] {
        &self.texture_data(*texture).texels
    }

    /// Texel at `(x, y)`.
    #[must_use]
    pub fn texel(&self, texture: &SoftwareTexture, x: u32, y: u32) -> u8 {
        let data = self.texture_data(*texture);
        data.texels[(y * data.desc.width + x) as usize]
    }

    /// Description `texture` was created with.
    #[must_use]
    pub fn texture_desc(&self, texture: &SoftwareTexture) -> TextureDesc {
        self.texture_data(*texture).desc
    }

    /// Number of textures not yet destroyed.
    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.textures.iter().flatten().count()
    }

    /// Number of framebuffers not yet destroyed.
    #[must_use]
    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.iter().flatten().count()
    }

    /// Framebuffer currently bound as render target.
    #[must_use]
    pub fn bound_framebuffer(&self) -> Option<SoftwareFramebuffer> {
        self.bound_framebuffer
    }

    /// Color attachment of `framebuffer`.
    #[must_use]
    pub fn framebuffer_texture(&self, framebuffer: &SoftwareFramebuffer) -> Option<SoftwareTexture> {
        self.framebuffers.get(framebuffer.0).copied().flatten()
    }

    /// Smoothing draws issued since the log was last drained.
    #[must_use]
    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draw_calls
    }

    /// Drain the draw call log.
    ///
    /// Every draw is recorded, so long-running hosts should call this once
    /// per frame.
    pub fn take_draw_calls(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.draw_calls)
    }

    fn texture_data(&self, texture: SoftwareTexture) -> &TextureData {
        self.textures[texture.0]
            .as_ref()
            .expect("software texture used after destroy")
    }

    fn texture_data_mut(&mut self, texture: SoftwareTexture) -> Option<&mut TextureData> {
        self.textures.get_mut(texture.0).and_then(Option::as_mut)
    }

    /// Nearest texel of `texture` at `uv`.
    fn sample(&self, texture: SoftwareTexture, uv: Vec2) -> u8 {
        let data = self.texture_data(texture);
        let width = data.desc.width as usize;
        let height = data.desc.height as usize;
        let uv = uv.clamp(Vec2::ZERO, Vec2::ONE);
        let x = ((uv.x * width as f32) as usize).min(width - 1);
        let y = ((uv.y * height as f32) as usize).min(height - 1);
        data.texels[y * width + x]
    }

    fn run_smoothing(&mut self) {
        let Some(pass) = &self.pass else {
            return;
        };
        let Some(target) = self
            .bound_framebuffer
            .and_then(|framebuffer| self.framebuffer_texture(&framebuffer))
        else {
            return;
        };
        let (Some(&raw), Some(&previous)) = (
            pass.textures.get(RAW_TEXTURE_SLOT),
            pass.textures.get(PREVIOUS_TEXTURE_SLOT),
        ) else {
            return;
        };
        let weight = pass
            .uniforms
            .get(DELTA_UNIFORM)
            .copied()
            .unwrap_or(Vec4::ZERO)
            .x;

        let target_desc = self.texture_data(target).desc;
        let vp = self.viewport;
        let x_range = vp.x.max(0)..(vp.x + vp.width).min(target_desc.width as i32);
        let y_range = vp.y.max(0)..(vp.y + vp.height).min(target_desc.height as i32);

        let mut writes = Vec::new();
        for y in y_range {
            let mut previous_row = Vec::new();
            let mut raw_row = Vec::new();
            for x in x_range.clone() {
                // Texel centre in quad texture coordinates.
                let uv = Vec2::new(
                    ((x - vp.x) as f32 + 0.5) / vp.width as f32,
                    ((y - vp.y) as f32 + 0.5) / vp.height as f32,
                );
                previous_row.push(self.sample(previous, uv));
                raw_row.push(self.sample(raw, uv));
            }
            let mut out = vec![0u8; raw_row.len()];
            blend_texels(&previous_row, &raw_row, weight, &mut out);
            writes.push((y, out));
        }

        let start = x_range.start as usize;
        if let Some(data) = self.texture_data_mut(target) {
            let width = data.desc.width as usize;
            for (y, row) in writes {
                if row.is_empty() {
                    continue;
                }
                let offset = y as usize * width + start;
                data.texels[offset..offset + row.len()].copy_from_slice(&row);
            }
        }
    }
}

/// Store `value` in the first free slot, returning its index.
fn insert_slot<T>(slots: &mut Vec<Option<T>>, value: T) -> usize {
    if let Some(index) = slots.iter().position(Option::is_none) {
        slots[index] = Some(value);
        index
    } else {
        slots.push(Some(value));
        slots.len() - 1
    }
}

impl RenderBackend for SoftwareBackend {
    type Texture = SoftwareTexture;
    type Framebuffer = SoftwareFramebuffer;
    type Effect = SoftwareEffect;

    fn is_initialised(&self) -> bool {
        self.initialised
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> SoftwareTexture {
        let len = desc.width as usize * desc.height as usize * desc.format.bytes_per_texel();
        SoftwareTexture(insert_slot(
            &mut self.textures,
            TextureData {
                desc: *desc,
                texels: vec![0; len],
            },
        ))
    }

    fn destroy_texture(&mut self, texture: SoftwareTexture) {
        if let Some(slot) = self.textures.get_mut(texture.0) {
            *slot = None;
        }
    }

    fn texture_size(&self, texture: &SoftwareTexture) -> (u32, u32) {
        let desc = self.texture_data(*texture).desc;
        (desc.width, desc.height)
    }

    fn upload_texture(&mut self, texture: &SoftwareTexture, data: &[u8]) {
        if let Some(target) = self.texture_data_mut(*texture) {
            let len = target.texels.len().min(data.len());
            target.texels[..len].copy_from_slice(&data[..len]);
        }
    }

    fn upload_texture_region(
        &mut self,
        texture: &SoftwareTexture,
        region: &UploadRegion,
        data: &[u8],
    ) {
        let Some(target) = self.texture_data_mut(*texture) else {
            return;
        };
        let tex_width = target.desc.width;
        let tex_height = target.desc.height;
        let width = region.width.min(tex_width.saturating_sub(region.x)) as usize;
        let rows = region.height.min(tex_height.saturating_sub(region.y));

        for row in 0..rows {
            let src = row as usize * region.stride;
            let Some(src_row) = data.get(src..src + width) else {
                break;
            };
            let dst = ((region.y + row) * tex_width + region.x) as usize;
            target.texels[dst..dst + width].copy_from_slice(src_row);
        }
    }

    fn create_framebuffer(&mut self, texture: &SoftwareTexture) -> SoftwareFramebuffer {
        SoftwareFramebuffer(insert_slot(&mut self.framebuffers, *texture))
    }

    fn destroy_framebuffer(&mut self, framebuffer: SoftwareFramebuffer) {
        if let Some(slot) = self.framebuffers.get_mut(framebuffer.0) {
            *slot = None;
        }
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn framebuffer_status(&self, framebuffer: &SoftwareFramebuffer) -> FramebufferStatus {
        if let Some(status) = self.status_override {
            return status;
        }
        match self.framebuffer_texture(framebuffer) {
            Some(texture) if self.textures[texture.0].is_some() => FramebufferStatus::Complete,
            _ => FramebufferStatus::MissingAttachment,
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<&SoftwareFramebuffer>) {
        self.bound_framebuffer = framebuffer.copied();
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn load_effect(&mut self, name: &'static str) -> Result<SoftwareEffect> {
        if !self.initialised || self.fail_effects {
            return Err(Error::ShaderInit {
                effect: name,
                message: "shader program failed to link".to_string(),
            });
        }
        if name != SMOOTH_EFFECT {
            return Err(Error::ShaderInit {
                effect: name,
                message: "unknown effect".to_string(),
            });
        }
        Ok(SoftwareEffect { name })
    }

    fn begin_pass(&mut self, _effect: &SoftwareEffect) {
        self.pass = Some(PassState::default());
    }

    fn bind_texture(&mut self, _effect: &SoftwareEffect, slot: &'static str, texture: &SoftwareTexture) {
        if let Some(pass) = &mut self.pass {
            pass.textures.insert(slot, *texture);
        }
    }

    fn set_uniform(&mut self, _effect: &SoftwareEffect, name: &'static str, value: Vec4) {
        if let Some(pass) = &mut self.pass {
            pass.uniforms.insert(name, value);
        }
    }

    fn draw_quad(&mut self, effect: &SoftwareEffect, _vertices: &[Vec2; 6], _texcoords: &[Vec2; 6]) {
        let delta = self
            .pass
            .as_ref()
            .and_then(|pass| pass.uniforms.get(DELTA_UNIFORM).copied())
            .unwrap_or(Vec4::ZERO);
        self.draw_calls.push(DrawCall {
            target: self.bound_framebuffer,
            viewport: self.viewport,
            delta,
        });

        if effect.name == SMOOTH_EFFECT {
            self.run_smoothing();
        }
    }

    fn end_pass(&mut self, _effect: &SoftwareEffect) {
        self.pass = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SamplerDesc, TextureFormat};

    fn desc(size: u32) -> TextureDesc {
        TextureDesc {
            format: TextureFormat::A8,
            width: size,
            height: size,
            sampler: SamplerDesc::linear_clamp(),
        }
    }

    #[test]
    fn test_blend_texels() {
        let mut out = [0u8; 4];
        blend_texels(&[0, 100, 255, 10], &[255, 100, 0, 20], 0.5, &mut out);
        assert_eq!(out, [128, 100, 128, 15]);

        blend_texels(&[0, 0, 0, 0], &[255, 255, 255, 255], 3.0, &mut out);
        assert_eq!(out, [255; 4]);

        blend_texels(&[7, 7, 7, 7], &[255, 255, 255, 255], -1.0, &mut out);
        assert_eq!(out, [7; 4]);
    }

    #[test]
    fn test_region_upload_honours_stride() {
        let mut backend = SoftwareBackend::new();
        let texture = backend.create_texture(&desc(4));

        // Two rows of two texels, five bytes apart.
        let data = [1, 2, 9, 9, 9, 3, 4, 9, 9, 9];
        let region = UploadRegion {
            x: 0,
            y: 0,
            width: 2,
            height: 2,
            stride: 5,
        };
        backend.upload_texture_region(&texture, &region, &data);

        assert_eq!(
            backend.texels(&texture),
            &[1, 2, 0, 0, 3, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_region_upload_is_clipped() {
        let mut backend = SoftwareBackend::new();
        let texture = backend.create_texture(&desc(2));
        let region = UploadRegion {
            x: 1,
            y: 1,
            width: 4,
            height: 4,
            stride: 4,
        };
        backend.upload_texture_region(&texture, &region, &[5; 16]);
        assert_eq!(backend.texels(&texture), &[0, 0, 0, 5]);
    }

    #[test]
    fn test_framebuffer_lifecycle() {
        let mut backend = SoftwareBackend::new();
        let texture = backend.create_texture(&desc(4));
        let framebuffer = backend.create_framebuffer(&texture);
        assert_eq!(
            backend.framebuffer_status(&framebuffer),
            FramebufferStatus::Complete
        );

        backend.destroy_texture(texture);
        assert_eq!(
            backend.framebuffer_status(&framebuffer),
            FramebufferStatus::MissingAttachment
        );

        backend.destroy_framebuffer(framebuffer);
        assert_eq!(backend.live_textures(), 0);
        assert_eq!(backend.live_framebuffers(), 0);
    }

    #[test]
    fn test_destroyed_slots_are_reused() {
        let mut backend = SoftwareBackend::new();
        for _ in 0..10 {
            let texture = backend.create_texture(&desc(4));
            let framebuffer = backend.create_framebuffer(&texture);
            backend.destroy_framebuffer(framebuffer);
            backend.destroy_texture(texture);
        }
        assert_eq!(backend.textures.len(), 1);
        assert_eq!(backend.framebuffers.len(), 1);

        let first = backend.create_texture(&desc(2));
        let second = backend.create_texture(&desc(2));
        backend.destroy_texture(first);
        assert_eq!(backend.create_texture(&desc(8)), first);
        assert_eq!(backend.texture_size(&first), (8, 8));
        assert_eq!(backend.texture_size(&second), (2, 2));
    }

    #[test]
    fn test_unknown_effect_fails() {
        let mut backend = SoftwareBackend::new();
        assert!(matches!(
            backend.load_effect("water"),
            Err(Error::ShaderInit { effect: "water", .. })
        ));
        assert!(backend.load_effect(SMOOTH_EFFECT).is_ok());

        let mut failing = SoftwareBackend::new().with_failing_effects();
        assert!(failing.load_effect(SMOOTH_EFFECT).is_err());
    }

    #[test]
    fn test_smoothing_pass_blends_into_bound_target() {
        let mut backend = SoftwareBackend::new();
        let raw = backend.create_texture(&desc(2));
        let previous = backend.create_texture(&desc(2));
        let target = backend.create_texture(&desc(2));
        let framebuffer = backend.create_framebuffer(&target);

        backend.upload_texture(&raw, &[200, 200, 0, 100]);
        backend.upload_texture(&previous, &[0, 100, 0, 100]);

        let effect = backend.load_effect(SMOOTH_EFFECT).unwrap();
        backend.bind_framebuffer(Some(&framebuffer));
        backend.begin_pass(&effect);
        backend.bind_texture(&effect, RAW_TEXTURE_SLOT, &raw);
        backend.bind_texture(&effect, PREVIOUS_TEXTURE_SLOT, &previous);
        backend.set_uniform(&effect, DELTA_UNIFORM, Vec4::new(0.25, 0.0, 0.0, 0.0));
        backend.set_viewport(Viewport {
            x: 0,
            y: 0,
            width: 2,
            height: 2,
        });
        backend.draw_quad(&effect, &crate::QUAD_VERTICES, &crate::QUAD_TEXCOORDS);
        backend.end_pass(&effect);

        assert_eq!(backend.texels(&target), &[50, 125, 0, 100]);
        assert_eq!(backend.draw_calls().len(), 1);
        assert_eq!(backend.draw_calls()[0].target, Some(framebuffer));
    }
}
