//! [`RenderBackend`] over Bevy images.
//!
//! The LOS pipeline runs against CPU-side [`Image`]s owned by the backend.
//! [`ImageBackend::sync`] then mirrors every modified texture into
//! `Assets<Image>`, from where Bevy uploads it to the GPU like any other
//! image asset.

use std::collections::HashMap;
use std::ops::Range;

use bevy::asset::RenderAssetUsages;
use bevy::image::{ImageAddressMode, ImageFilterMode, ImageSampler, ImageSamplerDescriptor};
use bevy::prelude::*;
use bevy::render::render_resource::{
    Extent3d, TextureDimension, TextureFormat as GpuTextureFormat,
};
use glam::{Vec2, Vec4};
use los_texture::smoothing::{DELTA_UNIFORM, PREVIOUS_TEXTURE_SLOT, RAW_TEXTURE_SLOT, SMOOTH_EFFECT};
use los_texture::software::blend_texels;
use los_texture::{
    AddressMode, Error, Filter, FramebufferStatus, RenderBackend, Result, SamplerDesc,
    TextureDesc, TextureFormat, UploadRegion, Viewport,
};

/// Handle to a texture owned by an [`ImageBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageTexture(usize);

/// Handle to a render target owned by an [`ImageBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageFramebuffer(usize);

/// The smoothing effect, evaluated on the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageEffect;

struct TextureEntry {
    image: Image,
    /// Asset mirroring `image`, assigned on first sync.
    handle: Option<Handle<Image>>,
    modified: bool,
}

#[derive(Default)]
struct PassState {
    textures: HashMap<&'static str, ImageTexture>,
    weight: f32,
}

/// Renders the LOS textures into Bevy images.
pub struct ImageBackend {
    textures: Vec<Option<TextureEntry>>,
    framebuffers: Vec<Option<ImageTexture>>,
    bound_framebuffer: Option<ImageFramebuffer>,
    viewport: Viewport,
    initialised: bool,
    pass: Option<PassState>,
}

impl Default for ImageBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            textures: Vec::new(),
            framebuffers: Vec::new(),
            bound_framebuffer: None,
            viewport: Viewport::default(),
            initialised: true,
            pass: None,
        }
    }

    /// Toggle whether effects can be loaded.
    pub fn set_initialised(&mut self, initialised: bool) {
        self.initialised = initialised;
    }

    /// The CPU-side image behind `texture`.
    #[must_use]
    pub fn image(&self, texture: &ImageTexture) -> Option<&Image> {
        self.entry(*texture).map(|entry| &entry.image)
    }

    /// The asset mirroring `texture`, once [`ImageBackend::sync`] has run.
    #[must_use]
    pub fn handle(&self, texture: &ImageTexture) -> Option<&Handle<Image>> {
        self.entry(*texture).and_then(|entry| entry.handle.as_ref())
    }

    /// Copy every texture modified since the last sync into `images`.
    ///
    /// Textures without an asset yet get one added. Destroyed textures drop
    /// their handle, which releases the asset.
    pub fn sync(&mut self, images: &mut Assets<Image>) {
        for entry in self.textures.iter_mut().flatten() {
            if !entry.modified {
                continue;
            }
            entry.modified = false;

            if let Some(handle) = &entry.handle
                && let Some(mut target) = images.get_mut(handle)
            {
                target.data.clone_from(&entry.image.data);
                continue;
            }
            entry.handle = Some(images.add(entry.image.clone()));
        }
    }

    fn entry(&self, texture: ImageTexture) -> Option<&TextureEntry> {
        self.textures.get(texture.0).and_then(Option::as_ref)
    }

    fn entry_mut(&mut self, texture: ImageTexture) -> Option<&mut TextureEntry> {
        self.textures.get_mut(texture.0).and_then(Option::as_mut)
    }

    /// Nearest texel of `texture` at `uv`.
    fn sample(&self, texture: ImageTexture, uv: Vec2) -> u8 {
        let Some(image) = self.image(&texture) else {
            return 0;
        };
        let Some(data) = image.data.as_deref() else {
            return 0;
        };
        let width = image.width() as usize;
        let height = image.height() as usize;
        let uv = uv.clamp(Vec2::ZERO, Vec2::ONE);
        let x = ((uv.x * width as f32) as usize).min(width.saturating_sub(1));
        let y = ((uv.y * height as f32) as usize).min(height.saturating_sub(1));
        data.get(y * width + x).copied().unwrap_or(0)
    }

    fn run_smoothing(&mut self) {
        let Some(pass) = &self.pass else {
            return;
        };
        let (Some(&raw), Some(&previous)) = (
            pass.textures.get(RAW_TEXTURE_SLOT),
            pass.textures.get(PREVIOUS_TEXTURE_SLOT),
        ) else {
            return;
        };
        let weight = pass.weight;
        let Some(target) = self
            .bound_framebuffer
            .and_then(|framebuffer| self.framebuffers.get(framebuffer.0).copied().flatten())
        else {
            return;
        };

        let (width, height) = self.texture_size(&target);
        let vp = self.viewport;
        let columns = clip(vp.x, vp.width, width);
        let rows = clip(vp.y, vp.height, height);
        if columns.is_empty() || rows.is_empty() {
            return;
        }

        let mut previous_texels = Vec::new();
        let mut raw_texels = Vec::new();
        for y in rows.clone() {
            for x in columns.clone() {
                let uv = Vec2::new(
                    ((x - vp.x) as f32 + 0.5) / vp.width as f32,
                    ((y - vp.y) as f32 + 0.5) / vp.height as f32,
                );
                previous_texels.push(self.sample(previous, uv));
                raw_texels.push(self.sample(raw, uv));
            }
        }
        let mut blended = vec![0u8; raw_texels.len()];
        blend_texels(&previous_texels, &raw_texels, weight, &mut blended);

        let Some(entry) = self.entry_mut(target) else {
            return;
        };
        let Some(data) = entry.image.data.as_mut() else {
            return;
        };
        let row_len = columns.len();
        for (row, y) in blended.chunks(row_len).zip(rows) {
            let start = y as usize * width as usize + columns.start as usize;
            data[start..start + row_len].copy_from_slice(row);
        }
        entry.modified = true;
    }
}

/// Pixels of `[origin, origin + extent)` that fall inside `[0, limit)`.
fn clip(origin: i32, extent: i32, limit: u32) -> Range<i32> {
    let limit = i32::try_from(limit).unwrap_or(i32::MAX);
    origin.max(0)..(origin + extent).min(limit)
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

fn gpu_format(format: TextureFormat) -> GpuTextureFormat {
    match format {
        TextureFormat::A8 => GpuTextureFormat::R8Unorm,
    }
}

fn image_sampler(sampler: &SamplerDesc) -> ImageSampler {
    let filter = match sampler.filter {
        Filter::Nearest => ImageFilterMode::Nearest,
        Filter::Linear => ImageFilterMode::Linear,
    };
    let address_mode = match sampler.address_mode {
        AddressMode::Repeat => ImageAddressMode::Repeat,
        AddressMode::ClampToEdge => ImageAddressMode::ClampToEdge,
    };
    ImageSampler::Descriptor(ImageSamplerDescriptor {
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: filter,
        min_filter: filter,
        ..default()
    })
}

impl RenderBackend for ImageBackend {
    type Texture = ImageTexture;
    type Framebuffer = ImageFramebuffer;
    type Effect = ImageEffect;

    fn is_initialised(&self) -> bool {
        self.initialised
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> ImageTexture {
        let mut image = Image::new_fill(
            Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            TextureDimension::D2,
            &[0],
            gpu_format(desc.format),
            RenderAssetUsages::default(),
        );
        image.sampler = image_sampler(&desc.sampler);

        ImageTexture(insert_slot(
            &mut self.textures,
            TextureEntry {
                image,
                handle: None,
                modified: true,
            },
        ))
    }

    fn destroy_texture(&mut self, texture: ImageTexture) {
        if let Some(slot) = self.textures.get_mut(texture.0) {
            *slot = None;
        }
    }

    fn texture_size(&self, texture: &ImageTexture) -> (u32, u32) {
        self.image(texture)
            .map_or((0, 0), |image| (image.width(), image.height()))
    }

    fn upload_texture(&mut self, texture: &ImageTexture, data: &[u8]) {
        let Some(entry) = self.entry_mut(*texture) else {
            return;
        };
        if let Some(texels) = entry.image.data.as_mut() {
            let len = texels.len().min(data.len());
            texels[..len].copy_from_slice(&data[..len]);
            entry.modified = true;
        }
    }

    fn upload_texture_region(&mut self, texture: &ImageTexture, region: &UploadRegion, data: &[u8]) {
        let Some(entry) = self.entry_mut(*texture) else {
            return;
        };
        let tex_width = entry.image.width();
        let tex_height = entry.image.height();
        let Some(texels) = entry.image.data.as_mut() else {
            return;
        };
        let width = region.width.min(tex_width.saturating_sub(region.x)) as usize;
        let rows = region.height.min(tex_height.saturating_sub(region.y));

        for row in 0..rows {
            let src = row as usize * region.stride;
            let Some(src_row) = data.get(src..src + width) else {
                break;
            };
            let dst = ((region.y + row) * tex_width + region.x) as usize;
            texels[dst..dst + width].copy_from_slice(src_row);
        }
        entry.modified = true;
    }

    fn create_framebuffer(&mut self, texture: &ImageTexture) -> ImageFramebuffer {
        ImageFramebuffer(insert_slot(&mut self.framebuffers, *texture))
    }

    fn destroy_framebuffer(&mut self, framebuffer: ImageFramebuffer) {
        if let Some(slot) = self.framebuffers.get_mut(framebuffer.0) {
            *slot = None;
        }
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn framebuffer_status(&self, framebuffer: &ImageFramebuffer) -> FramebufferStatus {
        let attachment = self
            .framebuffers
            .get(framebuffer.0)
            .copied()
            .flatten()
            .and_then(|texture| self.image(&texture));
        match attachment {
            Some(image) if image.texture_descriptor.format == GpuTextureFormat::R8Unorm => {
                FramebufferStatus::Complete
            }
            Some(_) => FramebufferStatus::Unsupported,
            None => FramebufferStatus::MissingAttachment,
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<&ImageFramebuffer>) {
        self.bound_framebuffer = framebuffer.copied();
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn load_effect(&mut self, name: &'static str) -> Result<ImageEffect> {
        if !self.initialised {
            return Err(Error::ShaderInit {
                effect: name,
                message: "renderer not initialised".to_string(),
            });
        }
        if name != SMOOTH_EFFECT {
            return Err(Error::ShaderInit {
                effect: name,
                message: "unknown effect".to_string(),
            });
        }
        Ok(ImageEffect)
    }

    fn begin_pass(&mut self, _effect: &ImageEffect) {
        self.pass = Some(PassState::default());
    }

    fn bind_texture(&mut self, _effect: &ImageEffect, slot: &'static str, texture: &ImageTexture) {
        if let Some(pass) = &mut self.pass {
            pass.textures.insert(slot, *texture);
        }
    }

    fn set_uniform(&mut self, _effect: &ImageEffect, name: &'static str, value: Vec4) {
        if name == DELTA_UNIFORM
            && let Some(pass) = &mut self.pass
        {
            pass.weight = value.x;
        }
    }

    fn draw_quad(&mut self, _effect: &ImageEffect, _vertices: &[Vec2; 6], _texcoords: &[Vec2; 6]) {
        self.run_smoothing();
    }

    fn end_pass(&mut self, _effect: &ImageEffect) {
        self.pass = None;
    }
}
