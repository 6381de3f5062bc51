//! Rendering services consumed by the LOS texture.
//!
//! The pipeline never talks to a graphics API directly. It goes through
//! [`RenderBackend`], which covers texture and framebuffer management, a
//! minimal shader-technique interface for the smoothing pass, and viewport
//! state. [`crate::software::SoftwareBackend`] implements it on the CPU.

use glam::{Vec2, Vec4};

use crate::error::Result;

/// Pixel format of the LOS textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    /// Single 8-bit channel.
    A8,
}

impl TextureFormat {
    /// Bytes per texel.
    #[must_use]
    pub fn bytes_per_texel(self) -> usize {
        match self {
            TextureFormat::A8 => 1,
        }
    }
}

/// Texture filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
}

/// Texture addressing mode outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Repeat,
    ClampToEdge,
}

/// Sampler state attached to a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub address_mode: AddressMode,
}

impl SamplerDesc {
    /// Linear filtering with clamp-to-edge addressing.
    #[must_use]
    pub fn linear_clamp() -> Self {
        Self {
            filter: Filter::Linear,
            address_mode: AddressMode::ClampToEdge,
        }
    }
}

/// Description of a 2D texture to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub sampler: SamplerDesc,
}

/// A rectangle of texels to overwrite, with the source row stride in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub stride: usize,
}

/// Result of a framebuffer completeness check.
///
/// Codes follow the OpenGL constants so they read the same in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    IncompleteAttachment,
    MissingAttachment,
    Unsupported,
    Other(u32),
}

impl FramebufferStatus {
    /// Numeric status code.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            FramebufferStatus::Complete => 0x8CD5,
            FramebufferStatus::IncompleteAttachment => 0x8CD6,
            FramebufferStatus::MissingAttachment => 0x8CD7,
            FramebufferStatus::Unsupported => 0x8CDD,
            FramebufferStatus::Other(code) => code,
        }
    }

    #[must_use]
    pub fn is_complete(self) -> bool {
        self == FramebufferStatus::Complete
    }
}

/// A render viewport in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Full-screen quad positions in normalized device coordinates.
pub const QUAD_VERTICES: [Vec2; 6] = [
    Vec2::new(1.0, 1.0),
    Vec2::new(-1.0, 1.0),
    Vec2::new(-1.0, -1.0),
    Vec2::new(-1.0, -1.0),
    Vec2::new(1.0, -1.0),
    Vec2::new(1.0, 1.0),
];

/// Texture coordinates matching [`QUAD_VERTICES`].
pub const QUAD_TEXCOORDS: [Vec2; 6] = [
    Vec2::new(1.0, 1.0),
    Vec2::new(0.0, 1.0),
    Vec2::new(0.0, 0.0),
    Vec2::new(0.0, 0.0),
    Vec2::new(1.0, 0.0),
    Vec2::new(1.0, 1.0),
];

/// GPU device, texture and shader services.
///
/// Handles are owned by the caller and must be returned through the matching
/// `destroy_*` method; backends are free to make handles plain ids.
pub trait RenderBackend {
    /// Texture handle.
    type Texture;
    /// Framebuffer handle with a single color attachment.
    type Framebuffer;
    /// Loaded shader technique.
    type Effect;

    /// Whether the renderer is up and able to run shader passes.
    fn is_initialised(&self) -> bool;

    fn create_texture(&mut self, desc: &TextureDesc) -> Self::Texture;

    fn destroy_texture(&mut self, texture: Self::Texture);

    /// Texture width and height in texels.
    fn texture_size(&self, texture: &Self::Texture) -> (u32, u32);

    /// Overwrite the whole texture with tightly packed `data`.
    fn upload_texture(&mut self, texture: &Self::Texture, data: &[u8]);

    /// Overwrite `region` of the texture, reading rows `region.stride` bytes
    /// apart from `data`.
    fn upload_texture_region(&mut self, texture: &Self::Texture, region: &UploadRegion, data: &[u8]);

    /// Create a framebuffer whose color attachment is `texture`.
    fn create_framebuffer(&mut self, texture: &Self::Texture) -> Self::Framebuffer;

    fn destroy_framebuffer(&mut self, framebuffer: Self::Framebuffer);

    fn framebuffer_status(&self, framebuffer: &Self::Framebuffer) -> FramebufferStatus;

    /// Bind `framebuffer` as render target, or the default target for `None`.
    fn bind_framebuffer(&mut self, framebuffer: Option<&Self::Framebuffer>);

    fn viewport(&self) -> Viewport;

    fn set_viewport(&mut self, viewport: Viewport);

    /// Load a named effect.
    ///
    /// Fails with [`crate::Error::ShaderInit`] when the effect or its program
    /// is unavailable.
    fn load_effect(&mut self, name: &'static str) -> Result<Self::Effect>;

    fn begin_pass(&mut self, effect: &Self::Effect);

    fn bind_texture(&mut self, effect: &Self::Effect, slot: &'static str, texture: &Self::Texture);

    fn set_uniform(&mut self, effect: &Self::Effect, name: &'static str, value: Vec4);

    /// Draw six vertices as a triangle list into the bound framebuffer.
    fn draw_quad(
        &mut self,
        effect: &Self::Effect,
        vertices: &[Vec2; 6],
        texcoords: &[Vec2; 6],
    );

    fn end_pass(&mut self, effect: &Self::Effect);
}
