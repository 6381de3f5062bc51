//! Bevy integration for the fog-of-war LOS texture.
//!
//! Insert a [`MapVisibility`] with the displayed player's visibility grid and
//! read the textures and matrices from [`LosTextureHandles`]. Replacing or
//! mutating the grid marks the texture dirty; it is rebuilt and smoothed once
//! per frame in `PostUpdate`.

mod backend;

use bevy::prelude::*;
use los_texture::{LosConfig, LosTexture, VisibilityGrid};

pub use backend::{ImageBackend, ImageEffect, ImageFramebuffer, ImageTexture};

/// Plugin maintaining the LOS texture.
#[derive(Default)]
pub struct LosTexturePlugin {
    pub config: LosConfig,
}

impl Plugin for LosTexturePlugin {
    fn build(&self, app: &mut App) {
        let los = match LosTexture::new(self.config.clone()) {
            Ok(los) => los,
            Err(e) => {
                tracing::error!("LOS texture disabled: {e}");
                return;
            }
        };

        app.insert_resource(LosTextureState {
            los,
            backend: ImageBackend::new(),
        })
        .init_resource::<MapVisibility>()
        .init_resource::<LosTextureHandles>()
        .add_systems(PostUpdate, update_los_texture);
    }
}

/// Visibility of the displayed player, as seen by the LOS texture.
///
/// `None` until the simulation has produced visibility data.
#[derive(Resource, Default)]
pub struct MapVisibility {
    pub grid: Option<VisibilityGrid>,
}

/// The LOS pipeline and the images it renders into.
#[derive(Resource)]
pub struct LosTextureState {
    pub los: LosTexture<ImageBackend>,
    backend: ImageBackend,
}

impl LosTextureState {
    #[must_use]
    pub fn backend(&self) -> &ImageBackend {
        &self.backend
    }

    /// Toggle temporal smoothing at runtime.
    pub fn set_smoothing_enabled(&mut self, enabled: bool) {
        self.los.set_smoothing_enabled(enabled);
    }
}

/// Latest LOS outputs, refreshed every frame.
#[derive(Resource, Default, Clone)]
pub struct LosTextureHandles {
    /// Unsmoothed texture.
    pub raw: Option<Handle<Image>>,
    /// Texture to sample for fog of war.
    pub smooth: Option<Handle<Image>>,
    /// World `(x, y, z)` to LOS texture `(u, v)`.
    pub world_to_los: Mat4,
    /// Minimap `(0, 0)-(1, 1)` to LOS texture `(u, v)`.
    pub los_to_minimap: Mat4,
}

fn update_los_texture(
    time: Res<Time>,
    visibility: Res<MapVisibility>,
    mut state: ResMut<LosTextureState>,
    mut images: ResMut<Assets<Image>>,
    mut handles: ResMut<LosTextureHandles>,
) {
    let state = &mut *state;
    if visibility.is_changed() {
        state.los.make_dirty();
    }

    state
        .los
        .interpolate(&mut state.backend, visibility.grid.as_ref(), time.delta_secs());
    state.backend.sync(&mut images);

    handles.raw = state
        .los
        .texture()
        .and_then(|texture| state.backend.handle(texture))
        .cloned();
    handles.smooth = state
        .los
        .texture_smooth()
        .and_then(|texture| state.backend.handle(texture))
        .cloned();
    handles.world_to_los = *state.los.texture_matrix();
    handles.los_to_minimap = *state.los.minimap_texture_matrix();
}

#[cfg(test)]
mod tests {
    use los_texture::Visibility;

    use super::*;

    fn app() -> App {
        let mut app = App::new();
        app.init_resource::<Time>()
            .insert_resource(Assets::<Image>::default())
            .add_plugins(LosTexturePlugin::default());
        app
    }

    fn single_visible(size: usize) -> VisibilityGrid {
        let mut grid = VisibilityGrid::new(size);
        grid.set(4, 4, Visibility::Visible);
        grid
    }

    /// Texel `(x, y)` of the 16x16 asset behind `handle`.
    fn texel(app: &App, handle: Option<&Handle<Image>>, x: usize, y: usize) -> u8 {
        let images = app.world().resource::<Assets<Image>>();
        let image = images.get(handle.unwrap()).unwrap();
        image.data.as_ref().unwrap()[y * 16 + x]
    }

    #[test]
    fn test_no_visibility_publishes_nothing() {
        let mut app = app();
        app.update();
        app.update();

        let handles = app.world().resource::<LosTextureHandles>();
        assert!(handles.raw.is_none());
        assert!(handles.smooth.is_none());
    }

    #[test]
    fn test_visibility_change_publishes_blurred_images() {
        let mut app = app();
        app.update();

        app.world_mut().resource_mut::<MapVisibility>().grid = Some(single_visible(9));
        app.update();

        let handles = app.world().resource::<LosTextureHandles>().clone();
        assert_ne!(handles.raw, handles.smooth);
        assert_eq!(texel(&app, handles.raw.as_ref(), 4, 4), 24);
        assert_eq!(texel(&app, handles.smooth.as_ref(), 4, 4), 24);
        assert_eq!(texel(&app, handles.raw.as_ref(), 12, 12), 0);
        assert!((handles.los_to_minimap.x_axis.x - 9.0 / 16.0).abs() < 1e-6);
    }

    #[test]
    fn test_unchanged_visibility_does_not_recompute() {
        let mut app = app();
        app.world_mut().resource_mut::<MapVisibility>().grid = Some(single_visible(9));
        app.update();

        // Edits that skip change detection are not a new tick.
        app.world_mut()
            .resource_mut::<MapVisibility>()
            .bypass_change_detection()
            .grid = Some(VisibilityGrid::new(9));
        app.update();
        let raw = app.world().resource::<LosTextureHandles>().raw.clone();
        assert_eq!(texel(&app, raw.as_ref(), 4, 4), 24);

        app.world_mut().resource_mut::<MapVisibility>().set_changed();
        app.update();
        let raw = app.world().resource::<LosTextureHandles>().raw.clone();
        assert_eq!(texel(&app, raw.as_ref(), 4, 4), 0);
    }

    #[test]
    fn test_smoothing_toggle_switches_published_texture() {
        let mut app = app();
        app.world_mut().resource_mut::<MapVisibility>().grid = Some(single_visible(9));
        app.update();

        app.world_mut()
            .resource_mut::<LosTextureState>()
            .set_smoothing_enabled(false);
        app.update();

        let handles = app.world().resource::<LosTextureHandles>();
        assert_eq!(handles.raw, handles.smooth);
    }
}
