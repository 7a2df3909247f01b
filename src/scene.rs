//! The clipping scene: entity storage, diagnostics and the per-frame driver.

use std::collections::HashSet;

use hecs::{Entity, World};

use crate::config::ClipConfig;
use crate::error::{ClipError, Diagnostic};
use crate::surface::ClippableSurface;
use crate::transform::Transform;
use crate::uniforms::Renderer;
use crate::volume::ClipVolume;

/// Owns the clipping volumes and surfaces of a scene.
///
/// Volumes and surfaces are `hecs` entities in [`world`](Self::world); they
/// refer to each other by [`Entity`] handle only, so neither keeps the other
/// alive. A handle whose entity was despawned (or lost its component) is
/// stale and gets dropped by the next synchronization or frame update.
///
/// All relationship changes go through methods on this type. Because each of
/// them takes `&mut self`, none of them can run while another is in progress.
///
/// # Example
///
/// ```
/// use cubeclip::*;
///
/// let mut scene = ClipScene::new();
/// let volume = scene.spawn_volume(Transform::from_position(Vec3::Y), ClipVolume::new(0.3));
/// let surface = scene.spawn_surface(Some(Renderer::new(UniformTable::new())), &[volume]);
/// scene.activate_surface(surface).unwrap();
///
/// // Once per rendered frame
/// scene.tick();
///
/// let renderer = scene.world.get::<&Renderer>(surface).unwrap();
/// let table = renderer.material::<UniformTable>().unwrap();
/// assert_eq!(table.float("_Fadable_opacity_0"), Some(0.3));
/// assert!(table.is_enabled("_FADABLE_STATUS__0"));
/// ```
pub struct ClipScene {
    /// Entity storage. Other components may live on the same entities.
    pub world: World,
    config: ClipConfig,
    diagnostics: Vec<Diagnostic>,
}

impl Default for ClipScene {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClipScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipScene")
            .field("entities", &self.world.len())
            .field("config", &self.config)
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

impl ClipScene {
    /// Create an empty scene with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ClipConfig::default())
    }

    /// Create an empty scene with a custom configuration.
    pub fn with_config(config: ClipConfig) -> Self {
        Self {
            world: World::new(),
            config,
            diagnostics: Vec::new(),
        }
    }

    /// The configuration the scene was created with.
    pub fn config(&self) -> &ClipConfig {
        &self.config
    }

    /// Spawn a clipping volume entity.
    ///
    /// An authored surface list in `volume` is applied by
    /// [`validate_volume`](Self::validate_volume).
    pub fn spawn_volume(&mut self, transform: Transform, volume: ClipVolume) -> Entity {
        self.world.spawn((transform, volume))
    }

    /// Spawn a clippable surface entity with an authored volume list.
    ///
    /// The surface does nothing until [`activate_surface`](Self::activate_surface)
    /// is called.
    pub fn spawn_surface(&mut self, renderer: Option<Renderer>, volumes: &[Entity]) -> Entity {
        let surface = ClippableSurface::with_volumes(volumes);
        match renderer {
            Some(renderer) => self.world.spawn((surface, renderer)),
            None => self.world.spawn((surface,)),
        }
    }

    /// Whether `entity` is a live clipping volume.
    pub fn is_volume(&self, entity: Entity) -> bool {
        self.world.satisfies::<&ClipVolume>(entity).unwrap_or(false)
    }

    /// Whether `entity` is a live clippable surface.
    pub fn is_surface(&self, entity: Entity) -> bool {
        self.world.satisfies::<&ClippableSurface>(entity).unwrap_or(false)
    }

    /// Run the per-frame update of every surface.
    ///
    /// Dirty bits of consumed volumes are cleared once all surfaces are
    /// updated, so a volume shared by several surfaces reaches each of them in
    /// the same frame. Returns the number of surfaces whose uniforms changed.
    pub fn tick(&mut self) -> usize {
        let surfaces: Vec<Entity> = self
            .world
            .query::<&ClippableSurface>()
            .iter()
            .map(|(entity, _)| entity)
            .collect();

        let mut consumed = Vec::new();
        let mut changed = 0;
        for surface in surfaces {
            if let Ok(true) = self.update_surface_slots(surface, &mut consumed) {
                changed += 1;
            }
        }

        for volume in consumed {
            self.set_transform_dirty(volume, false);
        }
        changed
    }

    /// Diagnostics reported since the last [`take_diagnostics`](Self::take_diagnostics).
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Drain the reported diagnostics.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        log::error!("[clip] {}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    pub(crate) fn volume(&self, volume: Entity) -> Result<hecs::Ref<'_, ClipVolume>, ClipError> {
        self.world
            .get::<&ClipVolume>(volume)
            .map_err(|_| ClipError::NotAVolume(volume))
    }

    pub(crate) fn volume_mut(
        &self,
        volume: Entity,
    ) -> Result<hecs::RefMut<'_, ClipVolume>, ClipError> {
        self.world
            .get::<&mut ClipVolume>(volume)
            .map_err(|_| ClipError::NotAVolume(volume))
    }

    pub(crate) fn surface(
        &self,
        surface: Entity,
    ) -> Result<hecs::Ref<'_, ClippableSurface>, ClipError> {
        self.world
            .get::<&ClippableSurface>(surface)
            .map_err(|_| ClipError::NotASurface(surface))
    }

    pub(crate) fn surface_mut(
        &self,
        surface: Entity,
    ) -> Result<hecs::RefMut<'_, ClippableSurface>, ClipError> {
        self.world
            .get::<&mut ClippableSurface>(surface)
            .map_err(|_| ClipError::NotASurface(surface))
    }
}

/// Remove duplicate handles, keeping the first occurrence of each.
pub(crate) fn dedup_stable(list: &mut Vec<Entity>) {
    let mut seen = HashSet::with_capacity(list.len());
    list.retain(|&e| seen.insert(e));
}
