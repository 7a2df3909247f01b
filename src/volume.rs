//! Clipping volumes: oriented cubes that clip the surfaces they are linked to.
//!
//! A volume entity carries a [`ClipVolume`] and a [`Transform`]. Its
//! `surfaces` list mirrors the slot lists of the surfaces it clips: whenever a
//! surface holds the volume in a slot, the surface appears in `surfaces`, and
//! the other way round.
//!
//! Volumes never touch a surface's slots directly. Every change goes through
//! the surface entry points ([`ClipScene::synchronize`],
//! [`ClipScene::remove_clipper`], [`ClipScene::set_surface_opacity`]).
//!
//! # Example
//!
//! ```
//! use cubeclip::*;
//!
//! let mut scene = ClipScene::new();
//! let surface = scene.spawn_surface(Some(Renderer::new(UniformTable::new())), &[]);
//! scene.activate_surface(surface).unwrap();
//!
//! let volume = scene.spawn_volume(Transform::new().uniform_scale(2.0), ClipVolume::new(0.3));
//! scene.register_with(volume, surface).unwrap();
//!
//! scene.set_volume_opacity(volume, 0.5).unwrap();
//! scene.destroy_volume(volume).unwrap();
//! ```

use hecs::Entity;

use crate::error::ClipError;
use crate::scene::{ClipScene, dedup_stable};
use crate::transform::Transform;

/// Component describing one clipping cube.
#[derive(Clone, Debug)]
pub struct ClipVolume {
    /// Opacity of clipped fragments, propagated to every linked surface.
    pub opacity: f32,
    /// A disabled volume stays in its slots but contributes opacity `1.0`.
    pub enabled: bool,
    /// Surfaces this volume clips. Edit it and call
    /// [`ClipScene::validate_volume`] to reconcile.
    pub surfaces: Vec<Entity>,
    /// Surfaces actually linked, kept apart from the authored `surfaces` so
    /// edits to the latter can be diffed on validation.
    known_surfaces: Vec<Entity>,
    dirty_transform: bool,
}

impl Default for ClipVolume {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ClipVolume {
    /// An enabled volume with the given opacity, not linked to anything.
    ///
    /// New volumes start with a dirty transform so the first frame after
    /// registration pushes their uniforms.
    pub fn new(opacity: f32) -> Self {
        Self {
            opacity,
            enabled: true,
            surfaces: Vec::new(),
            known_surfaces: Vec::new(),
            dirty_transform: true,
        }
    }

    /// Authored surface list, reconciled by [`ClipScene::validate_volume`].
    pub fn with_surfaces(mut self, surfaces: &[Entity]) -> Self {
        self.surfaces = surfaces.to_vec();
        self
    }

    /// Opacity the shader should see: `1.0` while disabled.
    pub fn effective_opacity(&self) -> f32 {
        if self.enabled { self.opacity } else { 1.0 }
    }

    /// Whether the transform changed since a surface last consumed it.
    pub fn is_transform_dirty(&self) -> bool {
        self.dirty_transform
    }

    /// Whether `surface` is in the linked list.
    pub fn is_linked(&self, surface: Entity) -> bool {
        self.surfaces.contains(&surface)
    }
}

impl ClipScene {
    /// Register `volume` with `surface`.
    ///
    /// A no-op if already linked. Otherwise the surface synchronizes with the
    /// volume added, and the volume's transform is marked dirty so the next
    /// frame pushes its uniforms.
    pub fn register_with(&mut self, volume: Entity, surface: Entity) -> Result<(), ClipError> {
        if self.volume(volume)?.is_linked(surface) {
            return Ok(());
        }
        self.synchronize(surface, Some(volume))?;
        self.mark_transform_changed(volume)
    }

    /// Set the opacity of `volume` and push it to every linked surface.
    ///
    /// Surfaces that no longer exist are dropped from the linked list.
    pub fn set_volume_opacity(&mut self, volume: Entity, opacity: f32) -> Result<(), ClipError> {
        let surfaces = {
            let mut v = self.volume_mut(volume)?;
            v.opacity = opacity;
            v.surfaces.clone()
        };

        let live: Vec<Entity> = surfaces
            .iter()
            .copied()
            .filter(|&s| self.is_surface(s))
            .collect();
        if live.len() != surfaces.len() {
            log::debug!(
                "[clip] purged {} stale surfaces from volume {:?}",
                surfaces.len() - live.len(),
                volume
            );
            self.volume_mut(volume)?.surfaces = live.clone();
        }

        for surface in live {
            self.set_surface_opacity(surface, volume, opacity)?;
        }
        Ok(())
    }

    /// Enable or disable `volume`.
    ///
    /// The volume keeps its slots; its transform is marked dirty so the next
    /// frame pushes the new effective opacity.
    pub fn set_volume_enabled(&mut self, volume: Entity, enabled: bool) -> Result<(), ClipError> {
        let mut v = self.volume_mut(volume)?;
        v.enabled = enabled;
        v.dirty_transform = true;
        Ok(())
    }

    /// Move `volume` and mark its transform dirty.
    pub fn set_volume_transform(
        &mut self,
        volume: Entity,
        transform: Transform,
    ) -> Result<(), ClipError> {
        self.volume(volume)?;
        self.world
            .insert_one(volume, transform)
            .map_err(|_| ClipError::NotAVolume(volume))?;
        self.mark_transform_changed(volume)
    }

    /// Mark the transform of `volume` as changed.
    ///
    /// Call this when the transform component was edited in place.
    pub fn mark_transform_changed(&mut self, volume: Entity) -> Result<(), ClipError> {
        self.volume_mut(volume)?.dirty_transform = true;
        Ok(())
    }

    /// Destroy `volume`: remove it from every linked surface, then despawn it.
    pub fn destroy_volume(&mut self, volume: Entity) -> Result<(), ClipError> {
        let surfaces = std::mem::take(&mut self.volume_mut(volume)?.surfaces);

        for surface in surfaces {
            if self.is_surface(surface) {
                self.remove_clipper(surface, volume)?;
            }
        }

        self.world
            .despawn(volume)
            .map_err(|_| ClipError::NotAVolume(volume))
    }

    /// Reconcile the authored surface list of `volume`.
    ///
    /// Deduplicates `surfaces`, removes the volume from linked surfaces that
    /// are no longer listed, synchronizes every listed surface with the volume
    /// and re-pushes the current opacity. Usable both from authoring tools and
    /// at runtime as a "reconcile now" entry point.
    pub fn validate_volume(&mut self, volume: Entity) -> Result<(), ClipError> {
        let (mut surfaces, known) = {
            let mut v = self.volume_mut(volume)?;
            dedup_stable(&mut v.surfaces);
            (v.surfaces.clone(), std::mem::take(&mut v.known_surfaces))
        };

        for &surface in known.iter().rev() {
            if !surfaces.contains(&surface) && self.is_surface(surface) {
                self.remove_clipper(surface, volume)?;
            }
        }

        let mut validated = Vec::with_capacity(surfaces.len());
        for i in (0..surfaces.len()).rev() {
            let surface = surfaces[i];
            if !self.is_surface(surface) {
                surfaces.remove(i);
                continue;
            }
            self.synchronize(surface, Some(volume))?;
            validated.push(surface);
        }

        let opacity = {
            let mut v = self.volume_mut(volume)?;
            v.surfaces = surfaces;
            v.known_surfaces = validated;
            v.opacity
        };
        self.set_volume_opacity(volume, opacity)
    }

    /// Add `surface` to the linked list of `volume` without touching the
    /// surface.
    pub(crate) fn link(&mut self, volume: Entity, surface: Entity) {
        if let Ok(mut v) = self.world.get::<&mut ClipVolume>(volume) {
            if !v.surfaces.contains(&surface) {
                log::debug!("[clip] linked volume {:?} to surface {:?}", volume, surface);
                v.surfaces.push(surface);
            }
            if !v.known_surfaces.contains(&surface) {
                v.known_surfaces.push(surface);
            }
        }
    }

    /// Remove `surface` from the linked list of `volume` without touching the
    /// surface.
    pub(crate) fn unlink(&mut self, volume: Entity, surface: Entity) {
        if let Ok(mut v) = self.world.get::<&mut ClipVolume>(volume) {
            if v.surfaces.contains(&surface) {
                log::debug!("[clip] unlinked volume {:?} from surface {:?}", volume, surface);
                v.surfaces.retain(|&s| s != surface);
            }
            v.known_surfaces.retain(|&s| s != surface);
        }
    }

    pub(crate) fn set_transform_dirty(&mut self, volume: Entity, dirty: bool) {
        if let Ok(mut v) = self.world.get::<&mut ClipVolume>(volume) {
            v.dirty_transform = dirty;
        }
    }
}
