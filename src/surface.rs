//! Clippable surfaces and the slot synchronization protocol.
//!
//! A surface entity carries a [`ClippableSurface`] and, normally, a
//! [`Renderer`]. The surface keeps an ordered list of up to
//! [`MAX_CLIPPERS`] volumes; a volume's position in that list is its shader
//! slot.
//!
//! Each slot index moves between two states:
//!
//! ```text
//!   INERT (opacity 1, no feature)  ──synchronize──►  ACTIVE (bound to V)
//!          ▲                                             │
//!          └──────── remove_clipper / empty / tick ──────┘
//! ```
//!
//! Stale handles (destroyed volumes) are never cleaned up eagerly; the next
//! [`synchronize`](ClipScene::synchronize) or
//! [`update_surface`](ClipScene::update_surface) drops them.

use hecs::Entity;

use crate::config::MAX_CLIPPERS;
use crate::error::{ClipError, Diagnostic};
use crate::scene::{ClipScene, dedup_stable};
use crate::transform::Transform;
use crate::uniforms::{Renderer, UniformNames, UniformSink};
use crate::volume::ClipVolume;

/// Component describing one renderable surface that can be clipped.
#[derive(Clone, Debug, Default)]
pub struct ClippableSurface {
    /// Volumes applied to this surface, in slot order. Edit it and call
    /// [`ClipScene::validate_surface`] to reconcile.
    pub slots: Vec<Entity>,
    /// Slot list as of the last synchronization.
    synced: Vec<Entity>,
    sink_bound: bool,
}

impl ClippableSurface {
    /// A surface with no volumes.
    pub fn new() -> Self {
        Self::default()
    }

    /// A surface with an authored volume list, applied on activation.
    pub fn with_volumes(volumes: &[Entity]) -> Self {
        Self {
            slots: volumes.to_vec(),
            ..Default::default()
        }
    }

    /// Whether activation found a renderer to write uniforms to.
    pub fn is_bound(&self) -> bool {
        self.sink_bound
    }

    /// Slot index of `volume`, if present.
    pub fn slot_of(&self, volume: Entity) -> Option<usize> {
        self.slots.iter().position(|&v| v == volume)
    }

    /// Number of slots the shader sees, capped at [`MAX_CLIPPERS`].
    pub fn active_count(&self) -> usize {
        self.slots.len().min(MAX_CLIPPERS)
    }
}

impl ClipScene {
    /// Activate `surface`: resolve its renderer, reset every slot to inert and
    /// synchronize the authored volume list.
    ///
    /// Without a [`Renderer`] on the entity, a
    /// [`Diagnostic::MissingRenderer`] is reported and the surface keeps
    /// working unbound (its uniform writes are skipped). The synchronization
    /// still runs; the missing renderer is then returned as an error.
    pub fn activate_surface(&mut self, surface: Entity) -> Result<(), ClipError> {
        let has_renderer = self.world.get::<&Renderer>(surface).is_ok();
        self.surface_mut(surface)?.sink_bound = has_renderer;

        if !has_renderer {
            self.report(Diagnostic::MissingRenderer { surface });
        }

        self.write_uniforms(surface, |sink, names| reset_opacities(sink, names, 0));
        self.synchronize(surface, None)?;

        if has_renderer {
            Ok(())
        } else {
            Err(ClipError::MissingRenderer(surface))
        }
    }

    /// Reconcile the slot list of `surface`, optionally adding `new_volume`.
    ///
    /// Appends `new_volume` if it is not present, deduplicates the slots
    /// (keeping the first occurrence), drops destroyed volumes and links every
    /// survivor back to the surface with its transform marked dirty, since
    /// slot indices may have shifted. Volumes removed from the list since the
    /// last call are unlinked. An empty list resets every slot to inert.
    pub fn synchronize(
        &mut self,
        surface: Entity,
        new_volume: Option<Entity>,
    ) -> Result<(), ClipError> {
        let (mut slots, synced) = {
            let s = self.surface(surface)?;
            (s.slots.clone(), s.synced.clone())
        };

        if let Some(volume) = new_volume {
            if !slots.contains(&volume) {
                slots.push(volume);
            }
        }

        dedup_stable(&mut slots);

        for i in (0..slots.len()).rev() {
            let volume = slots[i];
            if self.is_volume(volume) {
                self.link(volume, surface);
                self.set_transform_dirty(volume, true);
            } else {
                log::debug!("[clip] dropped stale slot {} of surface {:?}", i, surface);
                slots.remove(i);
            }
        }

        for volume in synced {
            if !slots.contains(&volume) {
                self.unlink(volume, surface);
            }
        }

        let empty = slots.is_empty();
        {
            let mut s = self.surface_mut(surface)?;
            s.synced = slots.clone();
            s.slots = slots;
        }

        if empty {
            self.write_uniforms(surface, |sink, names| {
                reset_opacities(sink, names, 0);
                disable_features(sink, names);
            });
        }
        Ok(())
    }

    /// Remove `volume` from the slots of `surface` and resynchronize.
    ///
    /// Does nothing if the volume is not in a slot.
    pub fn remove_clipper(&mut self, surface: Entity, volume: Entity) -> Result<(), ClipError> {
        {
            let mut s = self.surface_mut(surface)?;
            if !s.slots.contains(&volume) {
                return Ok(());
            }
            s.slots.retain(|&v| v != volume);
        }

        self.unlink(volume, surface);
        // An emptied list is reset to inert by `synchronize`.
        self.synchronize(surface, None)
    }

    /// Refresh the opacity uniform of every occupied slot of `surface`.
    ///
    /// Called by `volume` when its opacity changed to `opacity`. The whole row
    /// is rewritten: the calling volume's slot gets `opacity`, every other slot
    /// its own volume's opacity, and any disabled volume `1.0`.
    pub fn set_surface_opacity(
        &mut self,
        surface: Entity,
        volume: Entity,
        opacity: f32,
    ) -> Result<(), ClipError> {
        let slots = self.surface(surface)?.slots.clone();

        let row: Vec<f32> = slots
            .iter()
            .take(MAX_CLIPPERS)
            .map(|&v| match self.world.get::<&ClipVolume>(v) {
                Ok(clip) if !clip.enabled => 1.0,
                Ok(_) if v == volume => opacity,
                Ok(clip) => clip.opacity,
                // Destroyed and not purged yet: inert until the next pass.
                Err(_) => 1.0,
            })
            .collect();

        self.write_uniforms(surface, |sink, names| {
            for (slot, value) in row.into_iter().enumerate() {
                sink.set_float(&names.opacity(slot), value);
            }
        });
        Ok(())
    }

    /// Authoring-time consistency pass for `surface`.
    pub fn validate_surface(&mut self, surface: Entity) -> Result<(), ClipError> {
        self.synchronize(surface, None)
    }

    /// Run the per-frame update of a single surface.
    ///
    /// Consumed volumes have their dirty bit cleared immediately. Prefer
    /// [`ClipScene::tick`], which clears them only after every surface has
    /// seen the change. Returns whether any uniform changed.
    pub fn update_surface(&mut self, surface: Entity) -> Result<bool, ClipError> {
        let mut consumed = Vec::new();
        let changed = self.update_surface_slots(surface, &mut consumed)?;
        for volume in consumed {
            self.set_transform_dirty(volume, false);
        }
        Ok(changed)
    }

    /// Despawn `surface`. Volumes drop the stale handle lazily.
    pub fn destroy_surface(&mut self, surface: Entity) -> Result<(), ClipError> {
        self.surface(surface)?;
        self.world
            .despawn(surface)
            .map_err(|_| ClipError::NotASurface(surface))
    }

    /// Per-frame pass over the slots of `surface`.
    ///
    /// Pushes matrix, pivot and opacity for every dirty volume in a valid slot
    /// and records it in `consumed`. When anything changed, re-encodes the
    /// active count as a one-hot feature flag and resets the unused tail.
    pub(crate) fn update_surface_slots(
        &mut self,
        surface: Entity,
        consumed: &mut Vec<Entity>,
    ) -> Result<bool, ClipError> {
        let mut slots = self.surface(surface)?.slots.clone();

        let before = slots.len();
        slots.retain(|&v| self.is_volume(v));
        let mut changed = slots.len() != before;
        if changed {
            log::debug!(
                "[clip] purged {} destroyed volumes from surface {:?}",
                before - slots.len(),
                surface
            );
            self.surface_mut(surface)?.slots = slots.clone();
            // Survivors may have moved to a lower slot index.
            for &volume in &slots {
                self.set_transform_dirty(volume, true);
            }
        }

        let mut pushes = Vec::new();
        for (slot, &volume) in slots.iter().enumerate().take(MAX_CLIPPERS) {
            let Ok(clip) = self.world.get::<&ClipVolume>(volume) else {
                continue;
            };
            if !clip.is_transform_dirty() {
                continue;
            }
            let transform = self
                .world
                .get::<&Transform>(volume)
                .map(|t| *t)
                .unwrap_or_default();
            pushes.push((slot, transform, clip.effective_opacity()));
            consumed.push(volume);
            changed = true;
        }

        let count = slots.len();
        self.write_uniforms(surface, |sink, names| {
            for (slot, transform, opacity) in pushes {
                log::trace!("[clip] slot {} <- opacity {}", slot, opacity);
                sink.set_matrix(&names.matrix(slot), transform.clip_matrix());
                sink.set_vector(&names.pivot(slot), transform.position.extend(0.0));
                sink.set_float(&names.opacity(slot), opacity);
            }

            if changed {
                disable_features(sink, names);
                if count > 0 {
                    sink.enable_feature(&names.feature(count.min(MAX_CLIPPERS) - 1));
                }
                reset_opacities(sink, names, count);
            }
        });

        if count > MAX_CLIPPERS && self.config().report_overflow {
            self.report(Diagnostic::TooManyClippers { surface, count });
        }

        Ok(changed)
    }

    /// Run `f` against the material of `surface` if it was bound on
    /// activation. Unbound surfaces skip the write.
    fn write_uniforms(&self, surface: Entity, f: impl FnOnce(&mut dyn UniformSink, &UniformNames)) {
        let bound = self
            .world
            .get::<&ClippableSurface>(surface)
            .is_ok_and(|s| s.sink_bound);
        if !bound {
            return;
        }
        if let Ok(mut renderer) = self.world.get::<&mut Renderer>(surface) {
            f(renderer.sink_mut(), &self.config().names);
        }
    }
}

/// Set the opacity of every slot from `from` up to the capacity to `1.0`.
fn reset_opacities(sink: &mut dyn UniformSink, names: &UniformNames, from: usize) {
    for slot in from..MAX_CLIPPERS {
        sink.set_float(&names.opacity(slot), 1.0);
    }
}

fn disable_features(sink: &mut dyn UniformSink, names: &UniformNames) {
    for index in 0..MAX_CLIPPERS {
        sink.disable_feature(&names.feature(index));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UniformTable;
    use glam::{Quat, Vec3, Vec4};

    fn material(scene: &ClipScene, surface: Entity) -> UniformTable {
        scene
            .world
            .get::<&Renderer>(surface)
            .unwrap()
            .material::<UniformTable>()
            .unwrap()
            .clone()
    }

    fn active_surface(scene: &mut ClipScene) -> Entity {
        let surface = scene.spawn_surface(Some(Renderer::new(UniformTable::new())), &[]);
        scene.activate_surface(surface).unwrap();
        surface
    }

    fn slots(scene: &ClipScene, surface: Entity) -> Vec<Entity> {
        scene.world.get::<&ClippableSurface>(surface).unwrap().slots.clone()
    }

    fn opacity(table: &UniformTable, slot: usize) -> Option<f32> {
        table.float(&UniformNames::default().opacity(slot))
    }

    #[test]
    fn activation_resets_all_slots() {
        let mut scene = ClipScene::new();
        let surface = active_surface(&mut scene);

        let table = material(&scene, surface);
        for slot in 0..MAX_CLIPPERS {
            assert_eq!(opacity(&table, slot), Some(1.0), "slot {}", slot);
        }
        assert!(table.enabled_features().is_empty());
    }

    #[test]
    fn activation_without_renderer_reports_and_continues() {
        let mut scene = ClipScene::new();
        let volume = scene.spawn_volume(Transform::new(), ClipVolume::new(0.5));
        let surface = scene.spawn_surface(None, &[volume]);

        assert_eq!(
            scene.activate_surface(surface),
            Err(ClipError::MissingRenderer(surface))
        );
        assert_eq!(
            scene.take_diagnostics(),
            vec![Diagnostic::MissingRenderer { surface }]
        );

        // Still synchronized, just unbound.
        assert_eq!(slots(&scene, surface), vec![volume]);
        assert!(!scene.world.get::<&ClippableSurface>(surface).unwrap().is_bound());
        assert!(scene.update_surface(surface).unwrap());
    }

    #[test]
    fn activation_links_authored_volumes() {
        let mut scene = ClipScene::new();
        let a = scene.spawn_volume(Transform::new(), ClipVolume::new(0.5));
        let b = scene.spawn_volume(Transform::new(), ClipVolume::new(0.5));
        let surface = scene.spawn_surface(Some(Renderer::new(UniformTable::new())), &[a, b, a]);

        scene.activate_surface(surface).unwrap();

        assert_eq!(slots(&scene, surface), vec![a, b]);
        for v in [a, b] {
            assert!(scene.world.get::<&ClipVolume>(v).unwrap().is_linked(surface));
        }
    }

    #[test]
    fn synchronize_twice_adds_once() {
        let mut scene = ClipScene::new();
        let surface = active_surface(&mut scene);
        let volume = scene.spawn_volume(Transform::new(), ClipVolume::new(0.5));

        scene.synchronize(surface, Some(volume)).unwrap();
        scene.synchronize(surface, Some(volume)).unwrap();

        assert_eq!(slots(&scene, surface), vec![volume]);
    }

    #[test]
    fn synchronize_marks_survivors_dirty() {
        let mut scene = ClipScene::new();
        let surface = active_surface(&mut scene);
        let volume = scene.spawn_volume(Transform::new(), ClipVolume::new(0.5));
        scene.register_with(volume, surface).unwrap();
        scene.tick();
        assert!(!scene.world.get::<&ClipVolume>(volume).unwrap().is_transform_dirty());

        scene.synchronize(surface, None).unwrap();

        assert!(scene.world.get::<&ClipVolume>(volume).unwrap().is_transform_dirty());
    }

    #[test]
    fn synchronize_unlinks_volumes_removed_by_editing() {
        let mut scene = ClipScene::new();
        let surface = active_surface(&mut scene);
        let a = scene.spawn_volume(Transform::new(), ClipVolume::new(0.5));
        let b = scene.spawn_volume(Transform::new(), ClipVolume::new(0.5));
        scene.register_with(a, surface).unwrap();
        scene.register_with(b, surface).unwrap();

        scene.world.get::<&mut ClippableSurface>(surface).unwrap().slots = vec![b];
        scene.validate_surface(surface).unwrap();

        assert!(!scene.world.get::<&ClipVolume>(a).unwrap().is_linked(surface));
        assert!(scene.world.get::<&ClipVolume>(b).unwrap().is_linked(surface));
    }

    #[test]
    fn synchronize_purges_destroyed_volumes() {
        let mut scene = ClipScene::new();
        let surface = active_surface(&mut scene);
        let a = scene.spawn_volume(Transform::new(), ClipVolume::new(0.3));
        let b = scene.spawn_volume(Transform::new(), ClipVolume::new(0.6));
        scene.register_with(a, surface).unwrap();
        scene.register_with(b, surface).unwrap();
        scene.tick();
        assert!(!scene.world.get::<&ClipVolume>(b).unwrap().is_transform_dirty());

        scene.world.despawn(a).unwrap();
        scene.synchronize(surface, None).unwrap();

        assert_eq!(slots(&scene, surface), vec![b]);
        assert!(scene.world.get::<&ClipVolume>(b).unwrap().is_transform_dirty());

        scene.tick();
        assert_eq!(opacity(&material(&scene, surface), 0), Some(0.6));

        scene.world.despawn(b).unwrap();
        scene.synchronize(surface, None).unwrap();

        assert!(slots(&scene, surface).is_empty());
        let table = material(&scene, surface);
        for slot in 0..MAX_CLIPPERS {
            assert_eq!(opacity(&table, slot), Some(1.0), "slot {}", slot);
        }
        assert!(table.enabled_features().is_empty());
    }

    #[test]
    fn remove_clipper_shifts_slots_and_unlinks() {
        let mut scene = ClipScene::new();
        let surface = active_surface(&mut scene);
        let a = scene.spawn_volume(Transform::new(), ClipVolume::new(0.5));
        let b = scene.spawn_volume(Transform::new(), ClipVolume::new(0.5));
        scene.register_with(a, surface).unwrap();
        scene.register_with(b, surface).unwrap();

        scene.remove_clipper(surface, a).unwrap();

        assert_eq!(slots(&scene, surface), vec![b]);
        assert!(!scene.world.get::<&ClipVolume>(a).unwrap().is_linked(surface));

        // Removing an absent volume is a no-op.
        scene.remove_clipper(surface, a).unwrap();
        assert_eq!(slots(&scene, surface), vec![b]);
    }

    #[test]
    fn removing_last_clipper_resets_to_inert() {
        let mut scene = ClipScene::new();
        let surface = active_surface(&mut scene);
        let volume = scene.spawn_volume(Transform::new(), ClipVolume::new(0.4));
        scene.register_with(volume, surface).unwrap();
        scene.tick();
        assert_eq!(opacity(&material(&scene, surface), 0), Some(0.4));

        scene.remove_clipper(surface, volume).unwrap();

        let table = material(&scene, surface);
        for slot in 0..MAX_CLIPPERS {
            assert_eq!(opacity(&table, slot), Some(1.0), "slot {}", slot);
        }
        assert!(table.enabled_features().is_empty());
    }

    #[test]
    fn update_pushes_matrix_and_pivot() {
        let mut scene = ClipScene::new();
        let surface = active_surface(&mut scene);
        let transform = Transform::new()
            .position(Vec3::new(1.0, 2.0, 3.0))
            .rotation(Quat::from_rotation_x(0.3))
            .uniform_scale(0.5);
        let volume = scene.spawn_volume(transform, ClipVolume::new(0.7));
        scene.register_with(volume, surface).unwrap();

        assert!(scene.update_surface(surface).unwrap());

        let names = UniformNames::default();
        let table = material(&scene, surface);
        assert_eq!(table.matrix(&names.matrix(0)), Some(transform.clip_matrix()));
        assert_eq!(table.vector(&names.pivot(0)), Some(Vec4::new(1.0, 2.0, 3.0, 0.0)));
        assert_eq!(opacity(&table, 0), Some(0.7));
    }

    #[test]
    fn clean_frame_writes_nothing() {
        let mut scene = ClipScene::new();
        let surface = active_surface(&mut scene);
        let volume = scene.spawn_volume(Transform::new(), ClipVolume::new(0.7));
        scene.register_with(volume, surface).unwrap();
        scene.tick();

        scene
            .world
            .get::<&mut Renderer>(surface)
            .unwrap()
            .material_mut::<UniformTable>()
            .unwrap()
            .reset_writes();

        assert!(!scene.update_surface(surface).unwrap());
        assert_eq!(material(&scene, surface).writes(), 0);
    }

    #[test]
    fn disabled_volume_pushes_full_opacity() {
        let mut scene = ClipScene::new();
        let surface = active_surface(&mut scene);
        let a = scene.spawn_volume(Transform::new(), ClipVolume::new(0.2));
        let b = scene.spawn_volume(Transform::new(), ClipVolume::new(0.6));
        scene.register_with(a, surface).unwrap();
        scene.register_with(b, surface).unwrap();
        scene.set_volume_enabled(a, false).unwrap();

        scene.tick();
        let table = material(&scene, surface);
        assert_eq!(opacity(&table, 0), Some(1.0));
        assert_eq!(opacity(&table, 1), Some(0.6));

        // The opacity path respects the override as well.
        scene.set_volume_opacity(a, 0.1).unwrap();
        let table = material(&scene, surface);
        assert_eq!(opacity(&table, 0), Some(1.0));
        assert_eq!(opacity(&table, 1), Some(0.6));
    }

    #[test]
    fn feature_flag_is_one_hot_by_count() {
        let mut scene = ClipScene::new();
        let surface = active_surface(&mut scene);
        let names = UniformNames::default();

        for k in 1..=MAX_CLIPPERS {
            let volume = scene.spawn_volume(Transform::new(), ClipVolume::new(0.5));
            scene.register_with(volume, surface).unwrap();
            scene.tick();

            let table = material(&scene, surface);
            let expected = names.feature(k - 1);
            assert_eq!(table.enabled_features(), vec![expected.as_str()]);
            for slot in k..MAX_CLIPPERS {
                assert_eq!(opacity(&table, slot), Some(1.0), "tail slot {}", slot);
            }
        }
    }

    #[test]
    fn overflow_is_capped_and_reported_once_per_frame() {
        let mut scene = ClipScene::new();
        let surface = active_surface(&mut scene);
        let volumes: Vec<Entity> = (0..MAX_CLIPPERS + 2)
            .map(|_| scene.spawn_volume(Transform::new(), ClipVolume::new(0.5)))
            .collect();
        for &v in &volumes {
            scene.register_with(v, surface).unwrap();
        }

        scene.tick();

        let names = UniformNames::default();
        let table = material(&scene, surface);
        assert_eq!(opacity(&table, MAX_CLIPPERS), None);
        assert_eq!(table.matrix(&names.matrix(MAX_CLIPPERS)), None);
        assert_eq!(
            table.enabled_features(),
            vec![names.feature(MAX_CLIPPERS - 1).as_str()]
        );
        assert_eq!(
            scene.take_diagnostics(),
            vec![Diagnostic::TooManyClippers {
                surface,
                count: MAX_CLIPPERS + 2
            }]
        );

        scene.tick();
        assert_eq!(scene.take_diagnostics().len(), 1);
    }

    #[test]
    fn overflow_report_can_be_disabled() {
        let mut scene = ClipScene::with_config(crate::ClipConfig::new().report_overflow(false));
        let surface = active_surface(&mut scene);
        for _ in 0..=MAX_CLIPPERS {
            let v = scene.spawn_volume(Transform::new(), ClipVolume::new(0.5));
            scene.register_with(v, surface).unwrap();
        }

        scene.tick();
        assert!(scene.take_diagnostics().is_empty());
    }

    #[test]
    fn destroyed_volume_is_purged_on_update() {
        let mut scene = ClipScene::new();
        let surface = active_surface(&mut scene);
        let a = scene.spawn_volume(Transform::new(), ClipVolume::new(0.3));
        let b = scene.spawn_volume(Transform::new(), ClipVolume::new(0.6));
        scene.register_with(a, surface).unwrap();
        scene.register_with(b, surface).unwrap();
        scene.tick();

        // Despawned behind the scene's back: no removal request was made.
        scene.world.despawn(a).unwrap();
        assert!(scene.update_surface(surface).unwrap());

        assert_eq!(slots(&scene, surface), vec![b]);
        let table = material(&scene, surface);
        let names = UniformNames::default();
        assert_eq!(table.enabled_features(), vec![names.feature(0).as_str()]);
        assert_eq!(opacity(&table, 0), Some(0.6));
        assert_eq!(opacity(&table, 1), Some(1.0));
    }

    #[test]
    fn operations_on_missing_surface_fail() {
        let mut scene = ClipScene::new();
        let entity = scene.world.spawn(());

        assert_eq!(
            scene.synchronize(entity, None),
            Err(ClipError::NotASurface(entity))
        );
        assert_eq!(
            scene.update_surface(entity),
            Err(ClipError::NotASurface(entity))
        );
    }
}
