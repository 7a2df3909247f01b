//! # cubeclip
//!
//! **Cube-shaped clipping volumes for renderable surfaces.**
//!
//! A [`ClipVolume`] is an oriented cube; a [`ClippableSurface`] is a mesh that
//! can be clipped by up to [`MAX_CLIPPERS`] volumes at once. Both live as
//! components on `hecs` entities inside a [`ClipScene`], which keeps the
//! volume ↔ surface relationship consistent on both sides and, once per frame,
//! streams slot-indexed shader uniforms to each surface's material.
//!
//! ## Quick Start
//!
//! ```
//! use cubeclip::*;
//!
//! let mut scene = ClipScene::new();
//!
//! let surface = scene.spawn_surface(Some(Renderer::new(UniformTable::new())), &[]);
//! scene.activate_surface(surface).unwrap();
//!
//! let cube = scene.spawn_volume(
//!     Transform::new().position(Vec3::new(0.0, 1.0, 0.0)).uniform_scale(2.0),
//!     ClipVolume::new(0.3),
//! );
//! scene.register_with(cube, surface).unwrap();
//!
//! // Every frame: push changed volumes to their surfaces.
//! scene.tick();
//!
//! // Moving or toggling a volume is picked up by the next tick.
//! scene.set_volume_enabled(cube, false).unwrap();
//! scene.tick();
//! ```
//!
//! ## Shader contract
//!
//! Per slot `i` the material receives `_Fadable_matrix_i`, `_Fadable_pivot_i`
//! and `_Fadable_opacity_i`; the one-hot feature `_FADABLE_STATUS__<k-1>`
//! tells the shader how many slots (`k`) are active. See [`uniforms`] for the
//! details and [`ClipUniformBuffer`] for a wgpu-backed material.

mod config;
mod error;
mod gpu;
mod scene;
mod surface;
mod transform;
pub mod uniforms;
mod volume;

pub use config::{ClipConfig, MAX_CLIPPERS};
pub use error::{ClipError, Diagnostic};
pub use gpu::{CLIP_UNIFORMS_WGSL, ClipUniformBlock, ClipUniformBuffer};
pub use scene::ClipScene;
pub use surface::ClippableSurface;
pub use transform::Transform;
pub use uniforms::{Renderer, UniformKind, UniformNames, UniformSink, UniformTable, UniformValue};
pub use volume::ClipVolume;

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec3, Vec4};

// Entity handles
pub use hecs::{Entity, World};
