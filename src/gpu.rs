//! GPU-backed uniform sink for wgpu shaders.
//!
//! wgpu has no named material parameters or shader keywords, so
//! [`ClipUniformBuffer`] maps the slot-indexed names onto a single uniform
//! block, [`ClipUniformBlock`], and uploads it when asked. Feature flags become
//! bits of `feature_mask`; with the one-hot encoding at most one bit is set.
//!
//! The matching WGSL declaration is [`CLIP_UNIFORMS_WGSL`]:
//!
//! ```ignore
//! let source = format!("{}\n{}", cubeclip::CLIP_UNIFORMS_WGSL, include_str!("mesh.wgsl"));
//! ```
//!
//! # Example
//!
//! ```ignore
//! let buffer = ClipUniformBuffer::new(&device, "Crate Clip Uniforms");
//! let surface = scene.spawn_surface(Some(Renderer::new(buffer)), &[]);
//!
//! // Each frame
//! scene.tick();
//! if let Ok(mut renderer) = scene.world.get::<&mut Renderer>(surface) {
//!     if let Some(buffer) = renderer.material_mut::<ClipUniformBuffer>() {
//!         buffer.flush(&queue);
//!     }
//! }
//! ```

use std::any::Any;

use glam::{Mat4, Vec4};

use crate::config::MAX_CLIPPERS;
use crate::uniforms::{UniformKind, UniformNames, UniformSink};

/// WGSL declaration matching [`ClipUniformBlock`].
pub const CLIP_UNIFORMS_WGSL: &str = r#"
const MAX_CLIPPERS: u32 = 8u;

struct ClipUniforms {
    matrices: array<mat4x4<f32>, 8>,
    pivots: array<vec4<f32>, 8>,
    opacities: array<vec4<f32>, 2>,
    feature_mask: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

fn clip_opacity(u: ClipUniforms, slot: u32) -> f32 {
    return u.opacities[slot / 4u][slot % 4u];
}

fn clip_active_count(u: ClipUniforms) -> u32 {
    if (u.feature_mask == 0u) {
        return 0u;
    }
    return countTrailingZeros(u.feature_mask) + 1u;
}
"#;

/// Uniform block holding the clipping state of one surface.
///
/// Laid out for a WGSL `var<uniform>`: every member is 16-byte aligned and the
/// eight opacities are packed into two `vec4`s.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ClipUniformBlock {
    pub matrices: [[[f32; 4]; 4]; MAX_CLIPPERS],
    pub pivots: [[f32; 4]; MAX_CLIPPERS],
    pub opacities: [[f32; 4]; MAX_CLIPPERS / 4],
    pub feature_mask: u32,
    pub _padding: [u32; 3],
}

impl Default for ClipUniformBlock {
    /// Inert state: identity matrices, opacity `1.0` everywhere, no feature.
    fn default() -> Self {
        Self {
            matrices: [Mat4::IDENTITY.to_cols_array_2d(); MAX_CLIPPERS],
            pivots: [[0.0; 4]; MAX_CLIPPERS],
            opacities: [[1.0; 4]; MAX_CLIPPERS / 4],
            feature_mask: 0,
            _padding: [0; 3],
        }
    }
}

impl ClipUniformBlock {
    /// Opacity of `slot`.
    pub fn opacity(&self, slot: usize) -> f32 {
        self.opacities[slot / 4][slot % 4]
    }

    /// Number of active slots encoded by the one-hot feature mask.
    pub fn active_count(&self) -> usize {
        if self.feature_mask == 0 {
            0
        } else {
            self.feature_mask.trailing_zeros() as usize + 1
        }
    }

    /// Route a write addressed by `name` to its slot. Returns whether `names`
    /// recognized the name.
    fn apply(&mut self, names: &UniformNames, name: &str, value: BlockValue) -> bool {
        match names.parse(name) {
            Some((kind, slot)) => {
                self.write(kind, slot, value);
                true
            }
            None => false,
        }
    }

    fn write(&mut self, kind: UniformKind, slot: usize, value: BlockValue) {
        match (kind, value) {
            (UniformKind::Matrix, BlockValue::Matrix(m)) => {
                self.matrices[slot] = m.to_cols_array_2d();
            }
            (UniformKind::Pivot, BlockValue::Vector(v)) => self.pivots[slot] = v.to_array(),
            (UniformKind::Opacity, BlockValue::Float(f)) => self.opacities[slot / 4][slot % 4] = f,
            (UniformKind::Feature, BlockValue::Feature(on)) => {
                if on {
                    self.feature_mask |= 1 << slot;
                } else {
                    self.feature_mask &= !(1 << slot);
                }
            }
            // Wrong value type for the name: ignored like an unknown uniform.
            _ => {}
        }
    }
}

enum BlockValue {
    Matrix(Mat4),
    Vector(Vec4),
    Float(f32),
    Feature(bool),
}

/// A [`UniformSink`] backed by a wgpu uniform buffer.
///
/// Writes land in a CPU copy of the block; [`flush`](Self::flush) uploads it
/// if anything changed since the last upload.
pub struct ClipUniformBuffer {
    names: UniformNames,
    block: ClipUniformBlock,
    buffer: wgpu::Buffer,
    dirty: bool,
}

impl ClipUniformBuffer {
    /// Create the uniform buffer using the default uniform names.
    pub fn new(device: &wgpu::Device, label: &str) -> Self {
        Self::with_names(device, label, UniformNames::default())
    }

    /// Create the uniform buffer, accepting writes addressed with `names`.
    pub fn with_names(device: &wgpu::Device, label: &str, names: UniformNames) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<ClipUniformBlock>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            names,
            block: ClipUniformBlock::default(),
            buffer,
            // The buffer starts zeroed, the block starts inert.
            dirty: true,
        }
    }

    /// Bind group layout entry for the block at `binding`.
    pub fn layout_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }
    }

    /// The GPU buffer, for building bind groups.
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// The CPU copy of the block.
    pub fn block(&self) -> &ClipUniformBlock {
        &self.block
    }

    /// Whether the block changed since the last [`flush`](Self::flush).
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Upload the block if it changed. Returns whether an upload happened.
    pub fn flush(&mut self, queue: &wgpu::Queue) -> bool {
        if !self.dirty {
            return false;
        }
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.block]));
        self.dirty = false;
        true
    }

    fn write(&mut self, name: &str, value: BlockValue) {
        if self.block.apply(&self.names, name, value) {
            self.dirty = true;
        }
    }
}

impl std::fmt::Debug for ClipUniformBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipUniformBuffer")
            .field("block", &self.block)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl UniformSink for ClipUniformBuffer {
    fn set_matrix(&mut self, name: &str, value: Mat4) {
        self.write(name, BlockValue::Matrix(value));
    }

    fn set_vector(&mut self, name: &str, value: Vec4) {
        self.write(name, BlockValue::Vector(value));
    }

    fn set_float(&mut self, name: &str, value: f32) {
        self.write(name, BlockValue::Float(value));
    }

    fn enable_feature(&mut self, name: &str) {
        self.write(name, BlockValue::Feature(true));
    }

    fn disable_feature(&mut self, name: &str) {
        self.write(name, BlockValue::Feature(false));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
