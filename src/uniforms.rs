//! Slot-indexed shader uniforms and the sinks that receive them.
//!
//! Every clippable surface writes its clipping state through a
//! [`UniformSink`], the shader-parameter interface of its material. Uniforms are
//! addressed by name: a base name followed by the zero-based slot index.
//!
//! | Uniform                  | Type   | Meaning                                    |
//! |--------------------------|--------|--------------------------------------------|
//! | `_Fadable_matrix_<i>`    | mat4   | World to cube-local matrix of slot `i`     |
//! | `_Fadable_pivot_<i>`     | vec4   | World position of the volume in slot `i`   |
//! | `_Fadable_opacity_<i>`   | float  | Opacity inside the volume, `1.0` = inert   |
//! | `_FADABLE_STATUS__<k-1>` | feature| Enabled when exactly `k` slots are active  |
//!
//! The feature flags are one-hot: at most one is enabled at any time, selecting
//! the shader variant compiled for `k` volumes.
//!
//! [`UniformTable`] is a CPU-side sink that records the latest values. It is
//! handy for headless backends and for inspecting what a surface pushed.

use std::any::Any;
use std::collections::{HashMap, HashSet};

use glam::{Mat4, Vec4};

use crate::config::MAX_CLIPPERS;

/// The shader-parameter interface of one renderable surface.
///
/// Implemented by rendering backends. All methods are infallible: a backend
/// that does not know a name should ignore the write.
pub trait UniformSink: Send + Sync + 'static {
    /// Set a 4×4 matrix uniform.
    fn set_matrix(&mut self, name: &str, value: Mat4);
    /// Set a 4-component vector uniform.
    fn set_vector(&mut self, name: &str, value: Vec4);
    /// Set a scalar uniform.
    fn set_float(&mut self, name: &str, value: f32);
    /// Enable a shader feature (keyword).
    fn enable_feature(&mut self, name: &str);
    /// Disable a shader feature (keyword).
    fn disable_feature(&mut self, name: &str);

    /// Upcast for downcasting to the concrete sink.
    fn as_any(&self) -> &dyn Any;
    /// Mutable upcast for downcasting to the concrete sink.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// The renderable attached to a surface entity.
///
/// A [`ClippableSurface`](crate::ClippableSurface) resolves the `Renderer` on
/// its own entity when activated and writes all of its uniforms to the
/// contained material.
///
/// ```
/// use cubeclip::{Renderer, UniformTable};
///
/// let renderer = Renderer::new(UniformTable::new());
/// assert!(renderer.material::<UniformTable>().is_some());
/// ```
pub struct Renderer {
    material: Box<dyn UniformSink>,
}

impl Renderer {
    /// Create a renderer writing to the given material.
    pub fn new(material: impl UniformSink) -> Self {
        Self {
            material: Box::new(material),
        }
    }

    /// The material as a dynamic sink.
    pub fn sink_mut(&mut self) -> &mut dyn UniformSink {
        self.material.as_mut()
    }

    /// The material, if it is of type `S`.
    pub fn material<S: UniformSink>(&self) -> Option<&S> {
        self.material.as_any().downcast_ref::<S>()
    }

    /// The material, mutably, if it is of type `S`.
    pub fn material_mut<S: UniformSink>(&mut self) -> Option<&mut S> {
        self.material.as_any_mut().downcast_mut::<S>()
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer").finish_non_exhaustive()
    }
}

/// Which slot uniform a name refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformKind {
    /// `_Fadable_matrix_<i>`
    Matrix,
    /// `_Fadable_pivot_<i>`
    Pivot,
    /// `_Fadable_opacity_<i>`
    Opacity,
    /// `_FADABLE_STATUS__<i>`
    Feature,
}

/// Base names of the slot uniforms.
///
/// The defaults are the names the clipping shaders are compiled against.
/// Override them only together with the shader source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformNames {
    /// Prefix of the per-slot world to cube-local matrix.
    pub matrix: String,
    /// Prefix of the per-slot pivot position.
    pub pivot: String,
    /// Prefix of the per-slot opacity.
    pub opacity: String,
    /// Prefix of the active-count feature flags.
    pub feature: String,
}

impl Default for UniformNames {
    fn default() -> Self {
        Self {
            matrix: "_Fadable_matrix_".to_string(),
            pivot: "_Fadable_pivot_".to_string(),
            opacity: "_Fadable_opacity_".to_string(),
            feature: "_FADABLE_STATUS__".to_string(),
        }
    }
}

impl UniformNames {
    /// Name of the matrix uniform of `slot`.
    pub fn matrix(&self, slot: usize) -> String {
        format!("{}{}", self.matrix, slot)
    }

    /// Name of the pivot uniform of `slot`.
    pub fn pivot(&self, slot: usize) -> String {
        format!("{}{}", self.pivot, slot)
    }

    /// Name of the opacity uniform of `slot`.
    pub fn opacity(&self, slot: usize) -> String {
        format!("{}{}", self.opacity, slot)
    }

    /// Name of the feature flag enabled when `index + 1` slots are active.
    pub fn feature(&self, index: usize) -> String {
        format!("{}{}", self.feature, index)
    }

    /// Split a uniform name back into its kind and slot index.
    ///
    /// Returns `None` for names that do not follow the pattern or whose index
    /// is outside `0..MAX_CLIPPERS`.
    ///
    /// ```
    /// use cubeclip::{UniformKind, UniformNames};
    ///
    /// let names = UniformNames::default();
    /// assert_eq!(names.parse("_Fadable_opacity_3"), Some((UniformKind::Opacity, 3)));
    /// assert_eq!(names.parse("_Fadable_opacity_8"), None);
    /// assert_eq!(names.parse("_Color"), None);
    /// ```
    pub fn parse(&self, name: &str) -> Option<(UniformKind, usize)> {
        let prefixes = [
            (UniformKind::Matrix, &self.matrix),
            (UniformKind::Pivot, &self.pivot),
            (UniformKind::Opacity, &self.opacity),
            (UniformKind::Feature, &self.feature),
        ];

        prefixes.into_iter().find_map(|(kind, prefix)| {
            let index = name.strip_prefix(prefix.as_str())?.parse::<usize>().ok()?;
            (index < MAX_CLIPPERS).then_some((kind, index))
        })
    }
}

/// A value recorded by [`UniformTable`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    /// A 4×4 matrix.
    Matrix(Mat4),
    /// A 4-component vector.
    Vector(Vec4),
    /// A scalar.
    Float(f32),
}

/// CPU-side uniform sink that records the latest value of every name.
///
/// Also counts writes, which makes it easy to check that a frame without
/// changes produced no uniform traffic.
#[derive(Clone, Debug, Default)]
pub struct UniformTable {
    values: HashMap<String, UniformValue>,
    features: HashSet<String>,
    writes: usize,
}

impl UniformTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest value written under `name`.
    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.values.get(name).copied()
    }

    /// Latest scalar written under `name`.
    pub fn float(&self, name: &str) -> Option<f32> {
        match self.values.get(name) {
            Some(UniformValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    /// Latest vector written under `name`.
    pub fn vector(&self, name: &str) -> Option<Vec4> {
        match self.values.get(name) {
            Some(UniformValue::Vector(v)) => Some(*v),
            _ => None,
        }
    }

    /// Latest matrix written under `name`.
    pub fn matrix(&self, name: &str) -> Option<Mat4> {
        match self.values.get(name) {
            Some(UniformValue::Matrix(m)) => Some(*m),
            _ => None,
        }
    }

    /// Whether feature `name` is currently enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.features.contains(name)
    }

    /// All enabled features, sorted.
    pub fn enabled_features(&self) -> Vec<&str> {
        let mut features: Vec<&str> = self.features.iter().map(String::as_str).collect();
        features.sort_unstable();
        features
    }

    /// Number of writes (of any kind) since creation or the last
    /// [`reset_writes`](Self::reset_writes).
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Reset the write counter.
    pub fn reset_writes(&mut self) {
        self.writes = 0;
    }

    fn set(&mut self, name: &str, value: UniformValue) {
        self.writes += 1;
        self.values.insert(name.to_string(), value);
    }
}

impl UniformSink for UniformTable {
    fn set_matrix(&mut self, name: &str, value: Mat4) {
        self.set(name, UniformValue::Matrix(value));
    }

    fn set_vector(&mut self, name: &str, value: Vec4) {
        self.set(name, UniformValue::Vector(value));
    }

    fn set_float(&mut self, name: &str, value: f32) {
        self.set(name, UniformValue::Float(value));
    }

    fn enable_feature(&mut self, name: &str) {
        self.writes += 1;
        self.features.insert(name.to_string());
    }

    fn disable_feature(&mut self, name: &str) {
        self.writes += 1;
        self.features.remove(name);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
