//! World transforms for clipping volumes.
//!
//! A clipping volume is a unit cube placed in the world by a [`Transform`].
//! The shader does not test fragments against the cube directly; instead it
//! receives a matrix that maps world positions into cube-local space, where the
//! cube spans `[-0.5, 0.5]` on every axis. [`Transform::clip_matrix()`] builds
//! that matrix.
//!
//! ```
//! use cubeclip::{Transform, Vec3, Quat};
//!
//! let transform = Transform::new()
//!     .position(Vec3::new(0.0, 2.0, -5.0))
//!     .rotation(Quat::from_rotation_y(0.5))
//!     .uniform_scale(2.0);
//!
//! let to_cube = transform.clip_matrix();
//! ```

use glam::{Mat4, Quat, Vec3};

/// A 3D transformation representing position, rotation, and scale.
///
/// Stored as a component on every clipping volume entity. Transformations are
/// combined in the standard **Scale → Rotate → Translate** (SRT) order by
/// [`Transform::matrix()`].
///
/// # Default Values
///
/// - `position`: `(0, 0, 0)`
/// - `rotation`: Identity quaternion (no rotation)
/// - `scale`: `(1, 1, 1)`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// World-space position (translation).
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
    /// Scale factors for each axis.
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Creates a new identity transform (origin, no rotation, unit scale).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transform positioned at the given location.
    ///
    /// ```
    /// use cubeclip::{Transform, Vec3};
    ///
    /// let transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
    /// assert_eq!(transform.position, Vec3::new(1.0, 2.0, 3.0));
    /// ```
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Sets the position (translation) component.
    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Sets the rotation component using a quaternion.
    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Sets non-uniform scale factors for each axis.
    pub fn scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Sets uniform scale on all axes.
    ///
    /// ```
    /// use cubeclip::{Transform, Vec3};
    ///
    /// let transform = Transform::new().uniform_scale(2.0);
    /// assert_eq!(transform.scale, Vec3::new(2.0, 2.0, 2.0));
    /// ```
    pub fn uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    /// Converts this transform to a 4×4 local-to-world matrix (SRT order).
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Matrix pushed to the shader as `_Fadable_matrix_<slot>`.
    ///
    /// This is the inverse of the local-to-world matrix built with the
    /// *inverted* rotation, i.e. `(T · R⁻¹ · S)⁻¹ = S⁻¹ · R · T⁻¹`. The shader
    /// contract expects the rotation part in this form.
    ///
    /// A zero scale component makes the matrix non-invertible; the result then
    /// contains non-finite values, same as inverting any singular matrix.
    pub fn clip_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation.inverse(), self.position)
            .inverse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn identity_clip_matrix_is_identity() {
        let m = Transform::new().clip_matrix();
        assert!(m.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn clip_matrix_maps_pivot_to_origin() {
        let transform = Transform::new()
            .position(Vec3::new(3.0, -1.0, 2.0))
            .rotation(Quat::from_rotation_z(0.7))
            .uniform_scale(4.0);

        let local = transform.clip_matrix() * Vec4::new(3.0, -1.0, 2.0, 1.0);
        assert!(local.truncate().abs_diff_eq(Vec3::ZERO, 1e-5));
    }

    #[test]
    fn clip_matrix_normalises_by_scale() {
        let transform = Transform::new()
            .position(Vec3::new(1.0, 0.0, 0.0))
            .scale(Vec3::new(2.0, 4.0, 8.0));

        // A corner of the scaled cube lands on the corner of the unit cube.
        let corner = transform.clip_matrix().transform_point3(Vec3::new(2.0, 2.0, 4.0));
        assert!(corner.abs_diff_eq(Vec3::new(0.5, 0.5, 0.5), 1e-5));
    }

    #[test]
    fn clip_matrix_uses_forward_rotation() {
        let rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let transform = Transform::new().rotation(rotation);

        // With the inverted rotation baked into the local-to-world matrix,
        // inverting it leaves the forward rotation.
        let expected = Mat4::from_quat(rotation);
        assert!(transform.clip_matrix().abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn matrix_is_srt() {
        let transform = Transform::from_position(Vec3::X).uniform_scale(2.0);
        let p = transform.matrix().transform_point3(Vec3::ONE);
        assert!(p.abs_diff_eq(Vec3::new(3.0, 2.0, 2.0), 1e-6));
    }
}
