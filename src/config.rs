//! Clipping configuration.

use crate::uniforms::UniformNames;

/// Number of clipping volumes a single surface can apply at once.
///
/// The clipping shaders are compiled with this many uniform slots and one
/// feature variant per active count, so changing it requires rebuilding the
/// shaders too.
pub const MAX_CLIPPERS: usize = 8;

/// Configuration for a [`ClipScene`](crate::ClipScene).
///
/// # Example
///
/// ```
/// use cubeclip::{ClipConfig, UniformNames};
///
/// let config = ClipConfig::new()
///     .names(UniformNames::default())
///     .report_overflow(false);
/// assert!(!config.report_overflow);
/// ```
#[derive(Clone, Debug)]
pub struct ClipConfig {
    /// Uniform base names the surfaces write to.
    pub names: UniformNames,
    /// Report surfaces holding more than [`MAX_CLIPPERS`] volumes, once per
    /// frame each.
    pub report_overflow: bool,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            names: UniformNames::default(),
            report_overflow: true,
        }
    }
}

impl ClipConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(mut self, names: UniformNames) -> Self {
        self.names = names;
        self
    }

    pub fn report_overflow(mut self, report: bool) -> Self {
        self.report_overflow = report;
        self
    }
}
