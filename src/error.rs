//! Errors and misconfiguration diagnostics.

use hecs::Entity;

/// Errors returned by [`ClipScene`](crate::ClipScene) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipError {
    /// The entity is not alive or carries no [`ClipVolume`](crate::ClipVolume).
    NotAVolume(Entity),
    /// The entity is not alive or carries no
    /// [`ClippableSurface`](crate::ClippableSurface).
    NotASurface(Entity),
    /// The surface was activated without a [`Renderer`](crate::Renderer).
    MissingRenderer(Entity),
}

impl std::fmt::Display for ClipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClipError::NotAVolume(e) => write!(f, "entity {:?} is not a clip volume", e),
            ClipError::NotASurface(e) => write!(f, "entity {:?} is not a clippable surface", e),
            ClipError::MissingRenderer(e) => {
                write!(f, "clippable surface {:?} does not have a Renderer", e)
            }
        }
    }
}

impl std::error::Error for ClipError {}

/// A misconfiguration reported while the scene keeps running.
///
/// Diagnostics never stop an operation. The affected surface continues in a
/// safe state: without a renderer its uniform writes are skipped, and slots
/// beyond [`MAX_CLIPPERS`](crate::MAX_CLIPPERS) are never pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    /// A surface was activated without a renderer on its entity.
    MissingRenderer {
        /// The offending surface.
        surface: Entity,
    },
    /// A surface holds more clipping volumes than it has slots.
    TooManyClippers {
        /// The offending surface.
        surface: Entity,
        /// How many volumes it holds.
        count: usize,
    },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::MissingRenderer { surface } => write!(
                f,
                "entity {:?} with a ClippableSurface does not have a Renderer on it",
                surface
            ),
            Diagnostic::TooManyClippers { surface, count } => write!(
                f,
                "surface {:?} with cube clipping has too many clippers ({} > max {})",
                surface,
                count,
                crate::config::MAX_CLIPPERS
            ),
        }
    }
}
