//! Error types for the LOS texture pipeline.

use std::fmt;

use crate::backend::FramebufferStatus;

/// Result type for LOS texture operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or driving the LOS texture.
///
/// A missing visibility oracle is not represented here: the
/// affected operation is skipped and prior state is kept.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A configuration value is out of range.
    InvalidConfig {
        /// The offending field.
        field: &'static str,
        /// Description of what was invalid.
        detail: String,
    },
    /// The smoothing effect could not be loaded or linked.
    ShaderInit {
        /// Name of the effect that failed.
        effect: &'static str,
        /// The backend's error message.
        message: String,
    },
    /// One or both smoothing framebuffers were rejected by the GPU.
    FramebufferIncomplete {
        /// Status of the first smoothing framebuffer.
        first: FramebufferStatus,
        /// Status of the second smoothing framebuffer.
        second: FramebufferStatus,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig { field, detail } => {
                write!(f, "invalid config value for {field}: {detail}")
            }
            Error::ShaderInit { effect, message } => {
                write!(f, "failed to load effect {effect}: {message}")
            }
            Error::FramebufferIncomplete { first, second } => {
                write!(
                    f,
                    "LOS framebuffer object incomplete: {:#06X} {:#06X}",
                    first.code(),
                    second.code()
                )
            }
        }
    }
}

impl std::error::Error for Error {}
