//! Error types for the Galaxy3D GPU layer
//!
//! Three kinds of failure exist at this layer:
//! - contract violations, reported synchronously at the offending call
//! - context-reported failures (compile/link logs, raw error codes)
//! - context loss, which is a lifecycle event and never surfaces here
//!   except for fence waits that were in flight when the context went away.

use std::fmt;

use crate::program::ShaderStage;

/// Result type for Galaxy3D GPU operations
pub type Result<T> = std::result::Result<T, Error>;

/// Galaxy3D GPU errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Illegal argument or flag combination (programmer error)
    InvalidUsage(String),

    /// Feature not available on the active context tier
    Unsupported(String),

    /// Invalid resource (texture, buffer, program, etc.)
    InvalidResource(String),

    /// Shader compilation failed
    ShaderCompile {
        /// Stage that failed to compile
        stage: ShaderStage,
        /// Info log reported by the context
        log: String,
    },

    /// Program link failed (info log)
    ProgramLink(String),

    /// The context reported an error code
    ContextError {
        /// Raw error code
        code: u32,
        /// Human-readable description
        message: String,
    },

    /// The operation needed a live context and it was lost
    ContextLost,

    /// Waiting on a GPU fence failed
    FenceFailed,

    /// Backend-specific error
    BackendError(String),

    /// Initialization failed (device, context, subsystems)
    InitializationFailed(String),

    /// Out of GPU memory
    OutOfMemory,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidUsage(msg) => write!(f, "Invalid usage: {}", msg),
            Error::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::ShaderCompile { stage, log } => {
                write!(f, "{:?} shader compilation failed: {}", stage, log)
            }
            Error::ProgramLink(log) => write!(f, "Program link failed: {}", log),
            Error::ContextError { code, message } => {
                write!(f, "Context error 0x{:04X}: {}", code, message)
            }
            Error::ContextLost => write!(f, "Graphics context lost"),
            Error::FenceFailed => write!(f, "GPU fence wait failed"),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Wrap a raw context error code
    pub fn from_context_code(code: u32) -> Self {
        use crate::context::gl;
        let message = match code {
            gl::INVALID_ENUM => "invalid enum",
            gl::INVALID_VALUE => "invalid value",
            gl::INVALID_OPERATION => "invalid operation",
            gl::OUT_OF_MEMORY => "out of memory",
            gl::INVALID_FRAMEBUFFER_OPERATION => "invalid framebuffer operation",
            gl::CONTEXT_LOST_WEBGL => "context lost",
            _ => "unknown error",
        };
        Error::ContextError {
            code,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
