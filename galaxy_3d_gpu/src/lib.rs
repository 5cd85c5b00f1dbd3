/*!
# Galaxy 3D GPU

GPU abstraction layer over a context-based graphics API with two tiers:
the legacy tier (WebGL1-class plus extensions) and the extended tier
(WebGL2-class).

The layer hides the tier differences behind one API and keeps every GPU
object usable across a context loss: objects are invalidated when the
context goes away and rebuilt, from their shadows and descriptors, when it
comes back.

## Architecture

- **Device**: owns the context, creates every resource, resolves the current
  bindings into context calls at draw time and runs the frame loop
- **DeviceBackend**: named factory of devices (`"webgl"`, `"webgl2"`)
- **Buffer / IndexBuffer / StructuredBuffer**: GPU memory, optionally shadowed
- **Texture** and its typed wrappers (2D, 2D array, 3D, cube, video)
- **Sampler**: shared, cached sampling options
- **Framebuffer**: render target with MSAA resolve and legacy emulation
- **VertexLayout**: vertex buffers plus index buffer, bound together
- **Program**: linked shaders with reflection and uniform setters
- **BindGroup**: resources routed to a program by name
- **RenderStateSet**: blend, depth, stencil, rasterizer and color states

Hosts plug the real graphics API in by implementing `GlContext` (and
`Surface` for context creation).
*/

// Internal modules
mod error;
mod gpu;
pub mod log;

pub mod bind_group;
pub mod buffer;
pub mod caps;
pub mod context;
pub mod device;
pub mod framebuffer;
pub mod object;
pub mod program;
pub mod render_states;
pub mod sampler;
pub mod texture;
pub mod vertex_layout;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Process-wide services (logger)
    pub use crate::gpu::Gpu;

    // Device, backends and frame-level types
    pub use crate::device::backend::{find_backend, preferred_backend, DeviceBackend, GlBackend};
    pub use crate::device::{
        drawing_buffer_size, Device, DeviceEvent, DeviceOptions, DeviceStats, PixelRounding,
        PrimitiveTopology, Rect,
    };

    // Object lifecycle
    pub use crate::object::{GpuObject, ObjectKind};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};
        // Note: gpu_* macros are NOT re-exported here - they are internal only
    }

    // Context seam implemented by hosts
    pub mod context {
        pub use crate::context::*;
    }

    // Capability tables and formats
    pub mod caps {
        pub use crate::caps::*;
    }

    // Resource sub-module
    pub mod resource {
        pub use crate::bind_group::*;
        pub use crate::buffer::std140::{ShaderType, StructLayout, StructType};
        pub use crate::buffer::*;
        pub use crate::framebuffer::*;
        pub use crate::program::*;
        pub use crate::sampler::*;
        pub use crate::texture::*;
        pub use crate::vertex_layout::*;
    }

    // Render state sub-module
    pub mod render {
        pub use crate::render_states::*;
    }
}

// Re-export math library at crate root
pub use glam;
