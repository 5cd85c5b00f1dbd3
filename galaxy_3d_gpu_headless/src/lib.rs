/*!
# Galaxy 3D GPU - Headless Context

In-memory implementation of the `GlContext` / `Surface` seam of galaxy_3d_gpu.

The headless context keeps real object state (buffer bytes, texel images,
program uniform values), validates every call like the host API does and
raises the same error codes. Clears, blits, copies, mipmap generation and
readback work on texels; draws are validated and recorded, not rasterized.

It serves two purposes: running the GPU layer without a browser or driver,
and observing exactly which calls the layer issues (call counts, bound
state, uploaded uniforms, raised errors). Context loss can be triggered on
demand.

```no_run
use std::rc::Rc;
use galaxy_3d_gpu::galaxy3d::{Device, DeviceOptions};
use galaxy_3d_gpu::galaxy3d::context::ContextTier;
use galaxy_3d_gpu_headless::HeadlessSurface;

let surface = Rc::new(HeadlessSurface::extended());
let device = Device::new(surface.clone(), ContextTier::Extended, DeviceOptions::default())?;
# Ok::<(), galaxy_3d_gpu::galaxy3d::Error>(())
```
*/

mod headless_config;
mod headless_context;
mod headless_debug;
mod headless_framebuffer;
mod headless_shader;
mod headless_surface;
mod headless_texel;

pub use headless_config::HeadlessConfig;
pub use headless_context::{AttribPointer, DrawRecord, FixedState, HeadlessContext, ObjectCounts, UniformBinding};
pub use headless_surface::HeadlessSurface;
pub use headless_texel::{f32_to_half, half_to_f32, Image, TexelFormat};

// Re-export error reporting
pub use headless_debug::{error_name, print_error_stats_report, ErrorStats};
