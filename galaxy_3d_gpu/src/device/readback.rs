/// GPU fence waits and pixel readback
///
/// The extended tier stages reads into a pixel-pack buffer, inserts a fence
/// and polls it on a bounded interval before copying out. The legacy tier has
/// no fences and reads synchronously.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

use crate::context::{gl, GlContext, NativeBuffer, NativeFence};
use crate::error::{Error, Result};

/// Future resolving once a fence is signaled
///
/// Polling re-checks the fence at most once per `interval`. Between checks
/// the waker is scheduled with `schedule_wake` instead of re-polling. Rejects
/// with `FenceFailed` if the wait fails or the context is lost while waiting.
/// There is no cancellation: dropping the future only deletes the fence.
pub struct FenceWait {
    gl: Rc<dyn GlContext>,
    fence: Option<NativeFence>,
    interval: Duration,
    next_check: Instant,
}

impl FenceWait {
    /// Insert a fence after the commands issued so far
    pub(crate) fn insert(gl: Rc<dyn GlContext>, interval: Duration) -> Result<Self> {
        let fence = gl
            .fence_sync(gl::SYNC_GPU_COMMANDS_COMPLETE, 0)
            .ok_or(Error::FenceFailed)?;
        gl.flush();
        Ok(Self {
            gl,
            fence: Some(fence),
            interval,
            next_check: Instant::now(),
        })
    }
}

impl Future for FenceWait {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(fence) = this.fence else {
            return Poll::Ready(Ok(()));
        };

        let now = Instant::now();
        if now < this.next_check {
            schedule_wake(cx.waker(), this.next_check - now);
            return Poll::Pending;
        }

        if this.gl.is_context_lost() {
            this.fence = None;
            return Poll::Ready(Err(Error::FenceFailed));
        }

        match this.gl.client_wait_sync(fence, 0, 0) {
            gl::ALREADY_SIGNALED | gl::CONDITION_SATISFIED => {
                this.gl.delete_sync(fence);
                this.fence = None;
                Poll::Ready(Ok(()))
            }
            gl::WAIT_FAILED => {
                this.gl.delete_sync(fence);
                this.fence = None;
                Poll::Ready(Err(Error::FenceFailed))
            }
            _ => {
                this.next_check = Instant::now() + this.interval;
                schedule_wake(cx.waker(), this.interval);
                Poll::Pending
            }
        }
    }
}

thread_local! {
    /// Fence waits waiting for the next frame boundary
    static PARKED: RefCell<Vec<Waker>> = const { RefCell::new(Vec::new()) };
}

/// Wake `waker` once `delay` has passed: a sleeper thread on native targets,
/// the next `Device::run_frame` on the web where no thread can sleep
fn schedule_wake(waker: &Waker, delay: Duration) {
    if delay.is_zero() {
        waker.wake_by_ref();
        return;
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let waker = waker.clone();
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            waker.wake();
        });
    }
    #[cfg(target_arch = "wasm32")]
    PARKED.with(|parked| parked.borrow_mut().push(waker.clone()));
}

/// Wake every fence wait parked until the frame boundary
pub(crate) fn wake_parked() -> usize {
    let parked = PARKED.with(|parked| std::mem::take(&mut *parked.borrow_mut()));
    let count = parked.len();
    for waker in parked {
        waker.wake();
    }
    count
}

impl Drop for FenceWait {
    fn drop(&mut self) {
        if let Some(fence) = self.fence.take() {
            if !self.gl.is_context_lost() {
                self.gl.delete_sync(fence);
            }
        }
    }
}

/// Format/type pair used to read a color attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadFormat {
    pub format: u32,
    pub ty: u32,
    pub bytes_per_pixel: u32,
}

impl ReadFormat {
    pub const RGBA8: ReadFormat = ReadFormat {
        format: gl::RGBA,
        ty: gl::UNSIGNED_BYTE,
        bytes_per_pixel: 4,
    };

    pub const RGBA32F: ReadFormat = ReadFormat {
        format: gl::RGBA,
        ty: gl::FLOAT,
        bytes_per_pixel: 16,
    };

    pub fn byte_len(&self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel as usize
    }
}

/// `start + len` reaches past `limit`, overflow included
pub(crate) fn exceeds(start: u32, len: u32, limit: u32) -> bool {
    start.checked_add(len).map_or(true, |end| end > limit)
}

/// Pixel region of the currently bound read framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// A read already issued to the context, waiting to be copied out
pub(crate) enum PendingRead {
    /// Legacy tier: the pixels were read synchronously
    Ready(Vec<u8>),
    /// Extended tier: pixels sit in a pack buffer behind a fence
    Staged {
        gl: Rc<dyn GlContext>,
        buffer: NativeBuffer,
        len: usize,
        wait: FenceWait,
    },
}

impl PendingRead {
    /// Issue the read from the bound read framebuffer
    pub(crate) fn issue(
        gl: Rc<dyn GlContext>,
        region: ReadRegion,
        format: ReadFormat,
        async_readback: bool,
        interval: Duration,
    ) -> Result<Self> {
        let len = format.byte_len(region.width, region.height);
        gl.pixel_store_i32(gl::PACK_ALIGNMENT, 1);

        if !async_readback {
            let mut pixels = vec![0u8; len];
            gl.read_pixels(
                region.x,
                region.y,
                region.width,
                region.height,
                format.format,
                format.ty,
                &mut pixels,
            );
            return Ok(PendingRead::Ready(pixels));
        }

        let buffer = gl
            .create_buffer()
            .ok_or_else(|| Error::BackendError("Failed to create pack buffer".to_string()))?;
        gl.bind_buffer(gl::PIXEL_PACK_BUFFER, Some(buffer));
        gl.buffer_data_size(gl::PIXEL_PACK_BUFFER, len as u32, gl::STREAM_READ);
        gl.read_pixels_to_pack_buffer(
            region.x,
            region.y,
            region.width,
            region.height,
            format.format,
            format.ty,
            0,
        );
        gl.bind_buffer(gl::PIXEL_PACK_BUFFER, None);

        let wait = match FenceWait::insert(gl.clone(), interval) {
            Ok(wait) => wait,
            Err(e) => {
                gl.delete_buffer(buffer);
                return Err(e);
            }
        };
        Ok(PendingRead::Staged { gl, buffer, len, wait })
    }

    /// Wait for the data and copy it into `dst`
    pub(crate) async fn finish(self, dst: &mut [u8]) -> Result<()> {
        match self {
            PendingRead::Ready(pixels) => {
                let n = dst.len().min(pixels.len());
                dst[..n].copy_from_slice(&pixels[..n]);
                Ok(())
            }
            PendingRead::Staged { gl, buffer, len, wait } => {
                let waited = wait.await;
                if waited.is_err() || gl.is_context_lost() {
                    if !gl.is_context_lost() {
                        gl.delete_buffer(buffer);
                    }
                    return Err(Error::FenceFailed);
                }
                let n = dst.len().min(len);
                gl.bind_buffer(gl::PIXEL_PACK_BUFFER, Some(buffer));
                gl.get_buffer_sub_data(gl::PIXEL_PACK_BUFFER, 0, &mut dst[..n]);
                gl.bind_buffer(gl::PIXEL_PACK_BUFFER, None);
                gl.delete_buffer(buffer);
                Ok(())
            }
        }
    }
}

/// Read straight into `buffer` at `offset` through the pack binding
/// (extended tier). No fence: later reads of the buffer are ordered after it.
pub(crate) fn pack_into_buffer(
    gl: &dyn GlContext,
    region: ReadRegion,
    format: ReadFormat,
    buffer: NativeBuffer,
    offset: u32,
) {
    gl.pixel_store_i32(gl::PACK_ALIGNMENT, 1);
    gl.bind_buffer(gl::PIXEL_PACK_BUFFER, Some(buffer));
    gl.read_pixels_to_pack_buffer(
        region.x,
        region.y,
        region.width,
        region.height,
        format.format,
        format.ty,
        offset,
    );
    gl.bind_buffer(gl::PIXEL_PACK_BUFFER, None);
}

#[cfg(test)]
#[path = "readback_tests.rs"]
mod tests;
