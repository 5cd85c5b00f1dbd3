//! Unit tests for device/readback.rs

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::time::Duration;

use crate::context::mock_context::MockContext;
use crate::context::{gl, ContextTier, GlContext};
use crate::device::readback::*;
use crate::error::Error;

struct CountingWaker(AtomicUsize);

impl Wake for CountingWaker {
    fn wake(self: Arc<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn counting_waker() -> (Arc<CountingWaker>, Waker) {
    let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
    (counter.clone(), Waker::from(counter))
}

fn poll_once(wait: &mut FenceWait, waker: &Waker) -> Poll<crate::error::Result<()>> {
    Pin::new(wait).poll(&mut Context::from_waker(waker))
}

fn pending_fence(interval: Duration) -> (Rc<MockContext>, FenceWait) {
    let context = Rc::new(MockContext::new(ContextTier::Extended));
    context.set_fence_status(gl::TIMEOUT_EXPIRED);
    let gl: Rc<dyn GlContext> = context.clone();
    let wait = FenceWait::insert(gl, interval).unwrap();
    (context, wait)
}

// ============================================================================
// FENCE WAITS
// ============================================================================

#[test]
fn test_unsignaled_fence_waits_for_the_interval() {
    let (context, mut wait) = pending_fence(Duration::from_millis(50));
    let (counter, waker) = counting_waker();

    assert!(poll_once(&mut wait, &waker).is_pending());
    assert_eq!(context.count("client_wait_sync"), 1);
    // no immediate self-wake
    assert_eq!(counter.0.load(Ordering::SeqCst), 0);

    context.set_fence_status(gl::CONDITION_SATISFIED);
    std::thread::sleep(Duration::from_millis(250));
    assert_eq!(counter.0.load(Ordering::SeqCst), 1);

    assert!(matches!(poll_once(&mut wait, &waker), Poll::Ready(Ok(()))));
    assert_eq!(context.count("client_wait_sync"), 2);
    assert_eq!(context.count("delete_sync"), 1);
}

#[test]
fn test_early_poll_does_not_check_the_fence() {
    let (context, mut wait) = pending_fence(Duration::from_secs(60));
    let (_counter, waker) = counting_waker();

    assert!(poll_once(&mut wait, &waker).is_pending());
    assert!(poll_once(&mut wait, &waker).is_pending());
    assert_eq!(context.count("client_wait_sync"), 1);
}

#[test]
fn test_zero_interval_wakes_at_once() {
    let (_context, mut wait) = pending_fence(Duration::ZERO);
    let (counter, waker) = counting_waker();

    assert!(poll_once(&mut wait, &waker).is_pending());
    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
}

#[test]
fn test_wait_fails_on_loss_or_wait_failure() {
    let (context, mut wait) = pending_fence(Duration::ZERO);
    let (_counter, waker) = counting_waker();
    context.set_context_lost(true);
    assert!(matches!(poll_once(&mut wait, &waker), Poll::Ready(Err(Error::FenceFailed))));
    drop(wait);
    assert_eq!(context.count("delete_sync"), 0);

    let (context, mut wait) = pending_fence(Duration::ZERO);
    context.set_fence_status(gl::WAIT_FAILED);
    assert!(matches!(poll_once(&mut wait, &waker), Poll::Ready(Err(Error::FenceFailed))));
    assert_eq!(context.count("delete_sync"), 1);
}

#[test]
fn test_nothing_parked_outside_the_web() {
    assert_eq!(wake_parked(), 0);
}

// ============================================================================
// REGIONS
// ============================================================================

#[test]
fn test_exceeds_handles_wraparound() {
    assert!(!exceeds(0, 4, 4));
    assert!(exceeds(1, 4, 4));
    assert!(exceeds(u32::MAX, 1, 4));
    assert!(exceeds(2, u32::MAX, 4));
}

#[test]
fn test_byte_len_does_not_wrap() {
    let len = ReadFormat::RGBA32F.byte_len(16384, 16384);
    assert_eq!(len as u64, 16384u64 * 16384 * 16);
}
