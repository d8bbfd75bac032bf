use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use canlink_frame::CanFrame;
use futures_core::Stream;

use crate::bus::{BusShared, DEFAULT_RECEIVE_TIMEOUT};
use crate::error::{CanError, Result};
use crate::reader::ReadGuard;

/// Predicate applied to each candidate frame on a pull sequence.
pub type FrameFilter = Arc<dyn Fn(&CanFrame) -> bool + Send + Sync>;

/// Options for the pull sequences (`frames`, `frames_with_id`,
/// `frames_of_type`) and the batch collector.
#[derive(Clone)]
pub struct StreamOptions {
    /// Deadline for each individual read. There is no global
    /// deadline; a slow bus fails one pull at a time.
    pub timeout: Duration,
    /// Number of yielded frames after which the sequence ends.
    /// `None` runs until the consumer stops pulling.
    pub max_frames: Option<usize>,
    /// Caller-supplied predicate. Non-matching frames are read and
    /// discarded without counting toward `max_frames`.
    pub filter: Option<FrameFilter>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RECEIVE_TIMEOUT,
            max_frames: None,
            filter: None,
        }
    }
}

impl StreamOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&CanFrame) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("timeout", &self.timeout)
            .field("max_frames", &self.max_frames)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

type ReadFuture = Pin<Box<dyn Future<Output = Result<CanFrame>> + Send>>;

/// A lazy, pull-driven sequence of frames.
///
/// Strictly demand-driven: between pulls no background work happens
/// and at most one read is in flight. The sequence owns the bus's
/// receive slot for its whole life; dropping it — exhausted or not —
/// releases the slot and cancels any pending read, so abandonment
/// never leaves an orphaned reader. Once it has ended (limit reached,
/// failure, or abandonment) it stays ended.
pub struct FrameStream {
    shared: Arc<BusShared>,
    timeout: Duration,
    remaining: Option<usize>,
    filters: Vec<FrameFilter>,
    in_flight: Option<ReadFuture>,
    guard: Option<ReadGuard>,
    done: bool,
}

impl FrameStream {
    pub(crate) fn new(
        shared: Arc<BusShared>,
        guard: ReadGuard,
        implicit: Vec<FrameFilter>,
        options: StreamOptions,
    ) -> Self {
        let mut filters = implicit;
        if let Some(filter) = options.filter {
            filters.push(filter);
        }
        Self {
            shared,
            timeout: options.timeout,
            remaining: options.max_frames,
            filters,
            in_flight: None,
            guard: Some(guard),
            done: false,
        }
    }

    /// Pull the next frame.
    ///
    /// `None` means the sequence ended normally; `Some(Err(_))` is an
    /// abnormal end (the failure is yielded once, then the sequence
    /// is fused).
    pub async fn next(&mut self) -> Option<Result<CanFrame>> {
        std::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }

    fn begin_read(shared: &Arc<BusShared>, timeout: Duration) -> ReadFuture {
        let shared = Arc::clone(shared);
        Box::pin(async move {
            let transport = shared.transport()?;
            transport.recv(timeout).await.map_err(CanError::from)
        })
    }

    fn finish(&mut self) {
        self.done = true;
        self.in_flight = None;
        self.guard.take();
    }
}

impl Stream for FrameStream {
    type Item = Result<CanFrame>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        loop {
            if this.remaining == Some(0) {
                this.finish();
                return Poll::Ready(None);
            }

            let fut = this
                .in_flight
                .get_or_insert_with(|| Self::begin_read(&this.shared, this.timeout));

            let result = match fut.as_mut().poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(result) => result,
            };
            this.in_flight = None;

            match result {
                Err(err) => {
                    this.finish();
                    return Poll::Ready(Some(Err(err)));
                }
                Ok(frame) => {
                    if this.filters.iter().all(|accept| accept(&frame)) {
                        if let Some(remaining) = this.remaining.as_mut() {
                            *remaining -= 1;
                            if *remaining == 0 {
                                this.finish();
                            }
                        }
                        return Poll::Ready(Some(Ok(frame)));
                    }
                    // Discarded as if it never existed on the sequence.
                }
            }
        }
    }
}

impl fmt::Debug for FrameStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameStream")
            .field("timeout", &self.timeout)
            .field("remaining", &self.remaining)
            .field("filters", &self.filters.len())
            .field("done", &self.done)
            .finish()
    }
}
