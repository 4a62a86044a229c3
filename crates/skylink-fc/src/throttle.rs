use std::time::{Duration, Instant};

/// Trailing-edge, latest-wins rate limiter.
///
/// The first value opens a window; values offered while it is open replace
/// the pending one. When the window has elapsed, [`poll`](Self::poll) hands
/// out the newest value exactly once and the next offer opens a new window.
#[derive(Debug)]
pub struct LatestWindow<T> {
    window: Duration,
    opened: Option<Instant>,
    pending: Option<T>,
}

impl<T> LatestWindow<T> {
    pub fn new(window: Duration) -> Self {
        Self { window, opened: None, pending: None }
    }

    pub fn offer(&mut self, value: T, now: Instant) {
        self.opened.get_or_insert(now);
        self.pending = Some(value);
    }

    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let opened = self.opened?;
        if now.duration_since(opened) < self.window {
            return None;
        }
        self.opened = None;
        self.pending.take()
    }
}
