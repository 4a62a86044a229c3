//! At-most-one-outstanding request/reply with bounded retry.
//!
//! The layer remembers the single request in flight and the kind of reply
//! that resolves it. Replies of any other kind are left alone, which is how
//! unsolicited and stale traffic gets filtered before it reaches a state
//! machine. Retries are driven purely by the link's timer; nothing here
//! blocks.

use std::time::Duration;

use skylink_wire::{Message, MessageKind};
use tracing::{debug, error, warn};

use crate::outbound::{FrameSink, Outbound};
use crate::timer::RetryTimer;

pub const DEFAULT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total sends per exchange, including the first.
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: DEFAULT_ATTEMPTS, interval: DEFAULT_RETRY_INTERVAL }
    }
}

#[derive(Debug, Clone)]
pub struct PendingExchange {
    pub expected: MessageKind,
    pub request: Message,
    pub retries_left: u32,
    pub token: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Nothing pending, or the expiry belongs to a superseded exchange.
    Stale,
    Resent { retries_left: u32 },
    Exhausted { expected: MessageKind, attempts: u32 },
}

pub struct ReliableExchange<S, T> {
    out: Outbound<S>,
    timer: T,
    policy: RetryPolicy,
    pending: Option<PendingExchange>,
    next_token: u64,
}

impl<S: FrameSink, T: RetryTimer> ReliableExchange<S, T> {
    pub fn new(out: Outbound<S>, timer: T, policy: RetryPolicy) -> Self {
        Self { out, timer, policy, pending: None, next_token: 0 }
    }

    /// Send `request` now and keep retrying until a reply of kind `expected`
    /// is offered. Replaces any exchange already in flight.
    pub fn send_with_retry(&mut self, request: Message, expected: MessageKind) {
        if let Some(old) = self.pending.take() {
            debug!("superseding pending {:?} exchange", old.expected);
        }
        self.next_token += 1;
        let token = self.next_token;
        self.out.send(&request);
        self.timer.arm(self.policy.interval, token);
        self.pending = Some(PendingExchange {
            expected,
            request,
            retries_left: self.policy.attempts,
            token,
        });
    }

    /// Resolve the pending exchange with `reply` if it is the awaited kind.
    pub fn offer<'m>(&mut self, reply: &'m Message) -> Option<&'m Message> {
        let awaited = self.pending.as_ref().is_some_and(|p| p.expected == reply.kind());
        if !awaited {
            return None;
        }
        self.pending = None;
        self.timer.cancel();
        Some(reply)
    }

    pub fn retry_expired(&mut self, token: u64) -> RetryOutcome {
        let Some(p) = self.pending.as_mut() else {
            return RetryOutcome::Stale;
        };
        if p.token != token {
            return RetryOutcome::Stale;
        }

        p.retries_left = p.retries_left.saturating_sub(1);
        if p.retries_left > 0 {
            let retries_left = p.retries_left;
            warn!("no {:?} reply, resending ({} left)", p.expected, retries_left);
            self.out.send(&p.request);
            self.timer.arm(self.policy.interval, token);
            return RetryOutcome::Resent { retries_left };
        }

        let expected = p.expected;
        self.pending = None;
        error!("gave up waiting for {:?} after {} attempts", expected, self.policy.attempts);
        RetryOutcome::Exhausted { expected, attempts: self.policy.attempts }
    }

    /// Plain send that leaves the pending exchange untouched.
    pub fn send(&mut self, msg: &Message) {
        self.out.send(msg);
    }

    pub fn pending(&self) -> Option<&PendingExchange> {
        self.pending.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    pub fn outbound(&self) -> &Outbound<S> {
        &self.out
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }
}
