//! Test doubles shared by the module tests.

use std::time::Duration;

use bytes::Bytes;
use skylink_wire::{decode, Message};

use crate::timer::RetryTimer;

#[derive(Debug, Default)]
pub struct ManualTimer {
    armed: Option<(Duration, u64)>,
    pub arms: usize,
}

impl ManualTimer {
    pub fn armed(&self) -> Option<(Duration, u64)> {
        self.armed
    }
}

impl RetryTimer for ManualTimer {
    fn arm(&mut self, after: Duration, token: u64) {
        self.arms += 1;
        self.armed = Some((after, token));
    }

    fn cancel(&mut self) {
        self.armed = None;
    }
}

pub fn frames(sent: &[Bytes]) -> Vec<Message> {
    sent.iter().map(|f| decode(f).expect("own frame decodes").1).collect()
}
