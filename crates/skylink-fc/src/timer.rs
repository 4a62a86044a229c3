use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Single-shot timer owned by one link. Arming replaces whatever was armed
/// before; expiry is reported back to the link together with `token`.
pub trait RetryTimer {
    fn arm(&mut self, after: Duration, token: u64);
    fn cancel(&mut self);
}

/// Timer backed by a tokio sleep task. The callback runs on the runtime, so
/// it should only forward the token (e.g. into the link inbox).
pub struct TokioTimer {
    fire: Arc<dyn Fn(u64) + Send + Sync>,
    handle: Option<JoinHandle<()>>,
}

impl TokioTimer {
    pub fn new(fire: impl Fn(u64) + Send + Sync + 'static) -> Self {
        Self { fire: Arc::new(fire), handle: None }
    }
}

impl RetryTimer for TokioTimer {
    fn arm(&mut self, after: Duration, token: u64) {
        self.cancel();
        let fire = self.fire.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            fire(token);
        }));
    }

    fn cancel(&mut self) {
        if let Some(h) = self.handle.take() {
            h.abort();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
