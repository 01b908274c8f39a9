use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// キャンセルハンドル。clone したものは同じシグナルを共有する。
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// 冪等。2回目以降は何もしない
    pub fn cancel(&self) {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        });
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// キャンセルされるまで待つ
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // Sender は self が保持しているので Err にはならない
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// delay だけ待つ。途中でキャンセルされたら false。
pub async fn sleep_or_cancel(delay: Duration, handle: &CancelHandle) -> bool {
    if handle.is_cancelled() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => !handle.is_cancelled(),
        _ = handle.cancelled() => false,
    }
}
