use tokio::sync::watch;

/// Owner side of a cancellation signal
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Observer side, handed to the batch and the process runner
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/token pair
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken { rx: self.tx.subscribe() }
    }
}

impl CancelToken {
    /// A token that is never cancelled
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // keep the value readable after the sender is gone
        drop(tx);
        CancelToken { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if the handle is dropped first
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
