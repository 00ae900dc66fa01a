use tokio::sync::watch;

/// Cancels a running compilation.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

/// Observed by a compilation at every suspension point.
///
/// A signal whose handle is dropped without cancelling never fires.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    receiver: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn channel() -> (CancelHandle, CancelSignal) {
        let (sender, receiver) = watch::channel(false);
        (
            CancelHandle { sender },
            CancelSignal {
                receiver: Some(receiver),
            },
        )
    }

    pub fn from_receiver(receiver: watch::Receiver<bool>) -> Self {
        CancelSignal {
            receiver: Some(receiver),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.receiver.as_ref().is_some_and(|receiver| *receiver.borrow())
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&mut self) {
        let Some(receiver) = self.receiver.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fires_after_cancel() {
        let (handle, mut signal) = CancelSignal::channel();
        assert!(!signal.is_cancelled());
        handle.cancel();
        assert!(signal.is_cancelled());
        signal.cancelled().await;
    }

    #[tokio::test]
    async fn dropped_handle_never_fires() {
        let (handle, mut signal) = CancelSignal::channel();
        drop(handle);
        let fired = tokio::select! {
            _ = signal.cancelled() => true,
            _ = tokio::task::yield_now() => false,
        };
        assert!(!fired);
        assert!(!CancelSignal::never().is_cancelled());
    }
}
