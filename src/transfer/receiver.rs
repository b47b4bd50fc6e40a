use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{OwnedSemaphorePermit, Semaphore, oneshot};

use crate::error::{Result, SyncError};

/// Outcome of one inbound stream: bytes written, or why it failed
pub type TransferTicket = oneshot::Receiver<Result<u64>>;

/// A transfer that owns the single inbound slot until it is dropped
pub struct ArmedTransfer {
    pub relative_path: String,
    pub destination: PathBuf,
    done: oneshot::Sender<Result<u64>>,
    _permit: OwnedSemaphorePermit,
}

impl ArmedTransfer {
    /// Report the outcome and release the slot
    pub fn finish(self, outcome: Result<u64>) {
        // Nobody waiting is fine (the server never does)
        let _ = self.done.send(outcome);
    }
}

enum ReceiverState {
    Idle,
    Armed(ArmedTransfer),
}

/// The armed/idle gate for inbound streams of one connection.
///
/// Arming takes the only permit of a FIFO semaphore and the permit is held
/// until the stream has been written, so a second `arm` waits for the first
/// transfer to complete instead of racing it.
pub struct InboundReceiver {
    slot: Arc<Semaphore>,
    state: Mutex<ReceiverState>,
}

impl InboundReceiver {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
            state: Mutex::new(ReceiverState::Idle),
        }
    }

    /// Wait for the slot, then accept exactly one stream for `destination`
    pub async fn arm(&self, relative_path: &str, destination: PathBuf) -> Result<TransferTicket> {
        let permit = Arc::clone(&self.slot)
            .acquire_owned()
            .await
            .map_err(|_| SyncError::Disconnected)?;

        let (done, ticket) = oneshot::channel();
        *self.state() = ReceiverState::Armed(ArmedTransfer {
            relative_path: relative_path.to_string(),
            destination,
            done,
            _permit: permit,
        });
        Ok(ticket)
    }

    /// Take the armed transfer for an incoming stream, leaving the gate idle.
    ///
    /// The slot stays taken until the returned transfer is finished or dropped.
    pub fn take(&self) -> Option<ArmedTransfer> {
        match std::mem::replace(&mut *self.state(), ReceiverState::Idle) {
            ReceiverState::Armed(transfer) => Some(transfer),
            ReceiverState::Idle => None,
        }
    }

    /// Give up an armed transfer that will never get its stream
    pub fn disarm(&self) {
        if let Some(transfer) = self.take() {
            let message = format!("Transfer of {} was cancelled", transfer.relative_path);
            transfer.finish(Err(SyncError::Protocol(message)));
        }
    }

    /// Whether no transfer is armed or being written
    pub fn is_idle(&self) -> bool {
        self.slot.available_permits() == 1
    }

    /// Wait until no transfer is armed or in progress
    pub async fn wait_idle(&self) -> Result<()> {
        let _permit = self
            .slot
            .acquire()
            .await
            .map_err(|_| SyncError::Disconnected)?;
        Ok(())
    }

    /// Drop any armed transfer and fail all current and future waiters
    pub fn close(&self) {
        self.slot.close();
        self.take();
    }

    fn state(&self) -> MutexGuard<'_, ReceiverState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for InboundReceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn arm_take_finish_cycle() {
        let receiver = InboundReceiver::new();
        assert!(receiver.is_idle());

        let ticket = receiver.arm("a.txt", PathBuf::from("/r/a.txt")).await.unwrap();
        assert!(!receiver.is_idle());

        let transfer = receiver.take().unwrap();
        assert!(receiver.take().is_none());
        assert!(!receiver.is_idle());
        assert_eq!(transfer.relative_path, "a.txt");

        transfer.finish(Ok(3));
        assert_eq!(ticket.await.unwrap().unwrap(), 3);
        assert!(receiver.is_idle());
    }

    #[tokio::test]
    async fn take_without_arm_is_none() {
        let receiver = InboundReceiver::new();
        assert!(receiver.take().is_none());
    }

    #[tokio::test]
    async fn second_arm_waits_for_first_transfer() {
        let receiver = Arc::new(InboundReceiver::new());
        let _first = receiver.arm("one", PathBuf::from("/r/one")).await.unwrap();

        let second = {
            let receiver = Arc::clone(&receiver);
            tokio::spawn(async move { receiver.arm("two", PathBuf::from("/r/two")).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());

        // Taking the stream does not free the slot, finishing it does
        let transfer = receiver.take().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());

        transfer.finish(Ok(0));
        second.await.unwrap().unwrap();
        assert_eq!(receiver.take().unwrap().relative_path, "two");
    }

    #[tokio::test]
    async fn disarm_reports_cancellation_and_frees_slot() {
        let receiver = InboundReceiver::new();
        let ticket = receiver.arm("a", PathBuf::from("/r/a")).await.unwrap();

        receiver.disarm();
        assert!(ticket.await.unwrap().is_err());
        assert!(receiver.is_idle());
    }

    #[tokio::test]
    async fn close_fails_waiters() {
        let receiver = InboundReceiver::new();
        let ticket = receiver.arm("a", PathBuf::from("/r/a")).await.unwrap();

        receiver.close();
        // Dropped without an outcome
        assert!(ticket.await.is_err());
        assert!(matches!(receiver.wait_idle().await, Err(SyncError::Disconnected)));
    }
}
