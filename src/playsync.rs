// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::Notify;

/// A cancel handle is handed to every running automation. It's the automation's responsibility
/// to respect a cancel request, either by polling `is_cancelled` or by awaiting `cancelled`.
#[derive(Clone, Default)]
pub struct CancelHandle {
    /// Set to true once the underlying operation should stop.
    cancelled: Arc<AtomicBool>,
    /// Wakes any task currently awaiting cancellation.
    notify: Arc<Notify>,
}

impl CancelHandle {
    /// Creates a new cancel handle.
    pub fn new() -> CancelHandle {
        CancelHandle::default()
    }

    /// Returns true if the operation has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once the handle has been cancelled. Resolves immediately if it already was.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent cancel can't slip between the two.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Cancel the operation. Cancelling twice is a no-op.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_cancel_handle_cancelled() {
        let cancel_handle = CancelHandle::new();
        assert!(!cancel_handle.is_cancelled());

        let join = {
            let cancel_handle = cancel_handle.clone();
            tokio::spawn(async move { cancel_handle.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        cancel_handle.cancel();
        assert!(join.await.is_ok());
        assert!(cancel_handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_handle_already_cancelled() {
        let cancel_handle = CancelHandle::new();
        cancel_handle.cancel();
        cancel_handle.cancel();

        // Must not hang.
        tokio::time::timeout(Duration::from_secs(1), cancel_handle.cancelled())
            .await
            .expect("cancelled() should resolve immediately");
        assert!(cancel_handle.is_cancelled());
    }
}
