// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Observable boolean state.
//!
//! The current value is readable synchronously; consumers that care about
//! changes hold a [`watch::Receiver`] and await `changed()`. Setting a signal
//! to the value it already holds does not wake subscribers.

use tokio::sync::watch;

#[derive(Debug)]
pub struct StateSignal {
    tx: watch::Sender<bool>,
}

impl StateSignal {
    pub fn new(initial: bool) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Current value.
    pub fn get(&self) -> bool {
        *self.tx.borrow()
    }

    /// Set the value. Returns true if it changed.
    pub fn set(&self, value: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    /// Subscribe to changes. The receiver starts with the current value marked seen.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_reports_changes_only() {
        let signal = StateSignal::new(false);
        assert!(!signal.get());
        assert!(signal.set(true));
        assert!(signal.get());
        assert!(!signal.set(true));
        assert!(signal.set(false));
    }

    #[tokio::test]
    async fn test_subscriber_sees_change() {
        let signal = StateSignal::new(false);
        let mut rx = signal.subscribe();
        assert!(!rx.has_changed().unwrap());

        signal.set(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());

        // Redundant set does not notify
        signal.set(true);
        assert!(!rx.has_changed().unwrap());
    }
}
