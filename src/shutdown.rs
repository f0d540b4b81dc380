//! Process shutdown signal
//!
//! Observable from blocking code (orchestrator polling sleeps through
//! [`ShutdownSignal::wait_timeout`]) and from async code (the listener
//! awaits [`ShutdownSignal::wait`]).

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use tokio::sync::watch;

#[derive(Debug)]
pub struct ShutdownSignal {
    flag: Mutex<bool>,
    cond: Condvar,
    tx: watch::Sender<bool>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            flag: Mutex::new(false),
            cond: Condvar::new(),
            tx,
        }
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        let mut flag = match self.flag.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *flag = true;
        self.cond.notify_all();
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        match self.flag.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Sleep up to `timeout`. Returns `true` if shutdown was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = match self.flag.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let result = self.cond.wait_timeout_while(guard, timeout, |triggered| !*triggered);
        match result {
            Ok((guard, _)) => *guard,
            Err(poisoned) => *poisoned.into_inner().0,
        }
    }

    /// Resolve once shutdown is requested.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_wait_timeout_without_trigger() {
        let signal = ShutdownSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(5)));
        assert!(!signal.is_triggered());
    }

    #[test]
    fn test_trigger_wakes_sleeper() {
        let signal = Arc::new(ShutdownSignal::new());
        let sleeper = Arc::clone(&signal);
        let started = Instant::now();
        let handle = std::thread::spawn(move || sleeper.wait_timeout(Duration::from_secs(10)));
        std::thread::sleep(Duration::from_millis(20));
        signal.trigger();
        assert!(handle.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_async_wait() {
        let signal = Arc::new(ShutdownSignal::new());
        let waiter = Arc::clone(&signal);
        let task = tokio::spawn(async move { waiter.wait().await });
        signal.trigger();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
