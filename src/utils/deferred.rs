//! Single-assignment deferred values.
//!
//! A [`Deferred`] is created eagerly, settled at most once (resolve or reject),
//! and can be awaited any number of times, before or after settlement.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::LlmError;

type Slot<T> = Option<Result<T, LlmError>>;

/// A value that is resolved or rejected exactly once.
pub struct Deferred<T> {
    tx: Arc<watch::Sender<Slot<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Clone> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Deferred<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Settle with a value. Returns `false` when already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with an error. Returns `false` when already settled.
    pub fn reject(&self, error: LlmError) -> bool {
        self.settle(Err(error))
    }

    fn settle(&self, result: Result<T, LlmError>) -> bool {
        let mut result = Some(result);
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = result.take();
            true
        })
    }

    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The settled value, if any, without waiting.
    pub fn try_get(&self) -> Option<Result<T, LlmError>> {
        self.tx.borrow().clone()
    }

    /// Wait until the value is settled.
    pub async fn wait(&self) -> Result<T, LlmError> {
        let mut rx = self.tx.subscribe();
        let settled = rx
            .wait_for(|slot| slot.is_some())
            .await
            .map_err(|_| LlmError::InternalError("deferred value dropped".into()))?;
        match &*settled {
            Some(result) => result.clone(),
            None => Err(LlmError::InternalError("deferred value missing".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_once() {
        let d = Deferred::new();
        assert!(d.resolve(1));
        assert!(!d.resolve(2));
        assert!(!d.reject(LlmError::NoOutputGenerated));
        assert_eq!(d.wait().await, Ok(1));
        assert_eq!(d.wait().await, Ok(1));
    }

    #[tokio::test]
    async fn waiters_see_late_settlement() {
        let d: Deferred<u32> = Deferred::new();
        let waiter = {
            let d = d.clone();
            tokio::spawn(async move { d.wait().await })
        };
        tokio::task::yield_now().await;
        assert!(!d.is_settled());
        d.reject(LlmError::NoOutputGenerated);
        assert_eq!(waiter.await.unwrap(), Err(LlmError::NoOutputGenerated));
    }
}
