//! Call gate for outbound collaborator calls.
//!
//! Every embedding, index and model call made on behalf of a request runs
//! under a permit from one shared [`tokio::sync::Semaphore`]. A burst of
//! requests queues here instead of opening unbounded connections to the
//! model server.

use anyhow::{anyhow, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct CallGate {
    permits: Arc<Semaphore>,
}

impl CallGate {
    /// A gate with `capacity` permits, never fewer than one.
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity.max(1))),
        }
    }

    /// Run `fut` while holding one permit.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| anyhow!("call gate closed"))?;
        fut.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_returns_inner_result() {
        let gate = CallGate::new(2);
        let v = gate.run(async { Ok::<_, anyhow::Error>(7) }).await.unwrap();
        assert_eq!(v, 7);
        let err = gate
            .run(async { Err::<(), _>(anyhow!("model down")) })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "model down");

        // Both permits came back after the failure.
        let both = tokio::join!(
            gate.run(async { Ok::<_, anyhow::Error>(1) }),
            gate.run(async { Ok::<_, anyhow::Error>(2) })
        );
        assert_eq!(both.0.unwrap() + both.1.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let gate = CallGate::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = gate.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                gate.run(async {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_clamped() {
        let gate = CallGate::new(0);
        let v = tokio::time::timeout(
            Duration::from_secs(1),
            gate.run(async { Ok::<_, anyhow::Error>("ran") }),
        )
        .await
        .expect("gate with zero capacity never admitted a call")
        .unwrap();
        assert_eq!(v, "ran");
    }
}
