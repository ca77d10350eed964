//! Bounded-parallel execution of a graph in dependency order.

use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::error::CycleError;

use super::Graph;

/// Nodes partitioned by outcome after a run.
#[derive(Debug, Clone)]
pub struct RunOutcome<N> {
    /// Nodes whose callback returned `true`.
    pub succeeded: Vec<N>,
    /// Nodes that failed or had a failed dependency.
    pub failed: Vec<N>,
}

impl<N> Default for RunOutcome<N> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<N> RunOutcome<N> {
    /// Returns true if no node failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl<N> Graph<N>
where
    N: Clone + Eq + Hash + Display + Send + Sync + 'static,
{
    /// Runs `callback` once for every node, never before its dependencies.
    ///
    /// Ready nodes are fed to `pool_size` workers (clamped to the node count).
    /// The callback receives the node and, when any transitive dependency has
    /// failed, the failing ancestor. In that case the node is counted as
    /// failed whatever the callback returns, so callbacks should only record
    /// the skip. A panicking callback counts as a failure.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError`] before running anything if the graph is cyclic.
    pub async fn run<F, Fut>(&self, pool_size: usize, callback: F) -> Result<RunOutcome<N>, CycleError>
    where
        F: Fn(N, Option<N>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.detect_cycle()?;

        let total = self.nodes.len();
        if total == 0 {
            return Ok(RunOutcome::default());
        }

        let workers = pool_size.clamp(1, total);
        debug!("Running {total} nodes with {workers} workers");

        let callback = Arc::new(callback);
        let nodes = Arc::new(self.nodes.clone());
        let (work_tx, work_rx) = mpsc::unbounded_channel::<(usize, Option<usize>)>();
        let work_rx = Arc::new(Mutex::new(work_rx));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(usize, bool)>();

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let work_rx = Arc::clone(&work_rx);
            let done_tx = done_tx.clone();
            let callback = Arc::clone(&callback);
            let nodes = Arc::clone(&nodes);

            handles.push(tokio::spawn(async move {
                loop {
                    let next = work_rx.lock().await.recv().await;
                    let Some((idx, failed_dep)) = next else {
                        break;
                    };

                    let node = nodes[idx].clone();
                    let failed = failed_dep.map(|dep| nodes[dep].clone());
                    let cb = Arc::clone(&callback);
                    let arg = node.clone();
                    let ok = match tokio::spawn(async move { cb(arg, failed).await }).await {
                        Ok(ok) => ok,
                        Err(e) => {
                            warn!("Callback for {node} did not complete: {e}");
                            false
                        }
                    };

                    if done_tx.send((idx, ok && failed_dep.is_none())).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(done_tx);

        let mut in_degree = self.in_degrees();
        // Original failing ancestor for nodes downstream of a failure.
        let mut failed_from: Vec<Option<usize>> = vec![None; total];

        for (idx, degree) in in_degree.iter().enumerate() {
            if *degree == 0 {
                let _ = work_tx.send((idx, None));
            }
        }

        let mut outcome = RunOutcome::default();
        let mut visited = 0;

        while visited < total {
            let Some((idx, ok)) = done_rx.recv().await else {
                break;
            };
            visited += 1;

            if ok {
                outcome.succeeded.push(self.nodes[idx].clone());
            } else {
                outcome.failed.push(self.nodes[idx].clone());
            }

            let origin = failed_from[idx].or((!ok).then_some(idx));
            for edge in &self.edges[idx] {
                if let Some(origin) = origin {
                    failed_from[edge.to].get_or_insert(origin);
                }
                in_degree[edge.to] -= 1;
                if in_degree[edge.to] == 0 {
                    let _ = work_tx.send((edge.to, failed_from[edge.to]));
                }
            }
        }
        drop(work_tx);

        for handle in handles {
            let _ = handle.await;
        }

        Ok(outcome)
    }
}
