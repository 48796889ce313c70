//! Parallel proof scheduler
//!
//! Fans per-leaf opening proofs out to a fixed pool of OS threads:
//!
//! 1. leaves are split into contiguous chunks (`partition`),
//! 2. chunks go into a shared queue; each worker pops a chunk, proves every
//!    leaf in it and sends `(chunk, result)` back over a channel,
//! 3. the caller's thread aggregates results, reports progress once per
//!    completed chunk, then sorts the final leaf set by index.
//!
//! Workers share only immutable handles (`Arc<Srs>`, `Arc<Polynomial>`, the
//! commitment). The first failure of any kind (an opening error, a worker
//! panic, a dropped channel, an expired chunk deadline) aborts the whole
//! batch: the cancel flag stops idle workers, finished chunks are discarded
//! and only the error is returned.

#![forbid(unsafe_code)]

use std::collections::{HashSet, VecDeque};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ark_bn254::G1Affine;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::field::Polynomial;
use crate::partition::{self, ChunkIdx};
use crate::pcs::{self, Commitment, PcsError};
use crate::srs::Srs;
use crate::F;

/// A leaf awaiting its proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingLeaf {
    /// Position in the interpolation domain.
    pub index: u64,
    /// Salted record hash.
    pub value: F,
}

/// A proven leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leaf {
    /// Position in the interpolation domain.
    pub index: u64,
    /// Salted record hash, `P(index)`.
    pub value: F,
    /// Opening proof at `index`.
    pub proof: G1Affine,
}

/// Scheduler tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Chunks per available core when `chunk_count` is unset.
    pub workers_per_core: usize,
    /// Upper bound on worker threads (defaults to the core count).
    pub max_workers: Option<usize>,
    /// Explicit chunk count; overrides `workers_per_core`.
    pub chunk_count: Option<usize>,
    /// Longest the aggregator waits for the next chunk before aborting.
    pub chunk_deadline: Option<Duration>,
    /// Verify every proof against the commitment inside the worker.
    pub self_check: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers_per_core: 2,
            max_workers: None,
            chunk_count: None,
            chunk_deadline: None,
            self_check: false,
        }
    }
}

/// Progress after one completed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    /// Chunks finished so far.
    pub completed: usize,
    /// Total chunks in the batch.
    pub total: usize,
    /// Leaves proven so far.
    pub leaves_done: usize,
}

/// Scheduler failures. Any of them voids the whole batch.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A worker panicked or vanished.
    #[error("worker failure on chunk {chunk}: {reason}")]
    WorkerFailure {
        /// Chunk being processed, if known.
        chunk: usize,
        /// Panic payload or channel diagnostic.
        reason: String,
    },
    /// Opening a leaf failed inside a worker.
    #[error("proof for leaf {index} failed: {source}")]
    Proof {
        /// Leaf index.
        index: u64,
        /// Underlying opening error.
        #[source]
        source: PcsError,
    },
    /// No chunk completed within the configured deadline.
    #[error("no chunk completed within {deadline:?} ({completed}/{total} done)")]
    ChunkDeadline {
        /// Configured deadline.
        deadline: Duration,
        /// Chunks finished before expiry.
        completed: usize,
        /// Total chunks.
        total: usize,
    },
    /// Two leaves claim the same domain position.
    #[error("duplicate leaf index {index}")]
    DuplicateLeafIndex {
        /// Repeated index.
        index: u64,
    },
    /// The OS refused to start a worker thread.
    #[error("could not spawn worker: {0}")]
    Spawn(#[from] io::Error),
}

/// Per-leaf proving work executed inside a worker.
pub trait LeafProver: Send + Sync {
    /// Produce the opening proof for one leaf.
    fn prove(&self, leaf: &PendingLeaf) -> Result<G1Affine, PcsError>;
}

/// KZG opening of a fixed batch polynomial.
pub struct KzgLeafProver {
    srs: Arc<Srs>,
    poly: Arc<Polynomial<F>>,
    commitment: Commitment,
    self_check: bool,
}

impl KzgLeafProver {
    /// Prover for leaves of `poly`, whose commitment is `commitment`.
    pub fn new(
        srs: Arc<Srs>,
        poly: Arc<Polynomial<F>>,
        commitment: Commitment,
        self_check: bool,
    ) -> Self {
        Self {
            srs,
            poly,
            commitment,
            self_check,
        }
    }
}

impl LeafProver for KzgLeafProver {
    fn prove(&self, leaf: &PendingLeaf) -> Result<G1Affine, PcsError> {
        let point = F::from(leaf.index);
        let proof = pcs::open_leaf(&self.srs, &self.poly, point, leaf.value)?;
        if self.self_check {
            let vk = self.srs.verifier_key();
            if !pcs::verify(&vk, &self.commitment, &proof, point, leaf.value) {
                return Err(PcsError::ProofRejected {
                    point: crate::field::to_hex(&point),
                });
            }
        }
        Ok(proof)
    }
}

type ChunkResult = Result<Vec<Leaf>, SchedulerError>;

/// Fans leaf proofs out over worker threads.
#[derive(Clone)]
pub struct ProofScheduler {
    srs: Arc<Srs>,
    config: SchedulerConfig,
}

impl ProofScheduler {
    /// Scheduler bound to one SRS.
    pub fn new(srs: Arc<Srs>, config: SchedulerConfig) -> Self {
        Self { srs, config }
    }

    fn cores() -> usize {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    fn requested_chunks(&self) -> usize {
        self.config
            .chunk_count
            .unwrap_or_else(|| Self::cores() * self.config.workers_per_core.max(1))
    }

    /// Chunk count used for `len` leaves.
    pub fn planned_chunks(&self, len: usize) -> usize {
        partition::chunks(len, self.requested_chunks()).count()
    }

    /// Prove every leaf of the batch polynomial `poly` (committed as `commitment`).
    pub fn build_proofs(
        &self,
        poly: Arc<Polynomial<F>>,
        commitment: Commitment,
        leaves: Vec<PendingLeaf>,
        progress: impl FnMut(ChunkProgress),
    ) -> Result<Vec<Leaf>, SchedulerError> {
        let prover = Arc::new(KzgLeafProver::new(
            self.srs.clone(),
            poly,
            commitment,
            self.config.self_check,
        ));
        self.build_proofs_with(prover, leaves, progress)
    }

    /// Same as [`ProofScheduler::build_proofs`] with caller-supplied per-leaf work.
    #[instrument(level = "info", skip_all, fields(leaves = leaves.len()))]
    pub fn build_proofs_with<P: LeafProver + 'static>(
        &self,
        prover: Arc<P>,
        leaves: Vec<PendingLeaf>,
        mut progress: impl FnMut(ChunkProgress),
    ) -> Result<Vec<Leaf>, SchedulerError> {
        let mut seen = HashSet::with_capacity(leaves.len());
        if let Some(dup) = leaves.iter().find(|l| !seen.insert(l.index)) {
            return Err(SchedulerError::DuplicateLeafIndex { index: dup.index });
        }
        if leaves.is_empty() {
            return Ok(Vec::new());
        }

        let n_leaves = leaves.len();
        let tasks: VecDeque<(ChunkIdx, Vec<PendingLeaf>)> =
            partition::chunks(n_leaves, self.requested_chunks())
                .map(|(c, r)| (c, leaves[r].to_vec()))
                .collect();
        let total = tasks.len();
        let workers = self
            .config
            .max_workers
            .unwrap_or_else(Self::cores)
            .clamp(1, total);
        debug!(chunks = total, workers, "dispatching");

        let queue = Arc::new(Mutex::new(tasks));
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<(ChunkIdx, ChunkResult)>();

        let handles = spawn_pool(workers, &cancel, |w| {
            let queue = Arc::clone(&queue);
            let worker_cancel = Arc::clone(&cancel);
            let prover = Arc::clone(&prover);
            let tx = tx.clone();
            thread::Builder::new()
                .name(format!("veccert-worker-{w}"))
                .spawn(move || worker_loop(&*prover, &queue, &worker_cancel, &tx))
        })?;
        drop(tx);

        let mut done: Vec<Option<Vec<Leaf>>> =
            std::iter::repeat_with(|| None).take(total).collect();
        let mut completed = 0usize;
        let mut leaves_done = 0usize;
        let mut failure: Option<SchedulerError> = None;
        let mut detach = false;

        while completed < total {
            let received = match self.config.chunk_deadline {
                Some(deadline) => rx.recv_timeout(deadline).map_err(|e| match e {
                    RecvTimeoutError::Timeout => {
                        detach = true;
                        SchedulerError::ChunkDeadline {
                            deadline,
                            completed,
                            total,
                        }
                    }
                    RecvTimeoutError::Disconnected => disconnected(completed),
                }),
                None => rx.recv().map_err(|_| disconnected(completed)),
            };
            match received {
                Ok((c, Ok(chunk))) => {
                    completed += 1;
                    leaves_done += chunk.len();
                    debug!(chunk = c.as_usize(), completed, total, "chunk done");
                    progress(ChunkProgress {
                        completed,
                        total,
                        leaves_done,
                    });
                    done[c.as_usize()] = Some(chunk);
                }
                Ok((_, Err(e))) | Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failure {
            cancel.store(true, Ordering::SeqCst);
            error!(error = %e, "aborting batch");
            if !detach {
                for h in handles {
                    let _ = h.join();
                }
            }
            return Err(e);
        }
        for h in handles {
            let _ = h.join();
        }

        let mut out: Vec<Leaf> = done.into_iter().flatten().flatten().collect();
        if out.len() != n_leaves {
            return Err(disconnected(completed));
        }
        out.sort_by_key(|l| l.index);
        Ok(out)
    }
}

/// Start `count` workers through `spawn`. If any start fails, the workers
/// already running are cancelled and joined before the error is returned.
fn spawn_pool<S>(
    count: usize,
    cancel: &AtomicBool,
    mut spawn: S,
) -> Result<Vec<JoinHandle<()>>, SchedulerError>
where
    S: FnMut(usize) -> io::Result<JoinHandle<()>>,
{
    let mut handles = Vec::with_capacity(count);
    for w in 0..count {
        match spawn(w) {
            Ok(h) => handles.push(h),
            Err(e) => {
                cancel.store(true, Ordering::SeqCst);
                error!(worker = w, error = %e, "worker spawn failed");
                for h in handles {
                    let _ = h.join();
                }
                return Err(SchedulerError::Spawn(e));
            }
        }
    }
    Ok(handles)
}

fn disconnected(completed: usize) -> SchedulerError {
    SchedulerError::WorkerFailure {
        chunk: completed,
        reason: "result channel closed before all chunks arrived".into(),
    }
}

fn worker_loop<P: LeafProver + ?Sized>(
    prover: &P,
    queue: &Mutex<VecDeque<(ChunkIdx, Vec<PendingLeaf>)>>,
    cancel: &AtomicBool,
    tx: &mpsc::Sender<(ChunkIdx, ChunkResult)>,
) {
    loop {
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        let next = match queue.lock() {
            Ok(mut q) => q.pop_front(),
            Err(_) => None,
        };
        let Some((c, chunk)) = next else { break };

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            prove_chunk(prover, c, &chunk, cancel)
        }))
        .unwrap_or_else(|payload| {
            Err(SchedulerError::WorkerFailure {
                chunk: c.as_usize(),
                reason: panic_message(&*payload),
            })
        });
        let failed = result.is_err();
        if tx.send((c, result)).is_err() || failed {
            break;
        }
    }
}

fn prove_chunk<P: LeafProver + ?Sized>(
    prover: &P,
    c: ChunkIdx,
    chunk: &[PendingLeaf],
    cancel: &AtomicBool,
) -> ChunkResult {
    let mut out = Vec::with_capacity(chunk.len());
    for leaf in chunk {
        if cancel.load(Ordering::Relaxed) {
            return Err(SchedulerError::WorkerFailure {
                chunk: c.as_usize(),
                reason: "cancelled".into(),
            });
        }
        let proof = prover
            .prove(leaf)
            .map_err(|source| SchedulerError::Proof {
                index: leaf.index,
                source,
            })?;
        out.push(Leaf {
            index: leaf.index,
            value: leaf.value,
            proof,
        });
    }
    Ok(out)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
