//! Bounded, failure-isolating execution of a study batch.
//!
//! Every descriptor moves `Pending -> InFlight -> Succeeded | Failed` exactly
//! once. Workers are scoped to a single [`Orchestrator::run`] call and are all
//! joined before the [`BatchReport`] is assembled.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use crossbeam_channel::unbounded;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::DEFAULT_MAX_WORKERS;
use crate::domain::{DownloadDescriptor, StudyBatch};
use crate::error::DownloaderError;
use crate::layout::ensure_dir;
use crate::transfer::Transfer;

/// What happens to descriptors whose destination directory cannot be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DirectoryPolicy {
    /// Only the descriptors targeting that directory fail.
    #[default]
    SkipSubset,
    /// The whole batch is rejected before any transfer starts.
    AbortBatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Succeeded | TransferState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DownloadOutcome {
    Succeeded { bytes: u64 },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDownload {
    pub descriptor: DownloadDescriptor,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub study_id: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedDownload>,
    pub bytes: u64,
    pub workers: usize,
    pub started_at: String,
    pub finished_at: String,
}

impl BatchReport {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// True only when every descriptor succeeded.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

enum WorkerEvent {
    Started(usize),
    Finished(usize, DownloadOutcome),
}

pub struct Orchestrator<T: Transfer> {
    transfer: T,
    max_workers: usize,
    directory_policy: DirectoryPolicy,
}

impl<T: Transfer> Orchestrator<T> {
    pub fn new(transfer: T) -> Self {
        Self {
            transfer,
            max_workers: DEFAULT_MAX_WORKERS,
            directory_policy: DirectoryPolicy::default(),
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_directory_policy(mut self, policy: DirectoryPolicy) -> Self {
        self.directory_policy = policy;
        self
    }

    /// `min(cpus, max_workers)`, never more than there are jobs, at least one.
    pub fn worker_count(&self, jobs: usize) -> usize {
        let cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cpus.min(self.max_workers).min(jobs).max(1)
    }

    pub fn run(
        &self,
        batch: &StudyBatch,
        sink: &dyn ProgressSink,
    ) -> Result<BatchReport, DownloaderError> {
        let started_at = chrono::Utc::now().to_rfc3339();
        let descriptors = batch.descriptors();
        let mut states = vec![TransferState::Pending; descriptors.len()];
        let mut outcomes: Vec<Option<DownloadOutcome>> = vec![None; descriptors.len()];

        let runnable = self.prepare_directories(descriptors, &mut states, &mut outcomes)?;
        let workers = if runnable.is_empty() {
            0
        } else {
            self.worker_count(runnable.len())
        };
        info!(
            study = %batch.study_id(),
            files = descriptors.len(),
            runnable = runnable.len(),
            workers,
            "starting downloads"
        );

        if workers > 0 {
            let (job_tx, job_rx) = unbounded::<usize>();
            for index in &runnable {
                // The receiver is alive, so sending cannot fail.
                let _ = job_tx.send(*index);
            }
            drop(job_tx);
            let (event_tx, event_rx) = unbounded::<WorkerEvent>();

            thread::scope(|scope| {
                for _ in 0..workers {
                    let job_rx = job_rx.clone();
                    let event_tx = event_tx.clone();
                    scope.spawn(move || {
                        for index in job_rx.iter() {
                            let _ = event_tx.send(WorkerEvent::Started(index));
                            let outcome = self.fetch_one(&descriptors[index]);
                            let _ = event_tx.send(WorkerEvent::Finished(index, outcome));
                        }
                    });
                }
                drop(event_tx);

                let total = runnable.len();
                let mut started = 0usize;
                let mut clocks = BTreeMap::<usize, Instant>::new();
                for event in event_rx.iter() {
                    match event {
                        WorkerEvent::Started(index) => {
                            states[index] = TransferState::InFlight;
                            started += 1;
                            clocks.insert(index, Instant::now());
                            sink.event(ProgressEvent {
                                message: format!(
                                    "{started}/{total} Downloading file {}",
                                    descriptors[index].file_name()
                                ),
                                elapsed: None,
                            });
                        }
                        WorkerEvent::Finished(index, outcome) => {
                            let elapsed = clocks.remove(&index).map(|clock| clock.elapsed());
                            self.record(
                                &descriptors[index],
                                outcome,
                                elapsed,
                                &mut states[index],
                                &mut outcomes[index],
                                sink,
                            );
                        }
                    }
                }
            });
        }

        let report = assemble_report(batch, states, outcomes, workers, started_at);
        info!(
            study = %report.study_id,
            succeeded = report.succeeded,
            failed = report.failed_count(),
            "downloads finished"
        );
        sink.event(ProgressEvent {
            message: format!(
                "Downloading completed: {} succeeded, {} failed",
                report.succeeded,
                report.failed_count()
            ),
            elapsed: None,
        });
        Ok(report)
    }

    /// Creates every distinct destination directory and returns the indices
    /// that may be scheduled, in batch order.
    fn prepare_directories(
        &self,
        descriptors: &[DownloadDescriptor],
        states: &mut [TransferState],
        outcomes: &mut [Option<DownloadOutcome>],
    ) -> Result<Vec<usize>, DownloaderError> {
        let mut by_dir = BTreeMap::<&Utf8Path, Vec<usize>>::new();
        for (index, descriptor) in descriptors.iter().enumerate() {
            by_dir
                .entry(descriptor.destination_dir())
                .or_default()
                .push(index);
        }

        let mut runnable = Vec::with_capacity(descriptors.len());
        for (dir, indices) in by_dir {
            match ensure_dir(dir) {
                Ok(()) => runnable.extend(indices),
                Err(err) => match self.directory_policy {
                    DirectoryPolicy::AbortBatch => return Err(err),
                    DirectoryPolicy::SkipSubset => {
                        warn!(
                            error = %err,
                            skipped = indices.len(),
                            "skipping files for directory"
                        );
                        let reason = err.to_string();
                        for index in indices {
                            states[index] = TransferState::Failed;
                            outcomes[index] = Some(DownloadOutcome::Failed {
                                reason: reason.clone(),
                            });
                        }
                    }
                },
            }
        }
        runnable.sort_unstable();
        Ok(runnable)
    }

    fn fetch_one(&self, descriptor: &DownloadDescriptor) -> DownloadOutcome {
        match panic::catch_unwind(AssertUnwindSafe(|| self.transfer.fetch(descriptor))) {
            Ok(Ok(bytes)) => DownloadOutcome::Succeeded { bytes },
            Ok(Err(err)) => DownloadOutcome::Failed {
                reason: err.to_string(),
            },
            Err(_) => DownloadOutcome::Failed {
                reason: "transfer panicked".to_string(),
            },
        }
    }

    fn record(
        &self,
        descriptor: &DownloadDescriptor,
        outcome: DownloadOutcome,
        elapsed: Option<Duration>,
        state: &mut TransferState,
        slot: &mut Option<DownloadOutcome>,
        sink: &dyn ProgressSink,
    ) {
        if state.is_terminal() {
            return;
        }
        match &outcome {
            DownloadOutcome::Succeeded { bytes } => {
                *state = TransferState::Succeeded;
                debug!(file = descriptor.file_name(), bytes, ?elapsed, "download finished");
            }
            DownloadOutcome::Failed { reason } => {
                *state = TransferState::Failed;
                warn!(file = descriptor.file_name(), reason = %reason, "download failed");
                sink.event(ProgressEvent {
                    message: format!("Failed to download {}: {reason}", descriptor.file_name()),
                    elapsed,
                });
            }
        }
        *slot = Some(outcome);
    }
}

fn assemble_report(
    batch: &StudyBatch,
    states: Vec<TransferState>,
    outcomes: Vec<Option<DownloadOutcome>>,
    workers: usize,
    started_at: String,
) -> BatchReport {
    let mut succeeded = 0usize;
    let mut bytes = 0u64;
    let mut failed = Vec::new();

    for ((descriptor, state), outcome) in batch.descriptors().iter().zip(states).zip(outcomes) {
        match (state, outcome) {
            (TransferState::Succeeded, Some(DownloadOutcome::Succeeded { bytes: written })) => {
                succeeded += 1;
                bytes += written;
            }
            (_, Some(DownloadOutcome::Failed { reason })) => failed.push(FailedDownload {
                descriptor: descriptor.clone(),
                reason,
            }),
            _ => failed.push(FailedDownload {
                descriptor: descriptor.clone(),
                reason: "transfer did not complete".to_string(),
            }),
        }
    }

    BatchReport {
        study_id: batch.study_id().to_string(),
        total: batch.len(),
        succeeded,
        failed,
        bytes,
        workers,
        started_at,
        finished_at: chrono::Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoTransfer;

    impl Transfer for NoTransfer {
        fn fetch(&self, _descriptor: &DownloadDescriptor) -> Result<u64, DownloaderError> {
            Ok(0)
        }
    }

    #[test]
    fn worker_count_is_bounded() {
        let orchestrator = Orchestrator::new(NoTransfer);
        let cpus = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        assert_eq!(orchestrator.worker_count(1000), cpus.min(8));
        assert_eq!(orchestrator.worker_count(1), 1);
        assert_eq!(orchestrator.worker_count(0), 1);

        let narrow = Orchestrator::new(NoTransfer).with_max_workers(2);
        assert!(narrow.worker_count(1000) <= 2);
    }

    #[test]
    fn terminal_states() {
        assert!(!TransferState::Pending.is_terminal());
        assert!(!TransferState::InFlight.is_terminal());
        assert!(TransferState::Succeeded.is_terminal());
        assert!(TransferState::Failed.is_terminal());
    }
}
