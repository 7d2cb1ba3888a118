//! Background chunk preparation and cooperative cancellation
//!
//! While chunk k is sampled, a worker thread reads chunk k+1 and builds its
//! augmented buffer. The finished [`PreparedChunk`] crosses a bounded
//! channel and is installed by the sampler in a single move.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded};
use rand::SeedableRng;

use crate::{
    AugmentationEngine, AugmentedBuffer, DataError, DataResult, PipelineRng, ReadPolicy,
    ResidentChunk, SongEntry,
};

// ═══════════════════════════════════════════════════════════════════════════════
// CANCELLATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Shared cancellation flag
///
/// Checked between chunks and between augmentation fragments, never in the
/// middle of a window.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag so the pipeline can be reused
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PREFETCHER
// ═══════════════════════════════════════════════════════════════════════════════

/// A chunk read and augmented off the sampling thread
#[derive(Debug)]
pub struct PreparedChunk {
    pub chunk: ResidentChunk,
    pub augmented: Option<AugmentedBuffer>,
    /// Retries spent reading the chunk's files
    pub read_retries: u64,
}

struct PrefetchJob {
    index: usize,
    entries: Vec<SongEntry>,
    seed: u64,
}

/// Worker thread preparing one chunk ahead
pub struct ChunkPrefetcher {
    jobs: Option<Sender<PrefetchJob>>,
    results: Receiver<DataResult<PreparedChunk>>,
    handle: Option<JoinHandle<()>>,
    pending: Option<usize>,
}

impl std::fmt::Debug for ChunkPrefetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkPrefetcher")
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl ChunkPrefetcher {
    /// Start the worker thread
    pub fn spawn(
        policy: ReadPolicy,
        engine: Option<AugmentationEngine>,
        cancel: CancellationToken,
    ) -> DataResult<Self> {
        let (job_tx, job_rx) = bounded::<PrefetchJob>(1);
        let (result_tx, result_rx) = bounded::<DataResult<PreparedChunk>>(1);

        let handle = thread::Builder::new()
            .name("dmx-prefetch".into())
            .spawn(move || {
                for job in job_rx {
                    let result = prepare(&policy, engine.as_ref(), &cancel, job);
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
                log::debug!("Prefetch worker exiting");
            })
            .map_err(|e| DataError::Worker(e.to_string()))?;

        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            handle: Some(handle),
            pending: None,
        })
    }

    /// Chunk index currently being prepared
    pub fn pending(&self) -> Option<usize> {
        self.pending
    }

    /// Queue chunk `index`; at most one request is outstanding
    pub fn request(&mut self, index: usize, entries: Vec<SongEntry>, seed: u64) -> DataResult<()> {
        if self.pending.is_some() {
            self.discard()?;
        }
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| DataError::Worker("prefetcher is shut down".into()))?;
        jobs.send(PrefetchJob {
            index,
            entries,
            seed,
        })
        .map_err(|_| DataError::Worker("prefetch worker disconnected".into()))?;
        log::debug!("Prefetching chunk {}", index);
        self.pending = Some(index);
        Ok(())
    }

    /// Block until the pending chunk is ready
    pub fn wait(&mut self) -> DataResult<PreparedChunk> {
        if self.pending.is_none() {
            return Err(DataError::Worker("no chunk requested".into()));
        }
        let result = self
            .results
            .recv()
            .map_err(|_| DataError::Worker("prefetch worker disconnected".into()))?;
        self.pending = None;
        result
    }

    /// Drop the pending result, if any
    pub fn discard(&mut self) -> DataResult<()> {
        if self.pending.is_some() {
            match self.wait() {
                Ok(_) | Err(DataError::Cancelled) => {}
                Err(err) => log::warn!("Discarded prefetch failed: {}", err),
            }
        }
        Ok(())
    }
}

impl Drop for ChunkPrefetcher {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop
        self.jobs = None;
        while self.results.try_recv().is_ok() {}
        if let Some(handle) = self.handle.take() {
            // A result may still be in flight; drain it so the worker is not blocked
            while !handle.is_finished() {
                if self.results.recv().is_err() {
                    break;
                }
            }
            let _ = handle.join();
        }
    }
}

fn prepare(
    policy: &ReadPolicy,
    engine: Option<&AugmentationEngine>,
    cancel: &CancellationToken,
    job: PrefetchJob,
) -> DataResult<PreparedChunk> {
    if cancel.is_cancelled() {
        return Err(DataError::Cancelled);
    }
    let (chunk, read_retries) = policy.read_chunk(job.index, &job.entries)?;

    let augmented = match engine {
        Some(engine) => {
            let mut rng = PipelineRng::seed_from_u64(job.seed);
            Some(engine.generate(&chunk, &mut rng, cancel)?)
        }
        None => None,
    };

    Ok(PreparedChunk {
        chunk,
        augmented,
        read_retries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_token_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        clone.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_worker_reports_read_failure() {
        let policy = ReadPolicy {
            retries: 0,
            backoff: Duration::ZERO,
        };
        let mut prefetcher = ChunkPrefetcher::spawn(policy, None, CancellationToken::new()).unwrap();
        let entry = SongEntry::in_layout(std::path::Path::new("/nonexistent"), "Dev", "x");
        prefetcher.request(1, vec![entry], 0).unwrap();
        assert_eq!(prefetcher.pending(), Some(1));

        let err = prefetcher.wait().unwrap_err();
        assert!(matches!(err, DataError::CorpusIo { .. }));
        assert_eq!(prefetcher.pending(), None);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = ReadPolicy {
            retries: 0,
            backoff: Duration::ZERO,
        };
        let mut prefetcher = ChunkPrefetcher::spawn(policy, None, cancel).unwrap();
        prefetcher.request(0, vec![], 0).unwrap();
        assert!(matches!(prefetcher.wait(), Err(DataError::Cancelled)));
    }

    #[test]
    fn test_prepared_chunk_carries_read_stats() {
        use dmx_core::StereoBuffer;
        use dmx_file::{WavEncoding, write_stereo_wav};

        let dir = tempfile::tempdir().unwrap();
        let entry = SongEntry::in_layout(dir.path(), "Dev", "song");
        for path in entry.paths() {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            let audio = StereoBuffer::from_channels(vec![0.2; 500], vec![0.1; 500]);
            write_stereo_wav(path, &audio, 44100, WavEncoding::Int16).unwrap();
        }

        let policy = ReadPolicy {
            retries: 2,
            backoff: Duration::ZERO,
        };
        let mut prefetcher = ChunkPrefetcher::spawn(policy, None, CancellationToken::new()).unwrap();
        prefetcher.request(3, vec![entry], 0).unwrap();

        let prepared = prefetcher.wait().unwrap();
        assert_eq!(prepared.chunk.index, 3);
        assert_eq!(prepared.chunk.songs.len(), 1);
        assert_eq!(prepared.read_retries, 0);
        assert!(prepared.augmented.is_none());
    }
}
