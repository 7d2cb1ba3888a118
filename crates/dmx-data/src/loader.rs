//! Chunked corpus loader
//!
//! Keeps at most `chunk_size` songs in memory. The resident chunk is
//! replaced wholesale on advance; the previous one is dropped before the
//! next is read.
//!
//! ```text
//! Idle ─begin_epoch─▶ Loading ─▶ Resident ─advance─▶ Loading ─▶ … ─▶ Exhausted
//! ```

use std::path::Path;
use std::thread;
use std::time::Duration;

use dmx_core::{Instrument, NUM_SOURCES, StereoBuffer};
use dmx_file::{FileResult, read_stereo_wav};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::{Corpus, CorpusConfig, DataError, DataResult, ResidentChunk, Song, SongEntry};

/// Loader lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    /// No chunk loaded yet this epoch
    Idle,
    /// Reading a chunk
    Loading,
    /// A chunk is resident and more remain
    Resident,
    /// The final chunk is resident and has served its quota
    Exhausted,
}

/// Load counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    pub epochs: u64,
    pub chunk_loads: u64,
    pub songs_read: u64,
    pub read_retries: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// READING
// ═══════════════════════════════════════════════════════════════════════════════

/// How per-file read failures are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPolicy {
    /// Extra attempts for transient failures
    pub retries: u32,
    /// Delay before the first retry, doubled per attempt
    pub backoff: Duration,
}

impl ReadPolicy {
    pub fn from_config(config: &CorpusConfig) -> Self {
        Self {
            retries: config.read_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Read one WAV file, retrying transient failures
    fn read_track(&self, path: &Path, retries_used: &mut u64) -> DataResult<(StereoBuffer, u32)> {
        let (buffer, info) = self.with_retries(path, retries_used, || read_stereo_wav(path))?;
        Ok((buffer, info.sample_rate))
    }

    /// Run `read` until it succeeds, fails permanently, or `retries` extra
    /// attempts are spent
    pub fn with_retries<T>(
        &self,
        path: &Path,
        retries_used: &mut u64,
        mut read: impl FnMut() -> FileResult<T>,
    ) -> DataResult<T> {
        let mut attempt = 0u32;
        loop {
            match read() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retries => {
                    let delay = self.backoff.saturating_mul(1u32 << attempt.min(16));
                    log::warn!(
                        "Read of {} failed ({}), retry {}/{} in {:?}",
                        path.display(),
                        err,
                        attempt + 1,
                        self.retries,
                        delay
                    );
                    thread::sleep(delay);
                    attempt += 1;
                    *retries_used += 1;
                }
                Err(err) => return Err(DataError::corpus_io(path, err)),
            }
        }
    }

    /// Read mixture and stems of one song
    pub fn read_song(&self, entry: &SongEntry, retries_used: &mut u64) -> DataResult<Song> {
        let (mixture, sample_rate) = self.read_track(&entry.mixture, retries_used)?;

        let mut stems: [StereoBuffer; NUM_SOURCES] = Default::default();
        for instrument in Instrument::ALL {
            let path = &entry.stems[instrument.index()];
            let (stem, rate) = self.read_track(path, retries_used)?;
            if rate != sample_rate {
                return Err(DataError::corpus_io(
                    path,
                    format!("sample rate {} differs from mixture ({})", rate, sample_rate),
                ));
            }
            stems[instrument.index()] = stem;
        }

        Ok(Song::new(entry.name.clone(), mixture, stems, sample_rate))
    }

    /// Read a whole chunk; any failure aborts the chunk
    pub fn read_chunk(&self, index: usize, entries: &[SongEntry]) -> DataResult<(ResidentChunk, u64)> {
        let mut retries_used = 0;
        let songs = entries
            .iter()
            .map(|entry| self.read_song(entry, &mut retries_used))
            .collect::<DataResult<Vec<_>>>()?;
        Ok((ResidentChunk { index, songs }, retries_used))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOADER
// ═══════════════════════════════════════════════════════════════════════════════

/// Streams a corpus through memory one chunk of songs at a time
#[derive(Debug)]
pub struct ChunkedCorpusLoader {
    corpus: Corpus,
    chunk_size: usize,
    /// Song indices in the current epoch's order
    order: Vec<usize>,
    chunk_index: usize,
    resident: Option<ResidentChunk>,
    state: LoaderState,
    policy: ReadPolicy,
    stats: LoaderStats,
}

impl ChunkedCorpusLoader {
    pub fn new(corpus: Corpus, config: &CorpusConfig) -> DataResult<Self> {
        config.validate()?;
        let order = (0..corpus.len()).collect();
        Ok(Self {
            corpus,
            chunk_size: config.chunk_size,
            order,
            chunk_index: 0,
            resident: None,
            state: LoaderState::Idle,
            policy: ReadPolicy::from_config(config),
            stats: LoaderStats::default(),
        })
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    pub fn stats(&self) -> LoaderStats {
        self.stats
    }

    pub fn policy(&self) -> ReadPolicy {
        self.policy
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Chunks per epoch; the last may hold fewer songs
    pub fn num_chunks(&self) -> usize {
        self.corpus.len().div_ceil(self.chunk_size)
    }

    pub fn chunk_index(&self) -> usize {
        self.chunk_index
    }

    pub fn has_next_chunk(&self) -> bool {
        self.chunk_index + 1 < self.num_chunks()
    }

    pub fn resident(&self) -> Option<&ResidentChunk> {
        self.resident.as_ref()
    }

    /// Song entries of chunk `index` in the current order
    pub fn chunk_entries(&self, index: usize) -> Vec<SongEntry> {
        let start = (index * self.chunk_size).min(self.order.len());
        let end = (start + self.chunk_size).min(self.order.len());
        self.order[start..end]
            .iter()
            .map(|&i| self.corpus.songs()[i].clone())
            .collect()
    }

    /// Start an epoch: reshuffle (training only) and load chunk 0
    pub fn begin_epoch<R: Rng + ?Sized>(&mut self, rng: &mut R) -> DataResult<usize> {
        if self.corpus.split().shuffles() {
            self.order.shuffle(rng);
        }
        self.stats.epochs += 1;
        self.load_chunk(0)
    }

    /// Load chunk `index`, replacing the resident one
    ///
    /// Returns the resident sample count.
    pub fn load_chunk(&mut self, index: usize) -> DataResult<usize> {
        if index >= self.num_chunks() {
            return Err(DataError::InvalidConfig(format!(
                "chunk {} out of range ({} chunks)",
                index,
                self.num_chunks()
            )));
        }

        self.state = LoaderState::Loading;
        self.resident = None;

        let entries = self.chunk_entries(index);
        match self.policy.read_chunk(index, &entries) {
            Ok((chunk, retries)) => Ok(self.install(chunk, retries)),
            Err(err) => {
                self.state = LoaderState::Idle;
                Err(err)
            }
        }
    }

    /// Install an already-read chunk (from the prefetcher) along with the
    /// retries spent reading it
    pub fn install(&mut self, chunk: ResidentChunk, read_retries: u64) -> usize {
        let samples = chunk.total_samples();
        log::info!(
            "Chunk {}/{} resident: {} songs, {} samples",
            chunk.index + 1,
            self.num_chunks(),
            chunk.songs.len(),
            samples
        );

        self.stats.chunk_loads += 1;
        self.stats.songs_read += chunk.songs.len() as u64;
        self.stats.read_retries += read_retries;
        self.chunk_index = chunk.index;
        self.resident = Some(chunk);
        self.state = LoaderState::Resident;
        samples
    }

    /// Load the chunk after the resident one
    pub fn advance(&mut self) -> DataResult<usize> {
        self.load_chunk(self.chunk_index + 1)
    }

    /// Whether the resident chunk has served its quota and another remains
    ///
    /// Never true at the final chunk; reaching the quota there marks the
    /// loader exhausted and the chunk stays usable.
    pub fn should_advance(&mut self, batches_served: usize, batches_per_chunk: usize) -> bool {
        if batches_served <= batches_per_chunk {
            return false;
        }
        if self.has_next_chunk() {
            return true;
        }
        if self.state == LoaderState::Resident {
            log::debug!("Final chunk reached its quota, reusing it for the rest of the epoch");
            self.state = LoaderState::Exhausted;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Split;
    use dmx_file::{WavEncoding, write_stereo_wav};
    use rand::SeedableRng;

    fn write_corpus(root: &Path, songs: &[(&str, usize)]) -> Vec<SongEntry> {
        songs
            .iter()
            .map(|&(name, len)| {
                let entry = SongEntry::in_layout(root, "Dev", name);
                for path in entry.paths() {
                    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                    let audio = StereoBuffer::from_channels(vec![0.1; len], vec![-0.1; len]);
                    write_stereo_wav(path, &audio, 44100, WavEncoding::Int16).unwrap();
                }
                entry
            })
            .collect()
    }

    fn loader(root: &Path, songs: &[(&str, usize)], chunk_size: usize) -> ChunkedCorpusLoader {
        let entries = write_corpus(root, songs);
        let corpus = Corpus::from_entries(Split::Train, entries, 0).unwrap();
        let config = CorpusConfig::new(root).with_chunk_size(chunk_size);
        ChunkedCorpusLoader::new(corpus, &config).unwrap()
    }

    #[test]
    fn test_chunk_count_rounds_up() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path(), &[("a", 10), ("b", 10), ("c", 10)], 2);
        assert_eq!(loader.num_chunks(), 2);
        assert_eq!(loader.chunk_entries(1).len(), 1);
    }

    #[test]
    fn test_load_and_advance() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = loader(dir.path(), &[("a", 100), ("b", 200), ("c", 300)], 2);
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);

        assert_eq!(loader.state(), LoaderState::Idle);
        let first = loader.begin_epoch(&mut rng).unwrap();
        assert_eq!(loader.state(), LoaderState::Resident);
        assert_eq!(loader.resident().unwrap().songs.len(), 2);

        assert!(!loader.should_advance(3, 3));
        assert!(loader.should_advance(4, 3));
        let second = loader.advance().unwrap();
        assert_eq!(first + second, 600);
        assert_eq!(loader.chunk_index(), 1);

        // Final chunk: never advances, becomes exhausted
        assert!(!loader.should_advance(100, 3));
        assert_eq!(loader.state(), LoaderState::Exhausted);
        assert!(loader.resident().is_some());
        assert_eq!(loader.stats().chunk_loads, 2);
    }

    #[test]
    fn test_missing_stem_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = loader(dir.path(), &[("a", 100), ("b", 100)], 2);
        let victim = loader.chunk_entries(0)[1].stems[2].clone();
        std::fs::remove_file(&victim).unwrap();

        let err = loader.load_chunk(0).unwrap_err();
        match err {
            DataError::CorpusIo { path, .. } => assert!(path.ends_with("other.wav")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(loader.state(), LoaderState::Idle);
        assert!(loader.resident().is_none());
    }

    #[test]
    fn test_validation_order_is_fixed() {
        let dir = tempfile::tempdir().unwrap();
        let entries = write_corpus(dir.path(), &[("a", 10), ("b", 10), ("c", 10), ("d", 10)]);
        let corpus = Corpus::from_entries(Split::Validation, entries.clone(), 40).unwrap();
        let config = CorpusConfig::new(dir.path()).with_chunk_size(4);
        let mut loader = ChunkedCorpusLoader::new(corpus, &config).unwrap();

        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(99);
        loader.begin_epoch(&mut rng).unwrap();
        loader.begin_epoch(&mut rng).unwrap();
        assert_eq!(loader.chunk_entries(0), entries);
        assert_eq!(loader.stats().epochs, 2);
    }

    #[test]
    fn test_broken_files_fail_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let entries = write_corpus(dir.path(), &[("a", 2000), ("b", 2000)]);
        let corpus = Corpus::from_entries(Split::Train, entries, 0).unwrap();
        let config = CorpusConfig::new(dir.path())
            .with_chunk_size(1)
            .with_read_retries(3, 0);
        let mut loader = ChunkedCorpusLoader::new(corpus, &config).unwrap();

        // Missing stem in chunk 0, truncated stem in chunk 1
        std::fs::remove_file(&loader.chunk_entries(0)[0].stems[0]).unwrap();
        let truncated = loader.chunk_entries(1)[0].stems[3].clone();
        let bytes = std::fs::read(&truncated).unwrap();
        std::fs::write(&truncated, &bytes[..bytes.len() - 501]).unwrap();

        for index in 0..2 {
            let err = loader.load_chunk(index).unwrap_err();
            assert!(matches!(err, DataError::CorpusIo { .. }), "chunk {index}: {err}");
        }
        assert_eq!(loader.stats().read_retries, 0);
        assert_eq!(loader.stats().chunk_loads, 0);
    }

    #[test]
    fn test_transient_failures_retry_up_to_bound() {
        let policy = ReadPolicy {
            retries: 3,
            backoff: Duration::ZERO,
        };
        let path = Path::new("flaky.wav");
        let interrupted = || dmx_file::FileError::Io(std::io::ErrorKind::Interrupted.into());

        // Always failing: 1 attempt + 3 retries
        let mut calls = 0;
        let mut used = 0;
        let err = policy
            .with_retries(path, &mut used, || -> FileResult<()> {
                calls += 1;
                Err(interrupted())
            })
            .unwrap_err();
        assert!(matches!(err, DataError::CorpusIo { .. }));
        assert_eq!(calls, 4);
        assert_eq!(used, 3);

        // Recovers on the third attempt
        let mut calls = 0;
        let mut used = 0;
        let value = policy
            .with_retries(path, &mut used, || {
                calls += 1;
                if calls < 3 { Err(interrupted()) } else { Ok(7) }
            })
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(used, 2);
    }

    #[test]
    fn test_install_counts_read_retries() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = loader(dir.path(), &[("a", 100), ("b", 100)], 1);
        let entries = loader.chunk_entries(1);
        let (chunk, retries) = loader.policy().read_chunk(1, &entries).unwrap();
        assert_eq!(retries, 0);

        loader.install(chunk, 2);
        assert_eq!(loader.chunk_index(), 1);
        assert_eq!(loader.stats().read_retries, 2);
        assert_eq!(loader.stats().chunk_loads, 1);
    }
}
