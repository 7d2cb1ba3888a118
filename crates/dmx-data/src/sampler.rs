//! Training batch assembly
//!
//! Pull-based: every `next_batch` call draws all window positions first on
//! the sampler's own RNG, then analyzes the windows in parallel. Chunk loads
//! and augmentation only happen at chunk boundaries.

use dmx_core::NUM_SOURCES;
use dmx_dsp::{SpectrogramCodec, StereoSpectrogram};
use ndarray::{Array4, Array5, s};
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::{
    AugmentationConfig, AugmentationEngine, AugmentedBuffer, CancellationToken, ChunkPrefetcher,
    ChunkedCorpusLoader, Corpus, DataError, DataResult, PipelineConfig, PipelineRng,
    PreparedChunk, SamplerConfig, SongWindow, Split,
};

/// One network batch
///
/// `inputs` is (batch, frequency, time, channel) and `targets` is
/// (batch, frequency, time, channel, source), both compressed magnitude.
#[derive(Debug, Clone)]
pub struct Batch {
    pub inputs: Array4<f32>,
    pub targets: Array5<f32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.inputs.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sampling counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub epochs: u64,
    pub batches_served: u64,
    pub chunk_loads: u64,
    /// Items drawn from resident songs
    pub raw_items: u64,
    /// Items drawn from the augmented buffer
    pub augmented_items: u64,
    /// Times the augmented cursor wrapped back to the start
    pub cursor_wraps: u64,
}

/// Where one batch item comes from
#[derive(Debug, Clone, Copy)]
enum Draw {
    Resident { song: usize, start: usize },
    Augmented { window: usize },
}

// ═══════════════════════════════════════════════════════════════════════════════
// SAMPLER
// ═══════════════════════════════════════════════════════════════════════════════

/// Serves spectrogram batches from a chunked corpus
#[derive(Debug)]
pub struct BatchSampler {
    loader: ChunkedCorpusLoader,
    engine: Option<AugmentationEngine>,
    codec: SpectrogramCodec,
    config: SamplerConfig,
    window_samples: usize,
    rng: PipelineRng,

    augmented: Option<AugmentedBuffer>,
    aug_cursor: usize,
    served_in_chunk: usize,
    batches_per_chunk: usize,
    batches_per_epoch: usize,

    cancel: CancellationToken,
    prefetcher: Option<ChunkPrefetcher>,
    stats: SamplerStats,
}

impl BatchSampler {
    /// Create a sampler over `loader`
    ///
    /// `augmentation` is ignored when `None` or disabled.
    pub fn new(
        loader: ChunkedCorpusLoader,
        config: SamplerConfig,
        augmentation: Option<AugmentationConfig>,
    ) -> DataResult<Self> {
        config.validate()?;
        let codec = SpectrogramCodec::new(config.codec)?;
        let window_samples = config.window_samples();

        let engine = augmentation
            .filter(|aug| aug.enabled)
            .map(|aug| AugmentationEngine::new(aug, window_samples))
            .transpose()?;

        let rng = match config.seed {
            Some(seed) => PipelineRng::seed_from_u64(seed),
            None => PipelineRng::from_os_rng(),
        };

        let cancel = CancellationToken::new();
        let prefetcher = if config.prefetch {
            Some(ChunkPrefetcher::spawn(
                loader.policy(),
                engine.clone(),
                cancel.clone(),
            )?)
        } else {
            None
        };

        let batches_per_epoch = config.batches_per_epoch.unwrap_or_else(|| {
            let factor = if engine.is_some() { 2 } else { 1 };
            let per_batch = (window_samples * config.batch_size) as u64;
            ((loader.corpus().total_samples() * factor / per_batch) as usize).max(1)
        });

        log::info!(
            "Batch sampler: {:?} split, {} songs, batch {}, window {} samples, {} batches/epoch, augmentation {}",
            loader.corpus().split(),
            loader.corpus().len(),
            config.batch_size,
            window_samples,
            batches_per_epoch,
            if engine.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            loader,
            engine,
            codec,
            config,
            window_samples,
            rng,
            augmented: None,
            aug_cursor: 0,
            served_in_chunk: 0,
            batches_per_chunk: 1,
            batches_per_epoch,
            cancel,
            prefetcher,
            stats: SamplerStats::default(),
        })
    }

    /// Discover `split` and build a sampler for it
    ///
    /// Training uses the configured augmentation; validation never augments
    /// and defaults to 400-batch epochs.
    pub fn from_config(config: &PipelineConfig, split: Split) -> DataResult<Self> {
        config.validate()?;
        let corpus = Corpus::discover(&config.corpus, split)?;
        let loader = ChunkedCorpusLoader::new(corpus, &config.corpus)?;

        match split {
            Split::Train => Self::new(
                loader,
                config.sampler.clone(),
                Some(config.augmentation.clone()),
            ),
            Split::Validation => {
                let mut sampler = config.sampler.clone();
                sampler.batches_per_epoch = sampler
                    .batches_per_epoch
                    .or(SamplerConfig::validation().batches_per_epoch);
                Self::new(loader, sampler, None)
            }
        }
    }

    pub fn loader(&self) -> &ChunkedCorpusLoader {
        &self.loader
    }

    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    pub fn batches_per_epoch(&self) -> usize {
        self.batches_per_epoch
    }

    pub fn batches_per_chunk(&self) -> usize {
        self.batches_per_chunk
    }

    pub fn augmented(&self) -> Option<&AugmentedBuffer> {
        self.augmented.as_ref()
    }

    /// Token that stops the sampler and its prefetch worker
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Epoch / chunk lifecycle
    // ───────────────────────────────────────────────────────────────────────────

    /// Reshuffle (training) and reload chunk 0
    pub fn on_epoch_end(&mut self) -> DataResult<()> {
        self.begin_epoch()
    }

    fn begin_epoch(&mut self) -> DataResult<()> {
        self.check_cancelled()?;
        if let Some(prefetcher) = self.prefetcher.as_mut() {
            // A chunk prepared under the old order is stale
            prefetcher.discard()?;
        }

        self.augmented = None;
        let samples = self.loader.begin_epoch(&mut self.rng)?;
        self.augmented = self.generate_inline()?;
        self.chunk_installed(samples);
        self.stats.epochs += 1;
        self.request_prefetch()
    }

    fn advance_chunk(&mut self) -> DataResult<()> {
        self.check_cancelled()?;
        let next = self.loader.chunk_index() + 1;

        let prepared = match self.prefetcher.as_mut() {
            Some(prefetcher) if prefetcher.pending() == Some(next) => Some(prefetcher.wait()?),
            _ => None,
        };

        self.augmented = None;
        match prepared {
            Some(PreparedChunk {
                chunk,
                augmented,
                read_retries,
            }) => {
                let samples = self.loader.install(chunk, read_retries);
                self.augmented = augmented;
                self.chunk_installed(samples);
            }
            None => {
                let samples = self.loader.advance()?;
                self.augmented = self.generate_inline()?;
                self.chunk_installed(samples);
            }
        }
        self.request_prefetch()
    }

    /// Reset per-chunk bookkeeping in one step
    fn chunk_installed(&mut self, resident_samples: usize) {
        let per_batch = self.window_samples * self.config.batch_size;
        let factor = if self.engine.is_some() { 2 } else { 1 };
        self.batches_per_chunk = (resident_samples * factor / per_batch).max(1);
        self.served_in_chunk = 0;
        self.aug_cursor = 0;
        self.stats.chunk_loads += 1;
        log::debug!(
            "Chunk {} serves {} batches",
            self.loader.chunk_index(),
            self.batches_per_chunk
        );
    }

    fn generate_inline(&mut self) -> DataResult<Option<AugmentedBuffer>> {
        let (Some(engine), Some(chunk)) = (self.engine.as_ref(), self.loader.resident()) else {
            return Ok(None);
        };
        let mut rng = PipelineRng::seed_from_u64(self.rng.random());
        engine.generate(chunk, &mut rng, &self.cancel).map(Some)
    }

    fn request_prefetch(&mut self) -> DataResult<()> {
        let Some(prefetcher) = self.prefetcher.as_mut() else {
            return Ok(());
        };
        if !self.loader.has_next_chunk() {
            return Ok(());
        }
        let next = self.loader.chunk_index() + 1;
        prefetcher.request(next, self.loader.chunk_entries(next), self.rng.random())
    }

    fn check_cancelled(&self) -> DataResult<()> {
        if self.cancel.is_cancelled() {
            log::info!("Batch sampler cancelled");
            return Err(DataError::Cancelled);
        }
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Batches
    // ───────────────────────────────────────────────────────────────────────────

    /// Assemble the next batch
    pub fn next_batch(&mut self) -> DataResult<Batch> {
        self.check_cancelled()?;
        if self.loader.resident().is_none() {
            self.begin_epoch()?;
        }

        if self
            .loader
            .should_advance(self.served_in_chunk + 1, self.batches_per_chunk)
        {
            self.advance_chunk()?;
        }
        self.served_in_chunk += 1;

        let draws = self.plan()?;
        let windows = self.cut(&draws)?;

        let codec = &self.codec;
        let analyzed = windows
            .par_iter()
            .map(|window| analyze_window(codec, window))
            .collect::<DataResult<Vec<_>>>()?;

        let batch = self.assemble(&analyzed);
        self.stats.batches_served += 1;
        log::debug!(
            "Batch {} (chunk {}, {}/{})",
            self.stats.batches_served,
            self.loader.chunk_index(),
            self.served_in_chunk,
            self.batches_per_chunk
        );
        Ok(batch)
    }

    /// Draw the source of every item of the batch
    fn plan(&mut self) -> DataResult<Vec<Draw>> {
        let window = self.window_samples;
        let chunk = self
            .loader
            .resident()
            .ok_or_else(|| DataError::Worker("no resident chunk".into()))?;
        let eligible = chunk.songs_hosting(window);
        let aug_windows = self
            .augmented
            .as_ref()
            .map_or(0, |buffer| buffer.num_windows(window));

        if eligible.is_empty() && aug_windows == 0 {
            return Err(DataError::ShapeMismatch {
                needed: window,
                got: chunk.longest_song(),
            });
        }

        let mut draws = Vec::with_capacity(self.config.batch_size);
        for _ in 0..self.config.batch_size {
            let from_augmented = aug_windows > 0 && (eligible.is_empty() || self.rng.random_bool(0.5));

            if from_augmented {
                if self.aug_cursor >= aug_windows {
                    self.aug_cursor = 0;
                    self.stats.cursor_wraps += 1;
                }
                draws.push(Draw::Augmented {
                    window: self.aug_cursor,
                });
                self.aug_cursor += 1;
                self.stats.augmented_items += 1;
            } else {
                let song = eligible[self.rng.random_range(0..eligible.len())];
                let start = self.rng.random_range(0..=chunk.songs[song].len() - window);
                draws.push(Draw::Resident { song, start });
                self.stats.raw_items += 1;
            }
        }
        Ok(draws)
    }

    fn cut(&self, draws: &[Draw]) -> DataResult<Vec<SongWindow>> {
        let window = self.window_samples;
        let chunk = self
            .loader
            .resident()
            .ok_or_else(|| DataError::Worker("no resident chunk".into()))?;

        draws
            .iter()
            .map(|draw| {
                let cut = match *draw {
                    Draw::Resident { song, start } => chunk.songs[song].window(start, window),
                    Draw::Augmented { window: index } => self
                        .augmented
                        .as_ref()
                        .and_then(|buffer| buffer.window(index, window)),
                };
                cut.ok_or(DataError::ShapeMismatch {
                    needed: window,
                    got: chunk.longest_song(),
                })
            })
            .collect()
    }

    fn assemble(&self, analyzed: &[(StereoSpectrogram, Vec<StereoSpectrogram>)]) -> Batch {
        let bins = self.codec.num_bins();
        let frames = self.config.window_frames();
        let mut inputs = Array4::zeros((analyzed.len(), bins, frames, 2));
        let mut targets = Array5::zeros((analyzed.len(), bins, frames, 2, NUM_SOURCES));

        for (i, (mixture, stems)) in analyzed.iter().enumerate() {
            for ch in 0..2 {
                inputs
                    .slice_mut(s![i, .., .., ch])
                    .assign(&mixture.magnitude[ch]);
                for (source, stem) in stems.iter().enumerate() {
                    targets
                        .slice_mut(s![i, .., .., ch, source])
                        .assign(&stem.magnitude[ch]);
                }
            }
        }

        Batch { inputs, targets }
    }
}

fn analyze_window(
    codec: &SpectrogramCodec,
    window: &SongWindow,
) -> DataResult<(StereoSpectrogram, Vec<StereoSpectrogram>)> {
    let mixture = codec.analyze(&window.mixture)?;
    let stems = window
        .stems
        .iter()
        .map(|stem| codec.analyze(stem))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((mixture, stems))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CorpusConfig, SongEntry, StemSet, Transform};
    use dmx_core::StereoBuffer;
    use dmx_file::{WavEncoding, write_stereo_wav};
    use std::path::Path;

    fn tone(len: usize, freq: f32) -> StereoBuffer {
        let left = (0..len)
            .map(|i| (i as f32 * freq * 0.001).sin() * 0.25)
            .collect();
        let right = (0..len)
            .map(|i| (i as f32 * freq * 0.0013).sin() * 0.25)
            .collect();
        StereoBuffer::from_channels(left, right)
    }

    fn write_corpus(root: &Path, songs: &[(&str, usize)]) -> Vec<SongEntry> {
        songs
            .iter()
            .map(|&(name, len)| {
                let entry = SongEntry::in_layout(root, "Dev", name);
                let stems: StemSet = std::array::from_fn(|k| tone(len, 20.0 * (k + 1) as f32));
                let mixture = StereoBuffer::sum(stems.iter());
                let tracks = std::iter::once(&mixture).chain(stems.iter());
                for (path, audio) in entry.paths().zip(tracks) {
                    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                    write_stereo_wav(path, audio, 44100, WavEncoding::Float32).unwrap();
                }
                entry
            })
            .collect()
    }

    fn sampler(root: &Path, songs: &[(&str, usize)], config: SamplerConfig) -> BatchSampler {
        let entries = write_corpus(root, songs);
        let total = songs.iter().map(|&(_, len)| len as u64).sum();
        let corpus = Corpus::from_entries(Split::Train, entries, total).unwrap();
        let loader =
            ChunkedCorpusLoader::new(corpus, &CorpusConfig::new(root).with_chunk_size(1)).unwrap();
        BatchSampler::new(loader, config, None).unwrap()
    }

    #[test]
    fn test_batch_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = SamplerConfig::default().with_batch_size(2).with_seed(1);
        let mut sampler = sampler(dir.path(), &[("a", 12000)], config);

        let batch = sampler.next_batch().unwrap();
        assert_eq!(batch.inputs.dim(), (2, 1025, 21, 2));
        assert_eq!(batch.targets.dim(), (2, 1025, 21, 2, 4));
        assert_eq!(sampler.stats().raw_items, 2);
        assert_eq!(sampler.stats().augmented_items, 0);
    }

    #[test]
    fn test_quota_before_advance() {
        let dir = tempfile::tempdir().unwrap();
        // One song per chunk, 21000 / 10240 = 2 batches each
        let config = SamplerConfig::default().with_batch_size(1).with_seed(3);
        let mut sampler = sampler(dir.path(), &[("a", 21000), ("b", 21000)], config);

        sampler.next_batch().unwrap();
        assert_eq!(sampler.batches_per_chunk(), 2);
        sampler.next_batch().unwrap();
        assert_eq!(sampler.loader().chunk_index(), 0);

        sampler.next_batch().unwrap();
        assert_eq!(sampler.loader().chunk_index(), 1);

        // Final chunk is reused
        for _ in 0..3 {
            sampler.next_batch().unwrap();
        }
        assert_eq!(sampler.loader().chunk_index(), 1);
        assert_eq!(sampler.stats().chunk_loads, 2);
    }

    #[test]
    fn test_epoch_length_estimate() {
        let dir = tempfile::tempdir().unwrap();
        let config = SamplerConfig::default().with_batch_size(1);
        let sampler = sampler(dir.path(), &[("a", 21000), ("b", 11000)], config);
        // 32000 / 10240
        assert_eq!(sampler.batches_per_epoch(), 3);
    }

    #[test]
    fn test_song_too_short_for_window() {
        let dir = tempfile::tempdir().unwrap();
        let config = SamplerConfig::default().with_batch_size(1);
        let mut sampler = sampler(dir.path(), &[("a", 5000)], config);
        let err = sampler.next_batch().unwrap_err();
        assert!(matches!(err, DataError::ShapeMismatch { needed: 10240, got: 5000 }));
    }

    #[test]
    fn test_cancelled_sampler() {
        let dir = tempfile::tempdir().unwrap();
        let config = SamplerConfig::default().with_batch_size(1);
        let mut sampler = sampler(dir.path(), &[("a", 12000)], config);
        sampler.cancel_token().cancel();
        assert!(matches!(sampler.next_batch(), Err(DataError::Cancelled)));
    }

    #[test]
    fn test_augmented_cursor_wraps() {
        let dir = tempfile::tempdir().unwrap();
        let entries = write_corpus(dir.path(), &[("a", 30720)]);
        let corpus = Corpus::from_entries(Split::Train, entries, 30720).unwrap();
        let loader = ChunkedCorpusLoader::new(corpus, &CorpusConfig::new(dir.path())).unwrap();
        // One fragment of one window: every augmented item after the first wraps
        let aug = AugmentationConfig::default()
            .with_registry(vec![Transform::ChannelSwap])
            .with_fragment_windows(1)
            .with_oversampling(0.5);
        let config = SamplerConfig::default().with_batch_size(8).with_seed(21);
        let mut sampler = BatchSampler::new(loader, config, Some(aug)).unwrap();

        sampler.next_batch().unwrap();
        assert_eq!(sampler.augmented().unwrap().num_windows(10240), 1);
        let stats = sampler.stats();
        assert_eq!(stats.raw_items + stats.augmented_items, 8);
        assert_eq!(stats.cursor_wraps, stats.augmented_items.saturating_sub(1));
        // 2 x 30720 / (10240 x 8)
        assert_eq!(sampler.batches_per_chunk(), 1);
    }
}
