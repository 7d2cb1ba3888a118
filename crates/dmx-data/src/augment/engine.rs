//! Augmented buffer generation

use dmx_core::{NUM_SOURCES, StereoBuffer};
use rand::Rng;

use super::{AugmentedBuffer, AugmentedFragment, StemSet, TransformContext};
use crate::{AugmentationConfig, CancellationToken, DataError, DataResult, PipelineRng, ResidentChunk};

/// Synthesizes augmented material from a resident chunk
///
/// Stateless between calls; all randomness comes from the caller's RNG.
#[derive(Debug, Clone)]
pub struct AugmentationEngine {
    config: AugmentationConfig,
    window_samples: usize,
}

impl AugmentationEngine {
    pub fn new(config: AugmentationConfig, window_samples: usize) -> DataResult<Self> {
        config.validate()?;
        if window_samples == 0 {
            return Err(DataError::InvalidConfig("window must be non-empty".into()));
        }
        Ok(Self {
            config,
            window_samples,
        })
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Fragment length for `chunk`, clamped to its longest song
    pub fn fragment_len(&self, chunk: &ResidentChunk) -> usize {
        (self.config.fragment_windows * self.window_samples).min(chunk.longest_song())
    }

    /// Fragments needed to cover `oversampling × resident_samples`
    pub fn num_fragments(&self, resident_samples: usize, fragment_len: usize) -> usize {
        if fragment_len == 0 {
            return 0;
        }
        let target = self.config.oversampling * resident_samples as f64;
        ((target / fragment_len as f64).floor() as usize).max(1)
    }

    /// Build the augmented buffer for `chunk`
    ///
    /// Checks `cancel` between fragments; a cancelled run returns
    /// [`DataError::Cancelled`] and nothing partial.
    pub fn generate(
        &self,
        chunk: &ResidentChunk,
        rng: &mut PipelineRng,
        cancel: &CancellationToken,
    ) -> DataResult<AugmentedBuffer> {
        let fragment_len = self.fragment_len(chunk);
        if fragment_len < self.window_samples {
            return Err(DataError::ShapeMismatch {
                needed: self.window_samples,
                got: chunk.longest_song(),
            });
        }

        // Songs shorter than a fragment are never sliced
        let eligible = chunk.songs_hosting(fragment_len);
        let num_fragments = self.num_fragments(chunk.total_samples(), fragment_len);
        let registry = &self.config.registry;

        let mut ctx = TransformContext::new(chunk.sample_rate());
        let mut mixture = StereoBuffer::default();
        let mut stems: StemSet = Default::default();
        let mut fragments = Vec::with_capacity(num_fragments);

        for _ in 0..num_fragments {
            if cancel.is_cancelled() {
                log::debug!("Augmentation of chunk {} cancelled", chunk.index);
                return Err(DataError::Cancelled);
            }

            let swapped = rng.random_bool(self.config.swap_probability);
            let source_songs: [usize; NUM_SOURCES] = if swapped {
                std::array::from_fn(|_| eligible[rng.random_range(0..eligible.len())])
            } else {
                [eligible[rng.random_range(0..eligible.len())]; NUM_SOURCES]
            };

            let fragment: StemSet = std::array::from_fn(|k| {
                let song = &chunk.songs[source_songs[k]];
                let start = rng.random_range(0..=song.len() - fragment_len);
                song.stems[k]
                    .slice(start, fragment_len)
                    .unwrap_or_else(|| StereoBuffer::silence(fragment_len))
            });

            let transform = registry[rng.random_range(0..registry.len())];
            let transformed = transform.apply(fragment, &mut ctx, rng);

            mixture.append(&StereoBuffer::sum(transformed.iter()));
            for (dst, src) in stems.iter_mut().zip(&transformed) {
                dst.append(src);
            }
            fragments.push(AugmentedFragment {
                transform,
                swapped,
                source_songs,
            });
        }

        log::info!(
            "Augmented chunk {}: {} fragments x {} samples",
            chunk.index,
            fragments.len(),
            fragment_len
        );

        Ok(AugmentedBuffer {
            mixture,
            stems,
            fragments,
            fragment_len,
            sample_rate: chunk.sample_rate(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Song, Transform};
    use rand::SeedableRng;

    fn song(name: &str, len: usize, seed: f32) -> Song {
        let tone = |k: f32| -> StereoBuffer {
            let l = (0..len).map(|i| (i as f32 * 0.01 * k + seed).sin() * 0.2).collect();
            let r = (0..len).map(|i| (i as f32 * 0.02 * k - seed).cos() * 0.2).collect();
            StereoBuffer::from_channels(l, r)
        };
        let stems: StemSet = std::array::from_fn(|k| tone(k as f32 + 1.0));
        let mixture = StereoBuffer::sum(stems.iter());
        Song::new(name, mixture, stems, 44100)
    }

    fn chunk() -> ResidentChunk {
        ResidentChunk {
            index: 0,
            songs: vec![song("a", 12000, 0.1), song("b", 9000, 0.7), song("c", 2000, 1.3)],
        }
    }

    fn engine(registry: Vec<Transform>) -> AugmentationEngine {
        let config = AugmentationConfig::default()
            .with_registry(registry)
            .with_fragment_windows(2);
        AugmentationEngine::new(config, 2048).unwrap()
    }

    #[test]
    fn test_mixture_is_sum_of_stems() {
        for transform in Transform::ALL {
            let engine = engine(vec![transform]);
            let mut rng = PipelineRng::seed_from_u64(11);
            let buffer = engine
                .generate(&chunk(), &mut rng, &CancellationToken::new())
                .unwrap();

            let expected = StereoBuffer::sum(buffer.stems.iter());
            assert_eq!(buffer.mixture, expected, "{transform} broke mixture conservation");
            assert!(buffer.fragments.iter().all(|f| f.transform == transform));
        }
    }

    #[test]
    fn test_buffer_length_in_whole_fragments() {
        let engine = engine(Transform::default_registry());
        let mut rng = PipelineRng::seed_from_u64(5);
        let chunk = chunk();
        let buffer = engine.generate(&chunk, &mut rng, &CancellationToken::new()).unwrap();

        assert_eq!(buffer.fragment_len, 4096);
        // 2.0 x 23000 resident samples / 4096 per fragment
        assert_eq!(buffer.fragments.len(), 11);
        assert_eq!(buffer.len(), 11 * 4096);
        // "c" is shorter than a fragment and never used
        assert!(buffer.fragments.iter().all(|f| !f.source_songs.contains(&2)));
    }

    #[test]
    fn test_fragment_clamped_to_longest_song() {
        let config = AugmentationConfig::default().with_fragment_windows(100);
        let engine = AugmentationEngine::new(config, 2048).unwrap();
        assert_eq!(engine.fragment_len(&chunk()), 12000);
    }

    #[test]
    fn test_too_short_chunk() {
        let engine = engine(vec![Transform::MonoFold]);
        let chunk = ResidentChunk {
            index: 0,
            songs: vec![song("tiny", 1000, 0.0)],
        };
        let mut rng = PipelineRng::seed_from_u64(0);
        let err = engine.generate(&chunk, &mut rng, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, DataError::ShapeMismatch { needed: 2048, got: 1000 }));
    }

    #[test]
    fn test_cancelled_generation_is_discarded() {
        let engine = engine(vec![Transform::ChannelSwap]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut rng = PipelineRng::seed_from_u64(0);
        assert!(matches!(
            engine.generate(&chunk(), &mut rng, &cancel),
            Err(DataError::Cancelled)
        ));
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let engine = engine(Transform::ALL.to_vec());
        let a = engine
            .generate(&chunk(), &mut PipelineRng::seed_from_u64(9), &CancellationToken::new())
            .unwrap();
        let b = engine
            .generate(&chunk(), &mut PipelineRng::seed_from_u64(9), &CancellationToken::new())
            .unwrap();
        assert_eq!(a.fragments, b.fragments);
        assert_eq!(a.mixture, b.mixture);
    }
}
