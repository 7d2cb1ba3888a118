//! Configuration types for the data pipeline

use std::path::{Path, PathBuf};

use dmx_dsp::CodecConfig;
use serde::{Deserialize, Serialize};

use crate::augment::Transform;
use crate::{DataError, DataResult};

/// Where the corpus lives and how it is read
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Directory containing `Mixtures/` and `Sources/`
    pub root: PathBuf,
    /// Split directory used for training
    pub train_split: String,
    /// Split directory used for validation
    pub validation_split: String,
    /// Songs resident in memory at once
    pub chunk_size: usize,
    /// Extra attempts for transient read failures (0 = fail on first error)
    pub read_retries: u32,
    /// Delay before the first retry, doubled on each further attempt
    pub retry_backoff_ms: u64,
    /// Total sample count of the split; measured from WAV headers when unset
    pub total_samples: Option<u64>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("DSD100"),
            train_split: "Dev".into(),
            validation_split: "Test".into(),
            chunk_size: 10,
            read_retries: 0,
            retry_backoff_ms: 100,
            total_samples: None,
        }
    }
}

impl CorpusConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_read_retries(mut self, retries: u32, backoff_ms: u64) -> Self {
        self.read_retries = retries;
        self.retry_backoff_ms = backoff_ms;
        self
    }

    pub fn with_total_samples(mut self, total: u64) -> Self {
        self.total_samples = Some(total);
        self
    }

    pub fn validate(&self) -> DataResult<()> {
        if self.chunk_size == 0 {
            return Err(DataError::InvalidConfig("chunk_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Batch assembly parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub batch_size: usize,
    /// Context frames before the center frame
    pub frames_past: usize,
    /// Context frames after the center frame
    pub frames_future: usize,
    pub codec: CodecConfig,
    /// Seed for every random draw; `None` seeds from the OS
    pub seed: Option<u64>,
    /// Fixed epoch length; estimated from the corpus size when unset
    pub batches_per_epoch: Option<usize>,
    /// Load the next chunk on a background thread
    pub prefetch: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            frames_past: 10,
            frames_future: 10,
            codec: CodecConfig::default(),
            seed: None,
            batches_per_epoch: None,
            prefetch: false,
        }
    }
}

impl SamplerConfig {
    /// Validation preset: fixed 400-batch epochs
    pub fn validation() -> Self {
        Self {
            batches_per_epoch: Some(400),
            ..Default::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn with_batches_per_epoch(mut self, batches: usize) -> Self {
        self.batches_per_epoch = Some(batches);
        self
    }

    /// Samples per training window (`hop × (past + future)`)
    pub fn window_samples(&self) -> usize {
        self.codec
            .samples_for_hops(self.frames_past + self.frames_future)
    }

    /// Frames per analyzed window (`past + future + 1`)
    pub fn window_frames(&self) -> usize {
        self.codec.num_frames(self.window_samples())
    }

    pub fn validate(&self) -> DataResult<()> {
        self.codec.validate()?;
        if self.batch_size == 0 {
            return Err(DataError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.frames_past + self.frames_future == 0 {
            return Err(DataError::InvalidConfig("window must span at least one hop".into()));
        }
        if self.batches_per_epoch == Some(0) {
            return Err(DataError::InvalidConfig("batches_per_epoch must be at least 1".into()));
        }
        Ok(())
    }
}

/// On-the-fly augmentation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    pub enabled: bool,
    /// Augmented buffer length as a multiple of the resident samples
    pub oversampling: f64,
    /// Fragment length in windows
    pub fragment_windows: usize,
    /// Probability of drawing each stem from an independent song
    pub swap_probability: f64,
    /// Transforms drawn uniformly per fragment
    pub registry: Vec<Transform>,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            oversampling: 2.0,
            fragment_windows: 100,
            swap_probability: 0.5,
            registry: Transform::default_registry(),
        }
    }
}

impl AugmentationConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn with_registry(mut self, registry: Vec<Transform>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_fragment_windows(mut self, windows: usize) -> Self {
        self.fragment_windows = windows;
        self
    }

    pub fn with_oversampling(mut self, oversampling: f64) -> Self {
        self.oversampling = oversampling;
        self
    }

    pub fn validate(&self) -> DataResult<()> {
        if self.registry.is_empty() {
            return Err(DataError::InvalidConfig("augmentation registry is empty".into()));
        }
        if !(self.oversampling > 0.0 && self.oversampling.is_finite()) {
            return Err(DataError::InvalidConfig(format!(
                "oversampling must be positive, got {}",
                self.oversampling
            )));
        }
        if self.fragment_windows == 0 {
            return Err(DataError::InvalidConfig("fragment_windows must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.swap_probability) {
            return Err(DataError::InvalidConfig(format!(
                "swap_probability must be in [0, 1], got {}",
                self.swap_probability
            )));
        }
        Ok(())
    }
}

/// Complete pipeline configuration, loadable from JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub corpus: CorpusConfig,
    pub sampler: SamplerConfig,
    pub augmentation: AugmentationConfig,
}

impl PipelineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> DataResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> DataResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| DataError::InvalidConfig(format!("config parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> DataResult<()> {
        self.corpus.validate()?;
        self.sampler.validate()?;
        if self.augmentation.enabled {
            self.augmentation.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window() {
        let config = SamplerConfig::default();
        assert_eq!(config.window_samples(), 10240);
        assert_eq!(config.window_frames(), 21);
    }

    #[test]
    fn test_partial_json() {
        let config = PipelineConfig::from_json(
            r#"{ "corpus": { "root": "/data/dsd", "chunk_size": 3 }, "sampler": { "seed": 7 } }"#,
        )
        .unwrap();
        assert_eq!(config.corpus.chunk_size, 3);
        assert_eq!(config.corpus.train_split, "Dev");
        assert_eq!(config.sampler.seed, Some(7));
        assert_eq!(config.augmentation.registry, Transform::default_registry());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = PipelineConfig {
            augmentation: AugmentationConfig::default().with_registry(Transform::ALL.to_vec()),
            ..Default::default()
        };
        let parsed = PipelineConfig::from_json(&config.to_json()).unwrap();
        assert_eq!(parsed.augmentation.registry.len(), 8);
    }

    #[test]
    fn test_invalid_values() {
        assert!(CorpusConfig::default().with_chunk_size(0).validate().is_err());
        assert!(SamplerConfig::default().with_batch_size(0).validate().is_err());
        assert!(AugmentationConfig::default().with_registry(vec![]).validate().is_err());
        assert!(PipelineConfig::from_json("{ not json").is_err());
    }
}
