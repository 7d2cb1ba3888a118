//! Corpus discovery and in-memory songs
//!
//! Layout on disk:
//!
//! ```text
//! <root>/Mixtures/<split>/<song>/mixture.wav
//! <root>/Sources/<split>/<song>/{bass,drums,other,vocals}.wav
//! ```

use std::path::{Path, PathBuf};

use dmx_core::{DEFAULT_SAMPLE_RATE, Instrument, NUM_SOURCES, StereoBuffer};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::{CorpusConfig, DataError, DataResult};

const MIXTURES_DIR: &str = "Mixtures";
const SOURCES_DIR: &str = "Sources";
const MIXTURE_FILE: &str = "mixture.wav";

/// Corpus partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Split {
    Train,
    Validation,
}

impl Split {
    /// Training reshuffles song order every epoch; validation keeps it fixed
    pub fn shuffles(self) -> bool {
        matches!(self, Split::Train)
    }

    pub fn directory(self, config: &CorpusConfig) -> &str {
        match self {
            Split::Train => &config.train_split,
            Split::Validation => &config.validation_split,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SONG ENTRIES (ON DISK)
// ═══════════════════════════════════════════════════════════════════════════════

/// File locations of one song
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongEntry {
    pub name: String,
    pub mixture: PathBuf,
    /// Stem paths in source-axis order
    pub stems: [PathBuf; NUM_SOURCES],
}

impl SongEntry {
    /// Entry following the standard layout under `root` for `split_dir`
    pub fn in_layout(root: &Path, split_dir: &str, name: &str) -> Self {
        let mixture = root.join(MIXTURES_DIR).join(split_dir).join(name).join(MIXTURE_FILE);
        let sources = root.join(SOURCES_DIR).join(split_dir).join(name);
        let stems = Instrument::ALL.map(|inst| sources.join(inst.file_name()));
        Self {
            name: name.to_string(),
            mixture,
            stems,
        }
    }

    /// Mixture followed by the four stems
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.mixture.as_path()).chain(self.stems.iter().map(PathBuf::as_path))
    }
}

/// Ordered song list for one split
#[derive(Debug, Clone)]
pub struct Corpus {
    split: Split,
    songs: Vec<SongEntry>,
    total_samples: u64,
}

impl Corpus {
    /// Scan `<root>/Mixtures/<split>` for song directories (sorted by name)
    ///
    /// Every song must have a mixture and all four stems. The total sample
    /// count comes from the config or, when unset, from the mixture headers.
    pub fn discover(config: &CorpusConfig, split: Split) -> DataResult<Self> {
        let split_dir = split.directory(config);
        let mixtures_dir = config.root.join(MIXTURES_DIR).join(split_dir);
        if !mixtures_dir.is_dir() {
            return Err(DataError::corpus_io(&mixtures_dir, "mixture directory not found"));
        }

        let mut songs = Vec::new();
        for entry in WalkDir::new(&mixtures_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| DataError::corpus_io(&mixtures_dir, e))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let song = SongEntry::in_layout(&config.root, split_dir, &name);
            if let Some(missing) = song.paths().find(|p| !p.is_file()) {
                return Err(DataError::corpus_io(missing, "file not found"));
            }
            songs.push(song);
        }

        if songs.is_empty() {
            return Err(DataError::EmptyCorpus(mixtures_dir.display().to_string()));
        }

        let total_samples = match config.total_samples {
            Some(total) => total,
            None => {
                let mut total = 0u64;
                for song in &songs {
                    let info = dmx_file::probe_wav(&song.mixture)
                        .map_err(|e| DataError::corpus_io(&song.mixture, e))?;
                    total += info.num_frames;
                }
                total
            }
        };

        log::info!(
            "Discovered {} {:?} songs ({} samples) in {}",
            songs.len(),
            split,
            total_samples,
            mixtures_dir.display()
        );

        Ok(Self {
            split,
            songs,
            total_samples,
        })
    }

    /// Corpus from an explicit song list
    pub fn from_entries(split: Split, songs: Vec<SongEntry>, total_samples: u64) -> DataResult<Self> {
        if songs.is_empty() {
            return Err(DataError::EmptyCorpus("no song entries".into()));
        }
        Ok(Self {
            split,
            songs,
            total_samples,
        })
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn songs(&self) -> &[SongEntry] {
        &self.songs
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SONGS (IN MEMORY)
// ═══════════════════════════════════════════════════════════════════════════════

/// Mixture and stems cut from the same span
#[derive(Debug, Clone, PartialEq)]
pub struct SongWindow {
    pub mixture: StereoBuffer,
    pub stems: [StereoBuffer; NUM_SOURCES],
}

/// A resident song: mixture plus four stems of equal length
#[derive(Debug, Clone)]
pub struct Song {
    pub name: String,
    pub mixture: StereoBuffer,
    pub stems: [StereoBuffer; NUM_SOURCES],
    pub sample_rate: u32,
}

impl Song {
    /// Build a song, truncating every track to the shortest one
    pub fn new(
        name: impl Into<String>,
        mut mixture: StereoBuffer,
        mut stems: [StereoBuffer; NUM_SOURCES],
        sample_rate: u32,
    ) -> Self {
        let len = stems
            .iter()
            .map(StereoBuffer::len)
            .fold(mixture.len(), usize::min);
        mixture.truncate(len);
        for stem in &mut stems {
            stem.truncate(len);
        }
        Self {
            name: name.into(),
            mixture,
            stems,
            sample_rate,
        }
    }

    /// Usable length in samples
    pub fn len(&self) -> usize {
        self.mixture.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mixture.is_empty()
    }

    pub fn stem(&self, instrument: Instrument) -> &StereoBuffer {
        &self.stems[instrument.index()]
    }

    /// Aligned window across mixture and stems
    pub fn window(&self, start: usize, len: usize) -> Option<SongWindow> {
        let mixture = self.mixture.slice(start, len)?;
        let mut stems: [StereoBuffer; NUM_SOURCES] = Default::default();
        for (dst, src) in stems.iter_mut().zip(&self.stems) {
            *dst = src.slice(start, len)?;
        }
        Some(SongWindow { mixture, stems })
    }
}

/// Songs currently held in memory
#[derive(Debug, Clone)]
pub struct ResidentChunk {
    pub index: usize,
    pub songs: Vec<Song>,
}

impl ResidentChunk {
    /// Sum of mixture lengths
    pub fn total_samples(&self) -> usize {
        self.songs.iter().map(Song::len).sum()
    }

    pub fn longest_song(&self) -> usize {
        self.songs.iter().map(Song::len).max().unwrap_or(0)
    }

    /// Indices of songs with at least `len` samples
    pub fn songs_hosting(&self, len: usize) -> Vec<usize> {
        self.songs
            .iter()
            .enumerate()
            .filter(|(_, song)| song.len() >= len)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn sample_rate(&self) -> u32 {
        self.songs
            .first()
            .map(|s| s.sample_rate)
            .unwrap_or(DEFAULT_SAMPLE_RATE)
    }
}
