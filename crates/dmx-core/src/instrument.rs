//! Source instruments

use serde::{Deserialize, Serialize};

/// Separated source
///
/// The declaration order is the source-axis order of every target tensor
/// and of every network output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Instrument {
    /// Bass instruments (bass guitar, synth bass)
    Bass,
    /// Drum kit
    Drums,
    /// Everything else (guitars, synths, strings, etc.)
    Other,
    /// Vocal content (lead, backing, harmonies)
    Vocals,
}

impl Instrument {
    /// All sources in source-axis order
    pub const ALL: [Instrument; 4] = [
        Instrument::Bass,
        Instrument::Drums,
        Instrument::Other,
        Instrument::Vocals,
    ];

    /// Position on the source axis
    pub fn index(self) -> usize {
        match self {
            Instrument::Bass => 0,
            Instrument::Drums => 1,
            Instrument::Other => 2,
            Instrument::Vocals => 3,
        }
    }

    /// Inverse of [`Instrument::index`]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Display name, also used as the suffix of separated output files
    pub fn display_name(self) -> &'static str {
        match self {
            Instrument::Bass => "Bass",
            Instrument::Drums => "Drums",
            Instrument::Other => "Other",
            Instrument::Vocals => "Vocals",
        }
    }

    /// Lowercase stem name used in corpus file names (`bass.wav`, ...)
    pub fn stem_name(self) -> &'static str {
        match self {
            Instrument::Bass => "bass",
            Instrument::Drums => "drums",
            Instrument::Other => "other",
            Instrument::Vocals => "vocals",
        }
    }

    /// Corpus file name for this stem
    pub fn file_name(self) -> String {
        format!("{}.wav", self.stem_name())
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}
