//! Full-length stem separation
//!
//! ```text
//! mixture ─analyze─▶ |X|, ∠X ─windows─▶ model ─overlap-add─▶ estimates
//!                     │                                          │
//!                     └──────────── soft mask × |X| ◀────────────┘
//!                                        │
//!                                  synthesize(∠X) ─▶ 4 stems
//! ```

use std::path::{Path, PathBuf};

use dmx_core::{Instrument, NUM_CHANNELS, NUM_SOURCES, StereoBuffer};
use dmx_dsp::{SpectrogramCodec, StereoSpectrogram};
use dmx_file::{read_stereo_wav, write_stereo_wav};
use ndarray::{Array4, Axis, s};
use rayon::prelude::*;

use crate::{
    MlError, MlResult, OverlapAggregator, SeparationConfig, SeparationModel, SoftMask,
    window_starts,
};

/// Separated sources in bass, drums, other, vocals order
pub type Stems = [StereoBuffer; NUM_SOURCES];

/// Drives a [`SeparationModel`] over a whole recording
pub struct Separator<M: SeparationModel> {
    model: M,
    codec: SpectrogramCodec,
    config: SeparationConfig,
}

impl<M: SeparationModel> Separator<M> {
    pub fn new(model: M, config: SeparationConfig) -> MlResult<Self> {
        config.validate()?;
        let codec = SpectrogramCodec::new(config.codec)?;
        Ok(Self {
            model,
            codec,
            config,
        })
    }

    pub fn config(&self) -> &SeparationConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Separate `mixture` into four stems of the same length
    pub fn separate(&mut self, mixture: &StereoBuffer) -> MlResult<Stems> {
        let needed = self.config.window_samples();
        if mixture.len() < needed {
            return Err(MlError::BufferTooSmall {
                needed,
                got: mixture.len(),
            });
        }

        let spectrum = self.codec.analyze(mixture)?;
        let estimates = self.estimate(&spectrum)?;

        let mask = SoftMask::from_estimates(estimates.view());
        let linear = [spectrum.linear_magnitude(0), spectrum.linear_magnitude(1)];
        let sources = mask.apply([linear[0].view(), linear[1].view()])?;

        log::info!("Resynthesizing {} stems", NUM_SOURCES);
        let codec = &self.codec;
        let stems = (0..NUM_SOURCES)
            .into_par_iter()
            .map(|k| {
                codec.synthesize(
                    [
                        sources.slice(s![.., .., 0, k]),
                        sources.slice(s![.., .., 1, k]),
                    ],
                    [spectrum.phase[0].view(), spectrum.phase[1].view()],
                    mixture.len(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        stems.try_into().map_err(|_: Vec<StereoBuffer>| MlError::InferenceFailed {
            reason: "wrong number of resynthesized stems".into(),
        })
    }

    /// Run the model over every full window and overlap-add the results
    fn estimate(&mut self, spectrum: &StereoSpectrogram) -> MlResult<Array4<f32>> {
        let bins = spectrum.num_bins();
        let frames = spectrum.num_frames();
        let width = self.config.window_frames();
        let starts = window_starts(frames, width, self.config.stride);

        log::info!(
            "Separating {} frames in {} windows (width {}, stride {})",
            frames,
            starts.len(),
            width,
            self.config.stride
        );

        let mut aggregator =
            OverlapAggregator::new(bins, frames, width, self.config.stride, self.config.weighting)?;

        for (batch_index, batch) in starts.chunks(self.config.batch_size).enumerate() {
            let mut inputs = Array4::zeros((batch.len(), bins, width, NUM_CHANNELS));
            for (i, &start) in batch.iter().enumerate() {
                for ch in 0..NUM_CHANNELS {
                    inputs
                        .slice_mut(s![i, .., .., ch])
                        .assign(&spectrum.magnitude[ch].slice(s![.., start..start + width]));
                }
            }

            let outputs = self.model.predict(&inputs)?;
            let expected = (batch.len(), bins, width, NUM_CHANNELS, NUM_SOURCES);
            if outputs.dim() != expected {
                return Err(MlError::InvalidOutputShape {
                    expected: format!("{:?}", expected),
                    got: format!("{:?}", outputs.dim()),
                });
            }

            for (prediction, &start) in outputs.axis_iter(Axis(0)).zip(batch) {
                aggregator.add(start, prediction)?;
            }
            log::debug!(
                "Window batch {} done ({}/{} windows)",
                batch_index + 1,
                aggregator.windows_added(),
                starts.len()
            );
        }

        Ok(aggregator.finish())
    }

    /// Separate a WAV file, writing `<basename>_<Instrument>.wav` into `output_dir`
    pub fn separate_file(&mut self, input: &Path, output_dir: &Path) -> MlResult<Vec<PathBuf>> {
        let (mixture, info) = read_stereo_wav(input)?;
        log::info!(
            "Read {} ({:.1} s at {} Hz)",
            input.display(),
            info.duration(),
            info.sample_rate
        );

        let stems = self.separate(&mixture)?;

        let basename = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mixture".into());
        std::fs::create_dir_all(output_dir)?;

        let mut written = Vec::with_capacity(NUM_SOURCES);
        for instrument in Instrument::ALL {
            let path = output_dir.join(output_file_name(&basename, instrument));
            write_stereo_wav(
                &path,
                &stems[instrument.index()],
                info.sample_rate,
                self.config.output_encoding,
            )?;
            log::info!("Wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

/// `<basename>_<Instrument>.wav`
pub fn output_file_name(basename: &str, instrument: Instrument) -> String {
    format!("{}_{}.wav", basename, instrument.display_name())
}
