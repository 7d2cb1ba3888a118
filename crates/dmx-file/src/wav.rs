//! WAV reading and writing (hound)

use std::path::Path;

use dmx_core::StereoBuffer;

use crate::{FileError, FileResult};

// ═══════════════════════════════════════════════════════════════════════════════
// METADATA
// ═══════════════════════════════════════════════════════════════════════════════

/// Sample encoding of a WAV file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavEncoding {
    Int16,
    Int24,
    Int32,
    Float32,
}

impl WavEncoding {
    pub fn bits(&self) -> u16 {
        match self {
            Self::Int16 => 16,
            Self::Int24 => 24,
            Self::Int32 | Self::Float32 => 32,
        }
    }

    fn sample_format(&self) -> hound::SampleFormat {
        match self {
            Self::Float32 => hound::SampleFormat::Float,
            _ => hound::SampleFormat::Int,
        }
    }
}

/// WAV header information
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub is_float: bool,
    /// Number of sample frames (per channel)
    pub num_frames: u64,
}

impl WavInfo {
    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_frames as f64 / self.sample_rate as f64
    }
}

fn info_from_spec(spec: hound::WavSpec, num_frames: u64) -> WavInfo {
    WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
        is_float: spec.sample_format == hound::SampleFormat::Float,
        num_frames,
    }
}

fn check_exists(path: &Path) -> FileResult<()> {
    if !path.exists() {
        return Err(FileError::NotFound(path.display().to_string()));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// READING
// ═══════════════════════════════════════════════════════════════════════════════

/// Read only the header of a WAV file
pub fn probe_wav<P: AsRef<Path>>(path: P) -> FileResult<WavInfo> {
    let path = path.as_ref();
    check_exists(path)?;
    let reader = hound::WavReader::open(path)?;
    Ok(info_from_spec(reader.spec(), reader.duration() as u64))
}

/// Read a mono or stereo WAV file as planar stereo
///
/// Mono files are duplicated to both channels. Files with more than two
/// channels are rejected.
pub fn read_stereo_wav<P: AsRef<Path>>(path: P) -> FileResult<(StereoBuffer, WavInfo)> {
    let path = path.as_ref();
    check_exists(path)?;

    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    if spec.channels == 0 || spec.channels > 2 {
        return Err(FileError::UnsupportedChannels {
            path: path.display().to_string(),
            channels: spec.channels,
        });
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(FileError::UnsupportedFormat(format!(
                    "{}-bit integer PCM",
                    spec.bits_per_sample
                )));
            }
            let max_value = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_value))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let buffer = StereoBuffer::from_interleaved(&samples, spec.channels as usize);
    let info = info_from_spec(spec, buffer.len() as u64);

    log::trace!(
        "Read {} ({} frames @ {} Hz, {} ch)",
        path.display(),
        info.num_frames,
        info.sample_rate,
        info.channels
    );

    Ok((buffer, info))
}

// ═══════════════════════════════════════════════════════════════════════════════
// WRITING
// ═══════════════════════════════════════════════════════════════════════════════

/// Write a stereo buffer as an interleaved WAV file
pub fn write_stereo_wav<P: AsRef<Path>>(
    path: P,
    audio: &StereoBuffer,
    sample_rate: u32,
    encoding: WavEncoding,
) -> FileResult<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: encoding.bits(),
        sample_format: encoding.sample_format(),
    };

    let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;

    match encoding {
        WavEncoding::Float32 => {
            for (&l, &r) in audio.left().iter().zip(audio.right()) {
                writer.write_sample(l)?;
                writer.write_sample(r)?;
            }
        }
        WavEncoding::Int16 => {
            for (&l, &r) in audio.left().iter().zip(audio.right()) {
                writer.write_sample(quantize(l, 16) as i16)?;
                writer.write_sample(quantize(r, 16) as i16)?;
            }
        }
        WavEncoding::Int24 | WavEncoding::Int32 => {
            let bits = encoding.bits() as u32;
            for (&l, &r) in audio.left().iter().zip(audio.right()) {
                writer.write_sample(quantize(l, bits))?;
                writer.write_sample(quantize(r, bits))?;
            }
        }
    }

    writer.finalize()?;
    Ok(())
}

/// Clip to [-1, 1] and scale to a signed integer of `bits` bits
fn quantize(sample: f32, bits: u32) -> i32 {
    let max = ((1u64 << (bits - 1)) - 1) as f64;
    (sample.clamp(-1.0, 1.0) as f64 * max).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ramp(len: usize) -> StereoBuffer {
        let left: Vec<f32> = (0..len).map(|i| i as f32 / len as f32 - 0.5).collect();
        let right: Vec<f32> = left.iter().map(|s| -s).collect();
        StereoBuffer::from_channels(left, right)
    }

    #[test]
    fn test_float_roundtrip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let audio = ramp(256);

        write_stereo_wav(&path, &audio, 44100, WavEncoding::Float32).unwrap();
        let (read, info) = read_stereo_wav(&path).unwrap();

        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.channels, 2);
        assert!(info.is_float);
        assert_eq!(read, audio);
    }

    #[test]
    fn test_int16_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pcm16.wav");
        let audio = ramp(128);

        write_stereo_wav(&path, &audio, 22050, WavEncoding::Int16).unwrap();
        let (read, info) = read_stereo_wav(&path).unwrap();

        assert_eq!(info.bits_per_sample, 16);
        assert_eq!(info.num_frames, 128);
        for (a, b) in read.left().iter().zip(audio.left()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-4);
        }
        assert!(read.peak() <= 1.0);
    }

    #[test]
    fn test_probe_reports_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.wav");
        write_stereo_wav(&path, &ramp(1000), 48000, WavEncoding::Int24).unwrap();

        let info = probe_wav(&path).unwrap();
        assert_eq!(info.num_frames, 1000);
        assert_eq!(info.sample_rate, 48000);
    }

    #[test]
    fn test_missing_file() {
        let err = read_stereo_wav("/definitely/not/here.wav").unwrap_err();
        assert!(matches!(err, FileError::NotFound(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_truncated_file_is_not_transient() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.wav");
        write_stereo_wav(&path, &ramp(1000), 44100, WavEncoding::Int16).unwrap();
        let bytes = std::fs::read(&path).unwrap();

        // Cut inside the header, then inside the sample data
        for keep in [30, bytes.len() - 501] {
            std::fs::write(&path, &bytes[..keep]).unwrap();
            let err = read_stereo_wav(&path).unwrap_err();
            assert!(!err.is_transient(), "{keep} bytes: {err}");
        }
    }

    #[test]
    fn test_transient_io_kinds() {
        use std::io::{Error, ErrorKind};

        for kind in [ErrorKind::Interrupted, ErrorKind::TimedOut, ErrorKind::WouldBlock] {
            assert!(FileError::Io(Error::from(kind)).is_transient());
        }
        for kind in [
            ErrorKind::Other,
            ErrorKind::UnexpectedEof,
            ErrorKind::InvalidData,
            ErrorKind::PermissionDenied,
        ] {
            assert!(!FileError::Io(Error::from(kind)).is_transient());
        }
        assert!(!FileError::WavError("bad header".into()).is_transient());
    }
}
