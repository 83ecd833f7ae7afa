//! Codec-level operations on artifact files.
//!
//! The pipeline and the timeline only need four things from a codec: probe a
//! duration, cut a file in two, join files, and write silence. [`WavCodec`]
//! implements them for PCM and float WAV files.

use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, VoxreelError};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::{Path, PathBuf};

/// Codec service used for duration probing and timeline edits.
pub trait AudioCodec: Send + Sync {
    /// Duration of the media file in milliseconds.
    fn duration_ms(&self, path: &Path) -> Result<u64>;

    /// Cuts `source` at `at_ms` into `first` and `second`.
    ///
    /// Returns the durations of the two parts.
    fn cut(&self, source: &Path, at_ms: u64, first: &Path, second: &Path) -> Result<(u64, u64)>;

    /// Joins `inputs` in order into `output`. Returns the output duration.
    fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<u64>;

    /// Writes `duration_ms` of silence to `output`. Returns the duration written.
    fn silence(&self, duration_ms: u64, output: &Path) -> Result<u64>;
}

/// Decoded sample data, kept in the source's own representation.
enum Samples {
    Int(Vec<i32>),
    Float(Vec<f32>),
}

impl Samples {
    fn len(&self) -> usize {
        match self {
            Samples::Int(s) => s.len(),
            Samples::Float(s) => s.len(),
        }
    }
}

/// WAV implementation of [`AudioCodec`] built on `hound`.
#[derive(Debug, Clone, Copy)]
pub struct WavCodec {
    /// Sample rate used for generated silence.
    sample_rate: u32,
}

impl Default for WavCodec {
    fn default() -> Self {
        Self::new(SAMPLE_RATE)
    }
}

impl WavCodec {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    fn read(path: &Path) -> Result<(WavSpec, Samples)> {
        let mut reader = WavReader::open(path).map_err(|e| VoxreelError::Codec {
            message: format!("Failed to open {}: {}", path.display(), e),
        })?;
        let spec = reader.spec();
        let samples = match spec.sample_format {
            SampleFormat::Int => Samples::Int(
                reader
                    .samples::<i32>()
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            ),
            SampleFormat::Float => Samples::Float(
                reader
                    .samples::<f32>()
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            ),
        };
        Ok((spec, samples))
    }

    fn write(path: &Path, spec: WavSpec, samples: &Samples, range: std::ops::Range<usize>) -> Result<()> {
        let mut writer = WavWriter::create(path, spec)?;
        match samples {
            Samples::Int(s) => {
                for &sample in &s[range] {
                    writer.write_sample(sample)?;
                }
            }
            Samples::Float(s) => {
                for &sample in &s[range] {
                    writer.write_sample(sample)?;
                }
            }
        }
        writer.finalize()?;
        Ok(())
    }

    fn frames_to_ms(frames: u64, sample_rate: u32) -> u64 {
        if sample_rate == 0 {
            return 0;
        }
        frames * 1000 / u64::from(sample_rate)
    }

    fn ms_to_frames(ms: u64, sample_rate: u32) -> u64 {
        ms * u64::from(sample_rate) / 1000
    }

    fn same_layout(a: &WavSpec, b: &WavSpec) -> bool {
        a.channels == b.channels
            && a.sample_rate == b.sample_rate
            && a.bits_per_sample == b.bits_per_sample
            && a.sample_format == b.sample_format
    }
}

impl AudioCodec for WavCodec {
    fn duration_ms(&self, path: &Path) -> Result<u64> {
        let reader = WavReader::open(path).map_err(|e| VoxreelError::Codec {
            message: format!("Failed to open {}: {}", path.display(), e),
        })?;
        let spec = reader.spec();
        Ok(Self::frames_to_ms(
            u64::from(reader.duration()),
            spec.sample_rate,
        ))
    }

    fn cut(&self, source: &Path, at_ms: u64, first: &Path, second: &Path) -> Result<(u64, u64)> {
        let (spec, samples) = Self::read(source)?;
        let channels = usize::from(spec.channels.max(1));
        let total_frames = samples.len() / channels;
        let cut_frame = Self::ms_to_frames(at_ms, spec.sample_rate) as usize;

        if cut_frame == 0 || cut_frame >= total_frames {
            return Err(VoxreelError::InvalidSplitPoint {
                at_ms,
                duration_ms: Self::frames_to_ms(total_frames as u64, spec.sample_rate),
            });
        }

        let split = cut_frame * channels;
        Self::write(first, spec, &samples, 0..split)?;
        Self::write(second, spec, &samples, split..total_frames * channels)?;

        Ok((
            Self::frames_to_ms(cut_frame as u64, spec.sample_rate),
            Self::frames_to_ms((total_frames - cut_frame) as u64, spec.sample_rate),
        ))
    }

    fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<u64> {
        let Some(head) = inputs.first() else {
            return Err(VoxreelError::Codec {
                message: "nothing to concatenate".to_string(),
            });
        };
        let spec = WavReader::open(head)
            .map_err(|e| VoxreelError::Codec {
                message: format!("Failed to open {}: {}", head.display(), e),
            })?
            .spec();

        let mut writer = WavWriter::create(output, spec)?;
        let mut frames: u64 = 0;
        for input in inputs {
            let (input_spec, samples) = Self::read(input)?;
            if !Self::same_layout(&spec, &input_spec) {
                return Err(VoxreelError::Codec {
                    message: format!(
                        "{} has a different format ({} Hz, {} ch) than {} ({} Hz, {} ch)",
                        input.display(),
                        input_spec.sample_rate,
                        input_spec.channels,
                        head.display(),
                        spec.sample_rate,
                        spec.channels
                    ),
                });
            }
            match &samples {
                Samples::Int(s) => {
                    for &sample in s {
                        writer.write_sample(sample)?;
                    }
                }
                Samples::Float(s) => {
                    for &sample in s {
                        writer.write_sample(sample)?;
                    }
                }
            }
            frames += (samples.len() / usize::from(spec.channels.max(1))) as u64;
        }
        writer.finalize()?;

        Ok(Self::frames_to_ms(frames, spec.sample_rate))
    }

    fn silence(&self, duration_ms: u64, output: &Path) -> Result<u64> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let frames = Self::ms_to_frames(duration_ms, self.sample_rate);
        let mut writer = WavWriter::create(output, spec)?;
        for _ in 0..frames {
            writer.write_sample(0i16)?;
        }
        writer.finalize()?;
        Ok(Self::frames_to_ms(frames, self.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_tone(path: &Path, duration_ms: u64, sample_rate: u32, channels: u16) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        let frames = duration_ms * u64::from(sample_rate) / 1000;
        for i in 0..frames {
            for _ in 0..channels {
                writer.write_sample(((i % 100) as i16) * 100).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_duration_of_written_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        write_tone(&path, 1250, 16000, 1);
        assert_eq!(WavCodec::default().duration_ms(&path).unwrap(), 1250);
    }

    #[test]
    fn test_duration_of_stereo_file_counts_frames() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        write_tone(&path, 500, 8000, 2);
        assert_eq!(WavCodec::default().duration_ms(&path).unwrap(), 500);
    }

    #[test]
    fn test_duration_of_missing_file_is_codec_error() {
        let result = WavCodec::default().duration_ms(Path::new("/nonexistent/file.wav"));
        assert!(matches!(result, Err(VoxreelError::Codec { .. })));
    }

    #[test]
    fn test_cut_parts_sum_to_original() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.wav");
        let first = dir.path().join("a.wav");
        let second = dir.path().join("b.wav");
        write_tone(&source, 2000, 16000, 1);

        let codec = WavCodec::default();
        let (a, b) = codec.cut(&source, 700, &first, &second).unwrap();
        assert_eq!(a, 700);
        assert_eq!(b, 1300);
        assert_eq!(codec.duration_ms(&first).unwrap(), 700);
        assert_eq!(codec.duration_ms(&second).unwrap(), 1300);
    }

    #[test]
    fn test_cut_outside_media_is_rejected() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.wav");
        write_tone(&source, 1000, 16000, 1);
        let codec = WavCodec::default();

        for at in [0, 1000, 5000] {
            let result = codec.cut(
                &source,
                at,
                &dir.path().join("a.wav"),
                &dir.path().join("b.wav"),
            );
            assert!(matches!(
                result,
                Err(VoxreelError::InvalidSplitPoint { .. })
            ));
        }
    }

    #[test]
    fn test_concat_sums_durations() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        let out = dir.path().join("out.wav");
        write_tone(&a, 300, 16000, 1);
        write_tone(&b, 450, 16000, 1);

        let codec = WavCodec::default();
        assert_eq!(codec.concat(&[a, b], &out).unwrap(), 750);
        assert_eq!(codec.duration_ms(&out).unwrap(), 750);
    }

    #[test]
    fn test_concat_rejects_mixed_formats() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_tone(&a, 100, 16000, 1);
        write_tone(&b, 100, 8000, 1);

        let result = WavCodec::default().concat(&[a, b], &dir.path().join("out.wav"));
        assert!(matches!(result, Err(VoxreelError::Codec { .. })));
    }

    #[test]
    fn test_concat_empty_input_is_error() {
        let dir = TempDir::new().unwrap();
        let result = WavCodec::default().concat(&[], &dir.path().join("out.wav"));
        assert!(result.is_err());
    }

    #[test]
    fn test_silence_has_requested_duration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gap.wav");
        let codec = WavCodec::default();
        assert_eq!(codec.silence(800, &path).unwrap(), 800);
        assert_eq!(codec.duration_ms(&path).unwrap(), 800);
    }
}
