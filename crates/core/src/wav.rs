use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use tokio::fs;
use tracing::debug;

use crate::error::{Result, SlidecastError};

/// Shape of raw little-endian PCM audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// What the remote speech API returns: 24kHz mono 16-bit.
    pub const REMOTE: PcmFormat = PcmFormat {
        channels: 1,
        sample_rate: 24_000,
        bits_per_sample: 16,
    };

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    pub fn block_align(&self) -> usize {
        usize::from(self.channels) * self.bytes_per_sample()
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * u32::from(self.channels) * u32::from(self.bits_per_sample) / 8
    }

    fn validate(&self) -> Result<()> {
        if self.channels == 0 || self.sample_rate == 0 {
            return Err(SlidecastError::UnsupportedAudioFormat {
                reason: format!(
                    "{} channel(s) at {} Hz",
                    self.channels, self.sample_rate
                ),
            });
        }
        if !matches!(self.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(SlidecastError::UnsupportedAudioFormat {
                reason: format!("{} bits per sample", self.bits_per_sample),
            });
        }
        Ok(())
    }
}

/// Number of interleaved zero samples in `seconds` of silence.
pub fn silence_samples(format: PcmFormat, seconds: f32) -> u32 {
    let frames = (seconds.max(0.0) * format.sample_rate as f32).round() as u32;
    frames * u32::from(format.channels)
}

/// Write raw PCM as a WAV file, followed by `trailing_silence_secs` of silence.
///
/// Bytes that do not complete a frame are dropped. 8-bit input is unsigned,
/// wider input is signed, as in the WAV format itself.
pub fn write_wav(
    path: &Path,
    pcm: &[u8],
    format: PcmFormat,
    trailing_silence_secs: f32,
) -> Result<()> {
    format.validate()?;

    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.bits_per_sample,
        sample_format: SampleFormat::Int,
    };

    let usable = pcm.len() - pcm.len() % format.block_align();
    if usable < pcm.len() {
        debug!(
            dropped = pcm.len() - usable,
            "PCM data does not end on a frame boundary"
        );
    }

    let mut writer = WavWriter::create(path, spec)?;
    for chunk in pcm[..usable].chunks_exact(format.bytes_per_sample()) {
        writer.write_sample(decode_sample(chunk))?;
    }
    for _ in 0..silence_samples(format, trailing_silence_secs) {
        writer.write_sample(0i32)?;
    }
    writer.finalize()?;

    Ok(())
}

fn decode_sample(bytes: &[u8]) -> i32 {
    match *bytes {
        [b] => i32::from(b) - 128,
        [b0, b1] => i32::from(i16::from_le_bytes([b0, b1])),
        [b0, b1, b2] => i32::from_le_bytes([0, b0, b1, b2]) >> 8,
        [b0, b1, b2, b3] => i32::from_le_bytes([b0, b1, b2, b3]),
        _ => 0,
    }
}

/// Write an already complete audio container byte for byte.
pub async fn write_container(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;
    use tempfile::TempDir;

    fn header_u32(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn header_u16(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
    }

    #[test]
    fn writes_pcm_with_trailing_silence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.wav");
        let samples: Vec<i16> = vec![0, 1000, -1000, i16::MAX, i16::MIN];
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        write_wav(&path, &pcm, PcmFormat::REMOTE, 1.0).unwrap();

        let mut reader = WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 24_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), samples.len() as u32 + 24_000);

        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(&read[..samples.len()], samples.as_slice());
        assert!(read[samples.len()..].iter().all(|&s| s == 0));
    }

    #[test]
    fn header_fields_are_little_endian_pcm() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        let format = PcmFormat {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 16,
        };

        write_wav(&path, &[1, 0, 2, 0, 3, 0, 4, 0], format, 0.0).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(header_u16(&bytes, 20), 1);
        assert_eq!(header_u16(&bytes, 22), 2);
        assert_eq!(header_u32(&bytes, 24), 44_100);
        assert_eq!(header_u32(&bytes, 28), format.byte_rate());
        assert_eq!(header_u32(&bytes, 28), 176_400);
        assert_eq!(header_u16(&bytes, 32), format.block_align() as u16);
        assert_eq!(header_u16(&bytes, 34), 16);

        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 4);
        assert_eq!(reader.duration(), 2);
    }

    #[test]
    fn partial_frames_are_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("odd.wav");

        write_wav(&path, &[1, 0, 2], PcmFormat::REMOTE, 0.5).unwrap();

        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 1 + 12_000);
    }

    #[test]
    fn eight_bit_input_is_unsigned() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("u8.wav");
        let format = PcmFormat {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 8,
        };

        write_wav(&path, &[128, 255, 0], format, 0.0).unwrap();

        let mut reader = WavReader::open(&path).unwrap();
        let read: Vec<i8> = reader.samples::<i8>().map(|s| s.unwrap()).collect();
        assert_eq!(read, vec![0, 127, -128]);
    }

    #[test]
    fn rejects_unsupported_formats() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.wav");
        let format = PcmFormat {
            channels: 1,
            sample_rate: 24_000,
            bits_per_sample: 12,
        };

        let err = write_wav(&path, &[0, 0], format, 0.0).unwrap_err();
        assert!(matches!(err, SlidecastError::UnsupportedAudioFormat { .. }));
    }

    #[test]
    fn silence_scales_with_channels() {
        let stereo = PcmFormat {
            channels: 2,
            ..PcmFormat::REMOTE
        };
        assert_eq!(silence_samples(stereo, 1.0), 48_000);
        assert_eq!(silence_samples(PcmFormat::REMOTE, -3.0), 0);
    }

    #[tokio::test]
    async fn container_bytes_are_written_verbatim() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("local.wav");
        let bytes = b"RIFF....WAVEanything".to_vec();

        write_container(&path, &bytes).await.unwrap();

        assert_eq!(fs::read(&path).await.unwrap(), bytes);
    }
}
