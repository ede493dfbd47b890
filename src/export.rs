//! Offline rendering to sample buffers and WAV files.

use std::path::Path;

use gme_common::{ChiptunePlayerBase, PlaybackState};
use thiserror::Error;

const CHUNK: usize = 4096;

/// WAV export failure.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The WAV writer failed.
    #[error("WAV write failed: {0}")]
    Wav(#[from] hound::Error),
}

/// Render up to `seconds` of audio, stopping early when the track ends.
pub fn render(player: &mut dyn ChiptunePlayerBase, seconds: f32) -> Vec<f32> {
    let total = (seconds.max(0.0) as f64 * player.sample_rate() as f64) as usize;
    let mut out = Vec::with_capacity(total);
    let mut buffer = vec![0.0f32; CHUNK];
    player.play();
    while out.len() < total && player.state() == PlaybackState::Playing {
        let n = (total - out.len()).min(CHUNK);
        player.generate_samples_into(&mut buffer[..n]);
        out.extend_from_slice(&buffer[..n]);
        if let Some(w) = player.take_warning() {
            log::warn!("{w}");
        }
    }
    // the last chunk is zero-filled past the track end
    if player.state() != PlaybackState::Playing {
        let length = (player.duration_seconds() as f64 * player.sample_rate() as f64).round();
        out.truncate(length as usize);
    }
    out
}

/// Write mono `samples` as 16-bit PCM.
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    samples: &[f32],
    sample_rate: u32,
) -> Result<(), ExportError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    log::debug!(
        "wrote {} samples to {}",
        samples.len(),
        path.as_ref().display()
    );
    Ok(())
}
