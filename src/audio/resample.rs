use anyhow::{Context, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::decode::AudioData;

/// Converts a decoded track to the output device rate using rubato.
pub fn resample(audio: AudioData, to_rate: u32) -> Result<AudioData> {
    if audio.sample_rate == to_rate || audio.frames() == 0 {
        return Ok(AudioData {
            sample_rate: to_rate,
            ..audio
        });
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / audio.sample_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        2.0, // max relative ratio
        params,
        audio.frames(),
        audio.channels,
    )
    .context("Failed to create resampler")?;

    let planes = audio.deinterleave();
    let output = resampler
        .process(&planes, None)
        .context("Resampling failed")?;

    log::debug!("Resampled {}Hz -> {}Hz", audio.sample_rate, to_rate);
    Ok(AudioData::from_planes(&output, to_rate))
}
