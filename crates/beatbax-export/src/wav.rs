//! WAV export: RIFF/WAVE PCM 16-bit, via `hound`. f32 samples clamp to
//! `-1.0..=1.0` and scale to `i16::MAX`.

use std::path::Path;

use beatbax_core::render::{render_ism, RenderConfig, StereoBuffer};

use crate::error::Result;

/// Render `ism` offline at `cfg.sample_rate` and write it to `path` as a
/// stereo 16-bit PCM WAV file. Returns any non-fatal playback errors
/// encountered while rendering.
pub fn export_wav<P: AsRef<Path>>(ism: &beatbax_lang::Ism, cfg: &RenderConfig, path: P) -> Result<Vec<beatbax_core::PlaybackError>> {
    let (buffer, errors) = render_ism(ism, cfg);
    write_wav_file(path.as_ref(), &buffer, cfg.sample_rate as u32)?;
    Ok(errors)
}

fn write_wav_file(path: &Path, buffer: &StereoBuffer, sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for i in 0..buffer.len() {
        writer.write_sample(to_i16(buffer.left[i]))?;
        writer.write_sample(to_i16(buffer.right[i]))?;
    }
    writer.finalize()?;
    Ok(())
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use beatbax_lang::compile;

    #[test]
    fn writes_a_wav_file_of_the_expected_sample_count() {
        let src = "bpm 120\ninst lead type=pulse1\npat mel = C4 C4\nchannel 1 => inst lead pat mel\nplay";
        let (ism, _) = compile(src, ".").unwrap();
        let cfg = RenderConfig::default();
        let dir = std::env::temp_dir();
        let path = dir.join("beatbax_export_test_output.wav");
        let errors = export_wav(&ism, &cfg, &path).unwrap();
        assert!(errors.is_empty());
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().bits_per_sample, 16);
        std::fs::remove_file(&path).ok();
    }
}
