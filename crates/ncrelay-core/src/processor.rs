//! Synchronous frame processor.
//!
//! Wraps one engine with its frame geometry and suppression level, and runs
//! whole batches of frames through it. Sessions use it for their single-frame
//! Processing step; in-process callers can hand it arbitrarily long buffers.
//!
//! # Batch sizing
//!
//! A batch must be an exact multiple of the frame size. Trailing bytes that do
//! not form a complete frame cause the whole batch to be rejected up front,
//! before the engine or the output buffer is touched.

use crate::{
    audio::FrameSpec,
    engine::{FrameStats, NoiseEngine, SuppressionLevel},
    error::FrameError,
};

/// Running average of per-frame energies.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergySummary {
    /// Frames that reported stats
    pub frames: u64,
    /// Mean voice energy (0-100)
    pub mean_voice: f64,
    /// Mean noise energy (0-100)
    pub mean_noise: f64,
}

#[derive(Debug, Default)]
struct EnergyTally {
    frames: u64,
    voice: u64,
    noise: u64,
}

impl EnergyTally {
    fn record(&mut self, stats: FrameStats) {
        self.frames += 1;
        self.voice += u64::from(stats.voice_energy);
        self.noise += u64::from(stats.noise_energy);
    }

    fn summary(&self) -> EnergySummary {
        if self.frames == 0 {
            return EnergySummary::default();
        }
        EnergySummary {
            frames: self.frames,
            mean_voice: self.voice as f64 / self.frames as f64,
            mean_noise: self.noise as f64 / self.frames as f64,
        }
    }
}

/// Runs frames through an exclusively owned engine.
pub struct FrameProcessor<E: NoiseEngine> {
    engine: E,
    spec: FrameSpec,
    level: SuppressionLevel,
    tally: Option<EnergyTally>,
}

impl<E: NoiseEngine> FrameProcessor<E> {
    /// Wrap `engine`. With `stats_enabled`, per-frame energies are tallied.
    pub fn new(engine: E, spec: FrameSpec, level: SuppressionLevel, stats_enabled: bool) -> Self {
        Self { engine, spec, level, tally: stats_enabled.then(EnergyTally::default) }
    }

    /// Frame geometry this processor expects.
    pub fn spec(&self) -> FrameSpec {
        self.spec
    }

    /// Bytes in one frame.
    pub fn frame_bytes(&self) -> usize {
        self.spec.frame_bytes()
    }

    /// Average energies so far. `None` if stats are disabled.
    pub fn energy(&self) -> Option<EnergySummary> {
        self.tally.as_ref().map(EnergyTally::summary)
    }

    /// Check that `input`/`output` form a valid batch without processing it.
    ///
    /// Returns the number of frames in the batch.
    pub fn validate(&self, input: usize, output: usize) -> Result<usize, FrameError> {
        let frame_bytes = self.spec.frame_bytes();
        let sample_width = self.spec.sample_width();

        if input != output {
            return Err(FrameError::LengthMismatch { input, output });
        }
        if input % sample_width != 0 {
            return Err(FrameError::UnalignedSamples { len: input, sample_width });
        }
        if input < frame_bytes {
            return Err(FrameError::ShorterThanFrame { len: input, frame_bytes });
        }
        let trailing = input % frame_bytes;
        if trailing != 0 {
            return Err(FrameError::PartialTrailingFrame { len: input, frame_bytes, trailing });
        }

        Ok(input / frame_bytes)
    }

    /// Process every frame of `input` into the matching slot of `output`.
    ///
    /// Returns the number of frames processed. On an engine failure the
    /// frames before the failing one have already been written.
    pub fn process_frames(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize, FrameError> {
        let frames = self.validate(input.len(), output.len())?;
        let frame_bytes = self.spec.frame_bytes();

        for (src, dst) in input.chunks_exact(frame_bytes).zip(output.chunks_exact_mut(frame_bytes)) {
            match self.tally.as_mut() {
                Some(tally) => {
                    let mut stats = FrameStats::default();
                    self.engine.process(src, dst, self.level, Some(&mut stats))?;
                    tally.record(stats);
                },
                None => self.engine.process(src, dst, self.level, None)?,
            }
        }

        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{FrameDuration, SampleFormat, SampleRate},
        engine::BypassEngine,
        error::EngineError,
    };

    /// Inverts every byte and reports fixed energies; fails on frame `fail_at`.
    struct InvertingEngine {
        calls: usize,
        fail_at: Option<usize>,
    }

    impl NoiseEngine for InvertingEngine {
        fn process(
            &mut self,
            input: &[u8],
            output: &mut [u8],
            _level: SuppressionLevel,
            stats: Option<&mut FrameStats>,
        ) -> Result<(), EngineError> {
            if Some(self.calls) == self.fail_at {
                return Err(EngineError::Process("injected".to_string()));
            }
            self.calls += 1;
            for (o, i) in output.iter_mut().zip(input) {
                *o = !i;
            }
            if let Some(stats) = stats {
                *stats = FrameStats { voice_energy: 60, noise_energy: self.calls as u8 * 10 };
            }
            Ok(())
        }
    }

    fn small_spec() -> FrameSpec {
        // 80 samples * 2 bytes = 160 bytes per frame
        FrameSpec::new(SampleRate::Sr8000Hz, FrameDuration::Fd10ms, SampleFormat::Pcm16)
    }

    fn processor(fail_at: Option<usize>, stats: bool) -> FrameProcessor<InvertingEngine> {
        FrameProcessor::new(
            InvertingEngine { calls: 0, fail_at },
            small_spec(),
            SuppressionLevel::default(),
            stats,
        )
    }

    #[test]
    fn processes_every_frame_of_a_batch() {
        let mut p = processor(None, false);
        let input: Vec<u8> = (0..480).map(|i| i as u8).collect();
        let mut output = vec![0u8; 480];

        assert_eq!(p.process_frames(&input, &mut output), Ok(3));
        assert!(input.iter().zip(&output).all(|(i, o)| *o == !*i));
        assert_eq!(p.engine.calls, 3);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let mut p = processor(None, false);
        let result = p.process_frames(&[0u8; 160], &mut [0u8; 320]);
        assert_eq!(result, Err(FrameError::LengthMismatch { input: 160, output: 320 }));
    }

    #[test]
    fn rejects_half_samples() {
        let mut p = processor(None, false);
        let result = p.process_frames(&[0u8; 161], &mut [0u8; 161]);
        assert_eq!(result, Err(FrameError::UnalignedSamples { len: 161, sample_width: 2 }));
    }

    #[test]
    fn rejects_less_than_one_frame() {
        let mut p = processor(None, false);
        let result = p.process_frames(&[0u8; 100], &mut [0u8; 100]);
        assert_eq!(result, Err(FrameError::ShorterThanFrame { len: 100, frame_bytes: 160 }));
    }

    #[test]
    fn rejects_trailing_partial_frame_without_touching_output() {
        let mut p = processor(None, false);
        let input = vec![7u8; 200];
        let mut output = vec![0xAAu8; 200];

        let result = p.process_frames(&input, &mut output);
        assert_eq!(
            result,
            Err(FrameError::PartialTrailingFrame { len: 200, frame_bytes: 160, trailing: 40 })
        );
        assert!(output.iter().all(|b| *b == 0xAA));
        assert_eq!(p.engine.calls, 0);

        // Steady state is intact: a well-sized batch still works afterwards.
        assert_eq!(p.process_frames(&input[..160], &mut output[..160]), Ok(1));
    }

    #[test]
    fn engine_failure_surfaces_after_earlier_frames_written() {
        let mut p = processor(Some(1), false);
        let input = vec![0x0Fu8; 320];
        let mut output = vec![0u8; 320];

        let result = p.process_frames(&input, &mut output);
        assert!(matches!(result, Err(FrameError::Engine(EngineError::Process(_)))));
        assert!(output[..160].iter().all(|b| *b == 0xF0));
        assert!(output[160..].iter().all(|b| *b == 0));
    }

    #[test]
    fn tallies_energy_only_when_enabled() {
        let mut disabled = processor(None, false);
        disabled.process_frames(&[0u8; 160], &mut [0u8; 160]).unwrap();
        assert_eq!(disabled.energy(), None);

        let mut enabled = processor(None, true);
        enabled.process_frames(&[0u8; 320], &mut [0u8; 320]).unwrap();
        let summary = enabled.energy().unwrap();
        assert_eq!(summary.frames, 2);
        assert!((summary.mean_voice - 60.0).abs() < f64::EPSILON);
        assert!((summary.mean_noise - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bypass_engine_keeps_frame_length() {
        let spec = FrameSpec::default();
        let mut p =
            FrameProcessor::new(BypassEngine::new(spec), spec, SuppressionLevel::default(), false);
        let input = vec![3u8; spec.frame_bytes() * 4];
        let mut output = vec![0u8; input.len()];

        assert_eq!(p.process_frames(&input, &mut output), Ok(4));
        assert_eq!(input, output);
    }
}
