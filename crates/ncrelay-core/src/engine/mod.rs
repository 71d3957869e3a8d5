//! Noise-cancellation engine capability.
//!
//! The engine itself is an opaque third-party component. The relay only sees
//! it through two traits: [`EngineBackend`] for the process-wide lifecycle and
//! per-session construction, and [`NoiseEngine`] for the per-frame transform.
//!
//! # Concurrency
//!
//! An engine instance is not safe to enter from two threads at once.
//! [`NoiseEngine::process`] takes `&mut self`, so the borrow checker enforces
//! that every call on one instance is serialized. Instances are `Send` so a
//! session can move its engine onto a blocking worker and get it back.

mod bypass;

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

pub use bypass::{BypassBackend, BypassEngine};

use crate::{
    audio::{FrameDuration, FrameSpec, SampleFormat, SampleRate},
    error::{ConfigError, EngineError},
};

/// Default suppression intensity (full suppression).
pub const DEFAULT_SUPPRESSION_LEVEL: f32 = 100.0;

/// Suppression intensity in the range `0.0..=100.0`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct SuppressionLevel(f32);

impl SuppressionLevel {
    /// Validate and wrap a suppression level.
    pub fn new(level: f32) -> Result<Self, ConfigError> {
        if (0.0..=100.0).contains(&level) {
            Ok(Self(level))
        } else {
            Err(ConfigError::SuppressionOutOfRange(level))
        }
    }

    /// Raw level.
    pub fn get(self) -> f32 {
        self.0
    }
}

impl Default for SuppressionLevel {
    fn default() -> Self {
        Self(DEFAULT_SUPPRESSION_LEVEL)
    }
}

/// Per-frame statistics reported by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Voice energy, range 0-100
    pub voice_energy: u8,
    /// Noise energy, range 0-100
    pub noise_energy: u8,
}

/// Configuration used to construct one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Rate of incoming samples
    pub input_rate: SampleRate,
    /// Processing frame duration
    pub frame_duration: FrameDuration,
    /// Rate of produced samples (must equal `input_rate`)
    pub output_rate: SampleRate,
    /// Sample encoding of both buffers
    pub sample_format: SampleFormat,
    /// Model reference
    pub model: PathBuf,
    /// Whether per-frame statistics are collected
    pub stats_enabled: bool,
}

impl EngineConfig {
    /// Config for `model` with the default frame geometry and stats off.
    pub fn new(model: impl Into<PathBuf>) -> Self {
        let spec = FrameSpec::default();
        Self {
            input_rate: spec.sample_rate,
            frame_duration: spec.frame_duration,
            output_rate: spec.sample_rate,
            sample_format: spec.sample_format,
            model: model.into(),
            stats_enabled: false,
        }
    }

    /// Use a different frame geometry for both input and output.
    #[must_use]
    pub fn with_frame_spec(mut self, spec: FrameSpec) -> Self {
        self.input_rate = spec.sample_rate;
        self.output_rate = spec.sample_rate;
        self.frame_duration = spec.frame_duration;
        self.sample_format = spec.sample_format;
        self
    }

    /// Enable or disable per-frame statistics.
    #[must_use]
    pub fn with_stats(mut self, enabled: bool) -> Self {
        self.stats_enabled = enabled;
        self
    }

    /// Frame geometry of the input side.
    pub fn frame_spec(&self) -> FrameSpec {
        FrameSpec::new(self.input_rate, self.frame_duration, self.sample_format)
    }

    /// Reject configurations that break the frame-size invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.as_os_str().is_empty() {
            return Err(ConfigError::EmptyModelPath);
        }
        if self.input_rate != self.output_rate {
            return Err(ConfigError::RateMismatch {
                input: self.input_rate.hz(),
                output: self.output_rate.hz(),
            });
        }
        Ok(())
    }
}

/// One noise-cancellation instance, exclusively owned by a session.
pub trait NoiseEngine: Send + 'static {
    /// Transform one input frame into one output frame of identical size.
    ///
    /// `stats` is filled when the engine was created with stats enabled.
    ///
    /// # Errors
    ///
    /// - `EngineError::BufferSize` if either buffer is not one frame long
    /// - `EngineError::Process` if the engine fails internally
    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        level: SuppressionLevel,
        stats: Option<&mut FrameStats>,
    ) -> Result<(), EngineError>;
}

/// Process-wide engine library.
///
/// `init` must precede any `create`; `destroy` ends all engine use. Use
/// [`BackendGuard`] to bracket the two.
pub trait EngineBackend: Send + Sync + 'static {
    /// Engine instance produced by [`EngineBackend::create`].
    type Engine: NoiseEngine;

    /// Global initialization.
    fn init(&self) -> Result<(), EngineError>;

    /// Construct one engine instance.
    ///
    /// # Errors
    ///
    /// - `EngineError::ModelLoad` if the model cannot be loaded
    /// - `EngineError::InvalidConfig` if the configuration is rejected
    fn create(&self, config: &EngineConfig) -> Result<Self::Engine, EngineError>;

    /// Global teardown.
    fn destroy(&self);
}

/// Keeps an [`EngineBackend`] initialized for as long as it lives.
///
/// Engines must be created through [`BackendGuard::backend`], which counts
/// every instance alive, including one moved into a running `process` call.
/// `destroy` runs only once that count is zero: either through
/// [`try_destroy`](Self::try_destroy) or when the guard drops. A guard that
/// still sees live engines skips `destroy` rather than tear the library down
/// under them.
pub struct BackendGuard<B: EngineBackend> {
    backend: Arc<TrackedBackend<B>>,
    finished: bool,
}

impl<B: EngineBackend> BackendGuard<B> {
    /// Initialize the backend.
    pub fn init(backend: Arc<B>) -> Result<Self, EngineError> {
        backend.init()?;
        let backend = Arc::new(TrackedBackend { inner: backend, live: Arc::default() });
        Ok(Self { backend, finished: false })
    }

    /// Shared handle that creates counted engines.
    pub fn backend(&self) -> Arc<TrackedBackend<B>> {
        Arc::clone(&self.backend)
    }

    /// Engine instances created and not yet dropped.
    pub fn live_engines(&self) -> usize {
        self.backend.live_engines()
    }

    /// Run `destroy` if no engine is alive.
    ///
    /// # Errors
    ///
    /// Returns the number of live engines when `destroy` was skipped. The
    /// guard will not attempt it again.
    pub fn try_destroy(mut self) -> Result<(), usize> {
        self.finished = true;
        match self.live_engines() {
            0 => {
                self.backend.inner.destroy();
                Ok(())
            },
            live => Err(live),
        }
    }
}

impl<B: EngineBackend> Drop for BackendGuard<B> {
    fn drop(&mut self) {
        if !self.finished && self.live_engines() == 0 {
            self.backend.inner.destroy();
        }
    }
}

/// Backend handed out by [`BackendGuard`]. Counts live engines.
///
/// The lifecycle belongs to the guard, so `init` and `destroy` here do
/// nothing.
pub struct TrackedBackend<B: EngineBackend> {
    inner: Arc<B>,
    live: Arc<AtomicUsize>,
}

impl<B: EngineBackend> TrackedBackend<B> {
    /// Engine instances created and not yet dropped.
    pub fn live_engines(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

impl<B: EngineBackend> EngineBackend for TrackedBackend<B> {
    type Engine = TrackedEngine<B::Engine>;

    fn init(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn create(&self, config: &EngineConfig) -> Result<Self::Engine, EngineError> {
        // Counted before construction so a teardown cannot slip in mid-create
        let lease = EngineLease::acquire(&self.live);
        let engine = self.inner.create(config)?;
        Ok(TrackedEngine { engine, _lease: lease })
    }

    fn destroy(&self) {}
}

/// Engine created by a [`TrackedBackend`].
pub struct TrackedEngine<E> {
    // Declared first: the engine drops before the count is released
    engine: E,
    _lease: EngineLease,
}

impl<E: NoiseEngine> NoiseEngine for TrackedEngine<E> {
    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        level: SuppressionLevel,
        stats: Option<&mut FrameStats>,
    ) -> Result<(), EngineError> {
        self.engine.process(input, output, level, stats)
    }
}

struct EngineLease {
    live: Arc<AtomicUsize>,
}

impl EngineLease {
    fn acquire(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::AcqRel);
        Self { live: Arc::clone(live) }
    }
}

impl Drop for EngineLease {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppression_level_bounds() {
        assert!(SuppressionLevel::new(0.0).is_ok());
        assert!(SuppressionLevel::new(100.0).is_ok());
        assert_eq!(SuppressionLevel::new(100.5), Err(ConfigError::SuppressionOutOfRange(100.5)));
        assert!(SuppressionLevel::new(-1.0).is_err());
        assert!(SuppressionLevel::new(f32::NAN).is_err());
        assert_eq!(SuppressionLevel::default().get(), 100.0);
    }

    #[test]
    fn engine_config_rejects_empty_model() {
        let config = EngineConfig::new("");
        assert_eq!(config.validate(), Err(ConfigError::EmptyModelPath));
    }

    #[test]
    fn engine_config_rejects_rate_change() {
        let mut config = EngineConfig::new("model.kef");
        config.output_rate = SampleRate::Sr8000Hz;
        assert_eq!(
            config.validate(),
            Err(ConfigError::RateMismatch { input: 16000, output: 8000 })
        );
    }

    #[test]
    fn engine_config_frame_spec_follows_builder() {
        let spec =
            FrameSpec::new(SampleRate::Sr48000Hz, FrameDuration::Fd10ms, SampleFormat::Float32);
        let config = EngineConfig::new("model.kef").with_frame_spec(spec).with_stats(true);
        assert_eq!(config.frame_spec(), spec);
        assert_eq!(config.output_rate, SampleRate::Sr48000Hz);
        assert!(config.stats_enabled);
        assert!(config.validate().is_ok());
    }

    #[derive(Default)]
    struct CountingBackend {
        inits: AtomicUsize,
        destroys: AtomicUsize,
    }

    impl EngineBackend for CountingBackend {
        type Engine = BypassEngine;

        fn init(&self) -> Result<(), EngineError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn create(&self, config: &EngineConfig) -> Result<Self::Engine, EngineError> {
            config.validate().map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
            Ok(BypassEngine::new(config.frame_spec()))
        }

        fn destroy(&self) {
            self.destroys.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn backend_guard_brackets_lifecycle() {
        let backend = Arc::new(CountingBackend::default());

        {
            let guard = BackendGuard::init(Arc::clone(&backend)).unwrap();
            assert_eq!(backend.inits.load(Ordering::SeqCst), 1);
            assert_eq!(backend.destroys.load(Ordering::SeqCst), 0);
            let _engine = guard.backend().create(&EngineConfig::new("model.kef")).unwrap();
        }

        assert_eq!(backend.destroys.load(Ordering::SeqCst), 1);
    }

    struct BrokenBackend;

    impl EngineBackend for BrokenBackend {
        type Engine = BypassEngine;

        fn init(&self) -> Result<(), EngineError> {
            Err(EngineError::Init("license expired".to_string()))
        }

        fn create(&self, _config: &EngineConfig) -> Result<Self::Engine, EngineError> {
            Err(EngineError::Create("not initialized".to_string()))
        }

        fn destroy(&self) {
            unreachable!("destroy must not run when init failed");
        }
    }

    #[test]
    fn failed_init_yields_no_guard() {
        let result = BackendGuard::init(Arc::new(BrokenBackend));
        assert!(matches!(result, Err(EngineError::Init(_))));
    }

    #[test]
    fn destroy_waits_for_live_engines() {
        let backend = Arc::new(CountingBackend::default());
        let guard = BackendGuard::init(Arc::clone(&backend)).unwrap();

        let engine = guard.backend().create(&EngineConfig::new("model.kef")).unwrap();
        assert_eq!(guard.live_engines(), 1);
        drop(engine);
        assert_eq!(guard.live_engines(), 0);

        assert_eq!(guard.try_destroy(), Ok(()));
        assert_eq!(backend.destroys.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn destroy_skipped_while_engine_alive() {
        let backend = Arc::new(CountingBackend::default());
        let guard = BackendGuard::init(Arc::clone(&backend)).unwrap();

        let engine = guard.backend().create(&EngineConfig::new("model.kef")).unwrap();
        assert_eq!(guard.try_destroy(), Err(1));
        drop(engine);

        // Not retried once skipped
        assert_eq!(backend.destroys.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropped_guard_skips_destroy_while_engine_alive() {
        let backend = Arc::new(CountingBackend::default());
        let guard = BackendGuard::init(Arc::clone(&backend)).unwrap();
        let engine = guard.backend().create(&EngineConfig::new("model.kef")).unwrap();

        drop(guard);
        assert_eq!(backend.destroys.load(Ordering::SeqCst), 0);
        drop(engine);
    }

    #[test]
    fn failed_create_releases_count() {
        let guard = BackendGuard::init(Arc::new(CountingBackend::default())).unwrap();
        let result = guard.backend().create(&EngineConfig::new(""));

        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
        assert_eq!(guard.live_engines(), 0);
    }
}
