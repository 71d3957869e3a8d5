//! Stub engine backends.
//!
//! Every backend shares an [`EngineCounters`] with the engines it creates, so
//! tests can check that an engine was constructed for each admitted session
//! and released when the session closed.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use ncrelay_core::{
    EngineBackend, EngineConfig, EngineError, FrameStats, NoiseEngine, SuppressionLevel,
};

/// First byte that makes a [`FailingBackend`] engine reject a frame.
pub const POISON_BYTE: u8 = 0xFF;

/// First byte that makes a [`SlowBackend`] engine block before answering.
pub const SLOW_BYTE: u8 = 0xAB;

/// Lifecycle counters shared by a backend and its engines.
#[derive(Debug, Default)]
pub struct EngineCounters {
    initialized: AtomicBool,
    destroyed: AtomicBool,
    created: AtomicUsize,
    live: AtomicUsize,
    frames: AtomicUsize,
}

impl EngineCounters {
    /// Whether `init` was called.
    pub fn initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Whether `destroy` was called.
    pub fn destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Engines constructed so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    /// Engines constructed and not yet dropped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Frames processed successfully across all engines.
    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::Acquire)
    }

    fn track(self: &Arc<Self>) -> Tracked {
        let index = self.created.fetch_add(1, Ordering::AcqRel);
        self.live.fetch_add(1, Ordering::AcqRel);
        Tracked { counters: Arc::clone(self), index }
    }
}

fn check_buffers(config: &EngineConfig, input: &[u8], output: &[u8]) -> Result<(), EngineError> {
    let expected = config.frame_spec().frame_bytes();
    for actual in [input.len(), output.len()] {
        if actual != expected {
            return Err(EngineError::BufferSize { expected, actual });
        }
    }
    Ok(())
}

/// Keeps `live` accurate for the engine that holds it.
#[derive(Debug)]
struct Tracked {
    counters: Arc<EngineCounters>,
    index: usize,
}

impl Tracked {
    fn frame_done(&self) {
        self.counters.frames.fetch_add(1, Ordering::AcqRel);
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::AcqRel);
    }
}

macro_rules! lifecycle {
    () => {
        fn init(&self) -> Result<(), EngineError> {
            self.counters.initialized.store(true, Ordering::Release);
            Ok(())
        }

        fn destroy(&self) {
            self.counters.destroyed.store(true, Ordering::Release);
        }
    };
}

/// Backend whose engines stamp frames with a per-session marker.
///
/// Output byte 0 is the engine's marker (its creation index, wrapping), byte
/// 1 is the frame index within the session (wrapping), and the rest is the
/// input copied through.
#[derive(Debug, Default)]
pub struct MarkerBackend {
    counters: Arc<EngineCounters>,
}

impl MarkerBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters shared with the engines.
    pub fn counters(&self) -> Arc<EngineCounters> {
        Arc::clone(&self.counters)
    }
}

/// Engine created by [`MarkerBackend`].
#[derive(Debug)]
pub struct MarkerEngine {
    config: EngineConfig,
    marker: u8,
    frame: u8,
    tracked: Tracked,
}

impl EngineBackend for MarkerBackend {
    type Engine = MarkerEngine;

    lifecycle!();

    fn create(&self, config: &EngineConfig) -> Result<Self::Engine, EngineError> {
        let tracked = self.counters.track();
        Ok(MarkerEngine { config: config.clone(), marker: tracked.index as u8, frame: 0, tracked })
    }
}

impl NoiseEngine for MarkerEngine {
    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        _level: SuppressionLevel,
        stats: Option<&mut FrameStats>,
    ) -> Result<(), EngineError> {
        check_buffers(&self.config, input, output)?;

        output.copy_from_slice(input);
        output[0] = self.marker;
        if output.len() > 1 {
            output[1] = self.frame;
        }
        self.frame = self.frame.wrapping_add(1);

        if let Some(stats) = stats {
            *stats = FrameStats { voice_energy: 60, noise_energy: 20 };
        }
        self.tracked.frame_done();
        Ok(())
    }
}

/// Backend that fails construction or fails on poisoned frames.
#[derive(Debug, Default)]
pub struct FailingBackend {
    counters: Arc<EngineCounters>,
    fail_create: AtomicBool,
}

impl FailingBackend {
    /// Engines that pass frames through but reject any frame starting with
    /// [`POISON_BYTE`].
    pub fn poison() -> Self {
        Self::default()
    }

    /// Backend whose `create` fails until [`set_fail_create`] clears it.
    ///
    /// [`set_fail_create`]: Self::set_fail_create
    pub fn failing_create() -> Self {
        Self { fail_create: AtomicBool::new(true), ..Self::default() }
    }

    /// Make subsequent `create` calls fail or succeed.
    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::Release);
    }

    /// Counters shared with the engines.
    pub fn counters(&self) -> Arc<EngineCounters> {
        Arc::clone(&self.counters)
    }
}

/// Engine created by [`FailingBackend`].
#[derive(Debug)]
pub struct PoisonEngine {
    config: EngineConfig,
    tracked: Tracked,
}

impl EngineBackend for FailingBackend {
    type Engine = PoisonEngine;

    lifecycle!();

    fn create(&self, config: &EngineConfig) -> Result<Self::Engine, EngineError> {
        if self.fail_create.load(Ordering::Acquire) {
            return Err(EngineError::ModelLoad {
                path: config.model.display().to_string(),
                reason: "corrupt model".to_string(),
            });
        }
        Ok(PoisonEngine { config: config.clone(), tracked: self.counters.track() })
    }
}

impl NoiseEngine for PoisonEngine {
    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        _level: SuppressionLevel,
        _stats: Option<&mut FrameStats>,
    ) -> Result<(), EngineError> {
        check_buffers(&self.config, input, output)?;
        if input.first() == Some(&POISON_BYTE) {
            return Err(EngineError::Process("poisoned frame".to_string()));
        }

        output.copy_from_slice(input);
        self.tracked.frame_done();
        Ok(())
    }
}

/// Backend whose engines block on frames starting with [`SLOW_BYTE`].
#[derive(Debug)]
pub struct SlowBackend {
    counters: Arc<EngineCounters>,
    delay: Duration,
}

impl SlowBackend {
    /// Block trigger frames for `delay`.
    pub fn new(delay: Duration) -> Self {
        Self { counters: Arc::default(), delay }
    }

    /// Counters shared with the engines.
    pub fn counters(&self) -> Arc<EngineCounters> {
        Arc::clone(&self.counters)
    }
}

/// Engine created by [`SlowBackend`].
#[derive(Debug)]
pub struct SlowEngine {
    config: EngineConfig,
    delay: Duration,
    tracked: Tracked,
}

impl EngineBackend for SlowBackend {
    type Engine = SlowEngine;

    lifecycle!();

    fn create(&self, config: &EngineConfig) -> Result<Self::Engine, EngineError> {
        Ok(SlowEngine { config: config.clone(), delay: self.delay, tracked: self.counters.track() })
    }
}

impl NoiseEngine for SlowEngine {
    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        _level: SuppressionLevel,
        _stats: Option<&mut FrameStats>,
    ) -> Result<(), EngineError> {
        check_buffers(&self.config, input, output)?;
        if input.first() == Some(&SLOW_BYTE) {
            thread::sleep(self.delay);
        }

        output.copy_from_slice(input);
        self.tracked.frame_done();
        Ok(())
    }
}
