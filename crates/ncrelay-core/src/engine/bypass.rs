//! Bypass engine bundled with the relay.
//!
//! Stands in for the proprietary noise-cancellation library when none is
//! linked: it validates the model reference at construction and passes audio
//! through unchanged. Vendor engines plug in by implementing
//! [`EngineBackend`] instead.

use std::fs;

use super::{EngineBackend, EngineConfig, FrameStats, NoiseEngine, SuppressionLevel};
use crate::{audio::FrameSpec, error::EngineError};

/// Backend producing [`BypassEngine`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct BypassBackend;

impl BypassBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

impl EngineBackend for BypassBackend {
    type Engine = BypassEngine;

    fn init(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn create(&self, config: &EngineConfig) -> Result<Self::Engine, EngineError> {
        config.validate().map_err(|e| EngineError::InvalidConfig(e.to_string()))?;

        let path = config.model.display().to_string();
        let load_error = |e: std::io::Error| EngineError::ModelLoad {
            path: path.clone(),
            reason: e.to_string(),
        };
        // Opening proves the model is readable, not just present
        let metadata = fs::File::open(&config.model)
            .and_then(|model| model.metadata())
            .map_err(load_error)?;
        if !metadata.is_file() {
            return Err(EngineError::ModelLoad { path, reason: "not a regular file".to_string() });
        }

        Ok(BypassEngine::new(config.frame_spec()))
    }

    fn destroy(&self) {}
}

/// Engine that copies each input frame to the output unchanged.
#[derive(Debug, Clone)]
pub struct BypassEngine {
    frame_bytes: usize,
}

impl BypassEngine {
    /// Bypass engine for frames of the given geometry.
    pub fn new(spec: FrameSpec) -> Self {
        Self { frame_bytes: spec.frame_bytes() }
    }
}

impl NoiseEngine for BypassEngine {
    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        _level: SuppressionLevel,
        stats: Option<&mut FrameStats>,
    ) -> Result<(), EngineError> {
        for len in [input.len(), output.len()] {
            if len != self.frame_bytes {
                return Err(EngineError::BufferSize { expected: self.frame_bytes, actual: len });
            }
        }

        output.copy_from_slice(input);
        if let Some(stats) = stats {
            *stats = FrameStats::default();
        }
        Ok(())
    }
}
