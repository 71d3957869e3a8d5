//! Noise-cancellation relay binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on port 9000 with the given model at full suppression
//! ncrelay-server 9000 models/c6.kef
//!
//! # Half suppression, 32 sessions, 30 second drain, float samples at 48 kHz
//! ncrelay-server 9000 models/c6.kef 50 32 30 --sample-rate 48000 --sample-format float32
//! ```

use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use clap::{Parser, ValueEnum};
use ncrelay_core::{
    BackendGuard, BypassBackend, ConfigError, DrainOutcome, EngineConfig, FrameDuration,
    FrameSpec, SampleFormat, SampleRate, SuppressionLevel,
};
use ncrelay_server::{
    DEFAULT_ENGINE_THREADS, DEFAULT_STOP_GRACE, EngineDispatch, ExecutionPool, PoolConfig,
    RelayConfig, Server, ServerError,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Pcm16,
    Float32,
}

impl From<FormatArg> for SampleFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Pcm16 => SampleFormat::Pcm16,
            FormatArg::Float32 => SampleFormat::Float32,
        }
    }
}

/// Noise-cancellation relay server
#[derive(Parser, Debug)]
#[command(name = "ncrelay-server")]
#[command(about = "Streams audio frames through a noise-cancellation engine over TCP")]
#[command(version)]
struct Args {
    /// TCP port to listen on
    port: u16,

    /// Path to the engine model
    model_path: PathBuf,

    /// Noise suppression level (0-100)
    #[arg(default_value_t = 100.0)]
    noise_suppression_level: f32,

    /// Maximum concurrent connections
    #[arg(default_value_t = 10)]
    max_connections: usize,

    /// Seconds to wait for open sessions after a termination signal
    #[arg(default_value_t = 120)]
    shutdown_timeout_seconds: u64,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Input and output sample rate in Hz
    #[arg(long, default_value_t = 16000)]
    sample_rate: u32,

    /// Frame duration in milliseconds (10 or 20)
    #[arg(long, default_value_t = 20)]
    frame_ms: u32,

    /// Sample encoding on the wire
    #[arg(long, value_enum, default_value_t = FormatArg::Pcm16)]
    sample_format: FormatArg,

    /// Collect per-frame voice/noise energy and log averages on close
    #[arg(long)]
    stats: bool,

    /// Run engine calls on the I/O workers instead of the engine pool
    #[arg(long)]
    inline_engine: bool,

    /// Async worker threads (default: one per core, at least two)
    #[arg(long)]
    workers: Option<usize>,

    /// Maximum threads running engine calls
    #[arg(long, default_value_t = DEFAULT_ENGINE_THREADS)]
    engine_threads: usize,

    /// Milliseconds to wait for engine calls still running after a forced stop
    #[arg(long, default_value_t = DEFAULT_STOP_GRACE.as_millis() as u64)]
    stop_grace_ms: u64,

    /// Interval between drain checks in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn bind_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    fn relay_config(&self) -> Result<RelayConfig, ConfigError> {
        let spec = FrameSpec::new(
            SampleRate::from_hz(self.sample_rate)?,
            FrameDuration::from_millis(self.frame_ms)?,
            self.sample_format.into(),
        );
        let engine = EngineConfig::new(&self.model_path).with_frame_spec(spec).with_stats(self.stats);

        let mut config = RelayConfig::new(self.bind_address(), engine);
        config.max_connections = self.max_connections;
        config.shutdown_timeout = Duration::from_secs(self.shutdown_timeout_seconds);
        config.poll_interval = Duration::from_millis(self.poll_interval_ms);
        config.session.suppression = SuppressionLevel::new(self.noise_suppression_level)?;
        config.session.dispatch =
            if self.inline_engine { EngineDispatch::Inline } else { EngineDispatch::Offload };

        config.validate()?;
        Ok(config)
    }

    fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers,
            engine_threads: self.engine_threads,
            stop_grace: Duration::from_millis(self.stop_grace_ms),
        }
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = u8::from(e.use_stderr());
            let _ = e.print();
            return ExitCode::from(code);
        },
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        },
    }
}

fn run(args: &Args) -> Result<(), ServerError> {
    let config = args.relay_config()?;
    let pool = ExecutionPool::new(&args.pool_config())
        .map_err(|e| ServerError::Transport(format!("failed to start runtime: {e}")))?;

    tracing::info!("Noise-cancellation relay starting");
    tracing::info!(
        "Model {}, suppression {}, {} workers, engine calls {:?}",
        args.model_path.display(),
        config.session.suppression.get(),
        pool.workers(),
        config.session.dispatch
    );

    let engine = BackendGuard::init(Arc::new(BypassBackend::new()))?;
    let backend = engine.backend();

    let outcome = pool.run(async move {
        let server = Server::bind(config, backend).await?;
        tracing::info!("Server listening on {}", server.local_addr()?);
        server.run().await
    })?;

    if let Err(live) = engine.try_destroy() {
        tracing::error!("Engine teardown skipped: {} instances still in use", live);
    }

    match outcome {
        DrainOutcome::Graceful => tracing::info!("Relay stopped"),
        DrainOutcome::Forced { abandoned } => {
            tracing::warn!("Relay stopped with {} sessions abandoned", abandoned);
        },
    }
    Ok(())
}
