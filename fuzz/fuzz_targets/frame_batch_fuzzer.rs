//! Fuzz target for FrameProcessor batch validation
//!
//! Feed arbitrary byte buffers through a processor with arbitrary frame
//! geometry.
//!
//! # Invariants
//!
//! - A batch is processed iff it is a positive whole number of frames
//! - Processed output has the same length as the input
//! - A rejected batch leaves the output buffer untouched
//! - Never panics

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use ncrelay_core::{
    BypassEngine, FrameDuration, FrameProcessor, FrameSpec, SampleFormat, SampleRate,
    SuppressionLevel,
};

#[derive(Debug, Arbitrary)]
struct Input {
    rate: u8,
    twenty_ms: bool,
    float: bool,
    output_slack: u8,
    data: Vec<u8>,
}

const RATES: [SampleRate; 8] = [
    SampleRate::Sr8000Hz,
    SampleRate::Sr16000Hz,
    SampleRate::Sr24000Hz,
    SampleRate::Sr32000Hz,
    SampleRate::Sr44100Hz,
    SampleRate::Sr48000Hz,
    SampleRate::Sr88200Hz,
    SampleRate::Sr96000Hz,
];

fuzz_target!(|input: Input| {
    let spec = FrameSpec::new(
        RATES[usize::from(input.rate) % RATES.len()],
        if input.twenty_ms { FrameDuration::Fd20ms } else { FrameDuration::Fd10ms },
        if input.float { SampleFormat::Float32 } else { SampleFormat::Pcm16 },
    );
    let mut processor =
        FrameProcessor::new(BypassEngine::new(spec), spec, SuppressionLevel::default(), true);

    // Mostly equal lengths, sometimes a mismatch
    let slack = usize::from(input.output_slack % 4 == 0) * usize::from(input.output_slack);
    let mut output = vec![0x5Au8; input.data.len() + slack];

    let frame_bytes = spec.frame_bytes();
    let whole = slack == 0 && !input.data.is_empty() && input.data.len() % frame_bytes == 0;

    match processor.process_frames(&input.data, &mut output) {
        Ok(frames) => {
            assert!(whole, "accepted a batch of {} bytes", input.data.len());
            assert_eq!(frames * frame_bytes, input.data.len());
            assert_eq!(output, input.data);
            assert_eq!(processor.energy().map(|e| e.frames), Some(frames as u64));
        },
        Err(_) => {
            assert!(!whole, "rejected a whole batch of {} bytes", input.data.len());
            assert!(output.iter().all(|b| *b == 0x5A), "rejected batch touched output");
        },
    }
});
