//! Microphone side of a call: capture fixed-length segments, encode them and
//! hand them to the transport, one after another with no idle gap.

mod segment_loop;

pub use segment_loop::{RecordingConfig, RecordingLoop};
