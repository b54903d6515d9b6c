//! Speaker side of a call: inbound audio is decoded and played with
//! supersede-on-arrival.

mod file_sink;
mod router;

pub use file_sink::FilePlaybackDevice;
pub use router::PlaybackRouter;
