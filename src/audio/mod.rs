pub mod decode;
pub mod device;
pub mod file;
pub mod gain;
pub mod wav;

pub use decode::{decode_clip, ClipContainer};
pub use device::{
    share_capture, share_playback, AudioCaptureDevice, AudioClip, AudioFormat, AudioMode,
    AudioPlaybackDevice, AudioSegment, Permission, PlaybackHandle, SampleEncoding,
    SharedCaptureDevice, SharedPlaybackDevice,
};
pub use file::{AudioFile, FileCaptureDevice};
pub use gain::{apply_gain, AudioSettings, AudioSettingsHandle, MAX_AMPLIFICATION};
pub use wav::{encode_wav, write_wav_file};
