mod consts;
mod turn_detection;

pub use consts::{AudioFormat, Voice};
pub use turn_detection::{ServerVadTurnDetection, TurnDetection};

/// Audio data encoded as base64
pub type Base64EncodedAudioBytes = String;
