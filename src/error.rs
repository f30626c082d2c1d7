use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// Decode or I/O failure reported by the media host.
    #[error("failed to load media: {0}")]
    MediaLoad(String),
    /// The host refused to start playback without a prior user gesture.
    #[error("playback was blocked until the user interacts: {0}")]
    AutoplayBlocked(String),
    #[error("track index {index} is out of range for a queue of {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("no track is loaded")]
    NoActiveTrack,
}

impl PlaybackError {
    pub fn is_autoplay_blocked(&self) -> bool {
        matches!(self, Self::AutoplayBlocked(_))
    }
}
