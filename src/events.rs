use crate::error::PlaybackError;
use crate::model::Track;

/// Everything the engine reports to its listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    StateChange {
        is_playing: bool,
    },
    TrackChange {
        track: Track,
        category: String,
        index: usize,
    },
    /// Seconds since the start of the current track, and its length if known.
    TimeUpdate {
        current_time: f64,
        duration: Option<f64>,
    },
    LoadedMetadata {
        duration: f64,
    },
    Error {
        cause: PlaybackError,
    },
    PlayError {
        cause: PlaybackError,
    },
}

impl PlayerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StateChange { .. } => "statechange",
            Self::TrackChange { .. } => "trackchange",
            Self::TimeUpdate { .. } => "timeupdate",
            Self::LoadedMetadata { .. } => "loadedmetadata",
            Self::Error { .. } => "error",
            Self::PlayError { .. } => "playerror",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&PlayerEvent)>;

#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(ListenerId, Listener)>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&PlayerEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Delivers `event` to every listener in subscription order.
    pub fn emit(&mut self, event: &PlayerEvent) {
        log::trace!("emit {}", event.name());
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }
}
