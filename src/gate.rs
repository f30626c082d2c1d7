use crate::storage::KeyValueStore;
use anyhow::Result;

pub const INTERACTION_FLAG_KEY: &str = "interaction-flag";

/// Host capability to test whether playback may start without a gesture.
pub trait AutoplayProbe {
    fn probe_autoplay(&mut self) -> bool;
}

/// Host affordance that blocks until the user performs a qualifying gesture.
pub trait GestureSource {
    fn request_user_gesture(&mut self) -> Result<()>;
}

/// Grants immediately. For non-interactive hosts and tests.
#[derive(Debug, Default)]
pub struct AutoGrant {
    pub requests: usize,
}

impl GestureSource for AutoGrant {
    fn request_user_gesture(&mut self) -> Result<()> {
        self.requests += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InteractionState {
    pub has_interacted: bool,
    pub autoplay_allowed: Option<bool>,
}

pub struct InteractionGate<S> {
    store: S,
    state: InteractionState,
}

impl<S: KeyValueStore> InteractionGate<S> {
    /// Restores `has_interacted` from the store. An unreadable flag counts as no interaction.
    pub fn new(store: S) -> Self {
        let has_interacted = match store.get(INTERACTION_FLAG_KEY) {
            Ok(Some(raw)) => serde_json::from_str::<bool>(&raw).unwrap_or_else(|err| {
                log::warn!("ignoring malformed {INTERACTION_FLAG_KEY}: {err}");
                false
            }),
            Ok(None) => false,
            Err(err) => {
                log::warn!("failed to read {INTERACTION_FLAG_KEY}: {err:#}");
                false
            }
        };
        Self {
            store,
            state: InteractionState {
                has_interacted,
                autoplay_allowed: None,
            },
        }
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn has_interacted(&self) -> bool {
        self.state.has_interacted
    }

    /// Probes the host once; later calls return the remembered answer.
    pub fn detect_autoplay(&mut self, probe: &mut dyn AutoplayProbe) -> bool {
        if let Some(allowed) = self.state.autoplay_allowed {
            return allowed;
        }
        let allowed = probe.probe_autoplay();
        log::info!("autoplay allowed: {allowed}");
        self.state.autoplay_allowed = Some(allowed);
        allowed
    }

    /// Returns at once if the user already interacted, otherwise blocks on `gestures`.
    pub fn wait_for_interaction(&mut self, gestures: &mut dyn GestureSource) -> Result<()> {
        if self.state.has_interacted {
            return Ok(());
        }
        gestures.request_user_gesture()?;
        self.mark_interacted();
        Ok(())
    }

    pub fn mark_interacted(&mut self) {
        if self.state.has_interacted {
            return;
        }
        self.state.has_interacted = true;
        if let Err(err) = self.store.set(INTERACTION_FLAG_KEY, "true") {
            log::warn!("failed to persist {INTERACTION_FLAG_KEY}: {err:#}");
        }
    }

    /// Forgets both the probe result and the persisted flag.
    pub fn reset(&mut self) {
        self.state = InteractionState::default();
        if let Err(err) = self.store.remove(INTERACTION_FLAG_KEY) {
            log::warn!("failed to clear {INTERACTION_FLAG_KEY}: {err:#}");
        }
    }
}
