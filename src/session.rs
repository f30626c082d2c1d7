use crate::audio::MediaHost;
use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::engine::PlaybackEngine;
use crate::error::PlaybackError;
use crate::gate::{AutoplayProbe, GestureSource, InteractionGate};
use crate::model::Track;
use crate::recommend::{Recommendation, Recommender};
use crate::storage::KeyValueStore;
use crate::usage::{UsageLimits, UsageRecorder, UsageStore};
use anyhow::Result;
use std::cell::RefCell;
use std::rc::Rc;

/// One listening session: the engine wired to usage recording, the interaction gate and
/// the recommender, all sharing a single store and clock.
pub struct Session<H: MediaHost, S> {
    engine: PlaybackEngine<H>,
    catalog: Rc<Catalog>,
    usage: Rc<UsageStore<S>>,
    recorder: Rc<RefCell<UsageRecorder<S>>>,
    gate: InteractionGate<S>,
    recommender: Recommender<S>,
}

impl<H: MediaHost, S: KeyValueStore + Clone + 'static> Session<H, S> {
    pub fn new(
        host: H,
        store: S,
        catalog: Catalog,
        config: &SessionConfig,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let catalog = Rc::new(catalog);
        let usage = Rc::new(UsageStore::new(
            store.clone(),
            UsageLimits::from(config),
            Rc::clone(&clock),
        ));
        let recorder = Rc::new(RefCell::new(UsageRecorder::new(Rc::clone(&usage))));

        let mut engine = PlaybackEngine::new(host, Rc::clone(&clock));
        engine.set_volume(config.default_volume);
        let listener = Rc::clone(&recorder);
        engine.subscribe(move |event| listener.borrow_mut().handle(event));

        let recommender = Recommender::new(Rc::clone(&usage), Rc::clone(&catalog), clock);
        Self {
            engine,
            catalog,
            usage,
            recorder,
            gate: InteractionGate::new(store),
            recommender,
        }
    }

    /// Fixes both the shuffle and the recommendation sequences.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.engine = self.engine.with_seed(seed);
        self.recommender = self.recommender.with_seed(seed.wrapping_add(1));
        self
    }

    pub fn engine(&self) -> &PlaybackEngine<H> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut PlaybackEngine<H> {
        &mut self.engine
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn usage(&self) -> &UsageStore<S> {
        &self.usage
    }

    pub fn gate(&self) -> &InteractionGate<S> {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut InteractionGate<S> {
        &mut self.gate
    }

    /// Queues every track of `category_id` and starts the one at `index`.
    pub fn play_category(&mut self, category_id: &str, index: usize) -> Result<(), PlaybackError> {
        let tracks = self.catalog.tracks_for(category_id);
        self.engine.load_and_play(tracks, index, category_id)
    }

    /// Like [`Session::play_category`], but asks `gestures` for an interaction and retries
    /// once when the host blocks autoplay.
    pub fn play_category_gated(
        &mut self,
        category_id: &str,
        index: usize,
        gestures: &mut dyn GestureSource,
    ) -> Result<()> {
        let tracks = self.catalog.tracks_for(category_id);
        self.play_gated(tracks, index, category_id, gestures)
    }

    pub fn play_gated(
        &mut self,
        tracks: Vec<Track>,
        index: usize,
        category_id: &str,
        gestures: &mut dyn GestureSource,
    ) -> Result<()> {
        match self.engine.load_and_play(tracks.clone(), index, category_id) {
            Ok(()) => Ok(()),
            Err(err) if err.is_autoplay_blocked() => {
                log::info!("waiting for a user gesture before playing {category_id}");
                self.gate.wait_for_interaction(gestures)?;
                self.engine.host_mut().user_activated();
                self.engine.load_and_play(tracks, index, category_id)?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn recommendations(&mut self, count: usize) -> Vec<Recommendation> {
        self.recommender.recommendations(count)
    }

    pub fn tick(&mut self) {
        self.engine.tick();
    }

    /// Writes the listening time of the current track to the statistics.
    pub fn flush_usage(&mut self) {
        self.recorder.borrow_mut().flush();
    }
}

impl<H: MediaHost + AutoplayProbe, S: KeyValueStore + Clone + 'static> Session<H, S> {
    pub fn detect_autoplay(&mut self) -> bool {
        self.gate.detect_autoplay(self.engine.host_mut())
    }
}
