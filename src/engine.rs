use crate::audio::{MediaEvent, MediaHost, PlayOutcome};
use crate::clock::Clock;
use crate::error::PlaybackError;
use crate::events::{EventBus, ListenerId, PlayerEvent};
use crate::model::{PlaybackState, RepeatMode, Track};
use crate::queue::Queue;
use crate::sleep_timer::{SleepTimer, SleepTimerState};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::rc::Rc;
use std::time::Duration;

pub const DEFAULT_VOLUME: f32 = 0.7;
const MIN_PLAYBACK_RATE: f32 = 0.25;
const MAX_PLAYBACK_RATE: f32 = 4.0;

pub type SleepCallback = Box<dyn FnOnce()>;

/// Owns the single media stream, the queue and the sleep timer.
///
/// Work that the host completes later (pending `play()` calls, track end, position updates)
/// and the sleep timer only take effect inside [`PlaybackEngine::tick`] or
/// [`PlaybackEngine::handle_media_event`]. Every `play()` issued to the host carries an
/// attempt id; answers for anything but the latest attempt are dropped.
pub struct PlaybackEngine<H: MediaHost> {
    host: H,
    queue: Queue,
    category: Option<String>,
    state: PlaybackState,
    is_playing: bool,
    attempt: u64,
    announce_on_start: bool,
    source_failed: bool,
    volume: f32,
    playback_rate: f32,
    sleep_timer: SleepTimer<SleepCallback>,
    clock: Rc<dyn Clock>,
    events: EventBus,
    rng: SmallRng,
}

impl<H: MediaHost> PlaybackEngine<H> {
    pub fn new(mut host: H, clock: Rc<dyn Clock>) -> Self {
        host.set_volume(DEFAULT_VOLUME);
        Self {
            host,
            queue: Queue::new(),
            category: None,
            state: PlaybackState::Idle,
            is_playing: false,
            attempt: 0,
            announce_on_start: false,
            source_failed: false,
            volume: DEFAULT_VOLUME,
            playback_rate: 1.0,
            sleep_timer: SleepTimer::new(),
            clock,
            events: EventBus::new(),
            rng: SmallRng::from_os_rng(),
        }
    }

    /// Fixes the shuffle sequence.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&PlayerEvent) + 'static) -> ListenerId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.queue.current()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.queue.current_index()
    }

    pub fn current_category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn position(&self) -> Duration {
        self.host.position()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.host.duration()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn playback_rate(&self) -> f32 {
        self.playback_rate
    }

    pub fn shuffle(&self) -> bool {
        self.queue.shuffle
    }

    pub fn repeat(&self) -> RepeatMode {
        self.queue.repeat
    }

    /// Replaces the queue and starts `tracks[index]`.
    ///
    /// The source is only reloaded when its URL differs from the loaded one. A rejected
    /// `play()` is reported through `playerror` and returned; it is never retried here.
    pub fn load_and_play(
        &mut self,
        tracks: Vec<Track>,
        index: usize,
        category: &str,
    ) -> Result<(), PlaybackError> {
        if tracks.is_empty() {
            self.queue.replace(tracks, 0);
            self.category = None;
            self.halt();
            self.state = PlaybackState::Idle;
            return Ok(());
        }
        let len = tracks.len();
        if !self.queue.replace(tracks, index) {
            return Err(PlaybackError::IndexOutOfRange { index, len });
        }
        self.category = Some(category.to_string());
        self.start_current(true)
    }

    pub fn toggle_play_pause(&mut self) -> Result<(), PlaybackError> {
        if self.is_playing {
            self.host.pause();
            self.state = PlaybackState::Paused;
            self.set_playing(false);
            return Ok(());
        }
        if self.queue.current().is_none() {
            return Err(PlaybackError::NoActiveTrack);
        }
        if self.state == PlaybackState::Ended {
            self.rewind();
        }
        self.start_current(false)
    }

    /// Pauses and rewinds to the start, keeping the queue position.
    pub fn stop(&mut self) {
        self.halt();
        self.rewind();
        self.state = if self.queue.current().is_some() {
            PlaybackState::Paused
        } else {
            PlaybackState::Idle
        };
    }

    pub fn previous(&mut self) -> Option<usize> {
        let index = self.queue.previous_index()?;
        self.jump_to(index);
        Some(index)
    }

    pub fn next(&mut self) -> Option<usize> {
        let index = self.queue.next_index(&mut self.rng)?;
        self.jump_to(index);
        Some(index)
    }

    /// Seeks to `fraction` of the track length. Ignored while the length is unknown.
    pub fn seek(&mut self, fraction: f64) {
        if !fraction.is_finite() {
            return;
        }
        let Some(duration) = self.host.duration() else {
            log::debug!("seek ignored: duration unknown");
            return;
        };
        let target = duration.mul_f64(fraction.clamp(0.0, 1.0));
        if let Err(err) = self.host.set_position(target) {
            log::warn!("seek failed: {err:#}");
            return;
        }
        self.emit_time_update(target);
    }

    pub fn set_volume(&mut self, volume: f32) {
        if !volume.is_finite() {
            return;
        }
        self.volume = volume.clamp(0.0, 1.0);
        self.host.set_volume(self.volume);
    }

    pub fn set_playback_rate(&mut self, rate: f32) {
        if !rate.is_finite() || rate <= 0.0 {
            log::warn!("ignoring playback rate {rate}");
            return;
        }
        self.playback_rate = rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
        self.host.set_playback_rate(self.playback_rate);
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        self.queue.shuffle = !self.queue.shuffle;
        self.queue.shuffle
    }

    /// Cycles `none → all → one → none`; returns whether any repeat is active.
    pub fn toggle_repeat(&mut self) -> bool {
        self.queue.repeat = self.queue.repeat.next();
        self.queue.repeat != RepeatMode::None
    }

    pub fn set_repeat(&mut self, mode: RepeatMode) {
        self.queue.repeat = mode;
    }

    /// Replaces any pending sleep timer. When it fires the engine stops, then runs `on_fire`.
    pub fn set_sleep_timer(&mut self, minutes: f64, on_fire: impl FnOnce() + 'static) -> bool {
        self.sleep_timer
            .set(minutes, self.clock.now(), Box::new(on_fire))
    }

    pub fn cancel_sleep_timer(&mut self) -> bool {
        self.sleep_timer.cancel()
    }

    pub fn sleep_timer_state(&self) -> SleepTimerState {
        self.sleep_timer.state()
    }

    pub fn sleep_timer_remaining(&self) -> Option<Duration> {
        self.sleep_timer.remaining(self.clock.now())
    }

    /// Drains host events, then fires the sleep timer if it is due.
    pub fn tick(&mut self) {
        for event in self.host.poll_events() {
            self.handle_media_event(event);
        }
        if let Some(on_fire) = self.sleep_timer.poll(self.clock.now()) {
            log::info!("sleep timer fired, stopping playback");
            self.stop();
            on_fire();
        }
    }

    pub fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::Playing => {
                if self.state == PlaybackState::Loading || self.queue.current().is_none() {
                    return;
                }
                self.state = PlaybackState::Playing;
                self.set_playing(true);
            }
            MediaEvent::Paused => {
                if self.state == PlaybackState::Playing {
                    self.state = PlaybackState::Paused;
                    self.set_playing(false);
                }
            }
            MediaEvent::Ended => self.on_track_end(),
            MediaEvent::TimeUpdate { position } => self.emit_time_update(position),
            MediaEvent::LoadedMetadata { duration } => {
                self.events.emit(&PlayerEvent::LoadedMetadata {
                    duration: duration.as_secs_f64(),
                });
            }
            MediaEvent::Failed { cause } => {
                self.fail_media(cause);
            }
            MediaEvent::PlayResolved { attempt } => {
                if self.is_current_attempt(attempt) {
                    self.on_started();
                } else {
                    log::debug!("discarding stale play resolution for attempt {attempt}");
                }
            }
            MediaEvent::PlayRejected { attempt, cause } => {
                if self.is_current_attempt(attempt) {
                    self.reject_play(cause);
                } else {
                    log::debug!("discarding stale play rejection for attempt {attempt}: {cause}");
                }
            }
        }
    }

    fn is_current_attempt(&self, attempt: u64) -> bool {
        attempt == self.attempt && self.state == PlaybackState::Loading
    }

    fn jump_to(&mut self, index: usize) {
        if !self.queue.set_current(index) {
            return;
        }
        if let Err(err) = self.start_current(true) {
            log::debug!("track {index} did not start: {err}");
        }
    }

    fn start_current(&mut self, announce: bool) -> Result<(), PlaybackError> {
        let Some(url) = self.queue.current().map(|track| track.url.clone()) else {
            return Err(PlaybackError::NoActiveTrack);
        };

        self.attempt += 1;
        let attempt = self.attempt;
        if self.source_failed || self.host.source() != Some(url.as_str()) {
            if let Err(err) = self.host.set_source(&url) {
                return Err(self.fail_media(format!("{err:#}")));
            }
            self.source_failed = false;
            self.rewind();
        }

        self.state = PlaybackState::Loading;
        self.announce_on_start = announce;
        match self.host.play(attempt) {
            PlayOutcome::Started => {
                self.on_started();
                Ok(())
            }
            PlayOutcome::Pending => Ok(()),
            PlayOutcome::Rejected(cause) => Err(self.reject_play(cause)),
            PlayOutcome::Failed(cause) => Err(self.fail_media(cause)),
        }
    }

    fn on_started(&mut self) {
        self.state = PlaybackState::Playing;
        self.set_playing(true);
        if !std::mem::take(&mut self.announce_on_start) {
            return;
        }
        if let (Some(track), Some(index)) = (self.queue.current(), self.queue.current_index()) {
            let event = PlayerEvent::TrackChange {
                track: track.clone(),
                category: self.category.clone().unwrap_or_default(),
                index,
            };
            log::info!("now playing {}", track.display_name);
            self.events.emit(&event);
        }
    }

    fn reject_play(&mut self, cause: String) -> PlaybackError {
        log::warn!("play() rejected: {cause}");
        self.announce_on_start = false;
        self.state = PlaybackState::Paused;
        self.set_playing(false);
        let err = PlaybackError::AutoplayBlocked(cause);
        self.events.emit(&PlayerEvent::PlayError { cause: err.clone() });
        err
    }

    fn fail_media(&mut self, cause: String) -> PlaybackError {
        log::error!("media error: {cause}");
        self.announce_on_start = false;
        self.source_failed = true;
        self.state = PlaybackState::Error;
        self.set_playing(false);
        let err = PlaybackError::MediaLoad(cause);
        self.events.emit(&PlayerEvent::Error { cause: err.clone() });
        err
    }

    fn on_track_end(&mut self) {
        if self.queue.current().is_none() {
            return;
        }
        if self.queue.repeat == RepeatMode::One {
            self.rewind();
            if let Err(err) = self.start_current(false) {
                log::debug!("repeat did not restart: {err}");
            }
            return;
        }
        if let Some(index) = self.queue.next_index(&mut self.rng) {
            self.jump_to(index);
            return;
        }
        log::info!("queue finished");
        self.state = PlaybackState::Ended;
        self.set_playing(false);
    }

    /// Pauses the host and supersedes any in-flight `play()`.
    fn halt(&mut self) {
        self.attempt += 1;
        self.announce_on_start = false;
        self.host.pause();
        self.set_playing(false);
    }

    fn rewind(&mut self) {
        if let Err(err) = self.host.set_position(Duration::ZERO) {
            log::debug!("rewind skipped: {err:#}");
        }
    }

    fn set_playing(&mut self, playing: bool) {
        if self.is_playing == playing {
            return;
        }
        self.is_playing = playing;
        self.events.emit(&PlayerEvent::StateChange {
            is_playing: playing,
        });
    }

    fn emit_time_update(&mut self, position: Duration) {
        self.events.emit(&PlayerEvent::TimeUpdate {
            current_time: position.as_secs_f64(),
            duration: self.host.duration().map(|d| d.as_secs_f64()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AutoplayPolicy, NullHost};
    use crate::clock::ManualClock;
    use std::cell::{Cell, RefCell};

    fn tracks(names: &[&str]) -> Vec<Track> {
        names
            .iter()
            .map(|name| Track::new("Rain", name, format!("rain/{name}")))
            .collect()
    }

    fn host_for(names: &[&str]) -> NullHost {
        names.iter().fold(NullHost::new(), |host, name| {
            host.with_duration(&format!("rain/{name}"), Duration::from_secs(60))
        })
    }

    type Seen = Rc<RefCell<Vec<PlayerEvent>>>;

    fn engine_with(host: NullHost) -> (PlaybackEngine<NullHost>, ManualClock, Seen) {
        let clock = ManualClock::new(0, 12);
        let mut engine = PlaybackEngine::new(host, Rc::new(clock.clone())).with_seed(42);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        engine.subscribe(move |event| sink.borrow_mut().push(event.clone()));
        (engine, clock, seen)
    }

    fn names(seen: &Seen) -> Vec<&'static str> {
        seen.borrow().iter().map(PlayerEvent::name).collect()
    }

    #[test]
    fn load_and_play_emits_statechange_then_trackchange() {
        let abc = ["a.mp3", "b.mp3", "c.mp3"];
        let (mut engine, _, seen) = engine_with(host_for(&abc));
        engine
            .load_and_play(tracks(&abc), 1, "Rain")
            .expect("play starts");

        assert_eq!(engine.state(), PlaybackState::Playing);
        assert!(engine.is_playing());
        assert_eq!(engine.current_index(), Some(1));
        assert_eq!(engine.current_category(), Some("Rain"));
        assert_eq!(names(&seen), vec!["statechange", "trackchange"]);
        assert!((engine.host().volume() - DEFAULT_VOLUME).abs() < f32::EPSILON);
    }

    #[test]
    fn track_end_advances_then_stops_at_the_last_track() {
        let abc = ["a.mp3", "b.mp3", "c.mp3"];
        let (mut engine, _, _) = engine_with(host_for(&abc));
        engine.load_and_play(tracks(&abc), 0, "Rain").expect("play");

        engine.host_mut().finish_track();
        engine.tick();
        assert_eq!(engine.current_index(), Some(1));
        assert!(engine.is_playing());

        engine.load_and_play(tracks(&abc), 2, "Rain").expect("play last");
        engine.host_mut().finish_track();
        engine.tick();
        assert!(!engine.is_playing());
        assert_eq!(engine.current_index(), Some(2));
        assert_eq!(engine.state(), PlaybackState::Ended);
    }

    #[test]
    fn repeat_one_restarts_the_same_track_from_zero() {
        let ab = ["a.mp3", "b.mp3"];
        let (mut engine, _, seen) = engine_with(host_for(&ab));
        engine.set_repeat(RepeatMode::One);
        engine.load_and_play(tracks(&ab), 0, "Rain").expect("play");
        seen.borrow_mut().clear();

        engine.host_mut().advance(Duration::from_secs(20));
        engine.host_mut().finish_track();
        engine.tick();

        assert_eq!(engine.current_index(), Some(0));
        assert_eq!(engine.position(), Duration::ZERO);
        assert!(engine.is_playing());
        assert!(!names(&seen).contains(&"trackchange"));
    }

    #[test]
    fn same_url_does_not_reload_source() {
        let ab = ["a.mp3", "b.mp3"];
        let (mut engine, _, _) = engine_with(host_for(&ab));
        engine.load_and_play(tracks(&ab), 0, "Rain").expect("first");
        engine.host_mut().advance(Duration::from_secs(5));
        engine.load_and_play(tracks(&ab), 0, "Rain").expect("second");

        assert_eq!(engine.host().source_loads, 1);
        assert_eq!(engine.position(), Duration::from_secs(5));

        engine.load_and_play(tracks(&ab), 1, "Rain").expect("third");
        assert_eq!(engine.host().source_loads, 2);
        assert_eq!(engine.position(), Duration::ZERO);
    }

    #[test]
    fn blocked_play_surfaces_playerror_without_retry() {
        let ab = ["a.mp3", "b.mp3"];
        let (mut engine, _, seen) =
            engine_with(host_for(&ab).with_policy(AutoplayPolicy::Block));
        let err = engine
            .load_and_play(tracks(&ab), 0, "Rain")
            .expect_err("play should be blocked");

        assert!(err.is_autoplay_blocked());
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert_eq!(engine.host().play_calls, 1);
        assert_eq!(names(&seen), vec!["playerror"]);

        engine.host_mut().set_policy(AutoplayPolicy::Allow);
        engine.toggle_play_pause().expect("retry after gesture");
        assert!(engine.is_playing());
    }

    #[test]
    fn superseded_rejection_is_discarded() {
        let ab = ["a.mp3", "b.mp3"];
        let (mut engine, _, seen) =
            engine_with(NullHost::new().with_policy(AutoplayPolicy::Defer));
        engine.load_and_play(tracks(&ab), 0, "Rain").expect("first pending");
        engine.load_and_play(tracks(&ab), 1, "Rain").expect("second pending");
        assert_eq!(engine.host().pending_attempts(), &[1, 2]);

        engine.host_mut().reject(1, "stale");
        engine.host_mut().resolve(2);
        engine.tick();

        assert_eq!(names(&seen), vec!["statechange", "trackchange"]);
        assert_eq!(engine.current_index(), Some(1));
        assert_eq!(engine.state(), PlaybackState::Playing);
    }

    #[test]
    fn current_rejection_after_pending_is_reported() {
        let ab = ["a.mp3"];
        let (mut engine, _, seen) =
            engine_with(NullHost::new().with_policy(AutoplayPolicy::Defer));
        engine.load_and_play(tracks(&ab), 0, "Rain").expect("pending");
        engine.host_mut().reject(1, "needs gesture");
        engine.tick();

        assert_eq!(names(&seen), vec!["playerror"]);
        assert_eq!(engine.state(), PlaybackState::Paused);
    }

    #[test]
    fn media_failure_moves_to_error_and_emits_error() {
        let host = NullHost::new().with_failing_source("rain/bad.mp3");
        let (mut engine, _, seen) = engine_with(host);
        let err = engine
            .load_and_play(tracks(&["bad.mp3"]), 0, "Rain")
            .expect_err("load should fail");

        assert!(matches!(err, PlaybackError::MediaLoad(_)));
        assert_eq!(engine.state(), PlaybackState::Error);
        assert_eq!(names(&seen), vec!["error"]);

        engine.handle_media_event(MediaEvent::Failed {
            cause: String::from("network"),
        });
        assert_eq!(engine.state(), PlaybackState::Error);
    }

    #[test]
    fn failed_source_is_reloaded_after_stop() {
        let host = NullHost::new().with_failing_source("rain/bad.mp3");
        let (mut engine, _, seen) = engine_with(host);
        engine
            .load_and_play(tracks(&["bad.mp3"]), 0, "Rain")
            .expect_err("load should fail");

        engine.stop();
        let err = engine.toggle_play_pause().expect_err("still undecodable");

        assert!(matches!(err, PlaybackError::MediaLoad(_)));
        assert!(!engine.is_playing());
        assert_eq!(engine.state(), PlaybackState::Error);
        assert_eq!(engine.host().source_loads, 2);
        assert_eq!(names(&seen), vec!["error", "error"]);
    }

    #[test]
    fn decode_failure_on_play_is_a_media_error() {
        let host = NullHost::new().with_undecodable_source("rain/a.mp3");
        let (mut engine, _, seen) = engine_with(host);
        let err = engine
            .load_and_play(tracks(&["a.mp3"]), 0, "Rain")
            .expect_err("play should fail");

        assert!(matches!(err, PlaybackError::MediaLoad(_)));
        assert!(!err.is_autoplay_blocked());
        assert_eq!(engine.state(), PlaybackState::Error);
        engine.tick();
        assert_eq!(names(&seen), vec!["error"]);
    }

    #[test]
    fn invalid_index_keeps_queue_and_empty_list_idles() {
        let ab = ["a.mp3", "b.mp3"];
        let (mut engine, _, _) = engine_with(host_for(&ab));
        engine.load_and_play(tracks(&ab), 1, "Rain").expect("play");

        let err = engine
            .load_and_play(tracks(&ab), 9, "Rain")
            .expect_err("out of range");
        assert_eq!(err, PlaybackError::IndexOutOfRange { index: 9, len: 2 });
        assert_eq!(engine.current_index(), Some(1));

        engine.load_and_play(Vec::new(), 0, "Rain").expect("empty");
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert_eq!(engine.current_index(), None);
        assert!(!engine.is_playing());
        assert_eq!(engine.next(), None);
        assert_eq!(
            engine.toggle_play_pause(),
            Err(PlaybackError::NoActiveTrack)
        );
    }

    #[test]
    fn previous_and_next_follow_queue_rules() {
        let abc = ["a.mp3", "b.mp3", "c.mp3"];
        let (mut engine, _, _) = engine_with(host_for(&abc));
        engine.load_and_play(tracks(&abc), 0, "Rain").expect("play");

        assert_eq!(engine.previous(), None);
        assert_eq!(engine.next(), Some(1));
        assert_eq!(engine.next(), Some(2));
        assert_eq!(engine.next(), None);
        assert!(engine.toggle_repeat());
        assert_eq!(engine.repeat(), RepeatMode::All);
        assert_eq!(engine.next(), Some(0));
        assert_eq!(engine.previous(), None);

        assert!(engine.toggle_shuffle());
        for _ in 0..20 {
            let before = engine.current_index();
            let after = engine.next();
            assert_ne!(before, after);
        }
    }

    #[test]
    fn toggle_pause_and_stop() {
        let ab = ["a.mp3", "b.mp3"];
        let (mut engine, _, seen) = engine_with(host_for(&ab));
        engine.load_and_play(tracks(&ab), 0, "Rain").expect("play");
        engine.host_mut().advance(Duration::from_secs(10));

        engine.toggle_play_pause().expect("pause");
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert_eq!(engine.position(), Duration::from_secs(10));

        engine.toggle_play_pause().expect("resume");
        assert!(engine.is_playing());
        assert_eq!(engine.position(), Duration::from_secs(10));

        engine.stop();
        assert!(!engine.is_playing());
        assert_eq!(engine.position(), Duration::ZERO);
        assert_eq!(engine.current_index(), Some(0));

        let changes: Vec<_> = seen
            .borrow()
            .iter()
            .filter_map(|event| match event {
                PlayerEvent::StateChange { is_playing } => Some(*is_playing),
                _ => None,
            })
            .collect();
        assert_eq!(changes, vec![true, false, true, false]);
    }

    #[test]
    fn seek_volume_and_rate_are_clamped() {
        let ab = ["a.mp3"];
        let (mut engine, _, seen) = engine_with(host_for(&ab));
        engine.seek(0.5);
        assert!(seen.borrow().is_empty());

        engine.load_and_play(tracks(&ab), 0, "Rain").expect("play");
        engine.seek(0.5);
        assert_eq!(engine.position(), Duration::from_secs(30));
        engine.seek(4.0);
        assert_eq!(engine.position(), Duration::from_secs(60));
        engine.seek(f64::NAN);
        assert_eq!(engine.position(), Duration::from_secs(60));

        engine.set_volume(1.7);
        assert!((engine.volume() - 1.0).abs() < f32::EPSILON);
        engine.set_volume(-1.0);
        assert_eq!(engine.volume(), 0.0);

        engine.set_playback_rate(1.5);
        assert!((engine.host().playback_rate() - 1.5).abs() < f32::EPSILON);
        engine.set_playback_rate(0.0);
        assert!((engine.playback_rate() - 1.5).abs() < f32::EPSILON);
        engine.set_playback_rate(10.0);
        assert!((engine.playback_rate() - MAX_PLAYBACK_RATE).abs() < f32::EPSILON);
    }

    #[test]
    fn sleep_timer_stops_playback_once() {
        let ab = ["a.mp3", "b.mp3"];
        let (mut engine, clock, _) = engine_with(host_for(&ab));
        engine.load_and_play(tracks(&ab), 0, "Rain").expect("play");

        let fired = Rc::new(Cell::new(0));
        let first = Rc::clone(&fired);
        assert!(engine.set_sleep_timer(1.0, move || first.set(first.get() + 100)));
        let second = Rc::clone(&fired);
        assert!(engine.set_sleep_timer(5.0, move || second.set(second.get() + 1)));

        clock.advance(Duration::from_secs(60));
        engine.tick();
        assert_eq!(fired.get(), 0);
        assert!(engine.is_playing());
        assert_eq!(engine.sleep_timer_remaining(), Some(Duration::from_secs(240)));

        clock.advance(Duration::from_secs(240));
        engine.tick();
        clock.advance(Duration::from_secs(600));
        engine.tick();
        assert_eq!(fired.get(), 1);
        assert!(!engine.is_playing());
        assert_eq!(engine.sleep_timer_state(), SleepTimerState::default());
    }

    #[test]
    fn non_positive_sleep_timer_cancels() {
        let (mut engine, clock, _) = engine_with(NullHost::new());
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        engine.set_sleep_timer(1.0, move || flag.set(true));
        assert!(!engine.set_sleep_timer(0.0, || {}));

        clock.advance(Duration::from_secs(120));
        engine.tick();
        assert!(!fired.get());
        assert!(!engine.cancel_sleep_timer());
    }

    #[test]
    fn timeupdate_carries_position_and_duration() {
        let ab = ["a.mp3"];
        let (mut engine, _, seen) = engine_with(host_for(&ab));
        engine.load_and_play(tracks(&ab), 0, "Rain").expect("play");
        engine.host_mut().advance(Duration::from_secs(3));
        engine.tick();

        let updates: Vec<_> = seen
            .borrow()
            .iter()
            .filter_map(|event| match event {
                PlayerEvent::TimeUpdate {
                    current_time,
                    duration,
                } => Some((*current_time, *duration)),
                _ => None,
            })
            .collect();
        assert_eq!(updates, vec![(3.0, Some(60.0))]);
        assert!(names(&seen).contains(&"loadedmetadata"));
    }
}
