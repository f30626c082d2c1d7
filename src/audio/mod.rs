use crate::gate::AutoplayProbe;
use anyhow::{Context, Result};
use rodio::Source;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use std::collections::{HashMap, HashSet, VecDeque};
#[cfg(unix)]
use std::ffi::CString;
use std::fs::File;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const TIME_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

/// Result of asking the host to start playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Started,
    /// The host answers later with `PlayResolved` or `PlayRejected` for the same attempt.
    Pending,
    /// Refused by the platform policy; a user gesture may unblock it.
    Rejected(String),
    /// The source could not be opened or decoded.
    Failed(String),
}

/// Notifications raised by the host media API, drained through [`MediaHost::poll_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    Playing,
    Paused,
    Ended,
    TimeUpdate { position: Duration },
    LoadedMetadata { duration: Duration },
    Failed { cause: String },
    PlayResolved { attempt: u64 },
    PlayRejected { attempt: u64, cause: String },
}

/// The single media element the engine drives.
pub trait MediaHost {
    fn set_source(&mut self, url: &str) -> Result<()>;
    fn source(&self) -> Option<&str>;
    fn play(&mut self, attempt: u64) -> PlayOutcome;
    fn pause(&mut self);
    fn position(&self) -> Duration;
    fn set_position(&mut self, position: Duration) -> Result<()>;
    fn duration(&self) -> Option<Duration>;
    fn set_volume(&mut self, volume: f32);
    fn set_playback_rate(&mut self, rate: f32);
    fn poll_events(&mut self) -> Vec<MediaEvent>;

    /// The user performed a qualifying gesture; hosts that block autoplay may lift it.
    fn user_activated(&mut self) {}
}

pub struct RodioHost {
    stream: OutputStream,
    sink: Sink,
    source: Option<String>,
    path: Option<PathBuf>,
    track_duration: Option<Duration>,
    volume: f32,
    rate: f32,
    events: VecDeque<MediaEvent>,
    last_time_update: Option<Instant>,
    ended_reported: bool,
}

impl RodioHost {
    pub fn new() -> Result<Self> {
        let stream = open_output_stream()?;
        let sink = Sink::connect_new(stream.mixer());
        Ok(Self {
            stream,
            sink,
            source: None,
            path: None,
            track_duration: None,
            volume: 1.0,
            rate: 1.0,
            events: VecDeque::new(),
            last_time_update: None,
            ended_reported: false,
        })
    }

    fn load_sink(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Err(anyhow::anyhow!("no source set"));
        };
        let file =
            File::open(&path).with_context(|| format!("failed to open track {}", path.display()))?;
        let decoded = Decoder::try_from(file)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        self.track_duration = decoded.total_duration().filter(|d| !d.is_zero());

        self.sink.stop();
        self.sink = Sink::connect_new(self.stream.mixer());
        self.sink.pause();
        self.sink.append(decoded);
        self.sink.set_volume(self.volume);
        self.sink.set_speed(self.rate);
        self.ended_reported = false;
        Ok(())
    }
}

impl MediaHost for RodioHost {
    fn set_source(&mut self, url: &str) -> Result<()> {
        self.path = Some(PathBuf::from(url));
        self.source = Some(url.to_string());
        if let Err(err) = self.load_sink() {
            self.track_duration = None;
            return Err(err);
        }
        if let Some(duration) = self.track_duration {
            self.events.push_back(MediaEvent::LoadedMetadata { duration });
        }
        Ok(())
    }

    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn play(&mut self, _attempt: u64) -> PlayOutcome {
        if self.path.is_none() {
            return PlayOutcome::Failed(String::from("no source set"));
        }
        if self.sink.empty()
            && let Err(err) = self.load_sink()
        {
            return PlayOutcome::Failed(format!("{err:#}"));
        }
        self.sink.play();
        self.events.push_back(MediaEvent::Playing);
        PlayOutcome::Started
    }

    fn pause(&mut self) {
        if !self.sink.is_paused() {
            self.sink.pause();
            self.events.push_back(MediaEvent::Paused);
        }
    }

    fn position(&self) -> Duration {
        if self.path.is_none() {
            return Duration::ZERO;
        }
        self.sink.get_pos()
    }

    fn set_position(&mut self, position: Duration) -> Result<()> {
        if self.path.is_none() {
            return Err(anyhow::anyhow!("no active track"));
        }
        if self.sink.empty() {
            self.load_sink()?;
        }
        self.sink
            .try_seek(position)
            .map_err(|err| anyhow::anyhow!("failed to seek current track: {err:?}"))?;
        Ok(())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.sink.set_volume(self.volume);
    }

    fn set_playback_rate(&mut self, rate: f32) {
        self.rate = rate;
        self.sink.set_speed(rate);
    }

    fn poll_events(&mut self) -> Vec<MediaEvent> {
        let playing = self.path.is_some() && !self.sink.is_paused();
        if playing && self.sink.empty() && !self.ended_reported {
            self.ended_reported = true;
            self.sink.pause();
            self.events.push_back(MediaEvent::Ended);
        } else if playing
            && self
                .last_time_update
                .is_none_or(|at| at.elapsed() >= TIME_UPDATE_INTERVAL)
        {
            self.last_time_update = Some(Instant::now());
            self.events.push_back(MediaEvent::TimeUpdate {
                position: self.sink.get_pos(),
            });
        }
        self.events.drain(..).collect()
    }
}

impl AutoplayProbe for RodioHost {
    fn probe_autoplay(&mut self) -> bool {
        // Desktop output devices apply no gesture policy once the stream is open.
        log::debug!("autoplay probe: output stream open, playback allowed");
        true
    }
}

fn open_output_stream() -> Result<OutputStream> {
    let mut stream = with_silenced_stderr(|| {
        let default_err = match OutputStreamBuilder::from_default_device()
            .context("failed to open default system output stream")
            .and_then(|builder| {
                builder
                    .with_error_callback(|_| {})
                    .open_stream_or_fallback()
                    .context("failed to start default output stream")
            }) {
            Ok(stream) => return Ok(stream),
            Err(err) => err,
        };

        let host = rodio::cpal::default_host();
        let devices = host
            .output_devices()
            .context("failed to enumerate output devices")?;
        for device in devices {
            let name = device.name().unwrap_or_default();
            let opened = OutputStreamBuilder::from_device(device)
                .context("failed to open fallback output device")
                .and_then(|builder| {
                    builder
                        .with_error_callback(|_| {})
                        .open_stream_or_fallback()
                        .context("failed to start fallback output stream")
                });
            match opened {
                Ok(stream) => {
                    log::info!("using fallback audio output {name}");
                    return Ok(stream);
                }
                Err(err) => log::debug!("output {name} unavailable: {err:#}"),
            }
        }

        Err(anyhow::anyhow!(
            "unable to start any audio output stream after default failed: {default_err:#}"
        ))
    })?;
    stream.log_on_drop(false);
    Ok(stream)
}

#[cfg(unix)]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved < 0 {
        return operation();
    }

    let devnull = CString::new("/dev/null")
        .ok()
        .map(|path| unsafe { libc::open(path.as_ptr(), libc::O_WRONLY) })
        .unwrap_or(-1);

    if devnull >= 0 {
        unsafe {
            libc::dup2(devnull, libc::STDERR_FILENO);
            libc::close(devnull);
        }
    }

    let result = operation();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }

    result
}

#[cfg(not(unix))]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    operation()
}

/// How [`NullHost`] answers `play` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoplayPolicy {
    #[default]
    Allow,
    Block,
    /// Leave every attempt pending until the test settles it.
    Defer,
}

/// Silent host with a hand-driven position. Used by tests and `--null-audio`.
#[derive(Debug, Default)]
pub struct NullHost {
    source: Option<String>,
    paused: bool,
    position: Duration,
    track_duration: Option<Duration>,
    durations: HashMap<String, Duration>,
    failing: HashSet<String>,
    undecodable: HashSet<String>,
    volume: f32,
    rate: f32,
    policy: AutoplayPolicy,
    events: Vec<MediaEvent>,
    pending: Vec<u64>,
    pub source_loads: usize,
    pub play_calls: usize,
    pub probe_count: usize,
}

impl NullHost {
    pub fn new() -> Self {
        Self {
            paused: true,
            volume: 1.0,
            rate: 1.0,
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, policy: AutoplayPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_duration(mut self, url: &str, duration: Duration) -> Self {
        self.durations.insert(url.to_string(), duration);
        self
    }

    pub fn with_failing_source(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    /// `url` loads, but every `play` of it fails to decode.
    pub fn with_undecodable_source(mut self, url: &str) -> Self {
        self.undecodable.insert(url.to_string());
        self
    }

    pub fn set_policy(&mut self, policy: AutoplayPolicy) {
        self.policy = policy;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn playback_rate(&self) -> f32 {
        self.rate
    }

    pub fn pending_attempts(&self) -> &[u64] {
        &self.pending
    }

    pub fn push_event(&mut self, event: MediaEvent) {
        self.events.push(event);
    }

    /// Moves the playhead forward while playing and reports it.
    pub fn advance(&mut self, by: Duration) {
        if self.paused || self.source.is_none() {
            return;
        }
        self.position += by;
        if let Some(duration) = self.track_duration {
            self.position = self.position.min(duration);
        }
        self.events.push(MediaEvent::TimeUpdate {
            position: self.position,
        });
    }

    /// Plays out the current track.
    pub fn finish_track(&mut self) {
        if let Some(duration) = self.track_duration {
            self.position = duration;
        }
        self.paused = true;
        self.events.push(MediaEvent::Ended);
    }

    pub fn resolve(&mut self, attempt: u64) {
        self.pending.retain(|pending| *pending != attempt);
        self.paused = false;
        self.events.push(MediaEvent::PlayResolved { attempt });
        self.events.push(MediaEvent::Playing);
    }

    pub fn reject(&mut self, attempt: u64, cause: &str) {
        self.pending.retain(|pending| *pending != attempt);
        self.events.push(MediaEvent::PlayRejected {
            attempt,
            cause: cause.to_string(),
        });
    }
}

impl MediaHost for NullHost {
    fn set_source(&mut self, url: &str) -> Result<()> {
        self.source_loads += 1;
        self.source = Some(url.to_string());
        self.position = Duration::ZERO;
        self.paused = true;
        if self.failing.contains(url) {
            self.track_duration = None;
            return Err(anyhow::anyhow!("failed to decode {url}"));
        }
        self.track_duration = self.durations.get(url).copied();
        if let Some(duration) = self.track_duration {
            self.events.push(MediaEvent::LoadedMetadata { duration });
        }
        Ok(())
    }

    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn play(&mut self, attempt: u64) -> PlayOutcome {
        self.play_calls += 1;
        let Some(source) = self.source.as_deref() else {
            return PlayOutcome::Failed(String::from("no source set"));
        };
        if self.undecodable.contains(source) {
            return PlayOutcome::Failed(format!("failed to decode {source}"));
        }
        if self
            .track_duration
            .is_some_and(|duration| self.position >= duration)
        {
            self.position = Duration::ZERO;
        }
        match self.policy {
            AutoplayPolicy::Allow => {
                if self.paused {
                    self.paused = false;
                    self.events.push(MediaEvent::Playing);
                }
                PlayOutcome::Started
            }
            AutoplayPolicy::Block => {
                PlayOutcome::Rejected(String::from("play() requires a user gesture"))
            }
            AutoplayPolicy::Defer => {
                self.pending.push(attempt);
                PlayOutcome::Pending
            }
        }
    }

    fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            self.events.push(MediaEvent::Paused);
        }
    }

    fn position(&self) -> Duration {
        self.position
    }

    fn set_position(&mut self, position: Duration) -> Result<()> {
        if self.source.is_none() {
            return Err(anyhow::anyhow!("no active track"));
        }
        self.position = self
            .track_duration
            .map_or(position, |duration| position.min(duration));
        Ok(())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    fn set_playback_rate(&mut self, rate: f32) {
        self.rate = rate;
    }

    fn poll_events(&mut self) -> Vec<MediaEvent> {
        std::mem::take(&mut self.events)
    }

    fn user_activated(&mut self) {
        if self.policy == AutoplayPolicy::Block {
            self.policy = AutoplayPolicy::Allow;
        }
    }
}

impl AutoplayProbe for NullHost {
    fn probe_autoplay(&mut self) -> bool {
        self.probe_count += 1;
        self.policy != AutoplayPolicy::Block
    }
}
