#![no_main]

use libfuzzer_sys::fuzz_target;
use lull::audio::{AutoplayPolicy, NullHost};
use lull::clock::ManualClock;
use lull::engine::PlaybackEngine;
use lull::model::{PlaybackState, Track};
use std::rc::Rc;
use std::time::Duration;

fuzz_target!(|data: &[u8]| {
    let Some((&first, rest)) = data.split_first() else {
        return;
    };
    let len = usize::from(first % 16).max(1);
    let tracks: Vec<Track> = (0..len)
        .map(|idx| {
            let file = format!("track_{idx}.mp3");
            let url = format!("mem://{file}");
            Track::new("fuzz", &file, url)
        })
        .collect();

    let mut host = NullHost::new().with_policy(AutoplayPolicy::Defer);
    for track in &tracks {
        host = host.with_duration(&track.url, Duration::from_secs(3));
    }
    let clock = ManualClock::new(0, 12);
    let mut engine = PlaybackEngine::new(host, Rc::new(clock.clone())).with_seed(u64::from(first));
    let _ = engine.load_and_play(tracks, 0, "fuzz");

    for byte in rest {
        match byte % 12 {
            0 => {
                let _ = engine.toggle_play_pause();
            }
            1 => {
                engine.next();
            }
            2 => {
                engine.previous();
            }
            3 => {
                engine.toggle_shuffle();
            }
            4 => {
                engine.toggle_repeat();
            }
            5 => engine.seek(f64::from(byte / 12) / 21.0),
            6 => {
                let pending = engine.host().pending_attempts().to_vec();
                if let Some(&attempt) = pending.last() {
                    engine.host_mut().resolve(attempt);
                }
            }
            7 => {
                let pending = engine.host().pending_attempts().to_vec();
                if let Some(&attempt) = pending.first() {
                    engine.host_mut().reject(attempt, "blocked");
                }
            }
            8 => engine.host_mut().finish_track(),
            9 => {
                engine.set_sleep_timer(f64::from(byte / 12) / 4.0 - 0.5, || {});
            }
            10 => engine.stop(),
            _ => {
                engine.host_mut().advance(Duration::from_secs(1));
                clock.advance(Duration::from_secs(30));
            }
        }
        engine.tick();

        assert!(engine.current_index().is_some_and(|index| index < engine.queue().len()));
        if engine.is_playing() {
            assert!(matches!(
                engine.state(),
                PlaybackState::Playing | PlaybackState::Loading
            ));
        }
        if engine.state() == PlaybackState::Ended {
            assert!(!engine.is_playing());
        }
    }
});
