use crate::model::{RepeatMode, Track};
use rand::seq::SliceRandom;
use rand::rngs::SmallRng;

/// Ordered tracks with a cursor. `current_index` is `Some` exactly when the queue is non-empty.
#[derive(Debug, Clone, Default)]
pub struct Queue {
    tracks: Vec<Track>,
    current_index: Option<usize>,
    pub shuffle: bool,
    pub repeat: RepeatMode,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the tracks, keeping the shuffle and repeat settings.
    /// Returns `false` and leaves the queue untouched if `index` is out of range.
    pub fn replace(&mut self, tracks: Vec<Track>, index: usize) -> bool {
        if tracks.is_empty() {
            self.tracks.clear();
            self.current_index = None;
            return true;
        }
        if index >= tracks.len() {
            return false;
        }
        self.tracks = tracks;
        self.current_index = Some(index);
        true
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.current_index?)
    }

    pub fn set_current(&mut self, index: usize) -> bool {
        if index >= self.tracks.len() {
            return false;
        }
        self.current_index = Some(index);
        true
    }

    /// Linear predecessor; shuffle plays no part.
    pub fn previous_index(&self) -> Option<usize> {
        self.current_index?.checked_sub(1)
    }

    /// Index `next()` would move to, or `None` once the queue is exhausted.
    pub fn next_index(&self, rng: &mut SmallRng) -> Option<usize> {
        let current = self.current_index?;
        let len = self.tracks.len();

        if self.shuffle {
            if len == 1 {
                return Some(current);
            }
            let mut candidates: Vec<usize> = (0..len).filter(|idx| *idx != current).collect();
            candidates.shuffle(rng);
            return candidates.first().copied();
        }

        if current + 1 < len {
            Some(current + 1)
        } else if self.repeat == RepeatMode::All {
            Some(0)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prop_assert;
    use rand::SeedableRng;

    fn tracks(len: usize) -> Vec<Track> {
        (0..len)
            .map(|n| Track::new("Rain", &format!("{n}.mp3"), format!("rain/{n}.mp3")))
            .collect()
    }

    #[test]
    fn linear_next_halts_at_the_end_without_repeat() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut queue = Queue::new();
        queue.replace(tracks(3), 2);
        assert_eq!(queue.next_index(&mut rng), None);

        queue.repeat = RepeatMode::One;
        assert_eq!(queue.next_index(&mut rng), None);

        queue.repeat = RepeatMode::All;
        assert_eq!(queue.next_index(&mut rng), Some(0));
    }

    #[test]
    fn previous_ignores_shuffle_and_stops_at_zero() {
        let mut queue = Queue::new();
        queue.replace(tracks(3), 1);
        queue.shuffle = true;
        assert_eq!(queue.previous_index(), Some(0));
        queue.set_current(0);
        assert_eq!(queue.previous_index(), None);
    }

    #[test]
    fn shuffle_with_single_track_replays_it() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut queue = Queue::new();
        queue.replace(tracks(1), 0);
        queue.shuffle = true;
        assert_eq!(queue.next_index(&mut rng), Some(0));
    }

    #[test]
    fn replace_rejects_out_of_range_and_clears_on_empty() {
        let mut queue = Queue::new();
        queue.replace(tracks(2), 1);
        assert!(!queue.replace(tracks(2), 5));
        assert_eq!(queue.current_index(), Some(1));

        assert!(queue.replace(Vec::new(), 0));
        assert_eq!(queue.current_index(), None);
        let mut rng = SmallRng::seed_from_u64(3);
        assert_eq!(queue.next_index(&mut rng), None);
    }

    proptest::proptest! {
        #[test]
        fn linear_next_is_monotonic_until_wrap(len in 1usize..40, start in 0usize..40, wrap in proptest::bool::ANY) {
            let mut rng = SmallRng::seed_from_u64(0);
            let mut queue = Queue::new();
            queue.replace(tracks(len), start.min(len - 1));
            queue.repeat = if wrap { RepeatMode::All } else { RepeatMode::None };

            for _ in 0..(len * 2) {
                let current = queue.current_index().unwrap_or(0);
                let step = queue.next_index(&mut rng);
                match step {
                    Some(next) if next > current => prop_assert!(next == current + 1),
                    Some(next) => {
                        prop_assert!(wrap);
                        prop_assert!(next == 0 && current == len - 1);
                    }
                    None => {
                        prop_assert!(!wrap);
                        prop_assert!(current == len - 1);
                        break;
                    }
                }
                if let Some(next) = step {
                    queue.set_current(next);
                }
            }
        }

        #[test]
        fn shuffle_never_repeats_the_current_index(len in 2usize..40, seed in 0u64..1_000, steps in 1usize..60) {
            let mut rng = SmallRng::seed_from_u64(seed);
            let mut queue = Queue::new();
            queue.replace(tracks(len), 0);
            queue.shuffle = true;

            for _ in 0..steps {
                let current = queue.current_index().unwrap_or(0);
                let next = queue.next_index(&mut rng);
                prop_assert!(next.is_some());
                let next = next.unwrap_or(current);
                prop_assert!(next != current);
                prop_assert!(next < len);
                queue.set_current(next);
            }
        }
    }
}
