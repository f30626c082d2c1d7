use crate::catalog::{Catalog, TrackMetadata};
use crate::clock::Clock;
use crate::model::Track;
use crate::storage::KeyValueStore;
use crate::usage::UsageStore;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::rc::Rc;

const TOP_CATEGORIES: usize = 3;
const TIME_SCORE: f64 = 0.8;
const SIMILAR_SCORE: f64 = 0.7;
const RANDOM_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    BasedOnHistory,
    TimeBased,
    SimilarTo,
    Random,
}

impl Reason {
    pub fn code(self) -> &'static str {
        match self {
            Self::BasedOnHistory => "based_on_history",
            Self::TimeBased => "time_based",
            Self::SimilarTo => "similar_to",
            Self::Random => "random",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "based_on_history" => Some(Self::BasedOnHistory),
            "time_based" => Some(Self::TimeBased),
            "similar_to" => Some(Self::SimilarTo),
            "random" => Some(Self::Random),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Morning,
    Midday,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn from_hour(hour: u8) -> Self {
        match hour {
            6..=9 => Self::Morning,
            10..=13 => Self::Midday,
            14..=17 => Self::Afternoon,
            18..=21 => Self::Evening,
            _ => Self::Night,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Midday => "midday",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Night => "night",
        }
    }

    /// Catalog scenarios that suit this part of the day.
    pub fn scenarios(self) -> &'static [&'static str] {
        match self {
            Self::Morning => &["meditation", "energy_work"],
            Self::Midday => &["work", "focus"],
            Self::Afternoon => &["relaxation", "background"],
            Self::Evening => &["relaxation", "meditation"],
            Self::Night => &["sleep", "deep_sleep"],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReasonContext {
    pub time_of_day: Option<TimeOfDay>,
    pub similar_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub track: Track,
    pub reason: Reason,
    pub score: f64,
    pub context: ReasonContext,
}

impl Recommendation {
    pub fn reason_text(&self) -> String {
        reason_text(self.reason, &self.context)
    }
}

pub fn reason_text(reason: Reason, context: &ReasonContext) -> String {
    match reason {
        Reason::BasedOnHistory => String::from("Based on your listening history"),
        Reason::TimeBased => format!(
            "Perfect for {}",
            context.time_of_day.map_or("now", TimeOfDay::label)
        ),
        Reason::SimilarTo => match &context.similar_to {
            Some(name) => format!("Because you listened to {name}"),
            None => String::from("Because of what you listened to"),
        },
        Reason::Random => String::from("Recommended for you"),
    }
}

/// Like [`reason_text`] for a stored reason code; unknown codes read "Recommended".
pub fn reason_text_for_code(code: &str, context: &ReasonContext) -> String {
    Reason::from_code(code).map_or_else(
        || String::from("Recommended"),
        |reason| reason_text(reason, context),
    )
}

/// Blends listening history, time of day and tag similarity into one list.
///
/// Reads the usage store and catalog but never writes to either.
pub struct Recommender<S> {
    usage: Rc<UsageStore<S>>,
    catalog: Rc<Catalog>,
    clock: Rc<dyn Clock>,
    rng: SmallRng,
}

impl<S: KeyValueStore> Recommender<S> {
    pub fn new(usage: Rc<UsageStore<S>>, catalog: Rc<Catalog>, clock: Rc<dyn Clock>) -> Self {
        Self {
            usage,
            catalog,
            clock,
            rng: SmallRng::from_os_rng(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn recommendations(&mut self, count: usize) -> Vec<Recommendation> {
        let hour = self.clock.local_hour();
        self.recommendations_at(count, hour)
    }

    /// At most `count` items, unique by category and file; fewer only when the catalog is smaller.
    pub fn recommendations_at(&mut self, count: usize, hour: u8) -> Vec<Recommendation> {
        if count == 0 || self.catalog.is_empty() {
            return Vec::new();
        }

        let history_share = (count * 4).div_ceil(10);
        let time_share = (count * 3).div_ceil(10);
        let similar_share = (count * 3).div_ceil(10);

        let mut candidates = self.history_based(history_share);
        candidates.extend(self.time_based(time_share, hour));
        candidates.extend(self.similarity_based(similar_share));

        let mut seen = HashSet::new();
        let mut picks: Vec<Recommendation> = candidates
            .into_iter()
            .filter(|item| seen.insert(dedup_key(&item.track)))
            .collect();
        picks.truncate(count);

        if picks.len() < count {
            let missing = count - picks.len();
            let filler: Vec<Recommendation> = self
                .random_picks(self.catalog.all_tracks().len())
                .into_iter()
                .filter(|item| seen.insert(dedup_key(&item.track)))
                .take(missing)
                .collect();
            picks.extend(filler);
        }

        log::debug!("{} recommendations for hour {hour}", picks.len());
        picks
    }

    fn history_based(&mut self, count: usize) -> Vec<Recommendation> {
        let top = self.usage.most_played_categories(TOP_CATEGORIES);
        if top.is_empty() {
            return self.random_picks(count);
        }

        let played: HashSet<String> = self.usage.history().into_iter().map(|e| e.id).collect();
        let per_category = count.div_ceil(top.len());
        let mut out = Vec::new();
        for category in top {
            let unplayed: Vec<Track> = self
                .catalog
                .tracks_for(&category.category_id)
                .into_iter()
                .filter(|track| !played.contains(&track.id))
                .collect();
            for track in self.sample(unplayed, per_category) {
                out.push(Recommendation {
                    track,
                    reason: Reason::BasedOnHistory,
                    score: category.plays as f64,
                    context: ReasonContext::default(),
                });
            }
        }
        self.fill_with_random(out, count)
    }

    fn time_based(&mut self, count: usize, hour: u8) -> Vec<Recommendation> {
        let time_of_day = TimeOfDay::from_hour(hour);
        let scenarios = time_of_day.scenarios();
        let per_scenario = count.div_ceil(scenarios.len());
        let mut out = Vec::new();
        for scenario in scenarios {
            let matches = self.tracks_for(self.catalog.search_by_scenario(scenario));
            for track in self.sample(matches, per_scenario) {
                out.push(Recommendation {
                    track,
                    reason: Reason::TimeBased,
                    score: TIME_SCORE,
                    context: ReasonContext {
                        time_of_day: Some(time_of_day),
                        similar_to: None,
                    },
                });
            }
        }
        self.fill_with_random(out, count)
    }

    fn similarity_based(&mut self, count: usize) -> Vec<Recommendation> {
        let Some(recent) = self.usage.history().into_iter().next() else {
            return self.random_picks(count);
        };
        let tags = self
            .catalog
            .metadata(&recent.category_id, &recent.file_name)
            .map(|meta| meta.tags)
            .unwrap_or_default();
        if tags.is_empty() {
            return self.random_picks(count);
        }

        let matches: Vec<TrackMetadata> = self
            .catalog
            .search_by_tags(&tags)
            .into_iter()
            .filter(|meta| meta.file_name != recent.file_name)
            .collect();
        let mut out = Vec::new();
        for track in self.sample(self.tracks_for(matches), count) {
            out.push(Recommendation {
                track,
                reason: Reason::SimilarTo,
                score: SIMILAR_SCORE,
                context: ReasonContext {
                    time_of_day: None,
                    similar_to: Some(recent.display_name.clone()),
                },
            });
        }
        self.fill_with_random(out, count)
    }

    fn random_picks(&mut self, count: usize) -> Vec<Recommendation> {
        let tracks = self.catalog.all_tracks();
        self.sample(tracks, count)
            .into_iter()
            .map(|track| Recommendation {
                track,
                reason: Reason::Random,
                score: RANDOM_SCORE,
                context: ReasonContext::default(),
            })
            .collect()
    }

    /// Tops `items` up to `count` with random tracks it does not already hold.
    fn fill_with_random(
        &mut self,
        mut items: Vec<Recommendation>,
        count: usize,
    ) -> Vec<Recommendation> {
        items.truncate(count);
        if items.len() >= count {
            return items;
        }
        let mut held: HashSet<(String, String)> =
            items.iter().map(|item| dedup_key(&item.track)).collect();
        let missing = count - items.len();
        let total = self.catalog.all_tracks().len();
        let extra: Vec<Recommendation> = self
            .random_picks(total)
            .into_iter()
            .filter(|item| held.insert(dedup_key(&item.track)))
            .take(missing)
            .collect();
        items.extend(extra);
        items
    }

    fn tracks_for(&self, metadata: Vec<TrackMetadata>) -> Vec<Track> {
        metadata
            .into_iter()
            .filter_map(|meta| self.catalog.track(&meta.category_id, &meta.file_name))
            .collect()
    }

    fn sample(&mut self, mut tracks: Vec<Track>, count: usize) -> Vec<Track> {
        tracks.shuffle(&mut self.rng);
        tracks.truncate(count);
        tracks
    }
}

fn dedup_key(track: &Track) -> (String, String) {
    (track.category_id.clone(), track.file_name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Category;
    use crate::clock::ManualClock;
    use crate::model::HistoryEntry;
    use crate::storage::MemoryStore;
    use crate::usage::UsageLimits;

    fn catalog() -> Catalog {
        Catalog::new("audio")
            .with_category(
                "Rain",
                Category::new("rain", &["r1.mp3", "r2.mp3", "r3.mp3", "r4.mp3"]),
            )
            .with_category(
                "Fire",
                Category::new("fire", &["f1.mp3", "f2.mp3", "f3.mp3"]),
            )
            .with_category(
                "meditation",
                Category::new("meditation", &["m1.mp3", "m2.mp3", "m3.mp3"]),
            )
    }

    fn recommender(seed: u64) -> (Recommender<MemoryStore>, Rc<UsageStore<MemoryStore>>) {
        let clock: Rc<dyn Clock> = Rc::new(ManualClock::new(0, 12));
        let usage = Rc::new(UsageStore::new(
            MemoryStore::new(),
            UsageLimits::default(),
            Rc::clone(&clock),
        ));
        let rec = Recommender::new(Rc::clone(&usage), Rc::new(catalog()), clock).with_seed(seed);
        (rec, usage)
    }

    fn played(usage: &UsageStore<MemoryStore>, category: &str, file: &str, at: i64) {
        let track = Track::new(category, file, format!("x/{file}"));
        usage.add_history(HistoryEntry::from_track(&track, at));
        usage.update_statistics(category, 60);
    }

    fn assert_unique(items: &[Recommendation]) {
        let keys: HashSet<_> = items.iter().map(|item| dedup_key(&item.track)).collect();
        assert_eq!(keys.len(), items.len());
    }

    #[test]
    fn empty_history_yields_random_or_time_based_items() {
        for seed in 0..20 {
            let (mut rec, _) = recommender(seed);
            let items = rec.recommendations_at(4, 23);
            assert_eq!(items.len(), 4);
            assert_unique(&items);
            assert!(
                items
                    .iter()
                    .all(|item| matches!(item.reason, Reason::Random | Reason::TimeBased))
            );
        }
    }

    #[test]
    fn history_signal_samples_unplayed_tracks_in_top_categories() {
        let (mut rec, usage) = recommender(3);
        played(&usage, "Rain", "r1.mp3", 1);
        played(&usage, "Rain", "r2.mp3", 2);

        let items = rec.recommendations_at(5, 3);
        let history: Vec<_> = items
            .iter()
            .filter(|item| item.reason == Reason::BasedOnHistory)
            .collect();
        assert!(!history.is_empty());
        for item in history {
            assert_eq!(item.track.category_id, "Rain");
            assert!(item.track.file_name != "r1.mp3" && item.track.file_name != "r2.mp3");
            assert_eq!(item.score, 2.0);
        }
    }

    #[test]
    fn similarity_signal_excludes_the_source_track() {
        let (mut rec, usage) = recommender(11);
        played(&usage, "meditation", "m1.mp3", 1);

        let items = rec.recommendations_at(10, 12);
        assert_unique(&items);
        assert_eq!(items.len(), 10);
        for item in items.iter().filter(|item| item.reason == Reason::SimilarTo) {
            assert_ne!(item.track.file_name, "m1.mp3");
            assert_eq!(item.context.similar_to.as_deref(), Some("m1"));
            assert_eq!(item.reason_text(), "Because you listened to m1");
        }
    }

    #[test]
    fn never_exceeds_count_or_catalog_size() {
        let (mut rec, usage) = recommender(5);
        played(&usage, "Fire", "f1.mp3", 1);
        for count in 0..15 {
            let items = rec.recommendations_at(count, 8);
            assert!(items.len() <= count);
            assert_eq!(items.len(), count.min(10));
            assert_unique(&items);
        }
    }

    #[test]
    fn time_buckets_follow_the_clock() {
        assert_eq!(TimeOfDay::from_hour(6), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(13), TimeOfDay::Midday);
        assert_eq!(TimeOfDay::from_hour(14), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(21), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(22), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(5), TimeOfDay::Night);
    }

    #[test]
    fn reason_texts() {
        let evening = ReasonContext {
            time_of_day: Some(TimeOfDay::Evening),
            similar_to: None,
        };
        assert_eq!(
            reason_text(Reason::BasedOnHistory, &ReasonContext::default()),
            "Based on your listening history"
        );
        assert_eq!(reason_text(Reason::TimeBased, &evening), "Perfect for evening");
        assert_eq!(
            reason_text(Reason::TimeBased, &ReasonContext::default()),
            "Perfect for now"
        );
        assert_eq!(
            reason_text_for_code("random", &ReasonContext::default()),
            "Recommended for you"
        );
        assert_eq!(
            reason_text_for_code("explore_new", &ReasonContext::default()),
            "Recommended"
        );
    }

    #[test]
    fn recommendations_do_not_touch_usage() {
        let (mut rec, usage) = recommender(9);
        played(&usage, "Rain", "r1.mp3", 1);
        let before = usage.export();
        rec.recommendations(6);
        assert_eq!(usage.export(), before);
    }
}
