use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::events::PlayerEvent;
use crate::model::{CategoryStats, FavoriteEntry, HistoryEntry, UsageStats};
use crate::storage::KeyValueStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

pub const HISTORY_KEY: &str = "history";
pub const FAVORITES_KEY: &str = "favorites";
pub const STATISTICS_KEY: &str = "statistics";

/// Position jumps larger than this are treated as seeks, not listening time.
const MAX_TIME_STEP_SECONDS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageLimits {
    pub max_history_items: usize,
    pub max_favorites: usize,
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for UsageLimits {
    fn from(config: &SessionConfig) -> Self {
        Self {
            max_history_items: config.max_history_items,
            max_favorites: config.max_favorites,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryPlays {
    pub category_id: String,
    pub plays: u64,
    pub play_time_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageExport {
    #[serde(default)]
    pub history: Option<Vec<HistoryEntry>>,
    #[serde(default)]
    pub favorites: Option<Vec<FavoriteEntry>>,
    #[serde(default)]
    pub statistics: Option<UsageStats>,
    #[serde(default)]
    pub exported_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageInfo {
    pub history_count: usize,
    pub favorites_count: usize,
    pub total_plays: u64,
    pub storage_bytes: usize,
}

impl StorageInfo {
    pub fn size_label(&self) -> String {
        format!("{:.2} KB", self.storage_bytes as f64 / 1024.0)
    }
}

/// History, favorites and play statistics persisted through a [`KeyValueStore`].
///
/// Every read goes to the store. A record that fails to parse is logged, replaced with its
/// empty default and treated as empty; storage errors never reach the caller.
pub struct UsageStore<S> {
    store: S,
    limits: UsageLimits,
    clock: Rc<dyn Clock>,
}

impl<S: KeyValueStore> UsageStore<S> {
    pub fn new(store: S, limits: UsageLimits, clock: Rc<dyn Clock>) -> Self {
        Self {
            store,
            limits,
            clock,
        }
    }

    pub fn limits(&self) -> UsageLimits {
        self.limits
    }

    fn read<T: DeserializeOwned + Serialize + Default>(&self, key: &str) -> T {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return T::default(),
            Err(err) => {
                log::warn!("failed to read {key}: {err:#}");
                return T::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                log::warn!("resetting malformed {key} record: {err}");
                let fallback = T::default();
                self.write(key, &fallback);
                fallback
            }
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(err) => {
                log::error!("failed to encode {key}: {err}");
                return false;
            }
        };
        match self.store.set(key, &json) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("failed to save {key}: {err:#}");
                false
            }
        }
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.read(HISTORY_KEY)
    }

    pub fn recent_history(&self, limit: usize) -> Vec<HistoryEntry> {
        let mut history = self.history();
        history.truncate(limit);
        history
    }

    /// Moves `entry` to the front, dropping any older entry with the same id.
    pub fn add_history(&self, entry: HistoryEntry) -> bool {
        let mut history = self.history();
        history.retain(|existing| existing.id != entry.id);
        history.insert(0, entry);
        history.truncate(self.limits.max_history_items);
        self.write(HISTORY_KEY, &history)
    }

    /// Stores the seconds actually listened on the history entry `id`.
    pub fn record_listened(&self, id: &str, seconds: u32) -> bool {
        let mut history = self.history();
        let Some(entry) = history.iter_mut().find(|entry| entry.id == id) else {
            return false;
        };
        entry.duration_played = seconds;
        self.write(HISTORY_KEY, &history)
    }

    pub fn remove_history(&self, id: &str) -> bool {
        let mut history = self.history();
        let before = history.len();
        history.retain(|entry| entry.id != id);
        history.len() != before && self.write(HISTORY_KEY, &history)
    }

    pub fn clear_history(&self) -> bool {
        self.write(HISTORY_KEY, &Vec::<HistoryEntry>::new())
    }

    pub fn favorites(&self) -> Vec<FavoriteEntry> {
        self.read(FAVORITES_KEY)
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.favorites().iter().any(|entry| entry.id == id)
    }

    /// Rejects duplicates and additions past the cap.
    pub fn add_favorite(&self, entry: FavoriteEntry) -> bool {
        let mut favorites = self.favorites();
        if favorites.iter().any(|existing| existing.id == entry.id) {
            return false;
        }
        if favorites.len() >= self.limits.max_favorites {
            log::info!("favorites are full ({})", self.limits.max_favorites);
            return false;
        }
        favorites.insert(0, entry);
        self.write(FAVORITES_KEY, &favorites)
    }

    pub fn remove_favorite(&self, id: &str) -> bool {
        let mut favorites = self.favorites();
        let before = favorites.len();
        favorites.retain(|entry| entry.id != id);
        favorites.len() != before && self.write(FAVORITES_KEY, &favorites)
    }

    pub fn toggle_favorite(&self, entry: FavoriteEntry) -> bool {
        if self.is_favorite(&entry.id) {
            self.remove_favorite(&entry.id)
        } else {
            self.add_favorite(entry)
        }
    }

    pub fn clear_favorites(&self) -> bool {
        self.write(FAVORITES_KEY, &Vec::<FavoriteEntry>::new())
    }

    pub fn statistics(&self) -> UsageStats {
        self.read(STATISTICS_KEY)
    }

    pub fn update_statistics(&self, category_id: &str, play_seconds: u64) -> UsageStats {
        let mut stats = self.statistics();
        stats.total_plays += 1;
        stats.total_play_time_seconds += play_seconds;
        let category = stats
            .category_stats
            .entry(category_id.to_string())
            .or_insert_with(CategoryStats::default);
        category.plays += 1;
        category.play_time_seconds += play_seconds;
        stats.last_updated = Some(self.clock.epoch_seconds());
        self.write(STATISTICS_KEY, &stats);
        stats
    }

    pub fn most_played_categories(&self, limit: usize) -> Vec<CategoryPlays> {
        let mut categories: Vec<CategoryPlays> = self
            .statistics()
            .category_stats
            .into_iter()
            .map(|(category_id, stats)| CategoryPlays {
                category_id,
                plays: stats.plays,
                play_time_seconds: stats.play_time_seconds,
            })
            .collect();
        categories.sort_by(|a, b| {
            b.plays
                .cmp(&a.plays)
                .then_with(|| a.category_id.cmp(&b.category_id))
        });
        categories.truncate(limit);
        categories
    }

    pub fn export(&self) -> UsageExport {
        UsageExport {
            history: Some(self.history()),
            favorites: Some(self.favorites()),
            statistics: Some(self.statistics()),
            exported_at: Some(self.clock.epoch_seconds()),
        }
    }

    /// Writes each section present in `data`; absent sections are left alone.
    pub fn import(&self, data: &UsageExport) -> bool {
        let mut ok = true;
        if let Some(history) = &data.history {
            let mut history = history.clone();
            history.truncate(self.limits.max_history_items);
            ok &= self.write(HISTORY_KEY, &history);
        }
        if let Some(favorites) = &data.favorites {
            let mut favorites = favorites.clone();
            favorites.truncate(self.limits.max_favorites);
            ok &= self.write(FAVORITES_KEY, &favorites);
        }
        if let Some(statistics) = &data.statistics {
            ok &= self.write(STATISTICS_KEY, statistics);
        }
        ok
    }

    pub fn clear_all(&self) {
        for key in [HISTORY_KEY, FAVORITES_KEY, STATISTICS_KEY] {
            if let Err(err) = self.store.remove(key) {
                log::warn!("failed to clear {key}: {err:#}");
            }
        }
    }

    pub fn storage_info(&self) -> StorageInfo {
        let data = self.export();
        let storage_bytes = serde_json::to_string(&data).map_or(0, |json| json.len());
        StorageInfo {
            history_count: data.history.map_or(0, |h| h.len()),
            favorites_count: data.favorites.map_or(0, |f| f.len()),
            total_plays: data.statistics.map_or(0, |s| s.total_plays),
            storage_bytes,
        }
    }
}

struct ActivePlay {
    track_id: String,
    category_id: String,
    last_position: f64,
    listened_seconds: f64,
}

/// Engine listener that records history on every track change and play time when
/// the next track starts or [`UsageRecorder::flush`] is called.
pub struct UsageRecorder<S> {
    usage: Rc<UsageStore<S>>,
    active: Option<ActivePlay>,
}

impl<S: KeyValueStore> UsageRecorder<S> {
    pub fn new(usage: Rc<UsageStore<S>>) -> Self {
        Self {
            usage,
            active: None,
        }
    }

    pub fn handle(&mut self, event: &PlayerEvent) {
        match event {
            PlayerEvent::TrackChange { track, .. } => {
                self.flush();
                let played_at = self.usage.clock.epoch_seconds();
                self.usage
                    .add_history(HistoryEntry::from_track(track, played_at));
                self.active = Some(ActivePlay {
                    track_id: track.id.clone(),
                    category_id: track.category_id.clone(),
                    last_position: 0.0,
                    listened_seconds: 0.0,
                });
            }
            PlayerEvent::TimeUpdate { current_time, .. } => {
                let Some(active) = self.active.as_mut() else {
                    return;
                };
                let step = current_time - active.last_position;
                if step > 0.0 && step <= MAX_TIME_STEP_SECONDS {
                    active.listened_seconds += step;
                }
                active.last_position = *current_time;
            }
            _ => {}
        }
    }

    /// Commits the listening time of the current track, if any.
    pub fn flush(&mut self) {
        if let Some(active) = self.active.take() {
            let seconds = active.listened_seconds.round().max(0.0) as u64;
            self.usage.update_statistics(&active.category_id, seconds);
            self.usage.record_listened(
                &active.track_id,
                u32::try_from(seconds).unwrap_or(u32::MAX),
            );
        }
    }
}
