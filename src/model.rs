use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable identifier for a track, derived from its category and file name.
///
/// Whitespace runs collapse to a single `_` and the result is lowercased, so
/// `("Rain", "Soft Rain.mp3")` becomes `rain_soft_rain.mp3`.
pub fn track_id(category_id: &str, file_name: &str) -> String {
    format!("{category_id}_{file_name}")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// File name without its audio extension.
pub fn display_name_for(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if crate::catalog::is_audio_extension(ext) && !stem.is_empty() => {
            stem.to_string()
        }
        _ => file_name.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub category_id: String,
    pub file_name: String,
    pub display_name: String,
    pub url: String,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
}

impl Track {
    pub fn new(category_id: &str, file_name: &str, url: impl Into<String>) -> Self {
        Self {
            id: track_id(category_id, file_name),
            category_id: category_id.to_string(),
            file_name: file_name.to_string(),
            display_name: display_name_for(file_name),
            url: url.into(),
            duration_seconds: None,
        }
    }

    pub fn with_duration(mut self, seconds: Option<u32>) -> Self {
        self.duration_seconds = seconds;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    None,
    One,
    All,
}

impl RepeatMode {
    pub fn next(self) -> Self {
        match self {
            Self::None => Self::All,
            Self::All => Self::One,
            Self::One => Self::None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::One => "one",
            Self::All => "all",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Some(Self::None),
            "one" | "single" => Some(Self::One),
            "all" | "queue" => Some(Self::All),
            _ => None,
        }
    }
}

/// Lifecycle of the single media stream owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub category_id: String,
    pub file_name: String,
    pub display_name: String,
    pub played_at: i64,
    #[serde(default)]
    pub duration_played: u32,
}

impl HistoryEntry {
    pub fn from_track(track: &Track, played_at: i64) -> Self {
        Self {
            id: track.id.clone(),
            category_id: track.category_id.clone(),
            file_name: track.file_name.clone(),
            display_name: track.display_name.clone(),
            played_at,
            duration_played: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEntry {
    pub id: String,
    pub category_id: String,
    pub file_name: String,
    pub display_name: String,
    pub added_at: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl FavoriteEntry {
    pub fn from_track(track: &Track, added_at: i64, tags: Vec<String>) -> Self {
        Self {
            id: track.id.clone(),
            category_id: track.category_id.clone(),
            file_name: track.file_name.clone(),
            display_name: track.display_name.clone(),
            added_at,
            tags,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    #[serde(default)]
    pub plays: u64,
    #[serde(default, rename = "playTime")]
    pub play_time_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    #[serde(default)]
    pub total_plays: u64,
    #[serde(default, rename = "totalPlayTime")]
    pub total_play_time_seconds: u64,
    #[serde(default)]
    pub category_stats: HashMap<String, CategoryStats>,
    #[serde(default)]
    pub last_updated: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_id_is_lowercase_and_underscored() {
        assert_eq!(track_id("Rain", "x.mp3"), "rain_x.mp3");
        assert_eq!(
            track_id("Singing bowl sound", "Deep  Bowl.mp3"),
            "singing_bowl_sound_deep_bowl.mp3"
        );
    }

    #[test]
    fn display_name_strips_known_audio_extensions_only() {
        assert_eq!(display_name_for("Soft Rain.mp3"), "Soft Rain");
        assert_eq!(display_name_for("notes.v2"), "notes.v2");
        assert_eq!(display_name_for(".mp3"), ".mp3");
    }

    #[test]
    fn repeat_mode_cycles_through_all_variants() {
        let mut mode = RepeatMode::None;
        let mut seen = Vec::new();
        for _ in 0..3 {
            mode = mode.next();
            seen.push(mode);
        }
        assert_eq!(seen, vec![RepeatMode::All, RepeatMode::One, RepeatMode::None]);
    }

    #[test]
    fn usage_stats_reads_browser_layout() {
        let raw = r#"{"totalPlays":3,"totalPlayTime":120,"categoryStats":{"Rain":{"plays":2,"playTime":90}}}"#;
        let stats: UsageStats = serde_json::from_str(raw).expect("parse stats");
        assert_eq!(stats.total_plays, 3);
        assert_eq!(stats.total_play_time_seconds, 120);
        assert_eq!(stats.category_stats["Rain"].play_time_seconds, 90);
        assert_eq!(stats.last_updated, None);
    }

    #[test]
    fn category_stats_fill_missing_fields_individually() {
        let raw = r#"{"totalPlays":4,"totalPlayTime":300,"categoryStats":{"Rain":{"plays":2},"Fire":{"playTime":45}}}"#;
        let stats: UsageStats = serde_json::from_str(raw).expect("parse stats");
        assert_eq!(stats.total_plays, 4);
        assert_eq!(stats.category_stats["Rain"].plays, 2);
        assert_eq!(stats.category_stats["Rain"].play_time_seconds, 0);
        assert_eq!(stats.category_stats["Fire"].plays, 0);
        assert_eq!(stats.category_stats["Fire"].play_time_seconds, 45);
    }
}
