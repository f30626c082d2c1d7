use crate::model::{Track, display_name_for};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::path::Path;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::get_probe;
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "ogg", "m4a", "aac", "opus", "wma",
];

pub fn is_audio_extension(ext: &str) -> bool {
    AUDIO_EXTENSIONS
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
}

fn is_audio(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(is_audio_extension)
}

/// Per-file metadata that replaces the category defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileOverride {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub folder: String,
    pub files: Vec<String>,
    #[serde(default)]
    pub scenarios: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub overrides: BTreeMap<String, FileOverride>,
}

impl Category {
    pub fn new(folder: impl Into<String>, files: &[&str]) -> Self {
        Self {
            folder: folder.into(),
            files: files.iter().map(|file| file.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_scenarios(mut self, scenarios: &[&str]) -> Self {
        self.scenarios = Some(scenarios.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn with_file_tags(mut self, file: &str, tags: &[&str]) -> Self {
        self.overrides.entry(file.to_string()).or_default().tags =
            Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackMetadata {
    pub category_id: String,
    pub file_name: String,
    pub display_name: String,
    pub scenarios: Vec<String>,
    pub tags: Vec<String>,
    pub duration_seconds: Option<u32>,
}

/// Scenario and tag defaults for the well-known categories.
fn category_defaults(category_id: &str) -> (&'static [&'static str], &'static [&'static str]) {
    match category_id {
        "meditation" => (
            &["sleep", "meditation", "relaxation"],
            &["meditation", "relaxation", "mindfulness"],
        ),
        "Rain" => (
            &["sleep", "work", "study"],
            &["nature sounds", "white noise", "rain"],
        ),
        "Singing bowl sound" => (
            &["meditation", "healing", "yoga"],
            &["sound therapy", "singing bowl", "energy healing"],
        ),
        "Chakra" => (
            &["meditation", "healing", "energy_work"],
            &["chakra", "energy", "healing"],
        ),
        "hypnosis" => (
            &["sleep", "relaxation"],
            &["hypnosis", "sleep", "deep relaxation"],
        ),
        "Animal sounds" => (
            &["relaxation", "sleep", "background"],
            &["nature sounds", "animals", "ambience"],
        ),
        "Fire" => (
            &["relaxation", "sleep", "background"],
            &["nature sounds", "fire", "ambience"],
        ),
        "running water" => (
            &["relaxation", "meditation", "work"],
            &["nature sounds", "water", "white noise"],
        ),
        "Subconscious Therapy" => (
            &["self_improvement", "meditation", "sleep"],
            &["subconscious", "psychotherapy", "self improvement"],
        ),
        _ => (&["relaxation"], &[]),
    }
}

/// Read-only map of categories to playable files plus their descriptive metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub categories: BTreeMap<String, Category>,
}

impl Catalog {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            categories: BTreeMap::new(),
        }
    }

    pub fn with_category(mut self, category_id: &str, category: Category) -> Self {
        self.categories.insert(category_id.to_string(), category);
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        let catalog: Catalog = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse catalog {}", path.display()))?;
        Ok(catalog)
    }

    /// Builds a catalog from `root`, one category per immediate sub-directory.
    pub fn scan(root: &Path) -> Result<Self> {
        let mut dirs: Vec<_> = fs::read_dir(root)
            .with_context(|| format!("failed to list {}", root.display()))?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
            .collect();
        dirs.sort_by_key(|entry| entry.file_name());

        let mut catalog = Catalog::new(format!("{}/", root.display()));
        for dir in dirs {
            let folder = dir.file_name().to_string_lossy().to_string();
            let category_root = dir.path();
            let mut category = Category {
                folder: folder.clone(),
                ..Category::default()
            };

            for entry in WalkDir::new(&category_root)
                .follow_links(true)
                .into_iter()
                .filter_map(Result::ok)
            {
                let path = entry.path();
                if !entry.file_type().is_file() || !is_audio(path) {
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&category_root) else {
                    continue;
                };
                let file = relative
                    .components()
                    .map(|part| part.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if let Some(seconds) = probe_duration_seconds(path) {
                    category.overrides.entry(file.clone()).or_default().duration_seconds =
                        Some(seconds);
                }
                category.files.push(file);
            }

            category.files.sort();
            if category.files.is_empty() {
                continue;
            }
            log::debug!("scanned {} tracks in {folder}", category.files.len());
            catalog.categories.insert(folder, category);
        }

        Ok(catalog)
    }

    pub fn category_ids(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn category(&self, category_id: &str) -> Option<&Category> {
        self.categories.get(category_id)
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(|c| c.files.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn url_for(&self, category_id: &str, file_name: &str) -> Option<String> {
        let category = self.categories.get(category_id)?;
        let mut url = self.base_url.clone();
        if !url.is_empty() && !url.ends_with('/') {
            url.push('/');
        }
        url.push_str(&category.folder);
        url.push('/');
        url.push_str(file_name);
        Some(url)
    }

    pub fn track(&self, category_id: &str, file_name: &str) -> Option<Track> {
        let category = self.categories.get(category_id)?;
        if !category.files.iter().any(|file| file == file_name) {
            return None;
        }
        let url = self.url_for(category_id, file_name)?;
        let overrides = category.overrides.get(file_name);
        let mut track = Track::new(category_id, file_name, url)
            .with_duration(overrides.and_then(|o| o.duration_seconds));
        if let Some(name) = overrides.and_then(|o| o.display_name.clone()) {
            track.display_name = name;
        }
        Some(track)
    }

    pub fn tracks_for(&self, category_id: &str) -> Vec<Track> {
        let Some(category) = self.categories.get(category_id) else {
            return Vec::new();
        };
        category
            .files
            .iter()
            .filter_map(|file| self.track(category_id, file))
            .collect()
    }

    pub fn all_tracks(&self) -> Vec<Track> {
        self.category_ids()
            .flat_map(|id| self.tracks_for(id))
            .collect()
    }

    pub fn metadata(&self, category_id: &str, file_name: &str) -> Option<TrackMetadata> {
        let category = self.categories.get(category_id)?;
        if !category.files.iter().any(|file| file == file_name) {
            return None;
        }
        let (default_scenarios, default_tags) = category_defaults(category_id);
        let scenarios = category
            .scenarios
            .clone()
            .unwrap_or_else(|| default_scenarios.iter().map(|s| s.to_string()).collect());
        let category_tags = category.tags.clone().unwrap_or_else(|| {
            if default_tags.is_empty() {
                vec![category_id.to_string()]
            } else {
                default_tags.iter().map(|t| t.to_string()).collect()
            }
        });
        let overrides = category.overrides.get(file_name);

        Some(TrackMetadata {
            category_id: category_id.to_string(),
            file_name: file_name.to_string(),
            display_name: overrides
                .and_then(|o| o.display_name.clone())
                .unwrap_or_else(|| display_name_for(file_name)),
            scenarios,
            tags: overrides
                .and_then(|o| o.tags.clone())
                .unwrap_or(category_tags),
            duration_seconds: overrides.and_then(|o| o.duration_seconds),
        })
    }

    pub fn all_metadata(&self) -> Vec<TrackMetadata> {
        self.categories
            .iter()
            .flat_map(|(id, category)| {
                category
                    .files
                    .iter()
                    .filter_map(move |file| self.metadata(id, file))
            })
            .collect()
    }

    pub fn search_by_scenario(&self, scenario: &str) -> Vec<TrackMetadata> {
        self.all_metadata()
            .into_iter()
            .filter(|meta| meta.scenarios.iter().any(|s| s == scenario))
            .collect()
    }

    /// Tracks carrying a tag that contains any of `tags`, ignoring case.
    pub fn search_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> Vec<TrackMetadata> {
        let needles: Vec<String> = tags.iter().map(|t| t.as_ref().to_lowercase()).collect();
        self.all_metadata()
            .into_iter()
            .filter(|meta| {
                needles.iter().any(|needle| {
                    meta.tags
                        .iter()
                        .any(|tag| tag.to_lowercase().contains(needle.as_str()))
                })
            })
            .collect()
    }

    pub fn all_scenarios(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for meta in self.all_metadata() {
            for scenario in meta.scenarios {
                if !out.contains(&scenario) {
                    out.push(scenario);
                }
            }
        }
        out
    }

    pub fn all_tags(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for meta in self.all_metadata() {
            for tag in meta.tags {
                if !out.contains(&tag) {
                    out.push(tag);
                }
            }
        }
        out
    }
}

pub fn probe_duration_seconds(path: &Path) -> Option<u32> {
    let file = File::open(path).ok()?;
    let source = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(OsStr::to_str) {
        hint.with_extension(extension);
    }

    let probed = get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()?;

    let params = &probed.format.default_track()?.codec_params;
    if let (Some(time_base), Some(frame_count)) = (params.time_base, params.n_frames) {
        let time = time_base.calc_time(frame_count);
        let mut seconds = time.seconds as u32;
        if time.frac >= 0.5 {
            seconds = seconds.saturating_add(1);
        }
        return Some(seconds);
    }

    params
        .n_frames
        .zip(params.sample_rate)
        .filter(|(_, rate)| *rate > 0)
        .map(|(frames, rate)| ((frames as f64) / (rate as f64)).round() as u32)
}
