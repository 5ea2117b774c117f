//! Preset persistence - named metronome states in a JSON file
//!
//! The store keeps every preset plus the id of the last one used. Preset
//! records are held as raw JSON and only decoded into a typed state when a
//! preset is actually loaded, so a single corrupt record aborts that load
//! alone and the rest of the store stays usable. An unreadable or
//! unparsable file is replaced by an empty store with a logged warning.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::click::SoundParams;
use crate::error::PresetError;
use crate::program::ProgramSegment;

/// Complete persistable metronome state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetState {
    pub bpm: u32,
    /// Time signature as "N/D"
    pub time_signature: String,
    pub subdivision_level: u8,
    pub accent: SoundParams,
    pub beat: SoundParams,
    pub subdivision: SoundParams,
    /// Automation program; older presets may omit it
    #[serde(default)]
    pub program: Vec<ProgramSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PresetRecord {
    name: String,
    state: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    last_preset_id: Option<String>,
    #[serde(default)]
    presets: BTreeMap<String, PresetRecord>,
}

/// JSON-backed preset store.
pub struct PresetStore {
    path: PathBuf,
    data: StoreData,
}

impl PresetStore {
    /// Open the store at `path`, creating an empty one if the file is
    /// missing or corrupt.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(data) => data,
                Err(err) => {
                    log::warn!(
                        "[Presets] Failed to parse {:?}: {}. Starting with an empty store.",
                        path,
                        err
                    );
                    StoreData::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(err) => {
                log::warn!(
                    "[Presets] Failed to read {:?}: {}. Starting with an empty store.",
                    path,
                    err
                );
                StoreData::default()
            }
        };
        Self { path, data }
    }

    /// Write the store back to disk.
    pub fn save(&self) -> Result<(), PresetError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| PresetError::Io {
                    path: self.path.display().to_string(),
                    source,
                })?;
            }
        }
        let json = serde_json::to_string_pretty(&self.data).map_err(|err| PresetError::Io {
            path: self.path.display().to_string(),
            source: std::io::Error::other(err),
        })?;
        fs::write(&self.path, json).map_err(|source| PresetError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Save a preset under `name`. With `id` set, the existing preset is
    /// overwritten; otherwise the smallest free numeric id is assigned.
    /// The stored name is prefixed with its id (`ID3 shuffle`).
    /// Returns the id used.
    pub fn save_preset(
        &mut self,
        name: &str,
        state: &PresetState,
        id: Option<&str>,
    ) -> Result<String, PresetError> {
        let id = match id {
            Some(id) => id.to_string(),
            None => {
                let mut next = 1u32;
                while self.data.presets.contains_key(&next.to_string()) {
                    next += 1;
                }
                next.to_string()
            }
        };

        let record = PresetRecord {
            name: format!("ID{} {}", id, name),
            state: serde_json::to_value(state).map_err(|err| PresetError::Corrupted {
                id: id.clone(),
                reason: err.to_string(),
            })?,
        };
        self.data.presets.insert(id.clone(), record);
        self.save()?;
        Ok(id)
    }

    /// Case-insensitive substring search. Exactly one match is required.
    pub fn find(&self, term: &str) -> Result<(String, PresetState), PresetError> {
        let needle = term.to_lowercase();
        let matches: Vec<(&String, &PresetRecord)> = self
            .data
            .presets
            .iter()
            .filter(|(_, record)| record.name.to_lowercase().contains(&needle))
            .collect();

        match matches.as_slice() {
            [] => Err(PresetError::NotFound {
                term: term.to_string(),
            }),
            [(id, record)] => {
                let state: PresetState = serde_json::from_value(record.state.clone())
                    .map_err(|err| PresetError::Corrupted {
                        id: (*id).clone(),
                        reason: err.to_string(),
                    })?;
                Ok(((*id).clone(), state))
            }
            _ => Err(PresetError::Ambiguous {
                term: term.to_string(),
                matches: matches
                    .iter()
                    .map(|(_, record)| record.name.clone())
                    .collect(),
            }),
        }
    }

    /// Delete the single preset matching `term`; returns its id and name.
    pub fn delete(&mut self, term: &str) -> Result<(String, String), PresetError> {
        let needle = term.to_lowercase();
        let matches: Vec<(String, String)> = self
            .data
            .presets
            .iter()
            .filter(|(_, record)| record.name.to_lowercase().contains(&needle))
            .map(|(id, record)| (id.clone(), record.name.clone()))
            .collect();

        match matches.as_slice() {
            [] => Err(PresetError::NotFound {
                term: term.to_string(),
            }),
            [(id, name)] => {
                self.data.presets.remove(id);
                if self.data.last_preset_id.as_deref() == Some(id.as_str()) {
                    self.data.last_preset_id = None;
                }
                self.save()?;
                Ok((id.clone(), name.clone()))
            }
            _ => Err(PresetError::Ambiguous {
                term: term.to_string(),
                matches: matches.iter().map(|(_, name)| name.clone()).collect(),
            }),
        }
    }

    /// Load a preset by exact id.
    pub fn get(&self, id: &str) -> Result<PresetState, PresetError> {
        let record = self
            .data
            .presets
            .get(id)
            .ok_or_else(|| PresetError::NotFound {
                term: id.to_string(),
            })?;
        serde_json::from_value(record.state.clone()).map_err(|err| PresetError::Corrupted {
            id: id.to_string(),
            reason: err.to_string(),
        })
    }

    /// Name of the preset with the given id, if any.
    pub fn name_of(&self, id: &str) -> Option<String> {
        self.data.presets.get(id).map(|record| record.name.clone())
    }

    /// All presets as (id, name), ordered by numeric id.
    pub fn list(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .data
            .presets
            .iter()
            .map(|(id, record)| (id.clone(), record.name.clone()))
            .collect();
        entries.sort_by_key(|(id, _)| id.parse::<u32>().unwrap_or(u32::MAX));
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.data.presets.is_empty()
    }

    /// Record the preset to auto-load next session.
    pub fn set_last_used(&mut self, id: Option<&str>) -> Result<(), PresetError> {
        self.data.last_preset_id = id.map(str::to_string);
        self.save()
    }

    /// The last-used preset, if it still exists and still decodes.
    pub fn last_used(&self) -> Option<(String, PresetState)> {
        let id = self.data.last_preset_id.as_ref()?;
        let record = self.data.presets.get(id)?;
        match serde_json::from_value(record.state.clone()) {
            Ok(state) => Some((id.clone(), state)),
            Err(err) => {
                log::warn!("[Presets] Last-used preset {} is corrupted: {}", id, err);
                None
            }
        }
    }
}
