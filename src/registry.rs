use crate::mac::{InvalidFormat, MacAddress};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Stable identity of a registry entry. Assigned once when the entry is
/// created and never reused; display position is only a projection.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("name and MAC address must both be non-empty")]
    EmptyField,
    #[error(transparent)]
    InvalidMac(#[from] InvalidFormat),
    #[error("no device with id {0}")]
    UnknownDevice(EntryId),
    #[error("device store I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("device store is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One registry row. The MAC is kept as the user typed it; it is
/// validated on entry but not normalized at rest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    // Stores written before ids existed have plain {name, mac} objects;
    // `load` assigns fresh ids to the zero default.
    #[serde(default)]
    pub id: EntryId,
    pub name: String,
    pub mac: String,
}

/// Ordered collection of named devices, fully rewritten to a JSON file
/// after every mutation. Owned by a single process; no locking.
pub struct Registry {
    path: PathBuf,
    entries: Vec<DeviceEntry>,
    next_id: u64,
}

impl Registry {
    /// Reads the store at `path`. A missing file is a normal first run
    /// and yields an empty registry.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let entries: Vec<DeviceEntry> = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        debug!("loaded {} device(s) from {}", entries.len(), path.display());

        let mut registry = Registry {
            path,
            entries,
            next_id: 1,
        };
        registry.assign_missing_ids();
        Ok(registry)
    }

    fn assign_missing_ids(&mut self) {
        for entry in &self.entries {
            self.next_id = self.next_id.max(entry.id.0 + 1);
        }
        let mut seen = HashSet::new();
        for entry in &mut self.entries {
            if entry.id.0 == 0 || !seen.insert(entry.id.0) {
                entry.id = EntryId(self.next_id);
                self.next_id += 1;
            }
            seen.insert(entry.id.0);
        }
    }

    /// Snapshot in display order. Positions shift after `remove`;
    /// callers must re-query rather than cache them across mutations.
    pub fn entries(&self) -> &[DeviceEntry] {
        &self.entries
    }

    pub fn get(&self, id: EntryId) -> Option<&DeviceEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// The stored MAC text for a wake, as typed by the user.
    pub fn mac_for(&self, id: EntryId) -> Result<&str, RegistryError> {
        self.get(id)
            .map(|e| e.mac.as_str())
            .ok_or(RegistryError::UnknownDevice(id))
    }

    /// Appends a new entry and persists the registry. Returns the id of
    /// the new entry.
    pub fn add(&mut self, name: &str, mac: &str) -> Result<EntryId, RegistryError> {
        Self::validate(name, mac)?;
        let id = EntryId(self.next_id);
        self.entries.push(DeviceEntry {
            id,
            name: name.to_string(),
            mac: mac.to_string(),
        });
        if let Err(err) = self.persist() {
            self.entries.pop();
            return Err(err);
        }
        self.next_id += 1;
        Ok(id)
    }

    /// Overwrites the entry in place, keeping its display position.
    pub fn update(&mut self, id: EntryId, name: &str, mac: &str) -> Result<(), RegistryError> {
        Self::validate(name, mac)?;
        let pos = self.position(id)?;
        let previous = std::mem::replace(
            &mut self.entries[pos],
            DeviceEntry {
                id,
                name: name.to_string(),
                mac: mac.to_string(),
            },
        );
        if let Err(err) = self.persist() {
            self.entries[pos] = previous;
            return Err(err);
        }
        Ok(())
    }

    /// Removes the entry; later entries shift down one display position.
    pub fn remove(&mut self, id: EntryId) -> Result<DeviceEntry, RegistryError> {
        let pos = self.position(id)?;
        let removed = self.entries.remove(pos);
        if let Err(err) = self.persist() {
            self.entries.insert(pos, removed);
            return Err(err);
        }
        Ok(removed)
    }

    fn position(&self, id: EntryId) -> Result<usize, RegistryError> {
        self.entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(RegistryError::UnknownDevice(id))
    }

    fn validate(name: &str, mac: &str) -> Result<(), RegistryError> {
        if name.is_empty() || mac.is_empty() {
            return Err(RegistryError::EmptyField);
        }
        mac.parse::<MacAddress>()?;
        Ok(())
    }

    // Full rewrite through a temp file in the same directory, so a
    // crash mid-write never truncates the real store.
    fn persist(&self) -> Result<(), RegistryError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&self.entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
