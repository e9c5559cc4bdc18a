//! Name-keyed registry for shared assets such as materials and meshes.

use rustc_hash::FxHashMap;

use crate::error::RegistryError;

/// Unique-name map. Inserting an existing name fails and keeps the old entry.
pub struct AssetRegistry<T> {
    entries: FxHashMap<String, T>,
}

impl<T> Default for AssetRegistry<T> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }
}

impl<T> AssetRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under `name`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateName`] if `name` is taken.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> Result<(), RegistryError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        log::debug!("registered asset '{name}'");
        self.entries.insert(name, value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<T> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take every entry out, e.g. to release GPU resources on shutdown.
    pub fn drain(&mut self) -> impl Iterator<Item = (String, T)> + '_ {
        self.entries.drain()
    }
}
