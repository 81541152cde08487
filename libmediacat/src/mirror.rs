//! In-memory copy of the `file` table.
//!
//! Files live in a plain `Vec`; an id → position map gives O(1) lookup and
//! O(1) removal (swap-remove). There is no ordering guarantee, callers sort
//! for display.

use std::collections::HashMap;

use crate::model::MediaFile;

#[derive(Debug, Default, Clone)]
pub struct Mirror {
    files: Vec<MediaFile>,
    by_id: HashMap<i64, usize>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[MediaFile] {
        &self.files
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MediaFile> {
        self.files.iter()
    }

    pub fn get(&self, id: i64) -> Option<&MediaFile> {
        self.by_id.get(&id).map(|&i| &self.files[i])
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut MediaFile> {
        match self.by_id.get(&id) {
            Some(&i) => Some(&mut self.files[i]),
            None => None,
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Add a persisted file. A file without an id, or whose id is already
    /// mirrored, is ignored and `false` is returned.
    pub fn push(&mut self, file: MediaFile) -> bool {
        let Some(id) = file.id else {
            return false;
        };
        if self.by_id.contains_key(&id) {
            return false;
        }
        self.by_id.insert(id, self.files.len());
        self.files.push(file);
        true
    }

    pub fn remove(&mut self, id: i64) -> Option<MediaFile> {
        let pos = self.by_id.remove(&id)?;
        let file = self.files.swap_remove(pos);
        if let Some(moved) = self.files.get(pos).and_then(|f| f.id) {
            self.by_id.insert(moved, pos);
        }
        Some(file)
    }

    /// Keep only files matching `keep`, returning how many were dropped.
    pub fn retain<F: FnMut(&MediaFile) -> bool>(&mut self, keep: F) -> usize {
        let before = self.files.len();
        self.files.retain(keep);
        self.reindex();
        before - self.files.len()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, MediaFile> {
        self.files.iter_mut()
    }

    /// Reorder in place; the index follows.
    pub fn sort_by<F>(&mut self, cmp: F)
    where
        F: FnMut(&MediaFile, &MediaFile) -> std::cmp::Ordering,
    {
        self.files.sort_by(cmp);
        self.reindex();
    }

    fn reindex(&mut self) {
        self.by_id = self
            .files
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.id.map(|id| (id, i)))
            .collect();
    }
}
