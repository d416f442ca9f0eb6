// SPDX-License-Identifier: AGPL-3.0
// R2 Uploader Core - Staging queue
//
// Ordered collection of items awaiting or undergoing transfer.

use crate::item::StagedItem;
use crate::types::AppError;

/// Items in insertion order, unique by id
#[derive(Debug, Default)]
pub struct StagingQueue {
    items: Vec<StagedItem>,
}

impl StagingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item; an id that is already staged is refused
    pub fn append(&mut self, item: StagedItem) -> Result<(), AppError> {
        if self.contains(item.id()) {
            return Err(AppError::DuplicateItem(item.id().to_string()));
        }
        self.items.push(item);
        Ok(())
    }

    /// Remove an item, keeping the order of the rest
    pub fn remove(&mut self, id: &str) -> Option<StagedItem> {
        let index = self.items.iter().position(|i| i.id() == id)?;
        Some(self.items.remove(index))
    }

    pub fn find_by_id(&self, id: &str) -> Option<&StagedItem> {
        self.items.iter().find(|i| i.id() == id)
    }

    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut StagedItem> {
        self.items.iter_mut().find(|i| i.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find_by_id(id).is_some()
    }

    /// Snapshot of every staged item
    pub fn list_all(&self) -> Vec<StagedItem> {
        self.items.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StagedItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemKind, ItemSource};

    fn item(id: &str) -> StagedItem {
        StagedItem::new(id, ItemKind::File, ItemSource::FilePath(format!("/tmp/{}", id)), id)
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut queue = StagingQueue::new();
        for id in ["c", "a", "b"] {
            queue.append(item(id)).unwrap();
        }
        let ids: Vec<_> = queue.list_all().iter().map(|i| i.id().to_string()).collect();
        assert_eq!(ids, ["c", "a", "b"]);

        queue.remove("a").unwrap();
        let ids: Vec<_> = queue.iter().map(|i| i.id().to_string()).collect();
        assert_eq!(ids, ["c", "b"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut queue = StagingQueue::new();
        queue.append(item("x")).unwrap();
        assert_eq!(queue.append(item("x")), Err(AppError::DuplicateItem("x".into())));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove_missing_is_none() {
        let mut queue = StagingQueue::new();
        assert!(queue.remove("nope").is_none());
        assert!(queue.is_empty());
    }
}
