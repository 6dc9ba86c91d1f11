//! Pool transactions
//!
//! A [`Transaction`] stages object allocations, writes, frees and root
//! changes on top of the committed image. Nothing staged is visible outside
//! the transaction; [`PersistentPool::transaction`](crate::PersistentPool::transaction)
//! either applies and persists the whole staged set or drops it.

use crate::error::{PoolError, PoolResult};
use crate::format::PoolImage;
use pmstore_core::ObjectId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Staged mutation set against one pool image
pub struct Transaction<'a> {
    base: &'a PoolImage,
    next_id: u64,
    /// Staged object contents; `None` marks a freed object
    staged: BTreeMap<ObjectId, Option<Vec<u8>>>,
    /// Staged root pointer, if changed
    root: Option<Option<ObjectId>>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(base: &'a PoolImage) -> Self {
        Transaction {
            base,
            next_id: base.next_id,
            staged: BTreeMap::new(),
            root: None,
        }
    }

    /// Allocate a new object holding `value`
    pub fn alloc<T: Serialize>(&mut self, value: &T) -> PoolResult<ObjectId> {
        let bytes = bincode::serialize(value)?;
        let id = ObjectId::new(self.next_id);
        self.next_id += 1;
        self.staged.insert(id, Some(bytes));
        Ok(id)
    }

    /// Overwrite a live object
    pub fn write<T: Serialize>(&mut self, id: ObjectId, value: &T) -> PoolResult<()> {
        self.ensure_live(id)?;
        let bytes = bincode::serialize(value)?;
        self.staged.insert(id, Some(bytes));
        Ok(())
    }

    /// Read an object as seen by this transaction
    pub fn read<T: DeserializeOwned>(&self, id: ObjectId) -> PoolResult<T> {
        let bytes = self.live(id).ok_or(PoolError::MissingObject(id))?;
        Ok(bincode::deserialize(bytes)?)
    }

    /// Check whether `id` is live as seen by this transaction
    pub fn contains(&self, id: ObjectId) -> bool {
        self.live(id).is_some()
    }

    /// Free a live object
    pub fn free(&mut self, id: ObjectId) -> PoolResult<()> {
        self.ensure_live(id)?;
        if self.root_id() == Some(id) {
            self.root = Some(None);
        }
        self.staged.insert(id, None);
        Ok(())
    }

    /// Root object as seen by this transaction
    pub fn root_id(&self) -> Option<ObjectId> {
        match self.root {
            Some(root) => root,
            None => self.base.root,
        }
    }

    /// Point the root table at `id` (or clear it)
    pub fn set_root(&mut self, id: Option<ObjectId>) -> PoolResult<()> {
        if let Some(id) = id {
            self.ensure_live(id)?;
        }
        self.root = Some(id);
        Ok(())
    }

    /// Check if nothing has been staged
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty() && self.root.is_none()
    }

    fn live(&self, id: ObjectId) -> Option<&[u8]> {
        match self.staged.get(&id) {
            Some(Some(bytes)) => Some(bytes.as_slice()),
            Some(None) => None,
            None => self.base.objects.get(&id).map(Vec::as_slice),
        }
    }

    fn ensure_live(&self, id: ObjectId) -> PoolResult<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(PoolError::MissingObject(id))
        }
    }

    /// Produce the image that results from applying the staged set
    pub(crate) fn apply(self) -> PoolImage {
        let mut image = self.base.clone();
        for (id, bytes) in self.staged {
            match bytes {
                Some(bytes) => {
                    image.objects.insert(id, bytes);
                }
                None => {
                    image.objects.remove(&id);
                }
            }
        }
        if let Some(root) = self.root {
            image.root = root;
        }
        image.next_id = self.next_id;
        image
    }
}
