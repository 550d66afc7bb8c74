//! Live instance registry
//!
//! Tracks the set of registered instances per concrete type, keyed by
//! allocation identity (no duplicates). Each entry also carries the
//! transition bookkeeping the engine needs: whether the instance is
//! currently active, which provided services its last activation actually
//! published, and a generation counter that invalidates in-flight
//! asynchronous activations when the instance transitions underneath them.

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use weft_domain::{InstanceHandle, InstanceKey, ServiceHandle};

/// One registered instance of a concrete type
pub struct InstanceEntry {
    handle: InstanceHandle,
    key: InstanceKey,
    active: Cell<bool>,
    generation: Cell<u64>,
    published: RefCell<Vec<(usize, ServiceHandle)>>,
}

impl InstanceEntry {
    fn new(handle: InstanceHandle) -> Rc<Self> {
        let key = InstanceKey::of(&handle);
        Rc::new(Self {
            handle,
            key,
            active: Cell::new(false),
            generation: Cell::new(0),
            published: RefCell::new(Vec::new()),
        })
    }

    /// The type-erased instance
    pub fn handle(&self) -> &InstanceHandle {
        &self.handle
    }

    /// Allocation identity of the instance
    pub fn key(&self) -> InstanceKey {
        self.key
    }

    /// Whether the instance is currently activated
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub(crate) fn set_active(&self) -> bool {
        self.active.replace(true)
    }

    pub(crate) fn take_active(&self) -> bool {
        self.active.replace(false)
    }

    pub(crate) fn bump_generation(&self) -> u64 {
        let next = self.generation.get() + 1;
        self.generation.set(next);
        next
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub(crate) fn push_published(&self, index: usize, handle: ServiceHandle) {
        self.published.borrow_mut().push((index, handle));
    }

    pub(crate) fn retract_published(&self, index: usize) {
        self.published
            .borrow_mut()
            .retain(|(existing, _)| *existing != index);
    }

    pub(crate) fn take_published(&self) -> Vec<(usize, ServiceHandle)> {
        std::mem::take(&mut self.published.borrow_mut())
    }
}

/// Registered instances per concrete type
pub struct InstanceMap {
    map: RefCell<HashMap<TypeId, Vec<Rc<InstanceEntry>>>>,
}

impl InstanceMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self {
            map: RefCell::new(HashMap::new()),
        }
    }

    /// Store an instance, returning its entry.
    ///
    /// The caller checks for duplicates first; storing is unconditional.
    pub fn add(&self, type_id: TypeId, handle: InstanceHandle) -> Rc<InstanceEntry> {
        let entry = InstanceEntry::new(handle);
        self.map
            .borrow_mut()
            .entry(type_id)
            .or_default()
            .push(Rc::clone(&entry));
        entry
    }

    /// Remove an instance by identity
    pub fn remove(&self, type_id: TypeId, key: InstanceKey) -> Option<Rc<InstanceEntry>> {
        let mut map = self.map.borrow_mut();
        let entries = map.get_mut(&type_id)?;
        let position = entries.iter().position(|entry| entry.key() == key)?;
        Some(entries.remove(position))
    }

    /// Whether an instance is registered
    pub fn contains(&self, type_id: TypeId, key: InstanceKey) -> bool {
        self.map
            .borrow()
            .get(&type_id)
            .is_some_and(|entries| entries.iter().any(|entry| entry.key() == key))
    }

    /// Fetch an instance entry by identity
    pub fn get(&self, type_id: TypeId, key: InstanceKey) -> Option<Rc<InstanceEntry>> {
        self.map
            .borrow()
            .get(&type_id)?
            .iter()
            .find(|entry| entry.key() == key)
            .cloned()
    }

    /// Snapshot of every registered instance of a type.
    ///
    /// Transition callbacks run against snapshots so user code may register
    /// and unregister instances while the engine iterates.
    pub fn snapshot(&self, type_id: TypeId) -> Vec<Rc<InstanceEntry>> {
        self.map
            .borrow()
            .get(&type_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Types that currently have registered instances
    pub fn types(&self) -> Vec<TypeId> {
        self.map
            .borrow()
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(type_id, _)| *type_id)
            .collect()
    }

    /// Number of registered instances of a type
    pub fn count(&self, type_id: TypeId) -> usize {
        self.map.borrow().get(&type_id).map_or(0, Vec::len)
    }
}

impl Default for InstanceMap {
    fn default() -> Self {
        Self::new()
    }
}
