// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Local index of current objects for one resource type
//!
//! The index is the source of truth for snapshot lists. Applying an upstream
//! change to it yields the change events to record: a key seen for the first
//! time is ADDED, a changed one MODIFIED, a removed one DELETED.
//!
//! A (re)list is staged separately and swapped in on completion, so the index
//! never exposes a half-listed state. The swap is diffed against the previous
//! contents so that consumers see deletions that happened while the upstream
//! watch was broken.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use super::event_log::ChangeEvent;

/// Identity of an object within a resource type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()).map(String::from),
            name: name.to_string(),
        }
    }

    /// Key of a JSON object; `None` when it has no `metadata.name`
    pub fn of(object: &Value) -> Option<Self> {
        let metadata = object.get("metadata")?;
        let name = metadata.get("name")?.as_str()?;
        let namespace = metadata.get("namespace").and_then(Value::as_str);
        Some(Self::new(namespace, name))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Default)]
pub struct ObjectIndex {
    objects: BTreeMap<ObjectKey, Value>,
    /// Objects collected by an in-progress (re)list
    staged: Option<BTreeMap<ObjectKey, Value>>,
}

impl ObjectIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&Value> {
        self.objects.get(key)
    }

    /// Current objects, ordered by key
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.objects.values()
    }

    /// Insert or replace an object
    ///
    /// Returns `None` when the object has no name or is unchanged.
    pub fn upsert(&mut self, object: Value) -> Option<ChangeEvent> {
        let key = ObjectKey::of(&object)?;
        match self.objects.get(&key) {
            Some(existing) if *existing == object => None,
            Some(_) => {
                self.objects.insert(key, object.clone());
                Some(ChangeEvent::modified(object))
            }
            None => {
                self.objects.insert(key, object.clone());
                Some(ChangeEvent::added(object))
            }
        }
    }

    /// Remove an object; the event carries the object's final state
    pub fn remove(&mut self, object: Value) -> Option<ChangeEvent> {
        let key = ObjectKey::of(&object)?;
        self.objects
            .remove(&key)
            .map(|_| ChangeEvent::deleted(object))
    }

    /// Start collecting a fresh listing
    pub fn begin_relist(&mut self) {
        self.staged = Some(BTreeMap::new());
    }

    /// Add an object to the in-progress listing
    pub fn stage(&mut self, object: Value) {
        let Some(key) = ObjectKey::of(&object) else {
            return;
        };
        self.staged.get_or_insert_with(BTreeMap::new).insert(key, object);
    }

    /// Swap in the staged listing and return the differences
    ///
    /// Deletions come first, followed by additions and modifications in key
    /// order.
    pub fn finish_relist(&mut self) -> Vec<ChangeEvent> {
        let fresh = self.staged.take().unwrap_or_default();
        let previous = std::mem::replace(&mut self.objects, fresh);

        let mut events: Vec<ChangeEvent> = previous
            .iter()
            .filter(|(key, _)| !self.objects.contains_key(*key))
            .map(|(_, object)| ChangeEvent::deleted(object.clone()))
            .collect();

        for (key, object) in &self.objects {
            match previous.get(key) {
                None => events.push(ChangeEvent::added(object.clone())),
                Some(old) if old != object => events.push(ChangeEvent::modified(object.clone())),
                Some(_) => {}
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::event_log::EventKind;
    use serde_json::json;

    fn svc(name: &str, rv: &str) -> Value {
        json!({"metadata": {"namespace": "default", "name": name, "resourceVersion": rv}})
    }

    fn summary(events: &[ChangeEvent]) -> Vec<(EventKind, String)> {
        events
            .iter()
            .map(|e| {
                (
                    e.kind,
                    e.object["metadata"]["name"].as_str().unwrap().to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn test_object_key() {
        let key = ObjectKey::of(&svc("web", "1")).unwrap();
        assert_eq!(key.to_string(), "default/web");

        let cluster = ObjectKey::of(&json!({"metadata": {"name": "node-1", "namespace": ""}})).unwrap();
        assert_eq!(cluster.namespace, None);
        assert_eq!(cluster.to_string(), "node-1");

        assert!(ObjectKey::of(&json!({"metadata": {}})).is_none());
    }

    #[test]
    fn test_upsert_distinguishes_add_and_modify() {
        let mut index = ObjectIndex::new();
        assert_eq!(index.upsert(svc("web", "1")).unwrap().kind, EventKind::Added);
        assert_eq!(index.upsert(svc("web", "2")).unwrap().kind, EventKind::Modified);
        assert!(index.upsert(svc("web", "2")).is_none());
        assert!(index.upsert(json!({"spec": {}})).is_none());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut index = ObjectIndex::new();
        index.upsert(svc("web", "1"));

        let event = index.remove(svc("web", "2")).unwrap();
        assert_eq!(event.kind, EventKind::Deleted);
        assert_eq!(event.object["metadata"]["resourceVersion"], "2");
        assert_eq!(index.len(), 0);

        assert!(index.remove(svc("web", "3")).is_none());
    }

    #[test]
    fn test_initial_list_adds_everything() {
        let mut index = ObjectIndex::new();
        index.begin_relist();
        index.stage(svc("b", "1"));
        index.stage(svc("a", "1"));
        assert_eq!(index.len(), 0);

        let events = index.finish_relist();
        assert_eq!(
            summary(&events),
            vec![
                (EventKind::Added, "a".to_string()),
                (EventKind::Added, "b".to_string())
            ]
        );
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_relist_diff() {
        let mut index = ObjectIndex::new();
        index.upsert(svc("keep", "1"));
        index.upsert(svc("change", "1"));
        index.upsert(svc("gone", "1"));

        index.begin_relist();
        index.stage(svc("keep", "1"));
        index.stage(svc("change", "2"));
        index.stage(svc("new", "1"));
        let events = index.finish_relist();

        assert_eq!(
            summary(&events),
            vec![
                (EventKind::Deleted, "gone".to_string()),
                (EventKind::Modified, "change".to_string()),
                (EventKind::Added, "new".to_string()),
            ]
        );
        let names: Vec<_> = index
            .iter()
            .map(|o| o["metadata"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["change", "keep", "new"]);
    }

    #[test]
    fn test_empty_relist_deletes_all() {
        let mut index = ObjectIndex::new();
        index.upsert(svc("a", "1"));
        index.begin_relist();
        let events = index.finish_relist();
        assert_eq!(summary(&events), vec![(EventKind::Deleted, "a".to_string())]);
        assert_eq!(index.len(), 0);
    }
}
