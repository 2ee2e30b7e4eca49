//! Default in-memory session store.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::errors::{Error, Result};
use crate::sessions::{History, SessionManager, ThawAction, UserData};

/// Keeps every session in process memory behind one mutex.
///
/// Nothing survives a restart. Use [`SessionManager::get_all`] to export
/// sessions before shutdown and [`SessionManager::set`] to import them
/// again if you need cheap persistence.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Store>,
}

#[derive(Default)]
struct Store {
    users: HashMap<String, UserData>,
    frozen: HashMap<String, UserData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionManager for MemoryStore {
    fn init(&self, username: &str) {
        let mut store = self.lock();
        store
            .users
            .entry(username.to_string())
            .or_insert_with(UserData::new);
    }

    fn set(&self, username: &str, vars: HashMap<String, String>) {
        let mut store = self.lock();
        let data = store
            .users
            .entry(username.to_string())
            .or_insert_with(UserData::new);
        for (key, value) in vars {
            if value == "undefined" {
                data.variables.remove(&key);
            } else {
                data.variables.insert(key, value);
            }
        }
    }

    fn add_history(&self, username: &str, input: &str, reply: &str) {
        let mut store = self.lock();
        let data = store
            .users
            .entry(username.to_string())
            .or_insert_with(UserData::new);
        data.history.input.pop();
        data.history.input.insert(0, input.trim().to_string());
        data.history.reply.pop();
        data.history.reply.insert(0, reply.trim().to_string());
    }

    fn set_last_match(&self, username: &str, trigger: &str) {
        let mut store = self.lock();
        let data = store
            .users
            .entry(username.to_string())
            .or_insert_with(UserData::new);
        data.last_match = trigger.to_string();
    }

    fn get(&self, username: &str, key: &str) -> Result<String> {
        let store = self.lock();
        let data = store
            .users
            .get(username)
            .ok_or_else(|| Error::NoSuchUser(username.to_string()))?;
        data.variables
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NoSuchVariable(key.to_string()))
    }

    fn get_any(&self, username: &str) -> Result<UserData> {
        let store = self.lock();
        store
            .users
            .get(username)
            .cloned()
            .ok_or_else(|| Error::NoSuchUser(username.to_string()))
    }

    fn get_all(&self) -> HashMap<String, UserData> {
        self.lock().users.clone()
    }

    fn get_last_match(&self, username: &str) -> Result<String> {
        let store = self.lock();
        store
            .users
            .get(username)
            .map(|data| data.last_match.clone())
            .ok_or_else(|| Error::NoSuchUser(username.to_string()))
    }

    fn get_history(&self, username: &str) -> Result<History> {
        let store = self.lock();
        store
            .users
            .get(username)
            .map(|data| data.history.clone())
            .ok_or_else(|| Error::NoSuchUser(username.to_string()))
    }

    fn clear(&self, username: &str) {
        self.lock().users.remove(username);
    }

    fn clear_all(&self) {
        let mut store = self.lock();
        store.users.clear();
        store.frozen.clear();
    }

    fn freeze(&self, username: &str) -> Result<()> {
        let mut store = self.lock();
        let data = store
            .users
            .get(username)
            .cloned()
            .ok_or_else(|| Error::NoSuchUser(username.to_string()))?;
        store.frozen.insert(username.to_string(), data);
        Ok(())
    }

    fn thaw(&self, username: &str, action: ThawAction) -> Result<()> {
        let mut store = self.lock();
        if !store.frozen.contains_key(username) {
            return Err(Error::NotFrozen(username.to_string()));
        }
        match action {
            ThawAction::Thaw => {
                if let Some(frozen) = store.frozen.remove(username) {
                    store.users.insert(username.to_string(), frozen);
                }
            }
            ThawAction::Discard => {
                store.frozen.remove(username);
            }
            ThawAction::Keep => {
                if let Some(frozen) = store.frozen.get(username).cloned() {
                    store.users.insert(username.to_string(), frozen);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn new_sessions_default_to_random_topic() {
        let store = MemoryStore::new();
        store.init("alice");
        assert_eq!(store.get("alice", "topic").unwrap(), "random");
        assert_eq!(store.get_last_match("alice").unwrap(), "");
    }

    #[test]
    fn undefined_deletes_a_variable() {
        let store = MemoryStore::new();
        store.set("alice", vars(&[("name", "Alice")]));
        assert_eq!(store.get("alice", "name").unwrap(), "Alice");

        store.set("alice", vars(&[("name", "undefined")]));
        assert!(matches!(
            store.get("alice", "name"),
            Err(Error::NoSuchVariable(_))
        ));
    }

    #[test]
    fn history_keeps_the_latest_nine() {
        let store = MemoryStore::new();
        store.init("alice");
        for i in 1..=12 {
            store.add_history("alice", &format!("in{i}"), &format!("out{i}"));
        }

        let history = store.get_history("alice").unwrap();
        assert_eq!(history.input.len(), 9);
        assert_eq!(history.input[0], "in12");
        assert_eq!(history.input[8], "in4");
        assert_eq!(history.reply[0], "out12");
    }

    #[test]
    fn history_pads_with_undefined() {
        let store = MemoryStore::new();
        store.init("alice");
        store.add_history("alice", "hello", "hi");

        let history = store.get_history("alice").unwrap();
        assert_eq!(history.input[0], "hello");
        assert_eq!(history.input[1], "undefined");
        assert_eq!(history.reply[8], "undefined");
    }

    #[test]
    fn freeze_and_thaw_restores_variables() {
        let store = MemoryStore::new();
        store.set("alice", vars(&[("name", "Alice")]));
        store.freeze("alice").unwrap();
        store.set("alice", vars(&[("name", "Bob")]));

        store.thaw("alice", ThawAction::Thaw).unwrap();
        assert_eq!(store.get("alice", "name").unwrap(), "Alice");

        // The frozen copy is gone after a plain thaw.
        assert!(matches!(
            store.thaw("alice", ThawAction::Thaw),
            Err(Error::NotFrozen(_))
        ));
    }

    #[test]
    fn thaw_keep_preserves_the_snapshot() {
        let store = MemoryStore::new();
        store.set("alice", vars(&[("name", "Alice")]));
        store.freeze("alice").unwrap();
        store.set("alice", vars(&[("name", "Bob")]));

        store.thaw("alice", ThawAction::Keep).unwrap();
        assert_eq!(store.get("alice", "name").unwrap(), "Alice");

        // Still frozen; a second thaw works.
        store.set("alice", vars(&[("name", "Carol")]));
        store.thaw("alice", ThawAction::Thaw).unwrap();
        assert_eq!(store.get("alice", "name").unwrap(), "Alice");
    }

    #[test]
    fn thaw_discard_drops_without_restoring() {
        let store = MemoryStore::new();
        store.set("alice", vars(&[("name", "Alice")]));
        store.freeze("alice").unwrap();
        store.set("alice", vars(&[("name", "Bob")]));

        store.thaw("alice", ThawAction::Discard).unwrap();
        assert_eq!(store.get("alice", "name").unwrap(), "Bob");
    }

    #[test]
    fn thaw_unknown_user_is_an_error() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.thaw("ghost", ThawAction::Thaw),
            Err(Error::NotFrozen(_))
        ));
    }
}
