//! Session manager contract and the default in-memory store.
//!
//! The engine never owns user state directly: every read and write of user
//! variables, match state and history goes through a [`SessionManager`].
//! The default is [`MemoryStore`], which keeps everything in a mutex-guarded
//! map. Embedders that want active persistence (a database, a cache) can
//! implement the trait themselves; the record types derive serde traits so a
//! per-user JSON document is one call away.

#[path = "sessions/memory.rs"]
mod memory;

pub use memory::MemoryStore;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Number of input/reply pairs remembered per user.
pub const HISTORY_SIZE: usize = 9;

/// Everything the engine knows about one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    /// Free-form user variables. Always contains `topic` (default `random`).
    #[serde(rename = "vars")]
    pub variables: HashMap<String, String>,
    /// Raw pattern text of the last trigger this user matched.
    #[serde(rename = "lastMatch")]
    pub last_match: String,
    pub history: History,
}

/// Recent input and reply history, newest first.
///
/// Both rings hold exactly [`HISTORY_SIZE`] entries; unused slots hold the
/// literal string `undefined` so `<input9>` always expands to something.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct History {
    pub input: Vec<String>,
    pub reply: Vec<String>,
}

impl History {
    pub fn new() -> Self {
        History {
            input: vec!["undefined".to_string(); HISTORY_SIZE],
            reply: vec!["undefined".to_string(); HISTORY_SIZE],
        }
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl UserData {
    /// A fresh session: topic `random`, no last match, empty history.
    pub fn new() -> Self {
        let mut variables = HashMap::new();
        variables.insert("topic".to_string(), "random".to_string());
        UserData {
            variables,
            last_match: String::new(),
            history: History::new(),
        }
    }
}

impl Default for UserData {
    fn default() -> Self {
        Self::new()
    }
}

/// What to do with the frozen copy when thawing a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThawAction {
    /// Restore the variables and erase the frozen copy.
    Thaw,
    /// Erase the frozen copy without restoring.
    Discard,
    /// Restore the variables and keep the frozen copy.
    Keep,
}

/// Storage abstraction for per-user state.
///
/// Implementations must be internally synchronized: the engine calls these
/// methods through `&self`, possibly from several reply threads at once.
/// The value `undefined` passed to [`set`](SessionManager::set) deletes the
/// key.
pub trait SessionManager: Send + Sync {
    /// Make sure a session exists for `username`, creating a default one
    /// (topic `random`, 9-slot `undefined` history) if not.
    fn init(&self, username: &str);

    /// Merge variables into the user's session. `undefined` deletes a key.
    fn set(&self, username: &str, vars: HashMap<String, String>);

    /// Prepend input and reply to the history rings, dropping the oldest
    /// entries to keep exactly [`HISTORY_SIZE`] of each.
    fn add_history(&self, username: &str, input: &str, reply: &str);

    /// Record the raw pattern text of the trigger the user just matched.
    fn set_last_match(&self, username: &str, trigger: &str);

    /// Read one user variable.
    fn get(&self, username: &str, key: &str) -> Result<String>;

    /// Read a copy of everything about one user.
    fn get_any(&self, username: &str) -> Result<UserData>;

    /// Read a copy of everything about every user.
    fn get_all(&self) -> HashMap<String, UserData>;

    fn get_last_match(&self, username: &str) -> Result<String>;

    fn get_history(&self, username: &str) -> Result<History>;

    /// Forget one user entirely.
    fn clear(&self, username: &str);

    /// Forget every user, frozen copies included.
    fn clear_all(&self);

    /// Take a deep snapshot of the user's session.
    fn freeze(&self, username: &str) -> Result<()>;

    /// Restore (or discard) a previously frozen snapshot.
    fn thaw(&self, username: &str, action: ThawAction) -> Result<()>;
}
