//! Public configuration API.
//!
//! Everything here is callable at runtime, from any thread: the underlying
//! maps are mutex-guarded. The string `undefined` is the universal deletion
//! sentinel, mirroring the `<undef>` token in script syntax.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use crate::errors::{Error, Result};
use crate::sessions::{ThawAction, UserData};
use crate::{MacroHandler, RiveScript, Subroutine};

/// The runtime deletion sentinel.
const UNDEFINED: &str = "undefined";

impl RiveScript {
    /// Set a global variable (equivalent to `! global` in script). The
    /// reserved names `debug` and `depth` reconfigure the interpreter.
    pub fn set_global(&self, name: &str, value: &str) {
        let mut config = self.config_lock();
        if value == UNDEFINED {
            config.global.remove(name);
            return;
        }
        match name {
            "debug" => self.set_debug(value == "true"),
            "depth" => match value.parse() {
                Ok(depth) => self.set_depth(depth),
                Err(_) => self.warn(format!("Can't set global depth to {value}: not a number")),
            },
            _ => {}
        }
        config.global.insert(name.to_string(), value.to_string());
    }

    /// Get a global variable. `debug` and `depth` report the live knobs.
    pub fn get_global(&self, name: &str) -> Result<String> {
        match name {
            "debug" => Ok(self.debug_enabled().to_string()),
            "depth" => Ok(self.depth().to_string()),
            _ => self
                .config_lock()
                .global
                .get(name)
                .cloned()
                .ok_or_else(|| Error::NoSuchVariable(name.to_string())),
        }
    }

    /// Set a bot variable (equivalent to `! var`).
    pub fn set_variable(&self, name: &str, value: &str) {
        let mut config = self.config_lock();
        if value == UNDEFINED {
            config.var.remove(name);
        } else {
            config.var.insert(name.to_string(), value.to_string());
        }
    }

    /// Get a bot variable (what `<bot name>` reads).
    pub fn get_variable(&self, name: &str) -> Result<String> {
        self.config_lock()
            .var
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NoSuchVariable(name.to_string()))
    }

    /// Set a substitution pattern (equivalent to `! sub`).
    ///
    /// Substitutions added after [`sort_replies`](RiveScript::sort_replies)
    /// only take effect after the next sort.
    pub fn set_substitution(&self, name: &str, value: &str) {
        let mut config = self.config_lock();
        if value == UNDEFINED {
            config.sub.remove(name);
        } else {
            config.sub.insert(name.to_string(), value.to_string());
        }
    }

    /// Set a person substitution pattern (equivalent to `! person`).
    pub fn set_person(&self, name: &str, value: &str) {
        let mut config = self.config_lock();
        if value == UNDEFINED {
            config.person.remove(name);
        } else {
            config.person.insert(name.to_string(), value.to_string());
        }
    }

    /// Set a user variable (equivalent to `<set>`). `undefined` deletes.
    pub fn set_uservar(&self, username: &str, name: &str, value: &str) {
        let mut vars = HashMap::new();
        vars.insert(name.to_string(), value.to_string());
        self.sessions.set(username, vars);
    }

    /// Set many user variables at once.
    pub fn set_uservars(&self, username: &str, vars: HashMap<String, String>) {
        self.sessions.set(username, vars);
    }

    /// Get a user variable (what `<get name>` reads).
    pub fn get_uservar(&self, username: &str, name: &str) -> Result<String> {
        self.sessions.get(username, name)
    }

    /// Get all variables for one user.
    pub fn get_uservars(&self, username: &str) -> Result<HashMap<String, String>> {
        self.sessions.get_any(username).map(|data| data.variables)
    }

    /// Get the full session record for every known user.
    pub fn get_all_uservars(&self) -> HashMap<String, UserData> {
        self.sessions.get_all()
    }

    /// Delete one user's session entirely.
    pub fn clear_uservars(&self, username: &str) {
        self.sessions.clear(username);
    }

    /// Delete every session.
    pub fn clear_all_uservars(&self) {
        self.sessions.clear_all();
    }

    /// Snapshot a user's session for later restoration.
    pub fn freeze_uservars(&self, username: &str) -> Result<()> {
        self.sessions.freeze(username)
    }

    /// Restore or discard a frozen session snapshot.
    pub fn thaw_uservars(&self, username: &str, action: ThawAction) -> Result<()> {
        self.sessions.thaw(username, action)
    }

    /// The raw pattern text of the last trigger the user matched.
    pub fn last_match(&self, username: &str) -> Result<String> {
        self.sessions.get_last_match(username)
    }

    /// The user a reply is currently being produced for. Only meaningful
    /// from inside an object macro; errors outside a reply context.
    pub fn current_user(&self) -> Result<String> {
        self.current_user
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::NotReplying)
    }

    /// Register an object macro handler for a programming language.
    pub fn set_handler(&self, language: &str, handler: Box<dyn MacroHandler>) {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(language.to_string(), handler);
    }

    /// Remove a language handler, forgetting every object it had loaded.
    pub fn remove_handler(&self, language: &str) {
        let mut objlangs = self
            .objlangs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        objlangs.retain(|_, lang| lang != language);
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(language);
    }

    /// Define a native object macro callable via `<call>name args</call>`.
    pub fn set_subroutine(
        &self,
        name: &str,
        func: impl Fn(&RiveScript, &[String]) -> String + Send + Sync + 'static,
    ) {
        self.subroutines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::new(func) as Subroutine);
    }

    /// Remove a native object macro.
    pub fn delete_subroutine(&self, name: &str) {
        self.subroutines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }
}
