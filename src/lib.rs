//! Interpreter for the RiveScript chatbot scripting language.
//!
//! RiveScript documents declare trigger patterns, responses, redirects,
//! conditionals, topics and object macros. This crate parses those
//! documents, builds a sorted match index, and serves replies with variable
//! interpolation and per-user state.
//!
//! ## How the parts work together
//!
//! ```text
//! script text ── parser ──▶ ast::Root ── loader ──▶ brain tables
//!                                                     │
//!                                          sort_replies() (sorting.rs)
//!                                                     │
//!                                                     ▼
//! user message ─ normalize ─ match engine ─ tag processor ─▶ reply
//!                (tags.rs)    (reply.rs)      (tags.rs)
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use rivescript::RiveScript;
//!
//! let mut bot = RiveScript::new();
//! bot.load_file("brain.rive")?;
//! bot.sort_replies()?;
//! let reply = bot.reply("local-user", "Hello, bot!")?;
//! println!("The bot says: {reply}");
//! # Ok::<(), rivescript::Error>(())
//! ```
//!
//! Loading and sorting take `&mut self` and are therefore statically
//! excluded from running concurrently with replies; `reply` takes `&self`
//! and may be called from several threads at once. See the module docs of
//! [`sessions`] for the persistence contract.

#[macro_use]
mod macros;

pub mod ast;
mod brain;
mod config;
pub mod errors;
mod loading;
pub mod parser;
pub mod sessions;
mod utils;

pub use errors::{Error, Result};
pub use sessions::{History, MemoryStore, SessionManager, ThawAction, UserData, HISTORY_SIZE};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

/// The version of this library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Handler for object macros written in a foreign programming language.
///
/// Register one per language with
/// [`set_handler`](RiveScript::set_handler); the loader feeds it every
/// `> object` block of that language and the tag processor routes `<call>`
/// tags to it. Returning an empty string from `call` is legal.
pub trait MacroHandler: Send {
    /// Compile or register the named object from its source lines.
    fn load(&mut self, name: &str, code: &[String]);

    /// Invoke the named object with the given arguments.
    fn call(&mut self, name: &str, args: &[String]) -> String;
}

/// A native object macro: a Rust function callable from `<call>` tags.
pub type Subroutine = Arc<dyn Fn(&RiveScript, &[String]) -> String + Send + Sync>;

/// A chatbot brain: parsed topics, sorted indices and configuration.
pub struct RiveScript {
    // Interpreter knobs. `debug` and `depth` are shadowed by the script
    // globals of the same names and can be flipped mid-reply, hence atomics.
    debug: AtomicBool,
    strict: bool,
    utf8: bool,
    depth: AtomicUsize,
    unicode_punctuation: Regex,

    // Script-defined configuration. Writable during reply service through
    // tags like `<bot name=value>`, so it sits behind one mutex; reply code
    // copies values out rather than holding the lock.
    config: Mutex<ConfigMaps>,

    // Brain tables. Built by the loader, rewritten by sort_replies(), both
    // of which take &mut self; read-only while replies are served.
    topics: HashMap<String, Topic>,
    includes: HashMap<String, Vec<String>>,
    inherits: HashMap<String, Vec<String>>,
    sorted: SortBuffer,

    // Object macro registries.
    handlers: Mutex<HashMap<String, Box<dyn MacroHandler>>>,
    objlangs: Mutex<HashMap<String, String>>,
    subroutines: Mutex<HashMap<String, Subroutine>>,

    sessions: Box<dyn SessionManager>,
    rng: Mutex<StdRng>,
    current_user: Mutex<Option<String>>,
}

/// The `!` definition maps: globals, bot variables, substitutions, arrays.
#[derive(Default)]
pub(crate) struct ConfigMaps {
    pub global: HashMap<String, String>,
    pub var: HashMap<String, String>,
    pub sub: HashMap<String, String>,
    pub person: HashMap<String, String>,
    pub array: HashMap<String, Vec<String>>,
}

/// A topic's triggers as loaded into the brain. Triggers are shared
/// immutable values; the sorted indices hold clones of the same `Arc`s.
#[derive(Default)]
pub(crate) struct Topic {
    pub triggers: Vec<Arc<ast::Trigger>>,
}

/// One entry of a sorted index: the pattern text that was ranked (which may
/// carry an `{inherits=N}` prefix, or be the `%Previous` text) and the
/// trigger it belongs to.
#[derive(Clone)]
pub(crate) struct SortedTriggerEntry {
    pub pattern: String,
    pub pointer: Arc<ast::Trigger>,
}

/// Output of [`RiveScript::sort_replies`].
#[derive(Default)]
pub(crate) struct SortBuffer {
    pub topics: HashMap<String, Vec<SortedTriggerEntry>>,
    pub thats: HashMap<String, Vec<SortedTriggerEntry>>,
    pub sub: Vec<String>,
    pub person: Vec<String>,
}

impl RiveScript {
    /// Create a bot with default settings: strict syntax checking on,
    /// UTF-8 mode off, recursion depth 50, in-memory sessions, and an
    /// entropy-seeded RNG.
    pub fn new() -> Self {
        RiveScript {
            debug: AtomicBool::new(false),
            strict: true,
            utf8: false,
            depth: AtomicUsize::new(50),
            unicode_punctuation: Regex::new(r"[.,!?;:]").unwrap(),
            config: Mutex::new(ConfigMaps::default()),
            topics: HashMap::new(),
            includes: HashMap::new(),
            inherits: HashMap::new(),
            sorted: SortBuffer::default(),
            handlers: Mutex::new(HashMap::new()),
            objlangs: Mutex::new(HashMap::new()),
            subroutines: Mutex::new(HashMap::new()),
            sessions: Box::new(MemoryStore::new()),
            rng: Mutex::new(StdRng::from_entropy()),
            current_user: Mutex::new(None),
        }
    }

    /// Enable or disable debug tracing (also writable from scripts via
    /// `! global debug = true`).
    pub fn set_debug(&self, debug: bool) {
        self.debug.store(debug, Ordering::Relaxed);
    }

    /// Change the recursion depth limit (also `! global depth = N`).
    pub fn set_depth(&self, depth: usize) {
        self.depth.store(depth, Ordering::Relaxed);
    }

    /// Enable or disable strict syntax checking for subsequent loads.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Enable or disable UTF-8 mode for subsequent loads and replies.
    pub fn set_utf8(&mut self, utf8: bool) {
        self.utf8 = utf8;
    }

    /// Override the punctuation class stripped from messages in UTF-8 mode.
    pub fn set_unicode_punctuation(&mut self, pattern: &str) -> Result<()> {
        self.unicode_punctuation = Regex::new(pattern).map_err(|err| Error::Parse {
            file: "unicode_punctuation".to_string(),
            line: 0,
            reason: err.to_string(),
        })?;
        Ok(())
    }

    /// Seed the reply RNG so weighted and `{random}` picks are reproducible.
    pub fn set_seed(&self, seed: u64) {
        *self.rng_lock() = StdRng::seed_from_u64(seed);
    }

    /// Replace the session manager. Existing sessions do not migrate.
    pub fn set_session_manager(&mut self, manager: Box<dyn SessionManager>) {
        self.sessions = manager;
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub(crate) fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub(crate) fn utf8(&self) -> bool {
        self.utf8
    }

    /// Debug tracing, gated on the `debug` knob.
    pub(crate) fn say(&self, message: impl AsRef<str>) {
        if self.debug_enabled() {
            log::debug!("{}", message.as_ref());
        }
    }

    /// Non-fatal runtime warning.
    pub(crate) fn warn(&self, message: impl AsRef<str>) {
        log::warn!("{}", message.as_ref());
    }

    pub(crate) fn config_lock(&self) -> std::sync::MutexGuard<'_, ConfigMaps> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rng_lock(&self) -> std::sync::MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Draw a random index below `len` from the bot's own RNG. Access is
    /// serialized so a fixed seed stays reproducible.
    pub(crate) fn random_index(&self, len: usize) -> usize {
        self.rng_lock().gen_range(0..len)
    }

    /// Render the topic structure for inspection (the `/dump topics` REPL
    /// command).
    pub fn dump_topics(&self) -> String {
        let mut out = String::new();
        let mut names: Vec<&String> = self.topics.keys().collect();
        names.sort();
        for name in names {
            out.push_str(&format!("Topic: {name}\n"));
            for trigger in &self.topics[name].triggers {
                out.push_str(&format!("  + {}\n", trigger.trigger));
                if let Some(previous) = &trigger.previous {
                    out.push_str(&format!("    % {previous}\n"));
                }
                for cond in &trigger.condition {
                    out.push_str(&format!("    * {cond}\n"));
                }
                for reply in &trigger.reply {
                    out.push_str(&format!("    - {reply}\n"));
                }
                if let Some(redirect) = &trigger.redirect {
                    out.push_str(&format!("    @ {redirect}\n"));
                }
            }
        }
        out
    }

    /// Render the sort buffers for inspection (the `/dump sorted` REPL
    /// command).
    pub fn dump_sorted(&self) -> String {
        let mut out = String::new();
        for (label, tree) in [("Topics", &self.sorted.topics), ("Thats", &self.sorted.thats)] {
            out.push_str(&format!("Sort buffer: {label}\n"));
            let mut names: Vec<&String> = tree.keys().collect();
            names.sort();
            for name in names {
                out.push_str(&format!("  Topic: {name}\n"));
                for entry in &tree[name] {
                    out.push_str(&format!("    + {}\n", entry.pattern));
                }
            }
        }
        for (label, list) in [
            ("Substitutions", &self.sorted.sub),
            ("Person Substitutions", &self.sorted.person),
        ] {
            out.push_str(&format!("Sort buffer: {label}\n"));
            for item in list {
                out.push_str(&format!("  {item}\n"));
            }
        }
        out
    }
}

impl Default for RiveScript {
    fn default() -> Self {
        Self::new()
    }
}
