//! Abstract syntax tree for parsed RiveScript documents.
//!
//! The parser emits a [`Root`] per parse; the loader merges successive roots
//! into the live brain. These are passive containers: all behavior lives in
//! the parser and the brain.

use std::collections::HashMap;

/// Root of the tree for one parsed document.
#[derive(Debug, Clone, Default)]
pub struct Root {
    /// Begin-block style data: variables, substitutions, arrays.
    pub begin: Begin,
    /// Topic name to topic body. The `random` topic always exists.
    pub topics: HashMap<String, Topic>,
    /// Object macros, in source order.
    pub objects: Vec<Object>,
}

/// Configuration data gathered from `!` definition lines.
#[derive(Debug, Clone, Default)]
pub struct Begin {
    pub global: HashMap<String, String>,
    pub var: HashMap<String, String>,
    pub sub: HashMap<String, String>,
    pub person: HashMap<String, String>,
    pub array: HashMap<String, Vec<String>>,
}

/// A named group of triggers.
///
/// `includes` and `inherits` keep script order so downstream traversal is
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct Topic {
    pub triggers: Vec<Trigger>,
    pub includes: Vec<String>,
    pub inherits: Vec<String>,
}

/// A `+` pattern and everything attached to it.
#[derive(Debug, Clone, Default)]
pub struct Trigger {
    /// The raw pattern text.
    pub trigger: String,
    /// `-` response lines.
    pub reply: Vec<String>,
    /// `*` condition lines.
    pub condition: Vec<String>,
    /// `@` redirect target, if any.
    pub redirect: Option<String>,
    /// `%Previous` pattern, if any.
    pub previous: Option<String>,
}

/// Source code of an object macro.
#[derive(Debug, Clone)]
pub struct Object {
    pub name: String,
    pub language: String,
    pub code: Vec<String>,
}

impl Root {
    /// Create an empty tree with the `random` topic initialized.
    pub fn new() -> Self {
        let mut root = Root::default();
        root.add_topic("random");
        root
    }

    /// Make sure a topic exists so triggers can be added to it.
    pub fn add_topic(&mut self, name: &str) -> &mut Topic {
        self.topics.entry(name.to_string()).or_default()
    }
}
