//! Loading RiveScript documents into the brain.
//!
//! Three entry points feed the same pipeline: [`RiveScript::load_file`],
//! [`RiveScript::load_directory`] and [`RiveScript::stream`]. Each runs the
//! parser and merges the resulting AST into the live tables. Sorting is a
//! separate, explicit step: call
//! [`sort_replies`](RiveScript::sort_replies) once loading is done.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::parser::{Parser, ParserConfig};
use crate::{Error, Result, RiveScript};

/// The script-syntax deletion sentinel (`! var name = <undef>`).
const UNDEF_TAG: &str = "<undef>";

/// File extensions accepted by the directory loader when none are given.
const DEFAULT_EXTENSIONS: &[&str] = &[".rive", ".rs"];

impl RiveScript {
    /// Load a single RiveScript document from disk.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.say(format!("Load RiveScript file: {}", path.display()));

        let text = fs::read_to_string(path)?;
        let lines: Vec<&str> = text.lines().collect();
        self.parse(&path.to_string_lossy(), &lines)
    }

    /// Load every matching document from a directory.
    ///
    /// With no `extensions` the defaults `.rive` and `.rs` apply. A
    /// directory containing no matching files is an error: it almost always
    /// means the bot is pointed at the wrong path.
    pub fn load_directory(&mut self, path: impl AsRef<Path>, extensions: &[&str]) -> Result<()> {
        let path = path.as_ref();
        let extensions = if extensions.is_empty() {
            DEFAULT_EXTENSIONS
        } else {
            extensions
        };

        let mut files: Vec<_> = fs::read_dir(path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                let name = p.to_string_lossy();
                extensions.iter().any(|ext| name.ends_with(ext))
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(Error::NoFilesFound(path.display().to_string()));
        }

        for file in files {
            self.load_file(&file)?;
        }
        Ok(())
    }

    /// Load RiveScript source from a string buffer.
    pub fn stream(&mut self, code: &str) -> Result<()> {
        let lines: Vec<&str> = code.lines().collect();
        self.parse("Stream()", &lines)
    }

    /// Parse one document and merge the AST into the brain tables.
    fn parse(&mut self, filename: &str, lines: &[&str]) -> Result<()> {
        let parser = Parser::new(ParserConfig {
            strict: self.strict,
            utf8: self.utf8,
            on_warn: None,
        });
        let tree = parser.parse(filename, lines)?;

        {
            let mut config = self.config_lock();

            for (key, value) in tree.begin.global {
                if value == UNDEF_TAG {
                    config.global.remove(&key);
                    continue;
                }
                // debug and depth shadow interpreter knobs.
                match key.as_str() {
                    "debug" => self.set_debug(value == "true"),
                    "depth" => match value.parse() {
                        Ok(depth) => self.set_depth(depth),
                        Err(_) => {
                            self.warn(format!("Can't set global depth to {value}: not a number"))
                        }
                    },
                    _ => {
                        config.global.insert(key, value);
                    }
                }
            }

            for (key, value) in tree.begin.var {
                if value == UNDEF_TAG {
                    config.var.remove(&key);
                } else {
                    config.var.insert(key, value);
                }
            }
            for (key, value) in tree.begin.sub {
                if value == UNDEF_TAG {
                    config.sub.remove(&key);
                } else {
                    config.sub.insert(key, value);
                }
            }
            for (key, value) in tree.begin.person {
                if value == UNDEF_TAG {
                    config.person.remove(&key);
                } else {
                    config.person.insert(key, value);
                }
            }
            for (name, fields) in tree.begin.array {
                config.array.insert(name, fields);
            }
        }

        for (name, topic) in tree.topics {
            let entry = self.topics.entry(name.clone()).or_default();
            entry
                .triggers
                .extend(topic.triggers.into_iter().map(Arc::new));

            for included in topic.includes {
                let list = self.includes.entry(name.clone()).or_default();
                if !list.contains(&included) {
                    list.push(included);
                }
            }
            for inherited in topic.inherits {
                let list = self.inherits.entry(name.clone()).or_default();
                if !list.contains(&inherited) {
                    list.push(inherited);
                }
            }
        }

        // Hand object macros to their language handlers. Objects in a
        // language with no registered handler are dropped silently; the
        // <call> tag reports them as not found.
        let mut handlers = self.handlers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut objlangs = self.objlangs.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for object in tree.objects {
            if let Some(handler) = handlers.get_mut(&object.language) {
                handler.load(&object.name, &object.code);
                objlangs.insert(object.name, object.language);
            }
        }

        Ok(())
    }
}
