//! RiveScript source parser.
//!
//! This module is a standalone parser: feed it a filename (used only for
//! warnings) and the lines of a document, get back an [`ast::Root`]. It can
//! be used on its own to syntax-check scripts without building a full bot;
//! the engine's loader drives it internally.
//!
//! Parsing is line-oriented. The first non-whitespace character of each line
//! is the command:
//!
//! ```text
//! !   definition        >   open label        <   close label
//! +   trigger           -   response          %   previous
//! ^   continuation      @   redirect          *   condition
//! //  comment           /* ... */             block comment
//! ```
//!
//! `%` and `^` are never handled directly: before acting on any other
//! command the parser scans forward over the following lines and folds them
//! in. A `%` after a `+` becomes the trigger's `previous` pattern, and `^`
//! lines are glued onto the current line using the file-scoped `concat`
//! option (`! local concat = none|newline|space`).

use std::collections::HashMap;

use crate::ast;
use crate::errors::{Error, Result};

/// The highest RiveScript language version this parser understands.
pub const RS_VERSION: f64 = 2.0;

/// Callback for non-fatal parser warnings: `(message, filename, line_no)`.
pub type WarnHandler = Box<dyn Fn(&str, &str, usize) + Send + Sync>;

/// Parser configuration.
pub struct ParserConfig {
    /// Treat syntax errors as fatal instead of downgrading them to warnings.
    pub strict: bool,
    /// Allow foreign symbols in trigger patterns.
    pub utf8: bool,
    /// Receiver for warnings. When unset they go to `log::warn!`.
    pub on_warn: Option<WarnHandler>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            strict: true,
            utf8: false,
            on_warn: None,
        }
    }
}

pub struct Parser {
    c: ParserConfig,
}

impl Parser {
    pub fn new(config: ParserConfig) -> Self {
        Parser { c: config }
    }

    fn warn(&self, message: &str, filename: &str, lineno: usize) {
        match &self.c.on_warn {
            Some(handler) => handler(message, filename, lineno),
            None => log::warn!("{message} at {filename} line {lineno}"),
        }
    }

    /// Parse a RiveScript document into an AST.
    ///
    /// `filename` is an arbitrary name for the source, used when reporting
    /// warnings. Fatal errors (an unsupported `! version`, or any syntax
    /// error in strict mode) abandon the parse.
    pub fn parse(&self, filename: &str, code: &[&str]) -> Result<ast::Root> {
        let mut tree = ast::Root::new();

        let mut topic = String::from("random");
        let mut comment = false; // in a multi-line comment
        let mut inobj = false; // in an object macro block
        let mut obj_name = String::new();
        let mut obj_lang = String::new();
        let mut obj_buf: Vec<String> = Vec::new();
        let mut is_that = String::new(); // pending %Previous for the next +
        let mut cur_trig: Option<(String, usize)> = None;

        // File-scoped parser options.
        let mut local_options: HashMap<String, String> = HashMap::new();
        local_options.insert("concat".to_string(), "none".to_string());

        for (lp, raw) in code.iter().enumerate() {
            let lineno = lp + 1;

            let mut line = raw.trim().to_string();
            if line.is_empty() {
                continue;
            }

            // Inside an `> object`?
            if inobj {
                if line.contains("< object") || line.contains("<object") || line.contains("</object>") {
                    if !obj_name.is_empty() {
                        tree.objects.push(ast::Object {
                            name: obj_name.clone(),
                            language: obj_lang.clone(),
                            code: std::mem::take(&mut obj_buf),
                        });
                    }
                    inobj = false;
                } else {
                    obj_buf.push(line);
                }
                continue;
            }

            // Comments.
            if line.starts_with("//") {
                continue;
            } else if line.starts_with("/*") {
                if !line.contains("*/") {
                    comment = true;
                }
                continue;
            } else if line.contains("*/") {
                comment = false;
                continue;
            } else if comment {
                continue;
            }

            // Separate the command from its data.
            if line.len() < 2 {
                self.warn(
                    &format!("Weird single-character line '{line}' found"),
                    filename,
                    lineno,
                );
                continue;
            }
            let cmd = line.chars().next().unwrap_or(' ');
            line = line[cmd.len_utf8()..].to_string();

            // In-line comments need a space on both sides of the slashes.
            if let Some(idx) = line.find(" // ") {
                line.truncate(idx);
            }
            let mut line = line.trim().to_string();

            if let Err(reason) = self.check_syntax(cmd, &line) {
                if self.c.strict {
                    return Err(Error::Parse {
                        file: filename.to_string(),
                        line: lineno,
                        reason,
                    });
                }
                self.warn(&format!("Syntax error: {reason}"), filename, lineno);
            }

            // A new trigger resets the %Previous state.
            if cmd == '+' {
                is_that.clear();
            }

            log::debug!("cmd {cmd}: {line}");

            // Look ahead for ^Continue and %Previous.
            if cmd != '^' {
                for lookahead in code[lp + 1..].iter() {
                    let lookahead = lookahead.trim();
                    if lookahead.len() < 2 {
                        continue;
                    }
                    let look_cmd = lookahead.chars().next().unwrap_or(' ');
                    let lookahead = lookahead[look_cmd.len_utf8()..].trim();

                    // Only continuation-flavored commands matter here.
                    if look_cmd != '%' && look_cmd != '^' {
                        break;
                    }
                    if lookahead.is_empty() {
                        break;
                    }

                    if cmd == '+' {
                        if look_cmd == '%' {
                            is_that = lookahead.to_string();
                            break;
                        }
                        is_that.clear();
                    }

                    if cmd == '!' {
                        // Keep the line break; array definitions split on it.
                        if look_cmd == '^' {
                            line.push_str("<crlf>");
                            line.push_str(lookahead);
                        }
                        continue;
                    }

                    if look_cmd == '^' {
                        line.push_str(concat_mode(
                            local_options.get("concat").map(String::as_str).unwrap_or(""),
                        ));
                        line.push_str(lookahead);
                    }
                }
            }

            match cmd {
                '!' => {
                    if let Some(fatal) = self.parse_definition(
                        &mut tree,
                        &mut local_options,
                        &line,
                        filename,
                        lineno,
                    ) {
                        return Err(fatal);
                    }
                }
                '>' => {
                    let mut parts = line.split_whitespace();
                    let mut kind = parts.next().unwrap_or("");
                    let mut name = parts.next().unwrap_or("").to_string();
                    let fields: Vec<&str> = parts.collect();

                    if kind == "begin" {
                        kind = "topic";
                        name = "__begin__".to_string();
                    }
                    match kind {
                        "topic" => {
                            cur_trig = None;
                            topic = name;
                            tree.add_topic(&topic);

                            // Includes and inherits relations.
                            if fields.len() >= 2 {
                                let mut mode = "";
                                for field in fields {
                                    if field == "includes" || field == "inherits" {
                                        mode = field;
                                    } else if !mode.is_empty() {
                                        let entry = tree.add_topic(&topic);
                                        let list = if mode == "includes" {
                                            &mut entry.includes
                                        } else {
                                            &mut entry.inherits
                                        };
                                        if !list.iter().any(|t| t == field) {
                                            list.push(field.to_string());
                                        }
                                    }
                                }
                            }
                        }
                        "object" => {
                            let lang = fields.first().map(|l| l.to_lowercase());
                            obj_name = name;
                            obj_buf = Vec::new();
                            inobj = true;
                            match lang {
                                Some(lang) => obj_lang = lang,
                                None => {
                                    self.warn(
                                        &format!(
                                            "No programming language specified for object '{obj_name}'"
                                        ),
                                        filename,
                                        lineno,
                                    );
                                    obj_lang = "__unknown__".to_string();
                                }
                            }
                        }
                        _ => {
                            self.warn(&format!("Unknown label type '{kind}'"), filename, lineno);
                        }
                    }
                }
                '<' => {
                    if line == "begin" || line == "topic" {
                        topic = "random".to_string();
                    } else if line == "object" {
                        inobj = false;
                    }
                }
                '+' => {
                    let entry = tree.add_topic(&topic);
                    entry.triggers.push(ast::Trigger {
                        trigger: line,
                        previous: if is_that.is_empty() {
                            None
                        } else {
                            Some(is_that.clone())
                        },
                        ..Default::default()
                    });
                    cur_trig = Some((topic.clone(), entry.triggers.len() - 1));
                }
                '-' => match current_trigger(&mut tree, &cur_trig) {
                    Some(trig) => trig.reply.push(line),
                    None => self.warn("Response found before trigger", filename, lineno),
                },
                '*' => match current_trigger(&mut tree, &cur_trig) {
                    Some(trig) => trig.condition.push(line),
                    None => self.warn("Condition found before trigger", filename, lineno),
                },
                '@' => match current_trigger(&mut tree, &cur_trig) {
                    Some(trig) => trig.redirect = Some(line),
                    None => self.warn("Redirect found before trigger", filename, lineno),
                },
                // Both handled by the look-ahead pass above.
                '%' | '^' => {}
                _ => {
                    self.warn(&format!("Unknown command '{cmd}'"), filename, lineno);
                }
            }
        }

        Ok(tree)
    }

    /// Handle a `!` definition line. Returns a fatal error for unsupported
    /// language versions; everything else warns and is skipped.
    fn parse_definition(
        &self,
        tree: &mut ast::Root,
        local_options: &mut HashMap<String, String>,
        line: &str,
        filename: &str,
        lineno: usize,
    ) -> Option<Error> {
        let (left, value) = match line.split_once('=') {
            Some((left, value)) => (left.trim(), value.trim().to_string()),
            None => (line.trim(), String::new()),
        };
        let (kind, name) = match left.split_once(char::is_whitespace) {
            Some((kind, name)) => (kind.trim(), name.trim().to_string()),
            None => (left, String::new()),
        };

        // Fake line breaks only matter to arrays.
        let value = if kind == "array" {
            value
        } else {
            value.replace("<crlf>", "")
        };

        if kind == "version" {
            let parsed: f64 = value.parse().unwrap_or(0.0);
            if parsed > RS_VERSION {
                return Some(Error::Parse {
                    file: filename.to_string(),
                    line: lineno,
                    reason: format!("Unsupported RiveScript version {value}; we only support {RS_VERSION}"),
                });
            }
            return None;
        }

        if name.is_empty() {
            self.warn("Undefined variable name", filename, lineno);
            return None;
        }
        if value.is_empty() {
            self.warn("Undefined variable value", filename, lineno);
            return None;
        }

        match kind {
            "local" => {
                local_options.insert(name, value);
            }
            "global" => {
                tree.begin.global.insert(name, value);
            }
            "var" => {
                tree.begin.var.insert(name, value);
            }
            "array" => {
                // Each <crlf>-separated part is either pipe-delimited or
                // whitespace-delimited.
                let mut fields: Vec<String> = Vec::new();
                for part in value.split("<crlf>") {
                    if part.contains('|') {
                        fields.extend(part.split('|').map(str::to_string));
                    } else {
                        fields.extend(part.split(' ').map(str::to_string));
                    }
                }
                for field in fields.iter_mut() {
                    *field = field.replace("\\s", " ");
                }
                tree.begin.array.insert(name, fields);
            }
            "sub" => {
                tree.begin.sub.insert(name, value);
            }
            "person" => {
                tree.begin.person.insert(name, value);
            }
            _ => {
                self.warn(
                    &format!("Unknown definition type '{kind}'"),
                    filename,
                    lineno,
                );
            }
        }
        None
    }

    /// Validate one line. Errors are fatal in strict mode.
    fn check_syntax(&self, cmd: char, line: &str) -> std::result::Result<(), String> {
        match cmd {
            '!' => {
                // ! type name = value, or ! type = value (for ! version).
                if !regex!(r"^.+(?:\s+.+|)\s*=\s*.+?$").is_match(line)
                    && !line.starts_with("version")
                {
                    return Err(
                        "Invalid format for !Definition line: must be '! type name = value' OR '! type = value'"
                            .to_string(),
                    );
                }
            }
            '>' => {
                let first = line.split_whitespace().next().unwrap_or("");
                if first == "begin" && line.split_whitespace().count() > 1 {
                    return Err("The 'begin' label takes no additional arguments".to_string());
                } else if first == "topic" && regex!(r"[^a-z0-9_\-\s]").is_match(line) {
                    return Err(
                        "Topics should be lowercased and contain only letters and numbers"
                            .to_string(),
                    );
                } else if first == "object" && regex!(r"[^A-Za-z0-9_\-\s]").is_match(line) {
                    return Err("Objects can only contain numbers and letters".to_string());
                }
            }
            '+' | '%' | '@' => {
                // These are compiled into regular expressions later, so be
                // strict about the alphabet and bracket balance now.
                if self.c.utf8 {
                    if regex!(r"[A-Z\\.]").is_match(line) {
                        return Err(
                            "Triggers can't contain uppercase letters, backslashes or dots in UTF-8 mode"
                                .to_string(),
                        );
                    }
                } else if regex!(r"[^a-z0-9(|)\[\]*_#@{}<>=/\s]").is_match(line) {
                    return Err(
                        "Triggers may only contain lowercase letters, numbers, and these symbols: ( | ) [ ] * _ # @ { } < > = /"
                            .to_string(),
                    );
                }

                let mut parens = 0i32;
                let mut square = 0i32;
                let mut curly = 0i32;
                let mut angle = 0i32;
                for c in line.chars() {
                    match c {
                        '(' => parens += 1,
                        ')' => parens -= 1,
                        '[' => square += 1,
                        ']' => square -= 1,
                        '{' => curly += 1,
                        '}' => curly -= 1,
                        '<' => angle += 1,
                        '>' => angle -= 1,
                        _ => {}
                    }
                }
                if parens != 0 {
                    return Err("Unmatched parenthesis brackets".to_string());
                }
                if square != 0 {
                    return Err("Unmatched square brackets".to_string());
                }
                if curly != 0 {
                    return Err("Unmatched curly brackets".to_string());
                }
                if angle != 0 {
                    return Err("Unmatched angle brackets".to_string());
                }
            }
            '*' => {
                if !regex!(r"^.+?\s*(?:==|eq|!=|ne|<>|<=|>=|<|>)\s*.+?=>.+?$").is_match(line) {
                    return Err(
                        "Invalid format for !Condition: should be like '* value symbol value => response'"
                            .to_string(),
                    );
                }
            }
            // Responses, continuations and comments take verbatim text.
            _ => {}
        }
        Ok(())
    }
}

fn concat_mode(name: &str) -> &'static str {
    match name {
        "newline" => "\n",
        "space" => " ",
        _ => "",
    }
}

fn current_trigger<'a>(
    tree: &'a mut ast::Root,
    cur: &Option<(String, usize)>,
) -> Option<&'a mut ast::Trigger> {
    let (topic, idx) = cur.as_ref()?;
    tree.topics.get_mut(topic)?.triggers.get_mut(*idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(code: &str) -> ast::Root {
        let parser = Parser::new(ParserConfig::default());
        let lines: Vec<&str> = code.lines().collect();
        parser.parse("test.rive", &lines).unwrap()
    }

    #[test]
    fn parses_triggers_and_replies() {
        let tree = parse("+ hello bot\n- Hello human.\n- Hi there.");
        let random = &tree.topics["random"];
        assert_eq!(random.triggers.len(), 1);
        assert_eq!(random.triggers[0].trigger, "hello bot");
        assert_eq!(random.triggers[0].reply, vec!["Hello human.", "Hi there."]);
    }

    #[test]
    fn lookahead_attaches_previous_to_trigger() {
        let tree = parse("+ knock knock\n- Who's there?\n\n+ *\n% who is there\n- <sentence> who?");
        let random = &tree.topics["random"];
        assert_eq!(random.triggers.len(), 2);
        assert_eq!(random.triggers[1].previous.as_deref(), Some("who is there"));
    }

    #[test]
    fn continuation_uses_concat_mode() {
        let tree = parse("! local concat = space\n+ how are you\n- Good,\n^ thanks for asking.");
        assert_eq!(
            tree.topics["random"].triggers[0].reply[0],
            "Good, thanks for asking."
        );

        // Default mode joins with nothing; the option is file scoped.
        let tree = parse("+ how are you\n- Good,\n^ thanks.");
        assert_eq!(tree.topics["random"].triggers[0].reply[0], "Good,thanks.");
    }

    #[test]
    fn definitions_land_in_begin() {
        let tree = parse(concat!(
            "! version = 2.0\n",
            "! global debug = true\n",
            "! var name = Aiden\n",
            "! sub who's = who is\n",
            "! person you = i\n",
        ));
        assert_eq!(tree.begin.global["debug"], "true");
        assert_eq!(tree.begin.var["name"], "Aiden");
        assert_eq!(tree.begin.sub["who's"], "who is");
        assert_eq!(tree.begin.person["you"], "i");
    }

    #[test]
    fn arrays_split_on_pipes_or_spaces() {
        let tree = parse("! array colors = red green blue\n! array be = is|are|was|were");
        assert_eq!(tree.begin.array["colors"], vec!["red", "green", "blue"]);
        assert_eq!(tree.begin.array["be"], vec!["is", "are", "was", "were"]);
    }

    #[test]
    fn array_continuations_keep_line_breaks() {
        let tree = parse("! array colors = red green\n^ light\\sblue dark\\sblue");
        assert_eq!(
            tree.begin.array["colors"],
            vec!["red", "green", "light blue", "dark blue"]
        );
    }

    #[test]
    fn unsupported_version_is_fatal() {
        let parser = Parser::new(ParserConfig::default());
        let lines: Vec<&str> = "! version = 3.0".lines().collect();
        let err = parser.parse("test.rive", &lines).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }));
    }

    #[test]
    fn topics_record_includes_and_inherits() {
        let tree = parse(concat!(
            "> topic alpha includes beta inherits gamma\n",
            "+ alpha trigger\n",
            "- alpha reply\n",
            "< topic\n",
            "+ back in random\n",
            "- yes\n",
        ));
        let alpha = &tree.topics["alpha"];
        assert_eq!(alpha.includes, vec!["beta"]);
        assert_eq!(alpha.inherits, vec!["gamma"]);
        assert_eq!(alpha.triggers[0].trigger, "alpha trigger");
        assert_eq!(tree.topics["random"].triggers[0].trigger, "back in random");
    }

    #[test]
    fn begin_block_is_a_synthetic_topic() {
        let tree = parse("> begin\n+ request\n- {ok}\n< begin");
        assert_eq!(tree.topics["__begin__"].triggers[0].trigger, "request");
    }

    #[test]
    fn objects_collect_verbatim_code() {
        let tree = parse(concat!(
            "> object reverse javascript\n",
            "    var msg = args.join(\" \");\n",
            "    return msg.split(\"\").reverse().join(\"\");\n",
            "< object\n",
        ));
        assert_eq!(tree.objects.len(), 1);
        assert_eq!(tree.objects[0].name, "reverse");
        assert_eq!(tree.objects[0].language, "javascript");
        assert_eq!(tree.objects[0].code.len(), 2);
    }

    #[test]
    fn orphan_lines_warn_and_are_dropped() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let warnings = Arc::new(AtomicUsize::new(0));
        let counter = warnings.clone();
        let parser = Parser::new(ParserConfig {
            strict: true,
            utf8: false,
            on_warn: Some(Box::new(move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        });
        let lines: Vec<&str> = "- orphan reply\n+ hello\n- hi".lines().collect();
        let tree = parser.parse("test.rive", &lines).unwrap();
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
        assert_eq!(tree.topics["random"].triggers[0].reply, vec!["hi"]);
    }

    #[test]
    fn strict_mode_rejects_bad_triggers() {
        let parser = Parser::new(ParserConfig::default());
        let lines: Vec<&str> = "+ Hello Bot\n- hi".lines().collect();
        assert!(parser.parse("test.rive", &lines).is_err());

        let parser = Parser::new(ParserConfig {
            strict: false,
            ..Default::default()
        });
        let lines: Vec<&str> = "+ Hello Bot\n- hi".lines().collect();
        assert!(parser.parse("test.rive", &lines).is_ok());
    }

    #[test]
    fn inline_comments_are_stripped() {
        let tree = parse("+ hello bot // greet\n- Hello human.");
        assert_eq!(tree.topics["random"].triggers[0].trigger, "hello bot");
    }

    #[test]
    fn block_comments_swallow_lines() {
        let tree = parse("/*\n+ commented out\n- nope\n*/\n+ hello\n- hi");
        assert_eq!(tree.topics["random"].triggers.len(), 1);
        assert_eq!(tree.topics["random"].triggers[0].trigger, "hello");
    }
}
