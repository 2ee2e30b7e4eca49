//! Message normalization, substitutions and reply tag processing.
//!
//! Two halves live here. The first normalizes incoming text: lowercasing,
//! the `! sub` substitution pass, and the character stripping that differs
//! between ASCII and UTF-8 mode. The second is the tag processor applied to
//! an outgoing reply, where ordering matters: array references become
//! `{random}` sets before shortcuts expand, stars expand before `{random}`
//! picks, string formats run before the generic tag loop, and `<call>`
//! macros go last so their arguments arrive fully expanded.

use std::collections::HashMap;
use std::sync::PoisonError;

use crate::utils::{quotemeta, reg_replace, string_format, strip_nasties};
use crate::RiveScript;

impl RiveScript {
    /// Format a user's message (or the bot's previous reply, for
    /// `%Previous` matching) for safe pattern matching.
    pub(crate) fn format_message(&self, msg: &str, bot_reply: bool) -> String {
        let msg = msg.to_lowercase();

        // Run substitutions, longest key first.
        let subs = self.config_lock().sub.clone();
        let mut msg = self.substitute(&msg, &subs, &self.sorted.sub);

        if self.utf8() {
            // Only strip the HTML-ish metacharacters and configured
            // punctuation; foreign symbols are legitimate content.
            msg = regex!(r"[<>]+").replace_all(&msg, "").into_owned();
            msg = self.unicode_punctuation.replace_all(&msg, "").into_owned();
            if bot_reply {
                msg = regex!(r"[.?,!;:@#$%^&*()]+")
                    .replace_all(&msg, "")
                    .into_owned();
            }
            msg
        } else {
            strip_nasties(&msg)
        }
    }

    /// Apply a substitution map to a message.
    ///
    /// Each matched key is first swapped for a numbered `\x00N\x00`
    /// placeholder so that a later key can never re-match inside an earlier
    /// key's expansion; the placeholders are expanded back at the end.
    pub(crate) fn substitute(
        &self,
        message: &str,
        subs: &HashMap<String, String>,
        sorted: &[String],
    ) -> String {
        if subs.is_empty() {
            return message.to_string();
        }

        let mut message = message.to_string();
        let mut ph: Vec<String> = Vec::new();

        for pattern in sorted {
            let Some(result) = subs.get(pattern) else {
                continue;
            };
            let qm = quotemeta(pattern);
            let placeholder = format!("\x00{}\x00", ph.len());
            ph.push(result.clone());

            message = reg_replace(&message, &format!("^{qm}$"), &placeholder);
            message = reg_replace(
                &message,
                &format!(r"^{qm}(\W+)"),
                &format!("{placeholder}${{1}}"),
            );
            message = reg_replace(
                &message,
                &format!(r"(\W+){qm}(\W+)"),
                &format!("${{1}}{placeholder}${{2}}"),
            );
            message = reg_replace(
                &message,
                &format!(r"(\W+){qm}$"),
                &format!("${{1}}{placeholder}"),
            );
        }

        let mut tries = 0;
        while message.contains('\x00') {
            tries += 1;
            if tries > self.depth() {
                self.warn("Too many loops in substitution placeholders!");
                break;
            }
            let Some(caps) = regex!("\x00(\\d+)\x00").captures(&message) else {
                break;
            };
            let i: usize = caps[1].parse().unwrap_or(0);
            let result = ph.get(i).cloned().unwrap_or_default();
            message = message.replace(&format!("\x00{i}\x00"), &result);
        }

        message
    }

    /// Process all the tags in a selected reply.
    ///
    /// `st`/`bst` are the captures from the user-side trigger and the
    /// `%Previous` bot-side match respectively.
    pub(crate) fn process_tags(
        &self,
        username: &str,
        _message: &str,
        reply: &str,
        st: &[String],
        bst: &[String],
        step: usize,
    ) -> String {
        // Star 1 reads as "undefined" when the trigger had no captures.
        let mut stars: Vec<String> = vec![String::new()];
        stars.extend(st.iter().cloned());
        if stars.len() == 1 {
            stars.push("undefined".to_string());
        }
        let mut botstars: Vec<String> = vec![String::new()];
        botstars.extend(bst.iter().cloned());
        if botstars.len() == 1 {
            botstars.push("undefined".to_string());
        }

        let mut reply = reply.to_string();

        // Turn (@array) references into {random} sets. Unknown arrays are
        // parked in a sentinel so they round-trip unchanged.
        let mut giveup = 0;
        while let Some(caps) = regex!(r"\(@([A-Za-z0-9_ ]+?)\)").captures(&reply) {
            giveup += 1;
            if giveup > self.depth() {
                self.warn("Infinite loop looking for arrays in reply!");
                break;
            }
            let name = caps[1].to_string();
            let insert = match self.config_lock().array.get(&name) {
                Some(items) => format!("{{random}}{}{{/random}}", items.join("|")),
                None => format!("\x00@{name}\x00"),
            };
            reply = reply.replace(&format!("(@{name})"), &insert);
        }
        reply = reply.replace("\x00@", "(@");
        reply = reply.replace('\x00', ")");

        // Tag shortcuts.
        reply = reply.replace("<person>", "{person}<star>{/person}");
        reply = reply.replace("<@>", "{@<star>}");
        reply = reply.replace("<formal>", "{formal}<star>{/formal}");
        reply = reply.replace("<sentence>", "{sentence}<star>{/sentence}");
        reply = reply.replace("<uppercase>", "{uppercase}<star>{/uppercase}");
        reply = reply.replace("<lowercase>", "{lowercase}<star>{/lowercase}");

        // Weight tags have already served their purpose in sorting.
        reply = regex!(r"\{weight=\d+\}").replace_all(&reply, "").into_owned();

        // Star references. Out-of-range ones expand to the empty string.
        let mut giveup = 0;
        while let Some(caps) = regex!(r"<star(\d+)?>").captures(&reply) {
            giveup += 1;
            if giveup > self.depth() {
                break;
            }
            let tag = caps[0].to_string();
            let n: usize = caps.get(1).map_or(1, |m| m.as_str().parse().unwrap_or(1));
            let value = stars.get(n).cloned().unwrap_or_default();
            reply = reply.replace(&tag, &value);
        }
        let mut giveup = 0;
        while let Some(caps) = regex!(r"<botstar(\d+)?>").captures(&reply) {
            giveup += 1;
            if giveup > self.depth() {
                break;
            }
            let tag = caps[0].to_string();
            let n: usize = caps.get(1).map_or(1, |m| m.as_str().parse().unwrap_or(1));
            let value = botstars.get(n).cloned().unwrap_or_default();
            reply = reply.replace(&tag, &value);
        }

        // History, user id, escape sequences.
        reply = reply.replace("<input>", "<input1>");
        reply = reply.replace("<reply>", "<reply1>");
        if reply.contains("<input") || reply.contains("<reply") {
            let history = self.sessions.get_history(username).unwrap_or_default();
            for i in 1..=crate::HISTORY_SIZE {
                reply = reply.replace(&format!("<input{i}>"), &history.input[i - 1]);
                reply = reply.replace(&format!("<reply{i}>"), &history.reply[i - 1]);
            }
        }
        reply = reply.replace("<id>", username);
        reply = reply.replace("\\s", " ");
        reply = reply.replace("\\n", "\n");
        reply = reply.replace("\\#", "#");

        // {random} picks.
        let mut giveup = 0;
        while let Some(caps) = regex!(r"\{random\}(.+?)\{/random\}").captures(&reply) {
            giveup += 1;
            if giveup > self.depth() {
                self.warn("Infinite loop looking for random tag!");
                break;
            }
            let text = caps[1].to_string();
            let options: Vec<&str> = if text.contains('|') {
                text.split('|').collect()
            } else {
                text.split(' ').collect()
            };
            let output = if options.is_empty() {
                ""
            } else {
                options[self.random_index(options.len())]
            };
            reply = reply.replace(&format!("{{random}}{text}{{/random}}"), output);
        }

        // Person substitution and string formatting.
        for format in ["person", "formal", "sentence", "uppercase", "lowercase"] {
            let Ok(format_re) =
                regex::Regex::new(&format!(r"\{{{format}\}}(.+?)\{{/{format}\}}"))
            else {
                continue;
            };
            let mut giveup = 0;
            while let Some(caps) = format_re.captures(&reply) {
                giveup += 1;
                if giveup > self.depth() {
                    self.warn(format!("Infinite loop looking for {format} tag!"));
                    break;
                }
                let content = caps[1].to_string();
                let replace = if format == "person" {
                    let persons = self.config_lock().person.clone();
                    self.substitute(&content, &persons, &self.sorted.person)
                } else {
                    string_format(format, &content)
                };
                reply = reply.replace(
                    &format!("{{{format}}}{content}{{/{format}}}"),
                    &replace,
                );
            }
        }

        // The generic tag loop: resolve the innermost tag each pass so
        // nesting like <set a=<get b>> works in any arrangement. <call>
        // markers are masked off; they're handled last.
        reply = reply.replace("<call>", "{__call__}");
        reply = reply.replace("</call>", "{/__call__}");
        let mut giveup = 0;
        loop {
            giveup += 1;
            if giveup > self.depth() {
                self.warn("Infinite loop looking for inner tags!");
                break;
            }
            let Some(caps) = regex!(r"<([^<]+?)>").captures(&reply) else {
                break;
            };
            let tag_text = caps[1].to_string();
            let (tag, data) = match tag_text.split_once(' ') {
                Some((tag, data)) => (tag.to_lowercase(), data.to_string()),
                None => (tag_text.to_lowercase(), String::new()),
            };
            let mut insert = String::new();

            match tag.as_str() {
                "bot" | "env" => {
                    if let Some((name, value)) = data.split_once('=') {
                        // Assignment.
                        self.say(format!("Assign {tag} variable {name} = {value}"));
                        if tag == "bot" {
                            self.set_variable(name, value);
                        } else {
                            self.set_global(name, value);
                        }
                    } else {
                        let lookup = if tag == "bot" {
                            self.get_variable(&data)
                        } else {
                            self.get_global(&data)
                        };
                        insert = lookup.unwrap_or_else(|_| "undefined".to_string());
                    }
                }
                "set" => match data.split_once('=') {
                    Some((name, value)) => {
                        self.say(format!("Set uservar {name} = {value}"));
                        self.set_uservar(username, name, value);
                    }
                    None => {
                        self.warn(format!("Malformed <set> tag: {tag_text}"));
                    }
                },
                "add" | "sub" | "mult" | "div" => {
                    insert = self.math_tag(username, &tag, &data);
                }
                "get" => {
                    insert = self
                        .get_uservar(username, &data)
                        .unwrap_or_else(|_| "undefined".to_string());
                }
                _ => {
                    // Unrecognized; preserve it for the embedder.
                    insert = format!("\x00{tag_text}\x01");
                }
            }

            reply = reply.replace(&format!("<{tag_text}>"), &insert);
        }

        // Recover mangled HTML-like tags.
        reply = reply.replace('\x00', "<");
        reply = reply.replace('\x01', ">");

        // Topic setter.
        let mut giveup = 0;
        while let Some(caps) = regex!(r"\{topic=(.+?)\}").captures(&reply) {
            giveup += 1;
            if giveup > self.depth() {
                self.warn("Infinite loop looking for topic tag!");
                break;
            }
            let name = caps[1].to_string();
            self.set_uservar(username, "topic", &name);
            reply = reply.replace(&format!("{{topic={name}}}"), "");
        }

        // Inline redirector.
        let mut giveup = 0;
        while let Some(caps) = regex!(r"\{@(.+?)\}").captures(&reply) {
            giveup += 1;
            if giveup > self.depth() {
                self.warn("Infinite loop looking for redirect tag!");
                break;
            }
            let target = caps[1].trim().to_string();
            self.say(format!("Inline redirection to: {target}"));
            let subreply = match self.get_reply(username, &target, false, step + 1) {
                Ok(subreply) => subreply,
                Err(err) => {
                    self.warn(format!("Inline redirection to {target} failed: {err}"));
                    String::new()
                }
            };
            reply = reply.replace(&format!("{{@{}}}", &caps[1]), &subreply);
        }

        // Object macros.
        reply = reply.replace("{__call__}", "<call>");
        reply = reply.replace("{/__call__}", "</call>");
        let mut giveup = 0;
        while let Some(caps) = regex!(r"<call>(.+?)</call>").captures(&reply) {
            giveup += 1;
            if giveup > self.depth() {
                self.warn("Infinite loop looking for call tags!");
                break;
            }
            let text = caps[1].trim().to_string();
            let mut parts = text.split(' ');
            let obj = parts.next().unwrap_or("").to_string();
            let args: Vec<String> = parts.map(str::to_string).collect();

            let output = self.call_macro(&obj, &args);
            reply = reply.replace(&format!("<call>{}</call>", &caps[1]), &output);
        }

        reply
    }

    /// Integer math on a user variable: `<add points=5>` and friends.
    /// Failures produce an inline error string instead of aborting the
    /// reply.
    fn math_tag(&self, username: &str, tag: &str, data: &str) -> String {
        let Some((name, str_value)) = data.split_once('=') else {
            return format!("[ERR: Malformed <{tag}> tag]");
        };

        // Auto-initialize the variable.
        if self.get_uservar(username, name).is_err() {
            self.set_uservar(username, name, "0");
        }

        let Ok(value) = str_value.parse::<i64>() else {
            return format!("[ERR: Math can't {tag} non-numeric value {str_value}]");
        };
        let current = self
            .get_uservar(username, name)
            .unwrap_or_else(|_| "0".to_string());
        let Ok(orig) = current.parse::<i64>() else {
            return format!("[ERR: Math can't {tag} non-numeric user variable {name}]");
        };

        // Wrapping arithmetic: oversized operands degrade instead of
        // aborting the reply.
        let result = match tag {
            "add" => orig.wrapping_add(value),
            "sub" => orig.wrapping_sub(value),
            "mult" => orig.wrapping_mul(value),
            "div" => {
                if value == 0 {
                    return "[ERR: Can't Divide By Zero]".to_string();
                }
                orig.wrapping_div(value)
            }
            _ => orig,
        };

        self.set_uservar(username, name, &result.to_string());
        String::new()
    }

    /// Resolve a `<call>` target: native subroutines take precedence, then
    /// the object-language handler registry.
    fn call_macro(&self, obj: &str, args: &[String]) -> String {
        // Clone the Arc out so the registry lock is released before the
        // subroutine runs; a macro is allowed to call back into the engine.
        let subroutine = {
            let subroutines = self
                .subroutines
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subroutines.get(obj).cloned()
        };
        if let Some(func) = subroutine {
            return func(self, args);
        }

        let lang = {
            let objlangs = self.objlangs.lock().unwrap_or_else(PoisonError::into_inner);
            objlangs.get(obj).cloned()
        };
        if let Some(lang) = lang {
            let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(handler) = handlers.get_mut(&lang) {
                return handler.call(obj, args);
            }
        }

        "[ERR: Object Not Found]".to_string()
    }
}

#[cfg(test)]
mod tests {
    use crate::RiveScript;
    use std::collections::HashMap;

    fn sub_bot(pairs: &[(&str, &str)]) -> RiveScript {
        let mut bot = RiveScript::new();
        let mut code = String::new();
        for (key, value) in pairs {
            code.push_str(&format!("! sub {key} = {value}\n"));
        }
        code.push_str("+ placeholder\n- ok\n");
        bot.stream(&code).unwrap();
        bot.sort_replies().unwrap();
        bot
    }

    #[test]
    fn substitutions_rewrite_whole_words() {
        let bot = sub_bot(&[("what's", "what is"), ("u", "you")]);
        assert_eq!(bot.format_message("what's up with u", false), "what is up with you");
        // "u" inside a word is untouched.
        assert_eq!(bot.format_message("usual stuff", false), "usual stuff");
    }

    #[test]
    fn substitutions_do_not_rematch_expansions() {
        // "is" -> "was" and "was" -> "is" must not cascade.
        let bot = sub_bot(&[("is", "was"), ("was", "is")]);
        assert_eq!(bot.format_message("it is what it was", false), "it was what it is");
    }

    #[test]
    fn non_utf8_strips_punctuation() {
        let bot = RiveScript::new();
        assert_eq!(bot.format_message("Hello, Bot!", false), "hello bot");
        assert_eq!(bot.format_message("Who's there?", true), "whos there");
    }

    #[test]
    fn utf8_mode_keeps_foreign_symbols() {
        let mut bot = RiveScript::new();
        bot.set_utf8(true);
        assert_eq!(bot.format_message("привет, бот!", false), "привет бот");
        assert_eq!(bot.format_message("<script>hi</script>", false), "scripthi/script");
    }

    #[test]
    fn star_tags_expand_from_captures() {
        let bot = RiveScript::new();
        bot.set_uservar("u", "topic", "random");
        let stars = vec!["bob".to_string(), "smith".to_string()];
        let reply = bot.process_tags("u", "", "Hi <star>, <star2>, <star9>.", &stars, &[], 0);
        assert_eq!(reply, "Hi bob, smith, .");
    }

    #[test]
    fn star_defaults_to_undefined_without_captures() {
        let bot = RiveScript::new();
        let reply = bot.process_tags("u", "", "star is <star>", &[], &[], 0);
        assert_eq!(reply, "star is undefined");
    }

    #[test]
    fn string_format_tags() {
        let bot = RiveScript::new();
        let stars = vec!["canoe help".to_string()];
        let reply = bot.process_tags("u", "", "Haha! <sentence>!", &stars, &[], 0);
        assert_eq!(reply, "Haha! Canoe help!");

        let reply = bot.process_tags("u", "", "{uppercase}shout{/uppercase}", &[], &[], 0);
        assert_eq!(reply, "SHOUT");
    }

    #[test]
    fn person_tag_swaps_pronouns() {
        let mut bot = RiveScript::new();
        bot.stream("! person you = i\n! person i = you\n+ placeholder\n- ok")
            .unwrap();
        bot.sort_replies().unwrap();
        let stars = vec!["you told me".to_string()];
        let reply = bot.process_tags("u", "", "You said: <person>", &stars, &[], 0);
        assert_eq!(reply, "You said: i told me");
    }

    #[test]
    fn math_tags_operate_on_user_vars() {
        let bot = RiveScript::new();
        bot.set_uservar("u", "points", "10");
        let reply = bot.process_tags("u", "", "<add points=5>You have <get points> points.", &[], &[], 0);
        assert_eq!(reply, "You have 15 points.");
        assert_eq!(bot.get_uservar("u", "points").unwrap(), "15");

        let reply = bot.process_tags("u", "", "<div points=0>", &[], &[], 0);
        assert_eq!(reply, "[ERR: Can't Divide By Zero]");

        let reply = bot.process_tags("u", "", "<add points=x>", &[], &[], 0);
        assert_eq!(reply, "[ERR: Math can't add non-numeric value x]");
    }

    #[test]
    fn set_and_get_nest() {
        let bot = RiveScript::new();
        bot.set_uservar("u", "name", "Alice");
        let reply = bot.process_tags("u", "", "<set copy=<get name>>done", &[], &[], 0);
        assert_eq!(reply, "done");
        assert_eq!(bot.get_uservar("u", "copy").unwrap(), "Alice");
    }

    #[test]
    fn bot_and_env_tags_read_and_write() {
        let mut bot = RiveScript::new();
        bot.stream("! var name = Aiden\n! global env = prod\n+ placeholder\n- ok")
            .unwrap();
        let reply = bot.process_tags("u", "", "I am <bot name> in <env env>.", &[], &[], 0);
        assert_eq!(reply, "I am Aiden in prod.");

        bot.process_tags("u", "", "<bot mood=happy>", &[], &[], 0);
        assert_eq!(bot.get_variable("mood").unwrap(), "happy");
    }

    #[test]
    fn unknown_tags_round_trip() {
        let bot = RiveScript::new();
        let reply = bot.process_tags("u", "", "keep <mystery tag> intact", &[], &[], 0);
        assert_eq!(reply, "keep <mystery tag> intact");
    }

    #[test]
    fn random_tag_picks_a_listed_option() {
        let bot = RiveScript::new();
        bot.set_seed(42);
        let reply = bot.process_tags("u", "", "{random}a|b|c{/random}", &[], &[], 0);
        assert!(["a", "b", "c"].contains(&reply.as_str()));
    }

    #[test]
    fn array_references_become_random_sets() {
        let mut bot = RiveScript::new();
        bot.stream("! array greek = alpha beta gamma\n+ placeholder\n- ok")
            .unwrap();
        let reply = bot.process_tags("u", "", "Say (@greek)!", &[], &[], 0);
        assert!(["Say alpha!", "Say beta!", "Say gamma!"].contains(&reply.as_str()));

        // Missing arrays survive untouched.
        let reply = bot.process_tags("u", "", "Say (@missing)!", &[], &[], 0);
        assert_eq!(reply, "Say (@missing)!");
    }

    #[test]
    fn id_and_escapes_expand() {
        let bot = RiveScript::new();
        let reply = bot.process_tags("alice", "", r"<id>\sand\#9", &[], &[], 0);
        assert_eq!(reply, "alice and#9");
    }

    #[test]
    fn undefined_user_var_reads_as_undefined() {
        let bot = RiveScript::new();
        let reply = bot.process_tags("u", "", "<get ghost>", &[], &[], 0);
        assert_eq!(reply, "undefined");

        let mut vars = HashMap::new();
        vars.insert("ghost".to_string(), "boo".to_string());
        bot.set_uservars("u", vars);
        let reply = bot.process_tags("u", "", "<get ghost>", &[], &[], 0);
        assert_eq!(reply, "boo");
    }
}
