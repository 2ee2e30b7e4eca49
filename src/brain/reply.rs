//! The match engine.
//!
//! [`RiveScript::reply`] is the public entry point; [`get_reply`] is the
//! recursive worker behind it, shared by redirects (`@` and `{@...}`) and
//! the BEGIN block. Redirection passes an explicit `step` counter instead
//! of re-entering `reply`, so one `depth` knob bounds everything.
//!
//! Within a single call the order is strict: normalize, consult the BEGIN
//! block (if any), match, process tags, then append history. History comes
//! last so tags like `<reply1>` always see the previous turn.

use std::sync::{Arc, PoisonError};

use regex::Regex;

use crate::ast;
use crate::errors::{Error, Result};
use crate::utils::is_atomic;
use crate::RiveScript;

impl RiveScript {
    /// Fetch a reply from the bot for a user's message.
    pub fn reply(&self, username: &str, message: &str) -> Result<String> {
        self.say(format!("Asked to reply to [{username}] {message}"));

        self.sessions.init(username);

        // Mark the reply context so current_user() works from macros.
        *self
            .current_user
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(username.to_string());

        let result = self.reply_inner(username, message);

        *self
            .current_user
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;

        result
    }

    fn reply_inner(&self, username: &str, message: &str) -> Result<String> {
        let message = self.format_message(message, false);
        let reply;

        if self.topics.contains_key("__begin__") {
            // The BEGIN block gets the first say. Only if its reply
            // contains {ok} does the real reply get computed and spliced
            // in.
            let mut begin = self.get_reply(username, "request", true, 0)?;
            if begin.contains("{ok}") {
                let real = self.get_reply(username, &message, false, 0)?;
                begin = begin.replace("{ok}", &real);
            }
            reply = self.process_tags(username, &message, &begin, &[], &[], 0);
        } else {
            reply = self.get_reply(username, &message, false, 0)?;
        }

        self.sessions.add_history(username, &message, &reply);
        Ok(reply)
    }

    /// The internal logic behind `reply()`. `step` is the recursion depth
    /// counter; redirects re-enter here with `step + 1`.
    pub(crate) fn get_reply(
        &self,
        username: &str,
        message: &str,
        is_begin: bool,
        step: usize,
    ) -> Result<String> {
        if self.sorted.topics.is_empty() {
            self.warn("You forgot to call sort_replies()!");
            return Err(Error::RepliesNotSorted);
        }

        let mut topic = self
            .sessions
            .get(username, "topic")
            .unwrap_or_else(|_| "random".to_string());
        let mut stars: Vec<String> = Vec::new();
        let mut that_stars: Vec<String> = Vec::new();
        let mut reply = String::new();

        // Don't let the user get stranded in a missing topic.
        if !self.topics.contains_key(&topic) {
            self.warn(format!(
                "User {username} was in an empty topic named '{topic}'"
            ));
            self.set_uservar(username, "topic", "random");
            topic = "random".to_string();
        }

        if step > self.depth() {
            return Err(Error::DeepRecursion);
        }

        if is_begin {
            topic = "__begin__".to_string();
        }

        if !self.topics.contains_key(&topic) {
            // The fallback above already forced `random`, so this means
            // the default topic itself is gone.
            return Err(Error::NoDefaultTopic);
        }

        let mut matched: Option<Arc<ast::Trigger>> = None;
        let mut matched_trigger = String::new();

        // %Previous pass. Only on the first step: during a redirect the
        // last reply hasn't changed, and re-matching it would loop.
        if step == 0 {
            let has_relations = self
                .includes
                .get(&topic)
                .map_or(false, |list| !list.is_empty())
                || self
                    .inherits
                    .get(&topic)
                    .map_or(false, |list| !list.is_empty());
            let all_topics = if has_relations {
                self.get_topic_tree(&topic, 0)
            } else {
                vec![topic.clone()]
            };

            'topics: for top in all_topics {
                self.say(format!("Checking topic {top} for any %Previous's."));
                let Some(thats) = self.sorted.thats.get(&top) else {
                    continue;
                };
                if thats.is_empty() {
                    continue;
                }

                // The bot's last reply, formatted like a user message.
                let last_reply = self
                    .sessions
                    .get_history(username)
                    .map(|history| history.reply[0].clone())
                    .unwrap_or_else(|_| "undefined".to_string());
                let last_reply = self.format_message(&last_reply, true);
                self.say(format!("Bot's last reply: {last_reply}"));

                for trig in thats {
                    let Some(previous) = &trig.pointer.previous else {
                        continue;
                    };
                    let botside = self.trigger_regexp(username, previous);
                    self.say(format!(
                        "Try to match lastReply ({last_reply}) to {previous} ({botside})"
                    ));

                    let Ok(bot_re) = Regex::new(&format!("^{botside}$")) else {
                        continue;
                    };
                    let Some(bot_caps) = bot_re.captures(&last_reply) else {
                        continue;
                    };
                    self.say("Bot side matched!");
                    let bot_stars: Vec<String> = bot_caps
                        .iter()
                        .skip(1)
                        .map(|m| m.map_or(String::new(), |m| m.as_str().to_string()))
                        .collect();

                    // Now our message has to match the trigger itself.
                    let user_side = &trig.pointer;
                    let regexp = self.trigger_regexp(username, &user_side.trigger);
                    let mut is_match = false;
                    let mut user_stars: Vec<String> = Vec::new();
                    if is_atomic(&user_side.trigger) {
                        is_match = message == regexp;
                    } else if let Ok(re) = Regex::new(&format!("^{regexp}$")) {
                        if let Some(caps) = re.captures(message) {
                            is_match = true;
                            user_stars = caps
                                .iter()
                                .skip(1)
                                .map(|m| m.map_or(String::new(), |m| m.as_str().to_string()))
                                .collect();
                        }
                    }

                    if is_match {
                        matched = Some(user_side.clone());
                        matched_trigger = user_side.trigger.clone();
                        that_stars = bot_stars;
                        stars = user_stars;
                        break 'topics;
                    }
                }
            }
        }

        // Main pass over the topic's sorted index.
        if matched.is_none() {
            self.say("Searching their topic for a match...");
            let index = self.sorted.topics.get(&topic).map_or(&[] as &[_], Vec::as_slice);
            for trig in index {
                let pattern = &trig.pattern;
                let regexp = self.trigger_regexp(username, pattern);
                self.say(format!(
                    "Try to match \"{message}\" against {pattern} ({regexp})"
                ));

                let mut is_match = false;
                if is_atomic(pattern) && message == regexp {
                    is_match = true;
                } else if let Ok(re) = Regex::new(&format!("^{regexp}$")) {
                    if let Some(caps) = re.captures(message) {
                        is_match = true;
                        stars = caps
                            .iter()
                            .skip(1)
                            .map(|m| m.map_or(String::new(), |m| m.as_str().to_string()))
                            .collect();
                    }
                }

                if is_match {
                    self.say("Found a match!");
                    matched = Some(trig.pointer.clone());
                    matched_trigger = pattern.clone();
                    break;
                }
            }
        }

        self.sessions.set_last_match(username, &matched_trigger);

        let Some(matched) = matched else {
            return Err(Error::NoTriggerMatched);
        };

        if let Some(redirect) = &matched.redirect {
            // Hard redirect: pretend the user said the target.
            self.say(format!("Redirecting us to {redirect}"));
            let redirect = self
                .process_tags(username, message, redirect, &stars, &that_stars, step)
                .to_lowercase();
            self.say(format!("Pretend user said: {redirect}"));
            reply = self.get_reply(username, &redirect, is_begin, step + 1)?;
        } else {
            // Conditions first; the first one that passes wins.
            for row in &matched.condition {
                let Some((cond, potreply)) = row.split_once("=>") else {
                    continue;
                };
                let Some(caps) =
                    regex!(r"^(.+?)\s+(==|eq|!=|ne|<>|<=|>=|<|>)\s+(.+?)$").captures(cond.trim())
                else {
                    continue;
                };

                let left =
                    self.process_tags(username, message, caps[1].trim(), &stars, &that_stars, step);
                let eq = caps[2].to_string();
                let right =
                    self.process_tags(username, message, caps[3].trim(), &stars, &that_stars, step);

                // Empty sides compare as the undefined sentinel so that
                // `== undefined` works intuitively.
                let left = if left.is_empty() {
                    "undefined".to_string()
                } else {
                    left
                };
                let right = if right.is_empty() {
                    "undefined".to_string()
                } else {
                    right
                };

                self.say(format!("Check if {left} {eq} {right}"));

                let passed = match eq.as_str() {
                    "eq" | "==" => left == right,
                    "ne" | "!=" | "<>" => left != right,
                    _ => match (left.parse::<i64>(), right.parse::<i64>()) {
                        (Ok(l), Ok(r)) => match eq.as_str() {
                            "<" => l < r,
                            "<=" => l <= r,
                            ">" => l > r,
                            ">=" => l >= r,
                            _ => false,
                        },
                        _ => {
                            self.warn("Failed to evaluate numeric condition!");
                            false
                        }
                    },
                };

                if passed {
                    reply = potreply.trim().to_string();
                    break;
                }
            }

            // No condition fired: draw from the weighted reply bucket.
            if reply.is_empty() {
                let mut bucket: Vec<&String> = Vec::new();
                for rep in &matched.reply {
                    match regex!(r"\{weight=(\d+)\}").captures(rep) {
                        Some(caps) => {
                            let mut weight: i64 = caps[1].parse().unwrap_or(1);
                            if weight <= 0 {
                                self.warn("Can't have a weight <= 0!");
                                weight = 1;
                            }
                            for _ in 0..weight {
                                bucket.push(rep);
                            }
                        }
                        None => bucket.push(rep),
                    }
                }
                if !bucket.is_empty() {
                    reply = bucket[self.random_index(bucket.len())].clone();
                }
            }
        }

        if reply.is_empty() {
            return Err(Error::NoReplyFound);
        }

        self.say(format!("Reply: {reply}"));

        if is_begin {
            // The BEGIN block may set {topic} and user vars; everything
            // else waits for the final tag pass.
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

            let mut giveup = 0;
            while let Some(caps) = regex!(r"<set (.+?)=(.+?)>").captures(&reply) {
                giveup += 1;
                if giveup > self.depth() {
                    self.warn("Infinite loop looking for set tag!");
                    break;
                }
                let name = caps[1].to_string();
                let value = caps[2].to_string();
                self.set_uservar(username, &name, &value);
                reply = reply.replace(&format!("<set {name}={value}>"), "");
            }
        } else {
            reply = self.process_tags(username, message, &reply, &stars, &that_stars, step);
        }

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot(code: &str) -> RiveScript {
        let mut bot = RiveScript::new();
        bot.stream(code).unwrap();
        bot.sort_replies().unwrap();
        bot
    }

    #[test]
    fn atomic_trigger_replies() {
        let bot = bot("+ hello bot\n- Hello human.");
        assert_eq!(bot.reply("u", "Hello bot").unwrap(), "Hello human.");
    }

    #[test]
    fn star_captures_the_lowercased_message() {
        let bot = bot("+ my name is *\n- Nice to meet you, <star>.");
        assert_eq!(
            bot.reply("u", "my name is Bob").unwrap(),
            "Nice to meet you, bob."
        );
    }

    #[test]
    fn begin_block_gates_and_decorates_replies() {
        let bot = bot(concat!(
            "> begin\n",
            "+ request\n",
            "* <get met> == undefined => <set met=true>{ok}\n",
            "* <get name> != undefined => <get name>: {ok}\n",
            "- {ok}\n",
            "< begin\n",
            "\n",
            "+ hello bot\n",
            "- Hello human.\n",
        ));

        assert_eq!(bot.reply("u", "Hello bot").unwrap(), "Hello human.");
        assert_eq!(bot.get_uservar("u", "met").unwrap(), "true");

        bot.set_uservar("u", "name", "Bob");
        assert_eq!(bot.reply("u", "Hello bot").unwrap(), "Bob: Hello human.");
    }

    #[test]
    fn redirects_follow_to_the_target() {
        let bot = bot("+ hey\n@ hello\n+ hello\n- Hi there!");
        assert_eq!(bot.reply("u", "hey").unwrap(), "Hi there!");
    }

    #[test]
    fn previous_matches_against_the_last_reply() {
        let bot = bot(concat!(
            "! sub who's = who is\n",
            "+ knock knock\n",
            "- Who's there?\n",
            "+ *\n",
            "% who is there\n",
            "- <sentence> who?\n",
            "+ *\n",
            "% * who\n",
            "- Haha! <sentence>!\n",
        ));

        assert_eq!(bot.reply("u", "knock knock").unwrap(), "Who's there?");
        assert_eq!(bot.reply("u", "Canoe").unwrap(), "Canoe who?");
        assert_eq!(bot.reply("u", "Canoe help").unwrap(), "Haha! Canoe help!");
    }

    #[test]
    fn weighted_triggers_outrank_broader_ones() {
        let bot = bot(concat!(
            "+ hello *{weight=20}\n",
            "- Hi there!\n",
            "+ * or something{weight=10}\n",
            "- What?\n",
        ));
        assert_eq!(bot.reply("u", "Hello robot").unwrap(), "Hi there!");
    }

    #[test]
    fn weighted_replies_stay_in_the_bucket() {
        let bot = bot("+ hi\n- Alpha{weight=2}\n- Beta");
        bot.set_seed(7);
        for _ in 0..10 {
            let reply = bot.reply("u", "hi").unwrap();
            assert!(["Alpha", "Beta"].contains(&reply.as_str()), "got {reply}");
        }
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let script = "+ hi\n- one\n- two\n- three\n- four";
        let bot_a = bot(script);
        let bot_b = bot(script);
        bot_a.set_seed(1234);
        bot_b.set_seed(1234);
        for _ in 0..10 {
            assert_eq!(bot_a.reply("u", "hi").unwrap(), bot_b.reply("u", "hi").unwrap());
        }
    }

    #[test]
    fn topic_tag_moves_the_user() {
        let bot = bot(concat!(
            "+ enter the dungeon\n",
            "- {topic=dungeon}You are in the dungeon.\n",
            "\n",
            "> topic dungeon\n",
            "+ leave\n",
            "- {topic=random}You left.\n",
            "+ *\n",
            "- You are trapped.\n",
            "< topic\n",
        ));

        assert_eq!(
            bot.reply("u", "enter the dungeon").unwrap(),
            "You are in the dungeon."
        );
        assert_eq!(bot.get_uservar("u", "topic").unwrap(), "dungeon");
        assert_eq!(bot.reply("u", "flail wildly").unwrap(), "You are trapped.");
        assert_eq!(bot.reply("u", "leave").unwrap(), "You left.");
        assert_eq!(bot.get_uservar("u", "topic").unwrap(), "random");
    }

    #[test]
    fn inline_redirects_splice_the_subreply() {
        let bot = bot("+ hello\n- Hi!\n+ greet\n- They say: {@hello}");
        assert_eq!(bot.reply("u", "greet").unwrap(), "They say: Hi!");
    }

    #[test]
    fn redirect_loops_hit_the_depth_bound() {
        let bot = bot("+ one\n@ two\n+ two\n@ one");
        assert!(matches!(
            bot.reply("u", "one"),
            Err(Error::DeepRecursion)
        ));
    }

    #[test]
    fn replying_before_sorting_is_an_error() {
        let mut bot = RiveScript::new();
        bot.stream("+ hello\n- hi").unwrap();
        assert!(matches!(
            bot.reply("u", "hello"),
            Err(Error::RepliesNotSorted)
        ));
    }

    #[test]
    fn unmatched_input_is_an_error() {
        let bot = bot("+ hello\n- hi");
        assert!(matches!(
            bot.reply("u", "xyzzy plugh"),
            Err(Error::NoTriggerMatched)
        ));
    }

    #[test]
    fn matched_trigger_with_no_replies_is_an_error() {
        // A trigger with no responses at all: matches, then yields nothing.
        let mut bot = RiveScript::new();
        bot.stream("+ nothing here\n- placeholder").unwrap();
        {
            let topic = bot.topics.get_mut("random").unwrap();
            topic.triggers.push(std::sync::Arc::new(crate::ast::Trigger {
                trigger: "silent".to_string(),
                ..Default::default()
            }));
        }
        bot.sort_replies().unwrap();
        assert!(matches!(bot.reply("u", "silent"), Err(Error::NoReplyFound)));
    }

    #[test]
    fn history_ring_tracks_the_conversation() {
        let bot = bot("+ *\n- echo");
        for i in 1..=11 {
            bot.reply("u", &format!("message {i}")).unwrap();
        }

        let history = bot.sessions.get_history("u").unwrap();
        assert_eq!(history.input.len(), crate::HISTORY_SIZE);
        assert_eq!(history.input[0], "message 11");
        assert_eq!(history.input[8], "message 3");
        assert_eq!(history.reply[0], "echo");
    }

    #[test]
    fn input_tags_see_the_previous_turn() {
        let bot = bot("+ hello\n- hi\n+ what did i say\n- You said <input1>");
        bot.reply("u", "hello").unwrap();
        assert_eq!(bot.reply("u", "what did i say").unwrap(), "You said hello");
    }

    #[test]
    fn conditions_compare_numerically() {
        let bot = bot(concat!(
            "+ am i old\n",
            "* <get age> >= 18 => Yes.\n",
            "* <get age> < 18 => No.\n",
            "- I don't know your age.\n",
        ));

        assert_eq!(bot.reply("u", "am i old").unwrap(), "I don't know your age.");
        bot.set_uservar("u", "age", "20");
        assert_eq!(bot.reply("u", "am i old").unwrap(), "Yes.");
        bot.set_uservar("u", "age", "12");
        assert_eq!(bot.reply("u", "am i old").unwrap(), "No.");
    }

    #[test]
    fn native_subroutines_answer_call_tags() {
        let bot = bot("+ reverse *\n- <call>reverse <star></call>");
        bot.set_subroutine("reverse", |_, args: &[String]| {
            args.join(" ").chars().rev().collect()
        });
        assert_eq!(bot.reply("u", "reverse hello").unwrap(), "olleh");
    }

    #[test]
    fn unknown_objects_degrade_inline() {
        let bot = bot("+ call it\n- Result: <call>missing</call>");
        assert_eq!(
            bot.reply("u", "call it").unwrap(),
            "Result: [ERR: Object Not Found]"
        );
    }

    #[test]
    fn last_match_is_recorded() {
        let bot = bot("+ hello bot\n- Hello human.");
        bot.reply("u", "hello bot").unwrap();
        assert_eq!(bot.last_match("u").unwrap(), "hello bot");
    }

    #[test]
    fn current_user_is_set_during_replies_only() {
        let bot = bot("+ whoami\n- You are <call>whoami</call>.");
        bot.set_subroutine("whoami", |rs: &RiveScript, _: &[String]| {
            rs.current_user().unwrap_or_else(|_| "nobody".to_string())
        });
        assert_eq!(bot.reply("alice", "whoami").unwrap(), "You are alice.");
        assert!(bot.current_user().is_err());
    }

    #[test]
    fn includes_make_foreign_triggers_matchable() {
        let bot = bot(concat!(
            "> topic alpha includes beta\n",
            "+ alpha question\n- alpha answer\n",
            "< topic\n",
            "> topic beta\n",
            "+ beta question\n- beta answer\n",
            "< topic\n",
            "+ start\n- {topic=alpha}ok\n",
        ));
        bot.reply("u", "start").unwrap();
        assert_eq!(bot.reply("u", "beta question").unwrap(), "beta answer");
        assert_eq!(bot.reply("u", "alpha question").unwrap(), "alpha answer");
    }

    #[test]
    fn inheritance_overrides_matching() {
        let bot = bot(concat!(
            "> topic alpha inherits beta\n",
            "+ *\n- alpha wildcard\n",
            "< topic\n",
            "> topic beta\n",
            "+ beta question\n- beta answer\n",
            "< topic\n",
            "+ start\n- {topic=alpha}ok\n",
        ));
        bot.reply("u", "start").unwrap();
        // Alpha's wildcard outranks beta's atomic trigger.
        assert_eq!(bot.reply("u", "beta question").unwrap(), "alpha wildcard");
    }
}
