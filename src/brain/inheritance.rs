//! Topic graph traversal.
//!
//! Topics relate to each other two ways, and the difference is the whole
//! point of this module:
//!
//! - **includes**: the included topic's triggers are merged as peers of the
//!   including topic's own triggers.
//! - **inherits**: the inheriting topic's triggers always outrank the
//!   inherited topic's. Even a lone `*` in the inheriting topic beats every
//!   trigger below it.
//!
//! Priority is enforced with a synthetic `{inherits=N}` prefix on the
//! collected pattern text; the sort engine buckets on it and pushes
//! unprefixed triggers to the tail of each weight class.

use crate::{RiveScript, SortedTriggerEntry};

impl RiveScript {
    /// Collect all (pattern, trigger) pairs visible from a topic, following
    /// includes and inherits recursively.
    ///
    /// With `thats` set, only triggers carrying a `%Previous` clause are
    /// collected and the pattern returned is the `%Previous` text itself.
    pub(crate) fn get_topic_triggers(&self, topic: &str, thats: bool) -> Vec<SortedTriggerEntry> {
        self.topic_triggers_inner(topic, thats, 0, 0, false)
    }

    /// `depth` counts every recursion; `inheritance` counts only hops that
    /// cross an inherits or includes edge, and is what lands in the
    /// `{inherits=N}` prefix. `inherited` is set when the caller reached us
    /// through an inherits edge, forcing the prefix onto our own triggers.
    fn topic_triggers_inner(
        &self,
        topic: &str,
        thats: bool,
        depth: usize,
        inheritance: usize,
        inherited: bool,
    ) -> Vec<SortedTriggerEntry> {
        if depth > self.depth() {
            self.warn("Deep recursion while scanning topic inheritance!");
            return Vec::new();
        }

        self.say(format!(
            "Collecting trigger list for topic {topic} (depth={depth}; inheritance={inheritance}; inherited={inherited})"
        ));

        let mut triggers: Vec<SortedTriggerEntry> = Vec::new();

        // Triggers that exist in this topic directly.
        let mut in_this_topic: Vec<SortedTriggerEntry> = Vec::new();
        if let Some(data) = self.topics.get(topic) {
            for trigger in &data.triggers {
                if !thats {
                    in_this_topic.push(SortedTriggerEntry {
                        pattern: trigger.trigger.clone(),
                        pointer: trigger.clone(),
                    });
                } else if let Some(previous) = &trigger.previous {
                    in_this_topic.push(SortedTriggerEntry {
                        pattern: previous.clone(),
                        pointer: trigger.clone(),
                    });
                }
            }
        }

        if let Some(includes) = self.includes.get(topic) {
            for included in includes {
                self.say(format!("Topic {topic} includes {included}"));
                triggers.extend(self.topic_triggers_inner(
                    included,
                    thats,
                    depth + 1,
                    inheritance + 1,
                    false,
                ));
            }
        }

        if let Some(inherits) = self.inherits.get(topic) {
            for inherited_topic in inherits {
                self.say(format!("Topic {topic} inherits {inherited_topic}"));
                triggers.extend(self.topic_triggers_inner(
                    inherited_topic,
                    thats,
                    depth + 1,
                    inheritance + 1,
                    true,
                ));
            }
        }

        // If this topic inherits others (or we were reached through an
        // inherits edge), its own triggers must outrank everything
        // collected above.
        let has_inherits = self
            .inherits
            .get(topic)
            .map_or(false, |list| !list.is_empty());
        if has_inherits || inherited {
            for entry in in_this_topic {
                triggers.push(SortedTriggerEntry {
                    pattern: format!("{{inherits={inheritance}}}{}", entry.pattern),
                    pointer: entry.pointer,
                });
            }
        } else {
            triggers.extend(in_this_topic);
        }

        triggers
    }

    /// Every topic related to `topic`: itself, everything it includes or
    /// inherits, and so on transitively.
    pub(crate) fn get_topic_tree(&self, topic: &str, depth: usize) -> Vec<String> {
        if depth > self.depth() {
            self.warn("Deep recursion while scanning topic tree!");
            return Vec::new();
        }

        let mut topics = vec![topic.to_string()];
        if let Some(includes) = self.includes.get(topic) {
            for included in includes {
                topics.extend(self.get_topic_tree(included, depth + 1));
            }
        }
        if let Some(inherits) = self.inherits.get(topic) {
            for inherited in inherits {
                topics.extend(self.get_topic_tree(inherited, depth + 1));
            }
        }
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot(code: &str) -> RiveScript {
        let mut bot = RiveScript::new();
        bot.stream(code).unwrap();
        bot
    }

    #[test]
    fn includes_merge_as_peers() {
        let bot = bot(concat!(
            "> topic alpha includes beta\n",
            "+ alpha trigger\n",
            "- a\n",
            "< topic\n",
            "> topic beta\n",
            "+ beta trigger\n",
            "- b\n",
            "< topic\n",
        ));
        let triggers = bot.get_topic_triggers("alpha", false);
        let patterns: Vec<&str> = triggers.iter().map(|t| t.pattern.as_str()).collect();
        assert!(patterns.contains(&"alpha trigger"));
        assert!(patterns.contains(&"beta trigger"));
        // No synthetic priority on either side.
        assert!(patterns.iter().all(|p| !p.contains("{inherits=")));
    }

    #[test]
    fn inherited_triggers_carry_the_prefix() {
        let bot = bot(concat!(
            "> topic alpha inherits beta\n",
            "+ alpha trigger\n",
            "- a\n",
            "< topic\n",
            "> topic beta\n",
            "+ beta trigger\n",
            "- b\n",
            "< topic\n",
        ));
        let triggers = bot.get_topic_triggers("alpha", false);
        let patterns: Vec<&str> = triggers.iter().map(|t| t.pattern.as_str()).collect();
        assert!(patterns.contains(&"{inherits=0}alpha trigger"));
        assert!(patterns.contains(&"{inherits=1}beta trigger"));
    }

    #[test]
    fn thats_mode_collects_previous_patterns() {
        let bot = bot("+ *\n% who is there\n- <sentence> who?\n+ plain\n- reply");
        let thats = bot.get_topic_triggers("random", true);
        assert_eq!(thats.len(), 1);
        assert_eq!(thats[0].pattern, "who is there");
    }

    #[test]
    fn topic_tree_is_transitive() {
        let bot = bot(concat!(
            "> topic a includes b\n",
            "+ x\n- y\n",
            "< topic\n",
            "> topic b inherits c\n",
            "+ x\n- y\n",
            "< topic\n",
            "> topic c\n",
            "+ x\n- y\n",
            "< topic\n",
        ));
        let tree = bot.get_topic_tree("a", 0);
        assert_eq!(tree, vec!["a", "b", "c"]);
    }
}
