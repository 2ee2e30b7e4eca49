//! Trigger sorting.
//!
//! Matching walks the sorted index top to bottom and takes the first hit,
//! so correctness lives or dies on this order. Ranking happens on several
//! levels, applied in sequence:
//!
//! ```text
//! {weight=N}      highest first
//!   {inherits=N}  lowest first; triggers with no prefix go last
//!     category    atomic, optionals, _ wildcard, # wildcard, * wildcard
//!       words     more words first
//!         length  longer patterns first
//! ```
//!
//! Patterns that are nothing but a single wildcard character (`_`, `#`,
//! `*`) have zero words; they trail their category in dedicated buckets so
//! that a lone `*` is always the last resort.
//!
//! Substitution key lists get the same longest-first treatment so that
//! multi-word phrases are rewritten before their sub-phrases.

use std::collections::{HashMap, HashSet};

use crate::errors::{Error, Result};
use crate::utils::word_count;
use crate::{RiveScript, SortBuffer, SortedTriggerEntry};

/// Scratch buckets for one weight/inheritance class.
#[derive(Default)]
struct SortTrack {
    atomic: HashMap<usize, Vec<SortedTriggerEntry>>,
    option: HashMap<usize, Vec<SortedTriggerEntry>>,
    alpha: HashMap<usize, Vec<SortedTriggerEntry>>,
    number: HashMap<usize, Vec<SortedTriggerEntry>>,
    wild: HashMap<usize, Vec<SortedTriggerEntry>>,
    pound: Vec<SortedTriggerEntry>,
    under: Vec<SortedTriggerEntry>,
    star: Vec<SortedTriggerEntry>,
}

impl RiveScript {
    /// Build the sorted match indices for every topic.
    ///
    /// Must be called after loading and before the first reply. Fails when
    /// nothing was loaded at all, which usually means the bot was pointed
    /// at the wrong directory.
    pub fn sort_replies(&mut self) -> Result<()> {
        self.say("Sorting triggers...");

        if self.topics.is_empty() {
            return Err(Error::NoSourceLoaded);
        }

        let mut buffer = SortBuffer::default();

        let mut names: Vec<String> = self.topics.keys().cloned().collect();
        names.sort();
        for topic in names {
            self.say(format!("Analyzing topic {topic}"));

            // All triggers visible from this topic, inherited ones included.
            let all_triggers = self.get_topic_triggers(&topic, false);
            buffer
                .topics
                .insert(topic.clone(), self.sort_trigger_set(all_triggers, true));

            // And separately, the %Previous triggers.
            let that_triggers = self.get_topic_triggers(&topic, true);
            buffer
                .thats
                .insert(topic.clone(), self.sort_trigger_set(that_triggers, false));
        }

        {
            let config = self.config_lock();
            buffer.sub = sort_list(config.sub.keys());
            buffer.person = sort_list(config.person.keys());
        }

        if buffer.topics.values().all(Vec::is_empty) && buffer.thats.values().all(Vec::is_empty) {
            return Err(Error::NoSourceLoaded);
        }

        self.sorted = buffer;
        Ok(())
    }

    /// Sort one group of triggers into match order.
    ///
    /// With `exclude_previous`, triggers that carry a `%Previous` clause
    /// are skipped: they're only reachable through the `thats` index.
    fn sort_trigger_set(
        &self,
        triggers: Vec<SortedTriggerEntry>,
        exclude_previous: bool,
    ) -> Vec<SortedTriggerEntry> {
        // Bucket by {weight}.
        let mut prior: HashMap<i64, Vec<SortedTriggerEntry>> = HashMap::new();
        for trig in triggers {
            if exclude_previous && trig.pointer.previous.is_some() {
                continue;
            }
            let weight = regex!(r"\{weight=(\d+)\}")
                .captures(&trig.pattern)
                .and_then(|caps| caps[1].parse().ok())
                .unwrap_or(0i64);
            prior.entry(weight).or_default().push(trig);
        }

        let mut running: Vec<SortedTriggerEntry> = Vec::new();

        let mut priorities: Vec<i64> = prior.keys().copied().collect();
        priorities.sort_unstable_by(|a, b| b.cmp(a));

        for p in priorities {
            self.say(format!("Sorting triggers with priority {p}"));

            // Triggers from inherited topics carry an {inherits=N} prefix;
            // lower values outrank higher ones, and triggers with no
            // prefix at all go to the very end.
            let mut track: HashMap<i64, SortTrack> = HashMap::new();
            let mut highest_inherits: i64 = -1;

            for trig in prior.remove(&p).unwrap_or_default() {
                let mut inherits: i64 = -1;
                let mut pattern = trig.pattern.clone();
                if let Some(caps) = regex!(r"\{inherits=(\d+)\}").captures(&pattern) {
                    inherits = caps[1].parse().unwrap_or(0);
                    highest_inherits = highest_inherits.max(inherits);
                    self.say(format!(
                        "Trigger belongs to a topic that inherits other topics. Level={inherits}"
                    ));
                    pattern = regex!(r"\{inherits=(\d+)\}")
                        .replace_all(&pattern, "")
                        .into_owned();
                }

                let bucket = track.entry(inherits).or_default();
                let cnt = word_count(&pattern, false);

                if pattern.contains('_') {
                    if cnt > 0 {
                        bucket.alpha.entry(cnt).or_default().push(trig);
                    } else {
                        bucket.under.push(trig);
                    }
                } else if pattern.contains('#') {
                    if cnt > 0 {
                        bucket.number.entry(cnt).or_default().push(trig);
                    } else {
                        bucket.pound.push(trig);
                    }
                } else if pattern.contains('*') {
                    if cnt > 0 {
                        bucket.wild.entry(cnt).or_default().push(trig);
                    } else {
                        bucket.star.push(trig);
                    }
                } else if pattern.contains('[') {
                    bucket.option.entry(cnt).or_default().push(trig);
                } else {
                    bucket.atomic.entry(cnt).or_default().push(trig);
                }
            }

            // Move the no-{inherits} triggers below the deepest level seen.
            if let Some(no_inherits) = track.remove(&-1) {
                track.insert(highest_inherits + 1, no_inherits);
            }

            let mut levels: Vec<i64> = track.keys().copied().collect();
            levels.sort_unstable();

            for level in levels {
                let bucket = track.remove(&level).unwrap_or_default();
                sort_by_words(&mut running, bucket.atomic);
                sort_by_words(&mut running, bucket.option);
                sort_by_words(&mut running, bucket.alpha);
                sort_by_words(&mut running, bucket.number);
                sort_by_words(&mut running, bucket.wild);

                sort_by_length(&mut running, bucket.under);
                sort_by_length(&mut running, bucket.pound);
                sort_by_length(&mut running, bucket.star);
            }
        }

        running
    }
}

/// Append word-counted buckets to the running list: more words first, then
/// longer patterns first. Duplicate patterns keep every pointer.
fn sort_by_words(
    running: &mut Vec<SortedTriggerEntry>,
    buckets: HashMap<usize, Vec<SortedTriggerEntry>>,
) {
    let mut counts: Vec<usize> = buckets.keys().copied().collect();
    counts.sort_unstable_by(|a, b| b.cmp(a));

    for count in counts {
        let entries = &buckets[&count];
        append_longest_first(running, entries);
    }
}

/// Append degenerate single-wildcard triggers, longest pattern first.
fn sort_by_length(running: &mut Vec<SortedTriggerEntry>, entries: Vec<SortedTriggerEntry>) {
    append_longest_first(running, &entries);
}

/// Append entries ordered by descending pattern length. Each distinct
/// pattern is visited once; duplicate patterns keep all their pointers, in
/// source order.
fn append_longest_first(running: &mut Vec<SortedTriggerEntry>, entries: &[SortedTriggerEntry]) {
    let mut patterns: Vec<&str> = entries.iter().map(|e| e.pattern.as_str()).collect();
    patterns.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut seen: HashSet<&str> = HashSet::new();
    for pattern in patterns {
        if !seen.insert(pattern) {
            continue;
        }
        running.extend(entries.iter().filter(|e| e.pattern == pattern).cloned());
    }
}

/// Sort substitution keys: descending word count, ties broken by
/// descending length, then lexicographically for a stable total order.
fn sort_list<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut list: Vec<String> = items.cloned().collect();
    list.sort_by(|a, b| {
        word_count(b, true)
            .cmp(&word_count(a, true))
            .then(b.len().cmp(&a.len()))
            .then(a.cmp(b))
    });
    list
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted_patterns(code: &str) -> Vec<String> {
        let mut bot = RiveScript::new();
        bot.stream(code).unwrap();
        bot.sort_replies().unwrap();
        bot.sorted.topics["random"]
            .iter()
            .map(|e| e.pattern.clone())
            .collect()
    }

    #[test]
    fn specificity_order() {
        let patterns = sorted_patterns(concat!(
            "+ *\n- w\n",
            "+ hello bot\n- a\n",
            "+ hello *\n- b\n",
            "+ hello _\n- c\n",
            "+ hello #\n- d\n",
            "+ [the] hello\n- e\n",
        ));
        assert_eq!(
            patterns,
            vec!["hello bot", "[the] hello", "hello _", "hello #", "hello *", "*"]
        );
    }

    #[test]
    fn more_words_sort_first() {
        let patterns = sorted_patterns(concat!(
            "+ hi\n- a\n",
            "+ hello there robot friend\n- b\n",
            "+ hello there\n- c\n",
        ));
        assert_eq!(patterns, vec!["hello there robot friend", "hello there", "hi"]);
    }

    #[test]
    fn weight_outranks_specificity() {
        let patterns = sorted_patterns(concat!(
            "+ hello bot\n- a\n",
            "+ hello *{weight=20}\n- b\n",
            "+ * or something{weight=10}\n- c\n",
        ));
        assert_eq!(
            patterns,
            vec!["hello *{weight=20}", "* or something{weight=10}", "hello bot"]
        );
    }

    #[test]
    fn wildcard_degenerates_trail_in_order() {
        let patterns = sorted_patterns(concat!(
            "+ *\n- a\n",
            "+ _\n- b\n",
            "+ #\n- c\n",
            "+ real words\n- d\n",
        ));
        assert_eq!(patterns, vec!["real words", "_", "#", "*"]);
    }

    #[test]
    fn longer_degenerates_beat_shorter_ones() {
        let patterns = sorted_patterns("+ *\n- a\n+ * *\n- b\n+ * * *\n- c\n");
        assert_eq!(patterns, vec!["* * *", "* *", "*"]);
    }

    #[test]
    fn inheriting_topics_outrank_their_parents() {
        let mut bot = RiveScript::new();
        bot.stream(concat!(
            "> topic alpha inherits beta\n",
            "+ *\n- in alpha\n",
            "< topic\n",
            "> topic beta\n",
            "+ beta specific trigger\n- in beta\n",
            "< topic\n",
            "+ top\n- random\n",
        ))
        .unwrap();
        bot.sort_replies().unwrap();

        let patterns: Vec<&str> = bot.sorted.topics["alpha"]
            .iter()
            .map(|e| e.pattern.as_str())
            .collect();
        // Alpha's own * beats beta's atomic trigger.
        assert_eq!(
            patterns,
            vec!["{inherits=0}*", "{inherits=1}beta specific trigger"]
        );
    }

    #[test]
    fn sorting_is_stable_across_calls() {
        let code = concat!(
            "+ hello bot\n- a\n",
            "+ hello *\n- b\n",
            "+ [the] hello\n- c\n",
            "+ *\n- d\n",
            "+ how are you\n- e\n",
        );
        let first = sorted_patterns(code);
        for _ in 0..5 {
            assert_eq!(sorted_patterns(code), first);
        }
    }

    #[test]
    fn previous_triggers_are_excluded_from_the_main_index() {
        let mut bot = RiveScript::new();
        bot.stream("+ knock knock\n- Who's there?\n+ *\n% who is there\n- <sentence> who?")
            .unwrap();
        bot.sort_replies().unwrap();

        let main: Vec<&str> = bot.sorted.topics["random"]
            .iter()
            .map(|e| e.pattern.as_str())
            .collect();
        assert_eq!(main, vec!["knock knock"]);

        let thats: Vec<&str> = bot.sorted.thats["random"]
            .iter()
            .map(|e| e.pattern.as_str())
            .collect();
        assert_eq!(thats, vec!["who is there"]);
    }

    #[test]
    fn substitution_keys_sort_longest_first() {
        let mut bot = RiveScript::new();
        bot.stream(concat!(
            "! sub what's = what is\n",
            "! sub what's up = what is up\n",
            "! sub u = you\n",
            "+ placeholder\n- ok\n",
        ))
        .unwrap();
        bot.sort_replies().unwrap();
        assert_eq!(bot.sorted.sub, vec!["what's up", "what's", "u"]);
    }

    #[test]
    fn sorting_nothing_is_an_error() {
        let mut bot = RiveScript::new();
        assert!(matches!(bot.sort_replies(), Err(Error::NoSourceLoaded)));
    }
}
