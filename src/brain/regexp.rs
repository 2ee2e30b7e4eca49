//! Trigger pattern compilation.
//!
//! Turns RiveScript trigger syntax into a regular expression body (the
//! caller anchors it with `^...$`):
//!
//! ```text
//! *            (.+?)      one or more of anything
//! * (alone)    (.*?)      also matches the empty message
//! #            (\d+?)     digits only
//! _            letters only
//! [a|b]        optional alternation
//! @name        array alternation
//! <bot x>      current bot variable
//! <get x>      current user variable
//! <input>/<reply>          conversation history
//! ```
//!
//! Only ASCII regex features and plain character classes come out of here;
//! no lookaround, so an RE2-style engine could run the result unchanged.
//! Every expansion loop is bounded by the `depth` knob.

use crate::utils::{quotemeta, reg_replace, strip_nasties};
use crate::RiveScript;

impl RiveScript {
    /// Prepare a trigger pattern for the regular expression engine,
    /// interpolating arrays, variables and history for this user.
    pub(crate) fn trigger_regexp(&self, username: &str, pattern: &str) -> String {
        // A lone '*' must match the blank string too, so guard it before
        // the general '*' rewrite.
        let mut pattern = regex!(r"^\*$")
            .replace_all(pattern, "<zerowidthstar>")
            .into_owned();

        pattern = pattern.replace('*', "(.+?)");
        pattern = pattern.replace('#', r"(\d+?)");
        // '_' becomes \w for now; the optionals logic below would trip over
        // a character class with square brackets. Swapped to the real class
        // after optionals are done.
        pattern = pattern.replace('_', r"(\w+?)");
        pattern = regex!(r"\{weight=\d+\}")
            .replace_all(&pattern, "")
            .into_owned();
        pattern = regex!(r"\{inherits=\d+\}")
            .replace_all(&pattern, "")
            .into_owned();
        pattern = pattern.replace("<zerowidthstar>", "(.*?)");

        // Literal @ (as in an e-mail address) would collide with array
        // expansion in UTF-8 mode; escape it and recover at the end.
        if self.utf8() {
            pattern = pattern.replace('@', "\\u0040");
        }

        // Optionals: [a|b] becomes a non-capturing alternation where each
        // branch eats the surrounding whitespace, plus a branch for the
        // "not present" case.
        let mut giveup = 0;
        while let Some(caps) = regex!(r"\[(.+?)\]").captures(&pattern) {
            giveup += 1;
            if giveup > self.depth() {
                self.warn("Infinite loop when trying to process optionals in a trigger!");
                return String::new();
            }

            let inner = caps[1].to_string();
            let opts: Vec<String> = inner
                .split('|')
                .map(|part| format!(r"(?:\s|\b)+{part}(?:\s|\b)+"))
                .collect();

            // Any capture group inside the optional would shift the star
            // numbering, so downgrade them all to non-capturing.
            let pipes = opts
                .join("|")
                .replace("(.+?)", "(?:.+?)")
                .replace(r"(\d+?)", r"(?:\d+?)")
                .replace(r"(\w+?)", r"(?:\w+?)");

            pattern = reg_replace(
                &pattern,
                &format!(r"\s*\[{}\]\s*", quotemeta(&inner)),
                &format!(r"(?:{pipes}|(?:\s|\b)+)"),
            );
        }

        // _ wildcards can't match numbers. In UTF-8 mode the class stays
        // negated so foreign letters match; ASCII mode pins it down.
        let alpha_class = if self.utf8() { r"[^\s\d]" } else { "[A-Za-z]" };
        pattern = pattern.replace(r"\w", alpha_class);

        // Expand @arrays into alternations. Undefined arrays vanish.
        let mut giveup = 0;
        while pattern.contains('@') {
            giveup += 1;
            if giveup > self.depth() {
                break;
            }
            let Some(caps) = regex!(r"@(.+?)\b").captures(&pattern) else {
                break;
            };
            let name = caps[1].to_string();
            let rep = self
                .config_lock()
                .array
                .get(&name)
                .map(|items| format!("(?:{})", items.join("|")))
                .unwrap_or_default();
            pattern = pattern.replace(&format!("@{name}"), &rep);
        }

        // Fill in bot variables.
        let mut giveup = 0;
        while pattern.contains("<bot ") {
            giveup += 1;
            if giveup > self.depth() {
                break;
            }
            let Some(caps) = regex!(r"<bot (.+?)>").captures(&pattern) else {
                break;
            };
            let name = caps[1].to_string();
            let rep = self
                .config_lock()
                .var
                .get(&name)
                .map(|value| strip_nasties(value))
                .unwrap_or_default();
            pattern = pattern.replace(&format!("<bot {name}>"), &rep.to_lowercase());
        }

        // And user variables.
        let mut giveup = 0;
        while pattern.contains("<get ") {
            giveup += 1;
            if giveup > self.depth() {
                break;
            }
            let Some(caps) = regex!(r"<get (.+?)>").captures(&pattern) else {
                break;
            };
            let name = caps[1].to_string();
            let rep = self
                .sessions
                .get(username, &name)
                .unwrap_or_else(|_| "undefined".to_string());
            pattern = pattern.replace(&format!("<get {name}>"), &rep.to_lowercase());
        }

        // History tags.
        pattern = pattern.replace("<input>", "<input1>");
        pattern = pattern.replace("<reply>", "<reply1>");
        if pattern.contains("<input") || pattern.contains("<reply") {
            let history = self
                .sessions
                .get_history(username)
                .unwrap_or_default();
            let mut giveup = 0;
            while pattern.contains("<input") || pattern.contains("<reply") {
                giveup += 1;
                if giveup > self.depth() {
                    break;
                }
                for i in 1..=crate::HISTORY_SIZE {
                    pattern = pattern.replace(&format!("<input{i}>"), &history.input[i - 1]);
                    pattern = pattern.replace(&format!("<reply{i}>"), &history.reply[i - 1]);
                }
            }
        }

        // Recover escaped literal @.
        if self.utf8() && pattern.contains("\\u0040") {
            pattern = pattern.replace("\\u0040", "@");
        }

        pattern
    }
}
