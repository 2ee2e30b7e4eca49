//! String helpers shared by the parser, sorter and brain.

/// Count the words in a trigger pattern.
///
/// With `all` set, every whitespace-separated token counts. Otherwise the
/// wildcard and option metacharacters are treated as separators too, so a
/// pattern like `hello *` counts one word.
pub(crate) fn word_count(pattern: &str, all: bool) -> usize {
    if all {
        pattern.split_whitespace().count()
    } else {
        regex!(r"[\s\*\#\_\|]+")
            .split(pattern)
            .filter(|w| !w.is_empty())
            .count()
    }
}

/// Strip all characters that aren't alphanumerics or spaces.
pub(crate) fn strip_nasties(text: &str) -> String {
    regex!(r"[^A-Za-z0-9 ]").replace_all(text, "").into_owned()
}

/// Whether a trigger is atomic (no wildcards, optionals, tags or arrays).
///
/// Left brackets are enough to test; the full character set never appears
/// without one of these.
pub(crate) fn is_atomic(pattern: &str) -> bool {
    !pattern.contains(['*', '#', '_', '(', '[', '<', '@'])
}

/// Apply one of the string-format transforms to `text`.
///
/// `sentence` capitalizes only the first letter; `formal` title-cases every
/// word. Unknown formats return the text unchanged.
pub(crate) fn string_format(format: &str, text: &str) -> String {
    match format {
        "uppercase" => text.to_uppercase(),
        "lowercase" => text.to_lowercase(),
        "sentence" => capitalize(&text.to_lowercase()),
        "formal" => text
            .split(' ')
            .map(|word| capitalize(&word.to_lowercase()))
            .collect::<Vec<_>>()
            .join(" "),
        _ => text.to_string(),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Escape a string for literal use inside a regular expression.
pub(crate) fn quotemeta(pattern: &str) -> String {
    let unsafe_chars = r"\.+*?[^]$(){}=!<>|:";
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if unsafe_chars.contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Regex-based find/replace where `pattern` is compiled on the fly.
///
/// The replacement may use `${1}`-style capture references. A pattern that
/// fails to compile leaves the input untouched (and is logged); trigger text
/// is user-supplied, so this must never panic.
pub(crate) fn reg_replace(input: &str, pattern: &str, replacement: &str) -> String {
    match regex::Regex::new(pattern) {
        Ok(re) => re.replace_all(input, replacement).into_owned(),
        Err(err) => {
            log::warn!("reg_replace: bad pattern {pattern:?}: {err}");
            input.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_ignores_metacharacters() {
        let cases: Vec<(&str, usize)> = vec![
            ("hello bot", 2),
            ("hello *", 1),
            ("* hello * bot *", 2),
            ("what is your [home|office] phone number", 7),
            ("_", 0),
            ("* * *", 0),
            ("i am # years old", 4),
        ];
        for (pattern, expected) in cases {
            assert_eq!(word_count(pattern, false), expected, "pattern: {pattern}");
        }
    }

    #[test]
    fn word_count_all_counts_every_token() {
        assert_eq!(word_count("hello there bot", true), 3);
        assert_eq!(word_count("who's there", true), 2);
    }

    #[test]
    fn atomic_detection() {
        assert!(is_atomic("hello bot"));
        assert!(!is_atomic("hello *"));
        assert!(!is_atomic("my name is <bot name>"));
        assert!(!is_atomic("[the] weather"));
        assert!(!is_atomic("what is @colors"));
    }

    #[test]
    fn string_formats() {
        assert_eq!(string_format("uppercase", "hello world"), "HELLO WORLD");
        assert_eq!(string_format("lowercase", "Hello World"), "hello world");
        assert_eq!(string_format("sentence", "hello world"), "Hello world");
        assert_eq!(string_format("formal", "hello world"), "Hello World");
    }

    #[test]
    fn quotemeta_escapes_regex_specials() {
        assert_eq!(quotemeta("who's there?"), r"who's there\?");
        assert_eq!(quotemeta("a.b"), r"a\.b");
        assert_eq!(quotemeta("plain"), "plain");
    }

    #[test]
    fn strip_nasties_removes_punctuation() {
        assert_eq!(strip_nasties("who's there?"), "whos there");
        assert_eq!(strip_nasties("hello, bot!"), "hello bot");
    }
}
