//! Command line tokenizer.

use crate::constants::MAX_ARGS;
use tracing::warn;

/// Split one command line into words.
///
/// Whitespace separates words. A double quote toggles quoting, and inside
/// quotes whitespace is literal; a quote opened right after whitespace
/// starts a new word even if it ends up empty. A backslash inserts the
/// next character literally (quotes and backslashes included) without
/// toggling the quote state. An unterminated quote runs to the end of the
/// line. Words past [`MAX_ARGS`] are dropped with a warning.
pub fn parse_command(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut quoted = false;
    let mut escaped = false;

    for ch in line.chars() {
        if escaped {
            in_word = true;
            word.push(ch);
            escaped = false;
            continue;
        }

        match ch {
            '\\' => escaped = true,
            '"' => {
                quoted = !quoted;
                if quoted {
                    in_word = true;
                }
            }
            c if c.is_ascii_whitespace() && !quoted => {
                if in_word {
                    if words.len() == MAX_ARGS {
                        warn!(
                            "Too many arguments in command line, truncating at {}",
                            MAX_ARGS
                        );
                        return words;
                    }
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }

    if in_word {
        if words.len() == MAX_ARGS {
            warn!(
                "Too many arguments in command line, truncating at {}",
                MAX_ARGS
            );
        } else {
            words.push(word);
        }
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_words() {
        assert_eq!(
            parse_command("STREAM FILE welcome 1234"),
            vec!["STREAM", "FILE", "welcome", "1234"]
        );
    }

    #[test]
    fn test_extra_whitespace() {
        assert_eq!(parse_command("  NOOP \t  "), vec!["NOOP"]);
    }

    #[test]
    fn test_quoted_word() {
        assert_eq!(
            parse_command(r#"SET VARIABLE "foo bar" baz"#),
            vec!["SET", "VARIABLE", "foo bar", "baz"]
        );
    }

    #[test]
    fn test_escaped_quote() {
        assert_eq!(parse_command(r#"a\"b"#), vec![r#"a"b"#]);
    }

    #[test]
    fn test_escaped_backslash_and_space() {
        assert_eq!(parse_command(r"a\\b c\ d"), vec![r"a\b", "c d"]);
    }

    #[test]
    fn test_escaped_quote_inside_quotes() {
        assert_eq!(
            parse_command(r#"VERBOSE "say \"hi\"" 2"#),
            vec!["VERBOSE", r#"say "hi""#, "2"]
        );
    }

    #[test]
    fn test_empty_quotes_make_empty_word() {
        assert_eq!(
            parse_command(r#"STREAM FILE demo """#),
            vec!["STREAM", "FILE", "demo", ""]
        );
    }

    #[test]
    fn test_quote_inside_word_does_not_split() {
        assert_eq!(parse_command(r#"ab"c d"e f"#), vec!["abc de", "f"]);
    }

    #[test]
    fn test_unterminated_quote() {
        assert_eq!(
            parse_command(r#"SEND TEXT "hello there"#),
            vec!["SEND", "TEXT", "hello there"]
        );
    }

    #[test]
    fn test_empty_line() {
        assert!(parse_command("").is_empty());
        assert!(parse_command("   ").is_empty());
    }

    #[test]
    fn test_truncates_at_max_args() {
        let line = (0..MAX_ARGS + 10)
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let words = parse_command(&line);
        assert_eq!(words.len(), MAX_ARGS);
        assert_eq!(words[0], "0");
        assert_eq!(words[MAX_ARGS - 1], (MAX_ARGS - 1).to_string());
    }
}
