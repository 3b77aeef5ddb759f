//! Command-line lexing for commands stored as a single string.
//!
//! Task commands in `monospace.yml` may be written either as a YAML list or as
//! one string such as `make build "OUT=dist dir"`. This module turns the
//! string form into argv tokens.
//!
//! Rules:
//! - whitespace separates tokens, runs of whitespace collapse
//! - a token starting with `'` or `"` extends to the matching quote; inside it
//!   `\<quote>` and `\\` are unescaped, any other backslash is kept verbatim
//! - a quote that appears in the middle of an unquoted token is copied
//!   verbatim together with everything up to the matching quote
//! - in strict mode an unterminated quote is a [`MonospaceError::ParseQuote`];
//!   in lenient mode the rest of the input becomes the tail of the current token

use std::borrow::Cow;
use std::iter::Peekable;
use std::str::Chars;

use crate::types::{MonospaceError, MonospaceResult};

/// Split `input` into argv tokens, failing on unterminated quotes.
pub fn lex(input: &str) -> MonospaceResult<Vec<String>> {
    lex_with(input, true)
}

/// Split `input` into argv tokens, swallowing unterminated quotes.
pub fn lex_lenient(input: &str) -> Vec<String> {
    // Lenient lexing never produces an error.
    lex_with(input, false).unwrap_or_default()
}

fn lex_with(input: &str, strict: bool) -> MonospaceResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current: Option<String> = None;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if let Some(token) = current.take() {
                    tokens.push(token);
                }
            }
            '"' | '\'' if current.is_none() => {
                let mut token = String::new();
                let closed = read_quoted(&mut chars, c, &mut token);
                if !closed && strict {
                    return Err(MonospaceError::ParseQuote {
                        quote: c,
                        input: input.to_string(),
                    });
                }
                current = Some(token);
            }
            '"' | '\'' => {
                let token = current.get_or_insert_with(String::new);
                token.push(c);
                let closed = read_verbatim(&mut chars, c, token);
                if !closed && strict {
                    return Err(MonospaceError::ParseQuote {
                        quote: c,
                        input: input.to_string(),
                    });
                }
            }
            c => current.get_or_insert_with(String::new).push(c),
        }
    }

    if let Some(token) = current {
        tokens.push(token);
    }
    Ok(tokens)
}

/// Read the body of a quoted token (opening quote already consumed).
/// Returns whether the closing quote was found.
fn read_quoted(chars: &mut Peekable<Chars<'_>>, quote: char, out: &mut String) -> bool {
    while let Some(c) = chars.next() {
        if c == quote {
            return true;
        }
        if c == '\\' {
            match chars.peek() {
                Some(&next) if next == quote || next == '\\' => {
                    out.push(next);
                    chars.next();
                }
                _ => out.push('\\'),
            }
            continue;
        }
        out.push(c);
    }
    false
}

/// Copy a quoted segment inside an unquoted token, quotes included.
fn read_verbatim(chars: &mut Peekable<Chars<'_>>, quote: char, out: &mut String) -> bool {
    for c in chars.by_ref() {
        out.push(c);
        if c == quote {
            return true;
        }
    }
    false
}

/// Quote a single token so that [`lex`] reads it back unchanged.
pub fn quote(token: &str) -> Cow<'_, str> {
    let safe = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,^#*".contains(c));
    if safe {
        return Cow::Borrowed(token);
    }

    let mut quoted = String::with_capacity(token.len() + 2);
    quoted.push('"');
    for c in token.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

/// Join argv tokens back into a single command string.
pub fn join<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|t| quote(t.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn splits_on_whitespace_runs() {
        assert_eq!(
            lex("  make   build\ttest \n").unwrap(),
            vec!["make", "build", "test"]
        );
        assert!(lex("   ").unwrap().is_empty());
    }

    #[test]
    fn quoted_tokens_keep_spaces() {
        assert_eq!(
            lex(r#"echo "hello world" 'single quoted'"#).unwrap(),
            vec!["echo", "hello world", "single quoted"]
        );
    }

    #[test]
    fn escaped_quotes_are_unescaped() {
        assert_eq!(
            lex(r#"echo "say \"hi\"" 'it\'s'"#).unwrap(),
            vec!["echo", r#"say "hi""#, "it's"]
        );
    }

    #[test]
    fn other_backslashes_are_kept() {
        assert_eq!(lex(r#""C:\dir""#).unwrap(), vec![r"C:\dir"]);
    }

    #[test]
    fn inner_quotes_pass_through_verbatim() {
        assert_eq!(
            lex(r#"env FOO="a b" run"#).unwrap(),
            vec!["env", r#"FOO="a b""#, "run"]
        );
    }

    #[test]
    fn empty_quotes_produce_empty_token() {
        assert_eq!(lex(r#"printf "" x"#).unwrap(), vec!["printf", "", "x"]);
    }

    #[test]
    fn strict_mode_rejects_unterminated_quote() {
        let err = lex(r#"echo "oops"#).unwrap_err();
        assert!(matches!(err, MonospaceError::ParseQuote { quote: '"', .. }));

        let err = lex("echo FOO='bar").unwrap_err();
        assert!(matches!(err, MonospaceError::ParseQuote { quote: '\'', .. }));
    }

    #[test]
    fn lenient_mode_keeps_the_tail() {
        assert_eq!(lex_lenient(r#"echo "oops and more"#), vec!["echo", "oops and more"]);
        assert_eq!(lex_lenient("echo FOO='bar baz"), vec!["echo", "FOO='bar baz"]);
    }

    #[test]
    fn join_quotes_only_when_needed() {
        assert_eq!(join(&["make", "build"]), "make build");
        assert_eq!(join(&["echo", "a b", ""]), r#"echo "a b" """#);
    }

    proptest! {
        #[test]
        fn join_then_lex_round_trips(tokens in proptest::collection::vec("[a-zA-Z0-9 '\"\\\\._/-]{0,8}", 0..6)) {
            let joined = join(&tokens);
            prop_assert_eq!(lex(&joined).unwrap(), tokens);
        }
    }
}
