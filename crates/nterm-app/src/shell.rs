//! Shell word splitting and quoting
//!
//! The deprecated `-e "ls -la"` form carries a whole command line in one
//! argument, and session-config files store a tab's command the same way.
//! Splitting follows POSIX quoting rules (single quotes literal, double
//! quotes pass `\$`, `` \` ``, `\"` and `\\` escapes, backslash escapes
//! outside quotes); joining single-quotes anything that needs it so a
//! split → join → split cycle is stable.

use thiserror::Error;

/// Errors from splitting a command string.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ShellError {
    #[error("unterminated quote in command")]
    UnterminatedQuote,

    #[error("trailing backslash in command")]
    TrailingEscape,

    #[error("empty command")]
    Empty,
}

/// Split a command string into words.
pub fn split(input: &str) -> Result<Vec<String>, ShellError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' | '\n' => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(inner) => current.push(inner),
                        None => return Err(ShellError::UnterminatedQuote),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(esc @ ('$' | '`' | '"' | '\\')) => current.push(esc),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => return Err(ShellError::UnterminatedQuote),
                        },
                        Some(inner) => current.push(inner),
                        None => return Err(ShellError::UnterminatedQuote),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(esc) => current.push(esc),
                    None => return Err(ShellError::TrailingEscape),
                }
            }
            _ => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }

    if words.is_empty() {
        return Err(ShellError::Empty);
    }

    Ok(words)
}

/// Characters that force quoting when joining.
fn needs_quoting(word: &str) -> bool {
    word.is_empty()
        || word.chars().any(|c| {
            matches!(
                c,
                ' ' | '\t' | '\n' | '\r' | '\'' | '"' | '`' | '$' | '!' | '&' | '|' | ';' | '('
                    | ')' | '{' | '}' | '[' | ']' | '<' | '>' | '*' | '?' | '\\' | '#' | '~' | '^'
            )
        })
}

/// Quote one word using single quotes.
///
/// Single quotes inside the word are handled by ending the quoted section,
/// adding an escaped single quote, and starting a new quoted section:
/// `it's` becomes `'it'\''s'`.
fn quote(word: &str) -> String {
    if !needs_quoting(word) {
        return word.to_string();
    }
    let escaped = word.replace('\'', "'\\''");
    format!("'{escaped}'")
}

/// Join words into a single command string that [`split`] reverses.
pub fn join(words: &[String]) -> String {
    words.iter().map(|w| quote(w)).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_split_simple() {
        assert_eq!(split("ls -la").unwrap(), owned(&["ls", "-la"]));
    }

    #[test]
    fn test_split_collapses_whitespace() {
        assert_eq!(split("  a \t b  ").unwrap(), owned(&["a", "b"]));
    }

    #[test]
    fn test_split_single_quotes_literal() {
        assert_eq!(
            split("echo 'hello $USER'").unwrap(),
            owned(&["echo", "hello $USER"])
        );
    }

    #[test]
    fn test_split_double_quote_escapes() {
        assert_eq!(
            split(r#"echo "a\"b" "c\$d""#).unwrap(),
            owned(&["echo", "a\"b", "c$d"])
        );
    }

    #[test]
    fn test_split_backslash_outside_quotes() {
        assert_eq!(split(r"echo a\ b").unwrap(), owned(&["echo", "a b"]));
    }

    #[test]
    fn test_split_empty_quoted_word() {
        assert_eq!(split("env ''").unwrap(), owned(&["env", ""]));
    }

    #[test]
    fn test_split_errors() {
        assert_eq!(split("echo 'oops").unwrap_err(), ShellError::UnterminatedQuote);
        assert_eq!(split("echo oops\\").unwrap_err(), ShellError::TrailingEscape);
        assert_eq!(split("   ").unwrap_err(), ShellError::Empty);
    }

    #[test]
    fn test_join_then_split_is_stable() {
        let words = owned(&["sh", "-c", "echo 'it works' > \"$HOME/out\""]);
        let joined = join(&words);
        assert_eq!(split(&joined).unwrap(), words);
    }

    #[test]
    fn test_join_plain_words_unquoted() {
        assert_eq!(join(&owned(&["vim", "notes.txt"])), "vim notes.txt");
    }
}
