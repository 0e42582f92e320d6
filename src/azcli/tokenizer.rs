//! Command String Tokenizer
//!
//! Splits a raw command string into an argument vector without ever touching
//! a shell. Quoting follows the conventions callers expect from a command
//! line: single and double quotes delimit literal spans, and a backslash
//! escapes a quote character or another backslash.
//!
//! Tokenization is a pure function: no I/O, no environment access, and the
//! same input always yields the same tokens or the same error.

/// Error produced when a command string cannot be tokenized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenizeError {
    /// The input was empty or contained no tokens.
    #[error("empty command string")]
    Empty,

    /// A quoted span was opened but never closed.
    #[error("unclosed quote in command string")]
    UnclosedQuote,
}

/// Tokenize a command string into an argument vector.
///
/// Rules:
/// - Leading/trailing whitespace is trimmed; runs of unquoted whitespace
///   separate tokens.
/// - `'` and `"` open a literal span closed only by the same character; the
///   other quote character inside a span is ordinary content.
/// - `\` escapes a following quote character or backslash. Any other
///   backslash is kept literally.
/// - An unterminated span, or an input with no tokens, is an error.
///
/// # Example
///
/// ```
/// use azguard::azcli::tokenize;
///
/// let args = tokenize(r#"az vm create --name "my vm""#).unwrap();
/// assert_eq!(args, vec!["az", "vm", "create", "--name", "my vm"]);
/// ```
pub fn tokenize(input: &str) -> Result<Vec<String>, TokenizeError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(TokenizeError::Empty);
    }

    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut quote_char = '\0';

    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' | '\'' => {
                if !in_quote {
                    in_quote = true;
                    quote_char = ch;
                } else if ch == quote_char {
                    in_quote = false;
                    quote_char = '\0';
                } else {
                    // The other quote character inside a span is literal.
                    current.push(ch);
                }
            }
            '\\' => {
                match chars.peek() {
                    Some(&next) if next == '"' || next == '\'' || next == '\\' => {
                        current.push(next);
                        chars.next();
                    }
                    _ => current.push('\\'),
                }
            }
            c if c.is_whitespace() && !in_quote => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if in_quote {
        return Err(TokenizeError::UnclosedQuote);
    }

    if !current.is_empty() {
        args.push(current);
    }

    if args.is_empty() {
        return Err(TokenizeError::Empty);
    }

    Ok(args)
}
