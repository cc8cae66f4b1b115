use std::collections::HashMap;

#[derive(Clone, Copy)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    Backticked,
    Bracketed,
    LineComment,
    BlockComment(u32),
}

/// Lexical token of a SQL statement. Comments and whitespace are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Token {
    /// Keyword, bare identifier or number.
    Word(String),
    /// Quoted identifier with quotes removed.
    Ident(String),
    /// String literal with quotes removed and doubled quotes collapsed.
    Literal(String),
    /// Parameter placeholder, zero-based as SQLite numbers them.
    Param(usize),
    Symbol(char),
}

impl Token {
    pub(super) fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    /// Identifier text for bare or quoted names.
    pub(super) fn name(&self) -> Option<&str> {
        match self {
            Token::Word(w) | Token::Ident(w) => Some(w),
            _ => None,
        }
    }
}

fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'-') && bytes.get(idx + 1) == Some(&b'-')
}

fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'/') && bytes.get(idx + 1) == Some(&b'*')
}

fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'*') && bytes.get(idx + 1) == Some(&b'/')
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// Split SQL into tokens, numbering placeholders the way SQLite does: `?` takes the next
/// number after the largest seen so far, `?NNN` takes `NNN`, and a named parameter keeps the
/// number of its first occurrence.
pub(super) fn tokenize(sql: &str) -> Vec<Token> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut state = State::Normal;
    let mut text = Vec::new();
    let mut highest = 0usize;
    let mut named: HashMap<String, usize> = HashMap::new();
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'`' => state = State::Backticked,
                b'[' if !matches!(
                    tokens.last(),
                    Some(Token::Word(_) | Token::Ident(_) | Token::Symbol(']'))
                ) =>
                {
                    state = State::Bracketed;
                }
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'?' => {
                    let end = scan_while(bytes, idx + 1, |c| c.is_ascii_digit());
                    let number = std::str::from_utf8(&bytes[idx + 1..end])
                        .ok()
                        .and_then(|digits| digits.parse::<usize>().ok());
                    let number = number.unwrap_or(highest + 1);
                    highest = highest.max(number);
                    tokens.push(Token::Param(number.saturating_sub(1)));
                    idx = end - 1;
                }
                b':' | b'@' | b'$' if bytes.get(idx + 1).copied().is_some_and(is_word_byte) => {
                    let end = scan_while(bytes, idx + 1, is_word_byte);
                    let name = String::from_utf8_lossy(&bytes[idx..end]).into_owned();
                    let number = *named.entry(name).or_insert_with(|| {
                        highest += 1;
                        highest
                    });
                    tokens.push(Token::Param(number - 1));
                    idx = end - 1;
                }
                _ if is_word_byte(b) => {
                    let end = scan_while(bytes, idx, is_word_byte);
                    tokens.push(Token::Word(
                        String::from_utf8_lossy(&bytes[idx..end]).into_owned(),
                    ));
                    idx = end - 1;
                }
                _ if b.is_ascii_whitespace() => {}
                _ => tokens.push(Token::Symbol(char::from(b))),
            },
            State::SingleQuoted | State::DoubleQuoted | State::Backticked => {
                let quote = match state {
                    State::SingleQuoted => b'\'',
                    State::DoubleQuoted => b'"',
                    _ => b'`',
                };
                if b == quote {
                    if bytes.get(idx + 1) == Some(&quote) {
                        text.push(quote);
                        idx += 1; // escaped quote
                    } else {
                        let value = String::from_utf8_lossy(&text).into_owned();
                        text.clear();
                        tokens.push(if quote == b'\'' {
                            Token::Literal(value)
                        } else {
                            Token::Ident(value)
                        });
                        state = State::Normal;
                    }
                } else {
                    text.push(b);
                }
            }
            State::Bracketed => {
                if b == b']' {
                    tokens.push(Token::Ident(String::from_utf8_lossy(&text).into_owned()));
                    text.clear();
                    state = State::Normal;
                } else {
                    text.push(b);
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
        }
        idx += 1;
    }
    tokens
}

fn scan_while(bytes: &[u8], start: usize, pred: impl Fn(u8) -> bool) -> usize {
    let mut idx = start;
    while idx < bytes.len() && pred(bytes[idx]) {
        idx += 1;
    }
    idx
}

/// Render tokens back to type-name text, e.g. for the target of a `CAST`.
pub(super) fn render(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev_word = false;
    for token in tokens {
        let word = matches!(token, Token::Word(_) | Token::Ident(_));
        if word && prev_word {
            out.push(' ');
        }
        match token {
            Token::Word(w) => out.push_str(w),
            Token::Ident(i) => {
                out.push('"');
                out.push_str(&i.replace('"', "\"\""));
                out.push('"');
            }
            Token::Literal(l) => {
                out.push('\'');
                out.push_str(&l.replace('\'', "''"));
                out.push('\'');
            }
            Token::Param(_) => out.push('?'),
            Token::Symbol(c) => out.push(*c),
        }
        prev_word = word;
    }
    out
}

/// Leading keyword of the statement, upper-cased.
pub(super) fn leading_keyword(tokens: &[Token]) -> Option<String> {
    tokens.iter().find_map(|t| match t {
        Token::Word(w) => Some(w.to_ascii_uppercase()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_in_literals_and_comments_are_ignored() {
        let tokens = tokenize("SELECT '?', \"?\" -- ?\n, /* ? /* ? */ */ ? FROM t WHERE a = ?");
        let params: Vec<usize> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Param(i) => Some(*i),
                _ => None,
            })
            .collect();
        assert_eq!(params, vec![0, 1]);
        assert!(tokens.contains(&Token::Literal("?".into())));
        assert!(tokens.contains(&Token::Ident("?".into())));
    }

    #[test]
    fn numbered_and_named_placeholders_follow_sqlite_numbering() {
        let tokens = tokenize("VALUES (?3, ?, :a, :a, @b)");
        let params: Vec<usize> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Param(i) => Some(*i),
                _ => None,
            })
            .collect();
        assert_eq!(params, vec![2, 3, 4, 4, 5]);
    }

    #[test]
    fn renders_type_tokens() {
        let tokens = tokenize("DECIMAL(18, 7) 'STRUCT(a INTEGER)' INTEGER[]");
        assert_eq!(render(&tokens[..6]), "DECIMAL(18,7)");
        assert_eq!(render(&tokens[6..7]), "'STRUCT(a INTEGER)'");
        assert_eq!(render(&tokens[7..]), "INTEGER[]");
        assert_eq!(leading_keyword(&tokens).as_deref(), Some("DECIMAL"));
    }

    #[test]
    fn doubled_quotes_collapse() {
        let tokens = tokenize("SELECT 'it''s', [odd name]");
        assert_eq!(tokens[1], Token::Literal("it's".into()));
        assert_eq!(tokens[3], Token::Ident("odd name".into()));
    }
}
