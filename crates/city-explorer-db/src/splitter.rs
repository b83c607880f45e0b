//! Splits raw migration text into individually executable statements.
//!
//! A plain split on `;` breaks every trigger whose body holds more than one
//! statement. The scanner here walks the text once and only treats `;` as a
//! terminator when it is outside quotes and comments and not inside a
//! `BEGIN ... END` or `CASE ... END` block. Keywords are matched as whole
//! words, case-insensitively. String literals and every SQLite identifier
//! quoting style (`"x"`, `` `x` ``, `[x]`) count as quotes.
//!
//! Text after the last terminator is reported as [`Split::trailing`] and is
//! never part of [`Split::statements`].

/// Result of scanning a blob of SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split<'a> {
    /// Trimmed statements in source order, each ending with its `;`.
    pub statements: Vec<&'a str>,
    /// Non-blank text after the last terminator, if any.
    pub trailing: Option<&'a str>,
}

/// Splits `sql` into statements.
///
/// Statements are trimmed substrings of `sql` that include their
/// terminating `;`. Unterminated trailing text is dropped; use [`split`] to
/// see it.
pub fn split_statements(sql: &str) -> Vec<&str> {
    split(sql).statements
}

/// Splits `sql` into statements and reports any unterminated remainder.
pub fn split(sql: &str) -> Split<'_> {
    let mut scanner = Scanner::default();
    let mut statements = Vec::new();
    let mut start = 0;

    for (idx, ch) in sql.char_indices() {
        if scanner.feed(ch) {
            let end = idx + ch.len_utf8();
            statements.push(sql[start..end].trim());
            start = end;
        }
    }

    let rest = sql[start..].trim();
    Split {
        statements,
        trailing: (!rest.is_empty()).then_some(rest),
    }
}

#[derive(Debug, Default)]
struct Scanner {
    single_quote: bool,
    double_quote: bool,
    backtick: bool,
    bracket: bool,
    line_comment: bool,
    block_comment: bool,
    depth: u32,
    word: String,
    prev: Option<char>,
}

impl Scanner {
    /// Consumes one character. Returns `true` if it terminates a statement.
    fn feed(&mut self, ch: char) -> bool {
        let mut boundary = false;
        // Set when `ch` completes a two-character token, so it cannot also
        // start the next one (`*/*` closes a comment without reopening it).
        let mut paired = false;

        if self.line_comment {
            if ch == '\n' {
                self.line_comment = false;
            }
        } else if self.block_comment {
            if self.prev == Some('*') && ch == '/' {
                self.block_comment = false;
                paired = true;
            }
        } else if self.single_quote {
            if ch == '\'' {
                self.single_quote = false;
            }
        } else if self.double_quote {
            if ch == '"' {
                self.double_quote = false;
            }
        } else if self.backtick {
            if ch == '`' {
                self.backtick = false;
            }
        } else if self.bracket {
            if ch == ']' {
                self.bracket = false;
            }
        } else {
            match ch {
                '\'' => {
                    self.end_word();
                    self.single_quote = true;
                }
                '"' => {
                    self.end_word();
                    self.double_quote = true;
                }
                '`' => {
                    self.end_word();
                    self.backtick = true;
                }
                '[' => {
                    self.end_word();
                    self.bracket = true;
                }
                '-' if self.prev == Some('-') => {
                    self.line_comment = true;
                    paired = true;
                }
                '*' if self.prev == Some('/') => {
                    self.block_comment = true;
                    paired = true;
                }
                ';' => {
                    self.end_word();
                    boundary = self.depth == 0;
                }
                c if is_word_char(c) => self.word.push(c),
                _ => self.end_word(),
            }
        }

        self.prev = if paired { None } else { Some(ch) };
        boundary
    }

    /// Closes the current word and applies it to the block depth.
    fn end_word(&mut self) {
        if self.word.is_empty() {
            return;
        }
        if self.word.eq_ignore_ascii_case("begin") || self.word.eq_ignore_ascii_case("case") {
            self.depth += 1;
        } else if self.word.eq_ignore_ascii_case("end") && self.depth > 0 {
            self.depth -= 1;
        }
        self.word.clear();
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
