//! Line-oriented statement tokenizer for SQL dumps.
//!
//! The tokenizer understands exactly the dump syntax needed to find statement
//! boundaries:
//!
//! - `DELIMITER <token>` directives (stored procedures, triggers)
//! - `/* ... */` block comments, on one line or spanning several
//! - `--` and `#` comment lines
//!
//! Statement boundaries are found by checking whether the accumulated buffer
//! ends with the active delimiter after each line. Quoted strings get no
//! special treatment: a delimiter or comment marker inside a literal is
//! treated as dump syntax.


use crate::source::{DumpSource, SourceError};
use tracing::debug;

pub const DEFAULT_DELIMITER: &str = ";";

const DELIMITER_DIRECTIVE: &str = "DELIMITER ";
const BLOCK_COMMENT_OPEN: &str = "/*";
const BLOCK_COMMENT_CLOSE: &str = "*/";

/// Mutable scanner state, owned by a single [`StatementTokenizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizerState {
    pub active_delimiter: String,
    pub in_block_comment: bool,
    pub pending_buffer: String,
}

impl Default for TokenizerState {
    fn default() -> Self {
        Self {
            active_delimiter: DEFAULT_DELIMITER.to_string(),
            in_block_comment: false,
            pending_buffer: String::new(),
        }
    }
}

impl TokenizerState {
    /// Feed one line (terminator included) through the scanner. Returns the
    /// statement completed by this line, if any.
    pub fn push_line(&mut self, raw_line: &str) -> Option<String> {
        let mut line = raw_line;

        if self.in_block_comment {
            match line.find(BLOCK_COMMENT_CLOSE) {
                Some(end) => {
                    line = &line[end + BLOCK_COMMENT_CLOSE.len()..];
                    self.in_block_comment = false;
                }
                None => return None,
            }
        }

        let line = match self.strip_block_comments(line) {
            Some(line) => line,
            None => return None,
        };

        let check = line.trim();
        if check.is_empty() {
            return None;
        }

        if let Some(delimiter) = parse_delimiter_directive(check) {
            // A well-formed dump has an empty buffer here; flush whatever is
            // pending as-is rather than dropping it.
            let flushed = self.take_pending();
            debug!(
                from = %self.active_delimiter,
                to = delimiter,
                "delimiter changed"
            );
            self.active_delimiter = delimiter.to_string();
            return flushed;
        }

        if check.starts_with("--") || check.starts_with('#') {
            return None;
        }

        self.pending_buffer.push_str(&line);

        let test = self.pending_buffer.trim_end();
        if !self.active_delimiter.is_empty() && test.ends_with(self.active_delimiter.as_str()) {
            let body = test[..test.len() - self.active_delimiter.len()].trim();
            let statement = (!body.is_empty()).then(|| body.to_string());
            self.pending_buffer.clear();
            return statement;
        }

        None
    }

    /// Flush the pending buffer at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        self.take_pending()
    }

    fn take_pending(&mut self) -> Option<String> {
        let trimmed = self.pending_buffer.trim();
        let statement = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self.pending_buffer.clear();
        statement
    }

    /// Remove every `/* ... */` span closed on this line. An unterminated
    /// opener switches to block-comment state and discards the whole line.
    fn strip_block_comments(&mut self, line: &str) -> Option<String> {
        let mut line = line.to_string();

        while let Some(start) = line.find(BLOCK_COMMENT_OPEN) {
            let after_open = start + BLOCK_COMMENT_OPEN.len();
            match line[after_open..].find(BLOCK_COMMENT_CLOSE) {
                Some(rel_end) => {
                    let end = after_open + rel_end + BLOCK_COMMENT_CLOSE.len();
                    line.replace_range(start..end, "");
                }
                None => {
                    self.in_block_comment = true;
                    return None;
                }
            }
        }

        Some(line)
    }
}

/// Parse `DELIMITER <token>` (keyword matched case-insensitively) from a
/// trimmed line.
fn parse_delimiter_directive(check: &str) -> Option<&str> {
    let keyword = check.get(..DELIMITER_DIRECTIVE.len())?;
    if !keyword.eq_ignore_ascii_case(DELIMITER_DIRECTIVE) {
        return None;
    }
    let delimiter = check[DELIMITER_DIRECTIVE.len()..].trim();
    (!delimiter.is_empty()).then_some(delimiter)
}

/// Pull-based statement stream over a [`DumpSource`].
///
/// Yields each statement with comments, directives and the terminating
/// delimiter removed. A read error is yielded once, after which the
/// iterator is exhausted.
pub struct StatementTokenizer {
    source: DumpSource,
    state: TokenizerState,
    line: String,
    done: bool,
}

impl StatementTokenizer {
    pub fn new(source: DumpSource) -> Self {
        Self {
            source,
            state: TokenizerState::default(),
            line: String::with_capacity(4096),
            done: false,
        }
    }

    /// Tokenize literal SQL text.
    pub fn from_text(sql: impl Into<String>) -> Self {
        Self::new(DumpSource::inline(sql))
    }
}

impl Iterator for StatementTokenizer {
    type Item = Result<String, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            match self.source.read_line(&mut self.line) {
                Ok(true) => {
                    if let Some(statement) = self.state.push_line(&self.line) {
                        return Some(Ok(statement));
                    }
                }
                Ok(false) => {
                    self.done = true;
                    return self.state.finish().map(Ok);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl std::iter::FusedIterator for StatementTokenizer {}
