//! Parser for the tensor notation: a restricted JSON-like dialect describing
//! named float tensors.
//!
//! ```text
//! Tensors    := '{' TensorList? '}'
//! TensorList := Tensor (',' TensorList?)?
//! Tensor     := '"' Name '"' ':' '"' Dims ';' Values '"'
//! Dims       := Base64Run            // int64[] shape
//! Values     := Base64Run            // float32[] payload
//! Base64Run  := [A-Za-z0-9+/=]+
//! ```
//!
//! Whitespace is only skipped at structural positions: before and after the
//! braces, between list elements and around `:`. Names, base64 runs and the
//! `;` separator must be contiguous.
//!
//! The parser makes a single left-to-right pass over the input and never
//! backtracks. Decoded tensors are pushed into an [`InputContext`] in the order
//! they appear; the byte buffers are not checked against their element size
//! here, see [`crate::RawTensorEntry`].

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use thiserror::Error;

use crate::InputContext;

mod tokens {
    pub const NUL: u8 = b'\0';
    pub const ESCAPE: u8 = b'\\';
    pub const DQUOTE: u8 = b'"';
    pub const SEMICOLON: u8 = b';';
    pub const COLON: u8 = b':';
    pub const COMMA: u8 = b',';
    pub const OPEN_CBRACKET: u8 = b'{';
    pub const CLOSE_CBRACKET: u8 = b'}';
}

/// A malformed notation, located by 1-based line and column.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("error parsing tensor notation at {line}:{col}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub col: usize,
    pub message: String,
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parses `notation` into `context`. Empty input is a valid parse of zero tensors.
pub fn parse(notation: &str, context: &mut InputContext) -> ParseResult<()> {
    TensorParser::new(notation, context).cached_parse()
}

/// Read position over the notation text.
struct Cursor<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    /// Current byte, or NUL past the end. An embedded NUL also ends the input.
    fn peek(&self) -> u8 {
        self.source
            .as_bytes()
            .get(self.pos)
            .copied()
            .unwrap_or(tokens::NUL)
    }

    fn at_end(&self) -> bool {
        self.peek() == tokens::NUL
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), b' ' | b'\t' | b'\r' | b'\n') {
            self.advance();
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let consumed = self.source.get(..self.pos).unwrap_or(self.source);
        let line = 1 + consumed.matches('\n').count();
        let line_start = consumed.rfind('\n').map_or(0, |i| i + 1);
        let col = 1 + consumed[line_start..].chars().count();

        ParseError {
            line,
            col,
            message: message.into(),
        }
    }

    fn describe_current(&self) -> String {
        if self.at_end() {
            return "end of input".to_string();
        }
        match self.source.get(self.pos..).and_then(|rest| rest.chars().next()) {
            Some(c) => format!("'{}'", c.escape_debug()),
            None => format!("byte 0x{:02x}", self.peek()),
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        self.error(format!(
            "expected {expected}, found {}",
            self.describe_current()
        ))
    }

    fn expect(&mut self, c: u8) -> ParseResult<()> {
        if self.peek() == c {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", c as char)))
        }
    }

    fn read_base64(&mut self, what: &str) -> ParseResult<Bytes> {
        let start = self.pos;
        while is_base64(self.peek()) {
            self.advance();
        }

        let run = &self.source[start..self.pos];
        if run.is_empty() {
            return Err(self.unexpected(&format!("base64 {what}")));
        }
        if run.len() % 4 != 0 {
            return Err(self.error(format!(
                "base64 {what} \"{run}\" has length {}, which is not divisible by 4",
                run.len()
            )));
        }

        general_purpose::STANDARD
            .decode(run)
            .map(Bytes::from)
            .map_err(|err| self.error(format!("invalid base64 {what} \"{run}\": {err}")))
    }

    /// Reads a quoted name. A backslash toggles the escape flag, which keeps the
    /// next `"` from ending the name; any other character clears it. The name is
    /// returned verbatim, escapes included.
    fn read_tensor_name(&mut self) -> ParseResult<&'a str> {
        self.expect(tokens::DQUOTE)?;

        let start = self.pos;
        let mut in_escape = false;
        loop {
            match self.peek() {
                tokens::NUL => return Err(self.error("unterminated tensor name")),
                tokens::DQUOTE if !in_escape => break,
                tokens::ESCAPE => in_escape = !in_escape,
                _ => in_escape = false,
            }
            self.advance();
        }
        let source: &'a str = self.source;
        let name = &source[start..self.pos];

        self.expect(tokens::DQUOTE)?;
        Ok(name)
    }

    fn read_tensor_data(&mut self) -> ParseResult<(Bytes, Bytes)> {
        self.expect(tokens::DQUOTE)?;
        let dims = self.read_base64("dimensions")?;
        self.expect(tokens::SEMICOLON)?;
        let values = self.read_base64("values")?;
        self.expect(tokens::DQUOTE)?;
        Ok((dims, values))
    }
}

fn is_base64(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'+' || c == b'/' || c == b'='
}

/// Single-use parser bound to one notation string and one input context.
///
/// The first call to [`TensorParser::cached_parse`] does the work; later calls
/// return the memoized outcome without touching the input or the context again.
pub struct TensorParser<'a> {
    cursor: Cursor<'a>,
    context: &'a mut InputContext,
    outcome: Option<ParseResult<()>>,
}

impl<'a> TensorParser<'a> {
    pub fn new(notation: &'a str, context: &'a mut InputContext) -> Self {
        Self {
            cursor: Cursor::new(notation),
            context,
            outcome: None,
        }
    }

    pub fn cached_parse(&mut self) -> ParseResult<()> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        let outcome = if self.cursor.at_end() {
            Ok(())
        } else {
            self.read_tensor_list()
        };
        self.outcome = Some(outcome.clone());
        outcome
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, Some(Ok(())))
    }

    pub fn error(&self) -> Option<&ParseError> {
        self.outcome.as_ref().and_then(|outcome| outcome.as_ref().err())
    }

    fn read_tensor(&mut self) -> ParseResult<()> {
        let name = self.cursor.read_tensor_name()?;
        self.cursor.skip_whitespace();
        self.cursor.expect(tokens::COLON)?;
        self.cursor.skip_whitespace();
        let (dims, values) = self.cursor.read_tensor_data()?;

        self.context.push_input(name, dims, values);
        Ok(())
    }

    fn read_tensor_list(&mut self) -> ParseResult<()> {
        self.cursor.skip_whitespace();
        self.cursor.expect(tokens::OPEN_CBRACKET)?;
        self.cursor.skip_whitespace();

        while self.cursor.peek() != tokens::CLOSE_CBRACKET {
            self.read_tensor()?;
            self.cursor.skip_whitespace();
            match self.cursor.peek() {
                tokens::COMMA => {
                    self.cursor.advance();
                    self.cursor.skip_whitespace();
                }
                tokens::CLOSE_CBRACKET => break,
                _ => return Err(self.cursor.unexpected("',' or '}'")),
            }
        }

        self.cursor.expect(tokens::CLOSE_CBRACKET)
    }
}
