//! Model-artifact metadata parsing
//!
//! DocLayout-YOLO ONNX exports carry two custom metadata properties: the
//! class-index-to-name mapping and the padding stride, both stored as
//! literal strings (`{0: 'title', 1: 'plain text'}` and `32`). The parsers
//! here accept exactly that grammar and nothing else; they are deliberately
//! not a general literal evaluator.

use std::collections::HashMap;

use ort::session::Session;

use crate::LayoutDetectionError;

/// Metadata extracted from the model artifact at load time
#[derive(Debug, Clone)]
pub struct ModelMetadata {
    /// Class-index-to-name mapping
    pub names: HashMap<u32, String>,
    /// Padding alignment stride in pixels
    pub stride: u32,
}

impl ModelMetadata {
    /// Read and parse the `names` and `stride` metadata properties from a
    /// loaded session. Missing or malformed properties are fatal.
    pub fn from_session(session: &Session) -> Result<Self, LayoutDetectionError> {
        let meta = session.metadata().map_err(|e| {
            LayoutDetectionError::Metadata(format!("failed to read model metadata: {e}"))
        })?;

        let names = meta
            .custom("names")
            .map_err(|e| {
                LayoutDetectionError::Metadata(format!("failed to read 'names' property: {e}"))
            })?
            .ok_or_else(|| {
                LayoutDetectionError::Metadata("model has no 'names' metadata property".to_string())
            })?;

        let stride = meta
            .custom("stride")
            .map_err(|e| {
                LayoutDetectionError::Metadata(format!("failed to read 'stride' property: {e}"))
            })?
            .ok_or_else(|| {
                LayoutDetectionError::Metadata("model has no 'stride' metadata property".to_string())
            })?;

        Self::from_strings(&names, &stride)
    }

    /// Parse both metadata fields from their serialized string forms
    pub fn from_strings(names: &str, stride: &str) -> Result<Self, LayoutDetectionError> {
        Ok(Self {
            names: parse_names(names)?,
            stride: parse_stride(stride)?,
        })
    }
}

/// Parse the stride property: a bare positive integer literal
pub fn parse_stride(text: &str) -> Result<u32, LayoutDetectionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LayoutDetectionError::Metadata(format!(
            "stride is not an unsigned integer literal: {text:?}"
        )));
    }
    let value: u32 = trimmed.parse().map_err(|_| {
        LayoutDetectionError::Metadata(format!("stride out of range: {trimmed:?}"))
    })?;
    if value == 0 {
        return Err(LayoutDetectionError::Metadata(
            "stride must be positive".to_string(),
        ));
    }
    Ok(value)
}

/// Parse the names property: a mapping literal from non-negative integers
/// to single- or double-quoted strings, e.g. `{0: 'title', 1: "plain text"}`.
///
/// Escapes, nesting, expressions, duplicate or non-integer keys, trailing
/// commas, and trailing junk are all rejected.
pub fn parse_names(text: &str) -> Result<HashMap<u32, String>, LayoutDetectionError> {
    let mut parser = Parser {
        input: text.as_bytes(),
        pos: 0,
    };

    parser.skip_ws();
    parser.expect(b'{')?;
    parser.skip_ws();

    let mut names = HashMap::new();
    if parser.peek() != Some(b'}') {
        loop {
            let key = parser.integer()?;
            parser.skip_ws();
            parser.expect(b':')?;
            parser.skip_ws();
            let value = parser.quoted_string()?;

            if names.insert(key, value).is_some() {
                return Err(LayoutDetectionError::Metadata(format!(
                    "duplicate class index {key} in names mapping"
                )));
            }

            parser.skip_ws();
            match parser.peek() {
                Some(b',') => {
                    parser.pos += 1;
                    parser.skip_ws();
                    if parser.peek() == Some(b'}') {
                        return Err(parser.fail("trailing comma in names mapping"));
                    }
                }
                Some(b'}') => break,
                _ => return Err(parser.fail("expected ',' or '}' in names mapping")),
            }
        }
    }
    parser.expect(b'}')?;
    parser.skip_ws();
    if parser.pos != parser.input.len() {
        return Err(parser.fail("trailing characters after names mapping"));
    }

    Ok(names)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), LayoutDetectionError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.fail(&format!("expected {:?}", byte as char)))
        }
    }

    fn integer(&mut self) -> Result<u32, LayoutDetectionError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.fail("expected integer class index"));
        }
        // Input is all ASCII digits at this point.
        let digits = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.fail("expected integer class index"))?;
        digits
            .parse()
            .map_err(|_| self.fail("class index out of range"))
    }

    fn quoted_string(&mut self) -> Result<String, LayoutDetectionError> {
        let quote = match self.peek() {
            Some(q @ (b'\'' | b'"')) => q,
            _ => return Err(self.fail("expected quoted class name")),
        };
        self.pos += 1;

        let start = self.pos;
        loop {
            match self.peek() {
                Some(b'\\') => return Err(self.fail("escape sequences are not supported")),
                Some(b) if b == quote => break,
                Some(_) => self.pos += 1,
                None => return Err(self.fail("unterminated class name string")),
            }
        }

        let value = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.fail("class name is not valid UTF-8"))?
            .to_string();
        self.pos += 1;
        Ok(value)
    }

    fn fail(&self, message: &str) -> LayoutDetectionError {
        LayoutDetectionError::Metadata(format!(
            "invalid names mapping at byte {}: {}",
            self.pos, message
        ))
    }
}
