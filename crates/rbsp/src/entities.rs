//! The ENTITIES lump text format.
//!
//! ```text
//! {
//! "classname" "worldspawn"
//! "message" "hello"
//! }
//! ```
//!
//! Strings have no escapes: a `"` always ends the string. Whitespace is space,
//! `\n` and `\r`. A NUL byte ends the input just like the end of the slice.
//! Text is 8-bit (see [`crate::text`]).

use std::fmt;

use thiserror::Error;

use crate::text;

/// How much of the preceding text an [`EntityParseError`] carries.
const CONTEXT_LEN: usize = 24;

// ============================================================
// Entity
// ============================================================

/// One placed object: key/value pairs with case-insensitive keys.
///
/// Pairs keep their insertion order, so a rewritten lump lists keys the way
/// the source did rather than sorted by key. Setting an existing key replaces
/// its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entity {
    pairs: Vec<(String, String)>,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.pairs
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(key))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.position(key).map(|i| self.pairs[i].1.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Sets `key`, returning the previous value if the key was present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(i) => Some(std::mem::replace(&mut self.pairs[i].1, value)),
            None => {
                self.pairs.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.position(key).map(|i| self.pairs.remove(i).1)
    }

    pub fn classname(&self) -> Option<&str> {
        self.get("classname")
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Entity {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut entity = Entity::new();
        for (k, v) in iter {
            entity.insert(k, v);
        }
        entity
    }
}

// ============================================================
// Errors
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityParseErrorKind {
    ExpectedOpenBrace,
    ExpectedQuote,
    UnterminatedString,
    /// Input ended inside a `{ ... }` block.
    UnexpectedEnd,
}

impl fmt::Display for EntityParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            EntityParseErrorKind::ExpectedOpenBrace => "expected '{'",
            EntityParseErrorKind::ExpectedQuote => "expected '\"'",
            EntityParseErrorKind::UnterminatedString => "unexpected end of string",
            EntityParseErrorKind::UnexpectedEnd => "unexpected end of entity",
        };
        f.write_str(msg)
    }
}

/// Structural error in entity text, with the byte offset it was found at and
/// the text leading up to it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("entity parse error: {kind} at byte {offset} (after {context:?})")]
pub struct EntityParseError {
    pub kind: EntityParseErrorKind,
    pub offset: usize,
    pub context: String,
}

/// Why a key or value cannot be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityEncodeErrorKind {
    /// Strings have no escapes, so a quote would end them early.
    Quote,
    /// A NUL would end the lump early.
    Nul,
    /// Character with no single-byte form.
    Unencodable(char),
}

impl fmt::Display for EntityEncodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityEncodeErrorKind::Quote => f.write_str("contains '\"'"),
            EntityEncodeErrorKind::Nul => f.write_str("contains NUL"),
            EntityEncodeErrorKind::Unencodable(c) => {
                write!(f, "character {:?} is outside Latin-1", c)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("entity {entity}: {string:?} cannot be stored: {kind}")]
pub struct EntityEncodeError {
    /// Position of the entity in the list.
    pub entity: usize,
    pub string: String,
    pub kind: EntityEncodeErrorKind,
}

// ============================================================
// Parser
// ============================================================

struct Cursor<'a> {
    text: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    #[inline]
    fn peek(&self) -> Option<u8> {
        match self.text.get(self.pos) {
            Some(0) | None => None,
            Some(&c) => Some(c),
        }
    }

    /// Skips whitespace; returns false at the end of input.
    fn skip_whitespace(&mut self) -> bool {
        while let Some(c) = self.peek() {
            if !matches!(c, b' ' | b'\n' | b'\r') {
                return true;
            }
            self.pos += 1;
        }
        false
    }

    fn error(&self, kind: EntityParseErrorKind, offset: usize) -> EntityParseError {
        let end = offset.min(self.text.len());
        let start = end.saturating_sub(CONTEXT_LEN);
        EntityParseError {
            kind,
            offset,
            context: text::decode(&self.text[start..end]).into_owned(),
        }
    }

    fn parse_string(&mut self) -> Result<String, EntityParseError> {
        if !self.skip_whitespace() {
            return Err(self.error(EntityParseErrorKind::UnexpectedEnd, self.pos));
        }
        if self.peek() != Some(b'"') {
            return Err(self.error(EntityParseErrorKind::ExpectedQuote, self.pos));
        }
        let open = self.pos;
        self.pos += 1;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == b'"' {
                let s = text::decode(&self.text[start..self.pos]).into_owned();
                self.pos += 1;
                return Ok(s);
            }
            self.pos += 1;
        }
        Err(self.error(EntityParseErrorKind::UnterminatedString, open))
    }

    fn parse_entity(&mut self) -> Result<Entity, EntityParseError> {
        if self.peek() != Some(b'{') {
            return Err(self.error(
                EntityParseErrorKind::ExpectedOpenBrace,
                self.pos,
            ));
        }
        self.pos += 1;
        let mut entity = Entity::new();
        loop {
            if !self.skip_whitespace() {
                return Err(self.error(EntityParseErrorKind::UnexpectedEnd, self.pos));
            }
            if self.peek() == Some(b'}') {
                self.pos += 1;
                return Ok(entity);
            }
            let key = self.parse_string()?;
            let value = self.parse_string()?;
            entity.insert(key, value);
        }
    }
}

/// Parses entity text into entities, in order. Offsets in errors are byte
/// offsets into `text`.
pub fn parse<T: AsRef<[u8]> + ?Sized>(text: &T) -> Result<Vec<Entity>, EntityParseError> {
    let mut cursor = Cursor {
        text: text.as_ref(),
        pos: 0,
    };
    let mut entities = Vec::new();
    while cursor.skip_whitespace() {
        entities.push(cursor.parse_entity()?);
    }
    Ok(entities)
}

/// Renders entities in the canonical layout: one `"key" "value"` line per
/// pair between `{` and `}` lines.
pub fn stringify(entities: &[Entity]) -> String {
    let mut out = String::new();
    for entity in entities {
        out.push_str("{\n");
        for (key, value) in entity.iter() {
            out.push('"');
            out.push_str(key);
            out.push_str("\" \"");
            out.push_str(value);
            out.push_str("\"\n");
        }
        out.push_str("}\n");
    }
    out
}

fn encode_string(entity: usize, string: &str, out: &mut Vec<u8>) -> Result<(), EntityEncodeError> {
    let fail = |kind| EntityEncodeError {
        entity,
        string: string.to_string(),
        kind,
    };
    if string.contains('"') {
        return Err(fail(EntityEncodeErrorKind::Quote));
    }
    if string.contains('\0') {
        return Err(fail(EntityEncodeErrorKind::Nul));
    }
    let bytes = text::encode(string).map_err(|c| fail(EntityEncodeErrorKind::Unencodable(c)))?;
    out.push(b'"');
    out.extend_from_slice(&bytes);
    out.push(b'"');
    Ok(())
}

/// The [`stringify`] layout as lump bytes, without the NUL terminator.
///
/// Fails on any key or value that would not parse back to itself.
pub fn encode(entities: &[Entity]) -> Result<Vec<u8>, EntityEncodeError> {
    let mut out = Vec::new();
    for (index, entity) in entities.iter().enumerate() {
        out.extend_from_slice(b"{\n");
        for (key, value) in entity.iter() {
            encode_string(index, key, &mut out)?;
            out.push(b' ');
            encode_string(index, value, &mut out)?;
            out.push(b'\n');
        }
        out.extend_from_slice(b"}\n");
    }
    Ok(out)
}

// =============================================================================
// Tests
// =============================================================================
