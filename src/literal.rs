//! Literal syntax for persisted autochecks and automation I/O.
//!
//! Autocheck files and automation results are written as nested literals:
//! `None`, `True`/`False`, numbers, quoted strings, tuples, lists and dicts.
//! Bare identifiers are kept as [`Value::Ref`] so parameter references such
//! as `filesystem_default_levels` survive a read/write cycle verbatim and
//! are only resolved when a check table is built.

use std::fmt;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Errors produced while parsing or resolving literals.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LiteralError {
    /// Input ended in the middle of a value.
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEnd {
        /// Byte offset where more input was expected.
        offset: usize,
    },
    /// A character that cannot start or continue the current construct.
    #[error("unexpected character {found:?} at offset {offset}")]
    Unexpected {
        /// The offending character.
        found: char,
        /// Byte offset of the character.
        offset: usize,
    },
    /// A numeric token that is neither an integer nor a float.
    #[error("invalid number {text:?} at offset {offset}")]
    InvalidNumber {
        /// Raw token text.
        text: String,
        /// Byte offset of the token.
        offset: usize,
    },
    /// Input continues after a complete value.
    #[error("trailing input at offset {offset}")]
    TrailingInput {
        /// Byte offset of the first trailing character.
        offset: usize,
    },
    /// A bare identifier that no variable lookup could resolve.
    #[error("unknown name '{0}'")]
    UnknownName(String),
    /// A value used as a check item that is not `None`, integer or string.
    #[error("invalid item {0}: must be None, an integer or a string")]
    InvalidItem(String),
}

/// A parsed literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `None`.
    None,
    /// `True` / `False`.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Quoted string.
    Str(String),
    /// `(a, b)`.
    Tuple(Vec<Value>),
    /// `[a, b]`.
    List(Vec<Value>),
    /// `{k: v}`, insertion ordered.
    Dict(Vec<(Value, Value)>),
    /// Unresolved bare identifier.
    Ref(String),
}

impl Value {
    /// Parse a complete literal. Trailing input other than whitespace and
    /// comments is an error.
    pub fn parse(src: &str) -> Result<Self, LiteralError> {
        let mut parser = Parser::new(src);
        let value = parser.value()?;
        parser.skip_ws();
        if parser.peek().is_some() {
            return Err(LiteralError::TrailingInput { offset: parser.pos });
        }
        Ok(value)
    }

    /// Replace every [`Value::Ref`] with the value the lookup returns.
    pub fn resolve(&self, lookup: &dyn Fn(&str) -> Option<Value>) -> Result<Value, LiteralError> {
        Ok(match self {
            Value::Ref(name) => {
                lookup(name).ok_or_else(|| LiteralError::UnknownName(name.clone()))?
            }
            Value::Tuple(items) => Value::Tuple(resolve_all(items, lookup)?),
            Value::List(items) => Value::List(resolve_all(items, lookup)?),
            Value::Dict(pairs) => {
                let mut out = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    out.push((k.resolve(lookup)?, v.resolve(lookup)?));
                }
                Value::Dict(out)
            }
            other => other.clone(),
        })
    }

    /// Borrow the string payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Elements of a tuple or list.
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) | Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a dict entry by string key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Dict(pairs) => pairs
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Convert a TOML value. Arrays become tuples, tables become dicts.
    pub fn from_toml(value: &toml::Value) -> Self {
        match value {
            toml::Value::String(s) => Value::Str(s.clone()),
            toml::Value::Integer(i) => Value::Int(*i),
            toml::Value::Float(f) => Value::Float(*f),
            toml::Value::Boolean(b) => Value::Bool(*b),
            toml::Value::Datetime(d) => Value::Str(d.to_string()),
            toml::Value::Array(items) => Value::Tuple(items.iter().map(Value::from_toml).collect()),
            toml::Value::Table(table) => Value::Dict(
                table
                    .iter()
                    .map(|(k, v)| (Value::Str(k.clone()), Value::from_toml(v)))
                    .collect(),
            ),
        }
    }
}

fn resolve_all(
    items: &[Value],
    lookup: &dyn Fn(&str) -> Option<Value>,
) -> Result<Vec<Value>, LiteralError> {
    items.iter().map(|v| v.resolve(lookup)).collect()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write_float(f, *x),
            Value::Str(s) => write_str_repr(f, s),
            Value::Ref(name) => f.write_str(name),
            Value::Tuple(items) => {
                f.write_str("(")?;
                write_joined(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Value::List(items) => {
                f.write_str("[")?;
                write_joined(f, items)?;
                f.write_str("]")
            }
            Value::Dict(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
        write!(f, "{x:.1}")
    } else {
        write!(f, "{x}")
    }
}

/// Quote a string the way the literal printer does: single quotes unless
/// the text contains a single quote and no double quote.
pub fn quote(s: &str) -> String {
    Value::Str(s.to_owned()).to_string()
}

fn write_str_repr(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    let delim = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len().saturating_add(2));
    out.push(delim);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == delim => {
                out.push('\\');
                out.push(c);
            }
            c if u32::from(c) < 0x20 => out.push_str(&format!("\\x{:02x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out.push(delim);
    f.write_str(&out)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::None => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Str(s) | Value::Ref(s) => serializer.serialize_str(s),
            Value::Tuple(items) | Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dict(pairs) => {
                let mut map = serializer.serialize_map(Some(pairs.len()))?;
                for (k, v) in pairs {
                    match k {
                        Value::Str(s) => map.serialize_entry(s, v)?,
                        other => map.serialize_entry(&other.to_string(), v)?,
                    }
                }
                map.end()
            }
        }
    }
}

/// Identifies one service of a check type on a host.
///
/// Ordered `None < Int < Str`, which is the order check tables are
/// rendered in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum Item {
    /// Check type has a single service per host.
    None,
    /// Numeric item, e.g. an interface index.
    Int(i64),
    /// Textual item, e.g. a mount point.
    Str(String),
}

impl Item {
    /// Convert a literal into an item.
    pub fn from_value(value: &Value) -> Result<Self, LiteralError> {
        match value {
            Value::None => Ok(Item::None),
            Value::Int(i) => Ok(Item::Int(*i)),
            Value::Str(s) => Ok(Item::Str(s.clone())),
            other => Err(LiteralError::InvalidItem(other.to_string())),
        }
    }

    /// Convert back into a literal.
    pub fn to_value(&self) -> Value {
        match self {
            Item::None => Value::None,
            Item::Int(i) => Value::Int(*i),
            Item::Str(s) => Value::Str(s.clone()),
        }
    }

    /// Whether this is [`Item::None`].
    pub fn is_none(&self) -> bool {
        matches!(self, Item::None)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl From<&str> for Item {
    fn from(s: &str) -> Self {
        Item::Str(s.to_owned())
    }
}

impl From<i64> for Item {
    fn from(i: i64) -> Self {
        Item::Int(i)
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos..).and_then(|rest| rest.chars().next())
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos = self.pos.saturating_add(c.len_utf8());
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, want: char) -> Result<(), LiteralError> {
        self.skip_ws();
        match self.peek() {
            Some(c) if c == want => {
                self.bump();
                Ok(())
            }
            Some(found) => Err(LiteralError::Unexpected {
                found,
                offset: self.pos,
            }),
            None => Err(LiteralError::UnexpectedEnd { offset: self.pos }),
        }
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        self.skip_ws();
        let Some(c) = self.peek() else {
            return Err(LiteralError::UnexpectedEnd { offset: self.pos });
        };
        match c {
            '(' => {
                self.bump();
                let (items, trailing_comma) = self.sequence(')')?;
                if items.len() == 1 && !trailing_comma {
                    Ok(items.into_iter().next().unwrap_or(Value::None))
                } else {
                    Ok(Value::Tuple(items))
                }
            }
            '[' => {
                self.bump();
                let (items, _) = self.sequence(']')?;
                Ok(Value::List(items))
            }
            '{' => {
                self.bump();
                self.dict()
            }
            '\'' | '"' => self.string(),
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            c if c.is_alphabetic() || c == '_' => self.identifier(),
            found => Err(LiteralError::Unexpected {
                found,
                offset: self.pos,
            }),
        }
    }

    /// Comma separated values up to `close`. Returns whether the last
    /// element was followed by a comma.
    fn sequence(&mut self, close: char) -> Result<(Vec<Value>, bool), LiteralError> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(c) if c == close => {
                    self.bump();
                    return Ok((items, trailing_comma));
                }
                None => return Err(LiteralError::UnexpectedEnd { offset: self.pos }),
                _ => {}
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                    trailing_comma = true;
                }
                Some(c) if c == close => {
                    trailing_comma = false;
                }
                Some(found) => {
                    return Err(LiteralError::Unexpected {
                        found,
                        offset: self.pos,
                    })
                }
                None => return Err(LiteralError::UnexpectedEnd { offset: self.pos }),
            }
        }
    }

    fn dict(&mut self) -> Result<Value, LiteralError> {
        let mut pairs = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(Value::Dict(pairs));
            }
            let key = self.value()?;
            self.expect(':')?;
            let value = self.value()?;
            pairs.push((key, value));
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some('}') => {}
                Some(found) => {
                    return Err(LiteralError::Unexpected {
                        found,
                        offset: self.pos,
                    })
                }
                None => return Err(LiteralError::UnexpectedEnd { offset: self.pos }),
            }
        }
    }

    fn string(&mut self) -> Result<Value, LiteralError> {
        let Some(delim) = self.bump() else {
            return Err(LiteralError::UnexpectedEnd { offset: self.pos });
        };
        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(LiteralError::UnexpectedEnd { offset: self.pos });
            };
            if c == delim {
                return Ok(Value::Str(out));
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let Some(esc) = self.bump() else {
                return Err(LiteralError::UnexpectedEnd { offset: self.pos });
            };
            match esc {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                '\\' | '\'' | '"' => out.push(esc),
                'x' => {
                    let start = self.pos;
                    let hex: String = [self.bump(), self.bump()].iter().flatten().collect();
                    let code = u32::from_str_radix(&hex, 16).map_err(|_| {
                        LiteralError::InvalidNumber {
                            text: hex.clone(),
                            offset: start,
                        }
                    })?;
                    out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        let mut prev: Option<char> = None;
        while let Some(c) = self.peek() {
            let sign_ok = (c == '-' || c == '+')
                && (prev.is_none() || matches!(prev, Some('e') | Some('E')));
            if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '_' || sign_ok {
                prev = Some(c);
                self.bump();
            } else {
                break;
            }
        }
        let mut text = self.src.get(start..self.pos).unwrap_or_default().replace('_', "");
        // Legacy long integers carry an `L` suffix.
        if matches!(self.peek(), Some('L') | Some('l')) {
            self.bump();
        }
        if text.starts_with('+') {
            text.remove(0);
        }
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Int(i));
        }
        text.parse::<f64>()
            .map(Value::Float)
            .map_err(|_| LiteralError::InvalidNumber {
                text,
                offset: start,
            })
    }

    fn identifier(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let name = self.src.get(start..self.pos).unwrap_or_default();
        // u'...' is the legacy unicode string prefix.
        if (name == "u" || name == "U") && matches!(self.peek(), Some('\'') | Some('"')) {
            return self.string();
        }
        Ok(match name {
            "None" => Value::None,
            "True" => Value::Bool(true),
            "False" => Value::Bool(false),
            other => Value::Ref(other.to_owned()),
        })
    }
}
