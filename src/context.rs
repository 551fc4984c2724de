//! Per-invocation execution context
//!
//! An [`ExecutionContext`] is built once for every command the shell runs. It carries the
//! make target, the command text and an open set of attributes that the caller and the
//! plugins read and write while the chain executes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::logger::Sink;

/// Target value used when the shell was invoked without a make target.
pub const WITHOUT_TARGET: &str = "no-target";

/// Environment variable exported by make to the commands of its recipes.
pub const MAKE_LEVEL_VAR: &str = "MAKELEVEL";

/// Value of a context attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<AttrValue>),
}

impl AttrValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[AttrValue]> {
        match self {
            AttrValue::List(values) => Some(values),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Str(s) => f.write_str(s),
            AttrValue::List(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int(i64::from(value))
    }
}

impl From<u8> for AttrValue {
    fn from(value: u8) -> Self {
        AttrValue::Int(i64::from(value))
    }
}

impl From<u16> for AttrValue {
    fn from(value: u16) -> Self {
        AttrValue::Int(i64::from(value))
    }
}

impl From<u32> for AttrValue {
    fn from(value: u32) -> Self {
        AttrValue::Int(i64::from(value))
    }
}

/// Values beyond `i64::MAX` are kept as their decimal string.
impl From<u64> for AttrValue {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(n) => AttrValue::Int(n),
            Err(_) => AttrValue::Str(value.to_string()),
        }
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<PathBuf> for AttrValue {
    fn from(value: PathBuf) -> Self {
        AttrValue::Str(value.display().to_string())
    }
}

impl<T: Into<AttrValue>> From<Vec<T>> for AttrValue {
    fn from(values: Vec<T>) -> Self {
        AttrValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Snapshot of every attribute of a context, core fields included.
///
/// Owned by the caller; changing it never touches the context it was taken from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(BTreeMap<String, AttrValue>);

impl Attributes {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// State of a single command invocation, shared by every plugin of the chain.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    target: String,
    command: String,
    make_level: Option<String>,
    attributes: BTreeMap<String, AttrValue>,
    sink: Sink,
}

impl ExecutionContext {
    /// Create a context for `command`.
    ///
    /// A missing or empty `target` is stored as [`WITHOUT_TARGET`]. The make level is read
    /// from the process environment at this point.
    #[must_use]
    pub fn new(target: Option<String>, command: impl Into<String>) -> Self {
        Self {
            target: target
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| WITHOUT_TARGET.to_string()),
            command: command.into(),
            make_level: std::env::var(MAKE_LEVEL_VAR).ok(),
            attributes: BTreeMap::new(),
            sink: Sink::default(),
        }
    }

    #[must_use]
    pub fn with_attributes<K, V>(mut self, attributes: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<AttrValue>,
    {
        self.attributes.extend(
            attributes
                .into_iter()
                .map(|(key, value)| (key.into(), value.into())),
        );
        self
    }

    /// Override the make level captured from the environment.
    #[must_use]
    pub fn with_make_level(mut self, make_level: Option<String>) -> Self {
        self.make_level = make_level;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Sink) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub fn make_level(&self) -> Option<&str> {
        self.make_level.as_deref()
    }

    #[must_use]
    pub fn has_target(&self) -> bool {
        self.target != WITHOUT_TARGET
    }

    /// Whether the shell runs below a make invocation.
    #[must_use]
    pub fn has_make_level(&self) -> bool {
        self.make_level.is_some()
    }

    /// Sink that plugins should emit their events to.
    #[must_use]
    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Set an attribute, returning the previous value.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<AttrValue>,
    ) -> Option<AttrValue> {
        self.attributes.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.attributes.remove(key)
    }

    /// Append `value` to the list stored under `key`.
    ///
    /// A missing attribute starts a new list; a scalar attribute becomes the first element.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        let value = value.into();
        let entry = self
            .attributes
            .entry(key.into())
            .or_insert_with(|| AttrValue::List(Vec::new()));
        match entry {
            AttrValue::List(values) => values.push(value),
            scalar => {
                let previous = std::mem::replace(scalar, AttrValue::List(Vec::new()));
                *scalar = AttrValue::List(vec![previous, value]);
            }
        }
    }

    /// Extension attributes, without the core fields.
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.attributes
    }

    /// Snapshot of all attributes, used as the fields of log events.
    ///
    /// `target` and `command` take precedence over extension attributes of the same name.
    #[must_use]
    pub fn as_map(&self) -> Attributes {
        let mut map = self.attributes.clone();
        if let Some(level) = &self.make_level {
            map.insert("make_level".to_string(), AttrValue::Str(level.clone()));
        }
        map.insert("target".to_string(), AttrValue::Str(self.target.clone()));
        map.insert("command".to_string(), AttrValue::Str(self.command.clone()));
        Attributes(map)
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_target() {
            write!(
                f,
                "command `{}` with `{}` target",
                self.command, self.target
            )
        } else {
            write!(f, "command `{}` without target", self.command)
        }
    }
}
