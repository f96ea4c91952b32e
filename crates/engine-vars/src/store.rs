use crate::builtin;
use crate::error::{Error, Result};
use crate::value::{Value, Version};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

/// A single named value plus the flags that govern how it is stored,
/// logged and persisted.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub value: Value,
    pub hidden: bool,
    pub persisted: bool,
    pub read_only: bool,
}

/// The typed key/value store described by this engine's variable
/// subsystem. User variable lookups are case-sensitive; built-in lookups
/// are case-insensitive (see `builtin::lookup`).
#[derive(Debug, Default)]
pub struct VariableStore {
    variables: HashMap<String, Variable>,
    active: AtomicBool,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raised while the engine is inside a detect/plan/apply transition.
    /// Writes issued from the BA thread while this is set are refused.
    pub fn set_engine_active(&self, active: bool) {
        self.active.store(active, AtomicOrdering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(AtomicOrdering::SeqCst)
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(v) = builtin::lookup(name) {
            return Some(v);
        }
        self.variables.get(name).map(|v| v.value.clone())
    }

    fn hidden(&self, name: &str) -> bool {
        self.variables.get(name).map(|v| v.hidden).unwrap_or(false)
    }

    pub fn get_numeric(&self, name: &str) -> Result<i64> {
        match self.lookup(name) {
            None => Err(Error::NotFound { name: name.to_string() }),
            Some(Value::Numeric(n)) => Ok(n),
            Some(Value::String(s)) | Some(Value::Formatted(s)) => {
                Value::parse_numeric_str(&s).ok_or(Error::TypeMismatch { name: name.to_string() })
            }
            Some(Value::Version(_)) => Err(Error::TypeMismatch { name: name.to_string() }),
            Some(Value::None) => Err(Error::NotFound { name: name.to_string() }),
        }
    }

    pub fn get_string(&self, name: &str) -> Result<String> {
        match self.lookup(name) {
            None => Err(Error::NotFound { name: name.to_string() }),
            Some(Value::String(s)) => Ok(s),
            Some(Value::Formatted(template)) => Ok(template),
            Some(Value::Numeric(n)) => Ok(n.to_string()),
            Some(Value::Version(v)) => Ok(v.normalized()),
            Some(Value::None) => Ok(String::new()),
        }
    }

    pub fn get_version(&self, name: &str) -> Result<Version> {
        match self.lookup(name) {
            None => Err(Error::NotFound { name: name.to_string() }),
            Some(Value::Version(v)) => Ok(v),
            Some(Value::String(s)) | Some(Value::Formatted(s)) => Ok(Version::parse(&s)),
            Some(Value::Numeric(_)) | Some(Value::None) => {
                Err(Error::TypeMismatch { name: name.to_string() })
            }
        }
    }

    /// Expands a `Formatted` value against the store; all other types
    /// behave like `get_string`. `hidden_out` is set to `true` if any
    /// variable consulted while expanding is marked hidden.
    pub fn get_formatted(&self, name: &str, hidden_out: &mut bool) -> Result<String> {
        *hidden_out = self.hidden(name);
        match self.lookup(name) {
            None => Err(Error::NotFound { name: name.to_string() }),
            Some(Value::Formatted(template)) => {
                let mut visiting = HashSet::new();
                visiting.insert(name.to_string());
                Ok(self.format_scoped(&template, &mut visiting, hidden_out))
            }
            Some(_) => self.get_string(name),
        }
    }

    /// Expands an arbitrary template (not tied to a stored variable),
    /// e.g. a package's argument template or a log message.
    pub fn format(&self, template: &str, hidden_out: &mut bool) -> String {
        let mut visiting = HashSet::new();
        self.format_scoped(template, &mut visiting, hidden_out)
    }

    fn format_scoped(&self, template: &str, visiting: &mut HashSet<String>, hidden_out: &mut bool) -> String {
        let chars: Vec<char> = template.chars().collect();
        let mut out = String::new();
        let mut i = 0;
        while i < chars.len() {
            if chars[i] != '[' {
                out.push(chars[i]);
                i += 1;
                continue;
            }

            if i + 3 < chars.len()
                && chars[i + 1] == '\\'
                && (chars[i + 2] == '[' || chars[i + 2] == ']')
                && chars[i + 3] == ']'
            {
                out.push(chars[i + 2]);
                i += 4;
                continue;
            }

            match chars[i + 1..].iter().position(|&c| c == ']') {
                Some(rel_end) => {
                    let end = i + 1 + rel_end;
                    let name: String = chars[i + 1..end].iter().collect();
                    if visiting.contains(&name) {
                        out.push('[');
                        out.push_str(&name);
                        out.push(']');
                    } else if let Some(value) = self.lookup(&name) {
                        if self.hidden(&name) {
                            *hidden_out = true;
                        }
                        match value {
                            Value::Formatted(nested) => {
                                visiting.insert(name.clone());
                                out.push_str(&self.format_scoped(&nested, visiting, hidden_out));
                                visiting.remove(&name);
                            }
                            Value::String(s) => out.push_str(&s),
                            Value::Numeric(n) => out.push_str(&n.to_string()),
                            Value::Version(v) => out.push_str(&v.normalized()),
                            Value::None => {}
                        }
                    }
                    // unknown references expand to the empty string
                    i = end + 1;
                }
                None => {
                    out.push('[');
                    i += 1;
                }
            }
        }
        out
    }

    /// The typed value used by the condition evaluator: identical to a
    /// plain lookup except that a `Formatted` value is expanded first,
    /// since the condition grammar has no notion of an unexpanded
    /// template.
    pub fn resolve_for_condition(&self, name: &str) -> Result<Value> {
        match self.lookup(name) {
            None => Err(Error::NotFound { name: name.to_string() }),
            Some(Value::Formatted(template)) => {
                let mut hidden = false;
                let mut visiting = HashSet::new();
                visiting.insert(name.to_string());
                Ok(Value::String(self.format_scoped(&template, &mut visiting, &mut hidden)))
            }
            Some(other) => Ok(other),
        }
    }

    fn check_writable(&self, name: &str) -> Result<()> {
        if self.is_active() {
            return Err(Error::EngineActive);
        }
        if builtin::is_builtin(name) {
            return Err(Error::InvalidArg {
                name: name.to_string(),
                reason: "built-in variables are read-only".to_string(),
            });
        }
        if let Some(existing) = self.variables.get(name) {
            if existing.read_only {
                return Err(Error::InvalidArg {
                    name: name.to_string(),
                    reason: "variable is marked read-only".to_string(),
                });
            }
        }
        Ok(())
    }

    fn set(&mut self, name: &str, value: Value, overwrite: bool) -> Result<()> {
        self.check_writable(name)?;
        if !overwrite && self.variables.contains_key(name) {
            return Ok(());
        }
        let entry = self
            .variables
            .entry(name.to_string())
            .or_insert_with(|| Variable {
                name: name.to_string(),
                value: Value::None,
                hidden: false,
                persisted: false,
                read_only: false,
            });
        entry.value = value;
        Ok(())
    }

    pub fn set_numeric(&mut self, name: &str, value: i64, overwrite: bool) -> Result<()> {
        self.set(name, Value::Numeric(value), overwrite)
    }

    pub fn set_string(&mut self, name: &str, value: impl Into<String>, overwrite: bool) -> Result<()> {
        self.set(name, Value::String(value.into()), overwrite)
    }

    pub fn set_formatted(&mut self, name: &str, template: impl Into<String>, overwrite: bool) -> Result<()> {
        self.set(name, Value::Formatted(template.into()), overwrite)
    }

    pub fn set_version(&mut self, name: &str, value: Version, overwrite: bool) -> Result<()> {
        self.set(name, Value::Version(value), overwrite)
    }

    /// Marks a variable hidden, persisted or read-only. Used when loading
    /// manifest-declared variables, which carry these flags up front.
    pub fn declare(&mut self, name: &str, value: Value, hidden: bool, persisted: bool, read_only: bool) {
        self.variables.insert(
            name.to_string(),
            Variable {
                name: name.to_string(),
                value,
                hidden,
                persisted,
                read_only,
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        builtin::is_builtin(name) || self.variables.contains_key(name)
    }

    /// A stable binary snapshot of the store, used to hand state across
    /// the BA/engine boundary and for resume persistence. Hidden values
    /// are elided unless `include_hidden` is set.
    pub fn serialize(&self, include_hidden: bool) -> Vec<u8> {
        let mut entries: Vec<&Variable> = self
            .variables
            .values()
            .filter(|v| include_hidden || !v.hidden)
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let mut buf = Vec::new();
        buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for var in entries {
            write_string(&mut buf, &var.name);
            buf.push(var.hidden as u8);
            buf.push(var.persisted as u8);
            buf.push(var.read_only as u8);
            match &var.value {
                Value::None => buf.push(0),
                Value::Numeric(n) => {
                    buf.push(1);
                    buf.extend_from_slice(&n.to_le_bytes());
                }
                Value::String(s) => {
                    buf.push(2);
                    write_string(&mut buf, s);
                }
                Value::Formatted(s) => {
                    buf.push(3);
                    write_string(&mut buf, s);
                }
                Value::Version(v) => {
                    buf.push(4);
                    write_string(&mut buf, v.source_text());
                }
            }
        }
        buf
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor { bytes, pos: 0 };
        let count = cursor.read_u32()? as usize;
        let mut store = VariableStore::new();
        for _ in 0..count {
            let name = cursor.read_string()?;
            let hidden = cursor.read_u8()? != 0;
            let persisted = cursor.read_u8()? != 0;
            let read_only = cursor.read_u8()? != 0;
            let tag = cursor.read_u8()?;
            let value = match tag {
                0 => Value::None,
                1 => Value::Numeric(cursor.read_i64()?),
                2 => Value::String(cursor.read_string()?),
                3 => Value::Formatted(cursor.read_string()?),
                4 => Value::Version(Version::parse(&cursor.read_string()?)),
                other => {
                    return Err(Error::BadSnapshot {
                        reason: format!("unknown value tag {}", other),
                    })
                }
            };
            store.declare(&name, value, hidden, persisted, read_only);
        }
        Ok(store)
    }
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn read_u8(&mut self) -> Result<u8> {
        let b = *self.bytes.get(self.pos).ok_or(Error::BadSnapshot {
            reason: "unexpected end of snapshot".to_string(),
        })?;
        self.pos += 1;
        Ok(b)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let slice = self.take(4)?;
        Ok(u32::from_le_bytes(slice.try_into().unwrap()))
    }

    fn read_i64(&mut self) -> Result<i64> {
        let slice = self.take(8)?;
        Ok(i64::from_le_bytes(slice.try_into().unwrap()))
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let slice = self.take(len)?;
        String::from_utf8(slice.to_vec()).map_err(|_| Error::BadSnapshot {
            reason: "invalid utf-8 in snapshot".to_string(),
        })
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        let slice = self.bytes.get(self.pos..end).ok_or(Error::BadSnapshot {
            reason: "unexpected end of snapshot".to_string(),
        })?;
        self.pos = end;
        Ok(slice)
    }
}
