use std::cmp::Ordering;
use std::fmt;

/// A structured, orderable version value.
///
/// Versions compare lexicographically by numeric fields, padding the
/// shorter side with zeros, and fall back to a textual tail comparison
/// only when every numeric field is equal. This makes `v1.1` and
/// `v1.1.0.0` compare equal, matching the boundary case called out for
/// this store.
#[derive(Debug, Clone, Eq)]
pub struct Version {
    numeric: Vec<i64>,
    tail: String,
    /// Set when the source text didn't look like a well-formed version.
    /// The value still parses and still compares; callers are expected
    /// to log a warning rather than reject it.
    pub invalid: bool,
    text: String,
}

impl Version {
    pub fn parse(text: &str) -> Self {
        let trimmed = text.strip_prefix('v').unwrap_or(text);
        let mut numeric = Vec::new();
        let mut tail_parts: Vec<&str> = Vec::new();
        let mut seen_non_numeric = false;

        for segment in trimmed.split('.') {
            if !seen_non_numeric {
                if let Ok(n) = segment.parse::<i64>() {
                    numeric.push(n);
                    continue;
                }
                seen_non_numeric = true;
            }
            tail_parts.push(segment);
        }

        let invalid = numeric.is_empty() || trimmed.is_empty();
        let tail = tail_parts.join(".");

        Version {
            numeric,
            tail,
            invalid,
            text: text.to_string(),
        }
    }

    /// Builds a version from the packed 64-bit encoding the engine uses at
    /// I/O boundaries (four 16-bit fields, major in the high word).
    pub fn from_encoded_u64(packed: u64) -> Self {
        let major = (packed >> 48) & 0xffff;
        let minor = (packed >> 32) & 0xffff;
        let build = (packed >> 16) & 0xffff;
        let revision = packed & 0xffff;
        let numeric = vec![major as i64, minor as i64, build as i64, revision as i64];
        let text = format!("{}.{}.{}.{}", major, minor, build, revision);
        Version {
            numeric,
            tail: String::new(),
            invalid: false,
            text,
        }
    }

    pub fn to_encoded_u64(&self) -> Option<u64> {
        if self.numeric.len() > 4 || !self.tail.is_empty() {
            return None;
        }
        let mut fields = [0u64; 4];
        for (i, n) in self.numeric.iter().enumerate() {
            if *n < 0 || *n > 0xffff {
                return None;
            }
            fields[i] = *n as u64;
        }
        Some((fields[0] << 48) | (fields[1] << 32) | (fields[2] << 16) | fields[3])
    }

    /// The normalised textual form used by `get_string`/`get_version`.
    pub fn normalized(&self) -> String {
        if self.tail.is_empty() {
            self.numeric
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(".")
        } else {
            format!(
                "{}.{}",
                self.numeric
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("."),
                self.tail
            )
        }
    }

    pub fn source_text(&self) -> &str {
        &self.text
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.numeric.len().max(other.numeric.len());
        for i in 0..len {
            let a = self.numeric.get(i).copied().unwrap_or(0);
            let b = other.numeric.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        self.tail.cmp(&other.tail)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

/// A tagged sum representing everything a variable can hold.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Numeric(i64),
    String(String),
    /// Unexpanded template text; expands lazily against the store on read.
    Formatted(String),
    Version(Version),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Numeric(_) => "numeric",
            Value::String(_) => "string",
            Value::Formatted(_) => "formatted",
            Value::Version(_) => "version",
        }
    }

    /// Truthiness for a condition atom with no comparator.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Numeric(n) => *n != 0,
            Value::String(s) | Value::Formatted(s) => !s.is_empty(),
            Value::Version(v) => !v.normalized().is_empty(),
        }
    }

    /// Parses text as a numeric literal, base 10 by default and base 16
    /// when prefixed with `0x`. No partial-prefix parsing is allowed.
    /// Returns `None` rather than a distinct parse-error kind: spec'd
    /// callers fold a failed numeric coercion into `TypeMismatch`.
    pub fn parse_numeric_str(text: &str) -> Option<i64> {
        let text = text.trim();
        let (body, radix) = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            Some(hex) => (hex, 16),
            None => (text, 10),
        };
        i64::from_str_radix(body, radix).ok()
    }
}
