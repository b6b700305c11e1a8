use crate::data::Value;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// A dimension key or bin key.
///
/// Keys are totally ordered: numbers sort before pairs, pairs before text.
/// Numbers use IEEE total ordering so NaN never poisons a sorted index.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Key {
    Number(f64),
    Pair(f64, f64),
    Text(String),
}

impl Key {
    /// Numeric key with negative zero folded into zero
    pub fn num(n: f64) -> Self {
        Key::Number(n + 0.0)
    }

    pub fn pair(x: f64, y: f64) -> Self {
        Key::Pair(x + 0.0, y + 0.0)
    }

    pub fn text(s: &str) -> Self {
        Key::Text(s.to_string())
    }

    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Number(n) => Key::num(*n),
            Value::Text(s) => Key::Text(s.clone()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Key::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_pair(&self) -> Option<(f64, f64)> {
        match self {
            Key::Pair(x, y) => Some((*x, *y)),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::Pair(_, _) => 1,
            Key::Text(_) => 2,
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => a.total_cmp(b),
            (Key::Pair(ax, ay), Key::Pair(bx, by)) => ax.total_cmp(bx).then(ay.total_cmp(by)),
            (Key::Text(a), Key::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        Key::num(n)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::text(s)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(n) => write!(f, "{}", n),
            Key::Pair(x, y) => write!(f, "[{}, {}]", x, y),
            Key::Text(s) => write!(f, "{}", s),
        }
    }
}
