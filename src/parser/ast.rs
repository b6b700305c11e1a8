// Abstract syntax tree of interaction scripts

use crate::index::Key;

/// Literal argument of `select`
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
}

impl Literal {
    pub fn to_key(&self) -> Key {
        match self {
            Literal::Number(n) => Key::num(*n),
            Literal::Text(s) => Key::text(s),
        }
    }
}

/// One step of an interaction script
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Brush `[lo, hi)` on a dimension
    Range { dimension: String, lo: f64, hi: f64 },
    /// Keep records whose key is one of the values
    Select { dimension: String, values: Vec<Literal> },
    /// Clear one dimension's filter
    Clear { dimension: String },
    /// Reorder a histogram group; the criterion is checked when run
    Sort { group: String, criterion: String },
    /// Build the series map for a variant attribute
    Series { variant: String },
}

/// Commands in the order they run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub commands: Vec<Command>,
}
