use crate::error::{EngineError, Result};
use serde_json::Value as Json;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::Read;

/// Attribute name carrying the record identifier
pub const ID_ATTRIBUTE: &str = "id";

/// A scalar attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Number(_) => None,
        }
    }

    /// Stable textual rendering used when concatenating series keys
    pub fn render(&self) -> String {
        match self {
            Value::Number(n) => n.to_string(),
            Value::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// One flat record: a unique id plus attribute values.
///
/// Records are treated as immutable once a dataset has been built over them.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: i64,
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(id: i64) -> Self {
        Self { id, fields: BTreeMap::new() }
    }

    /// Builder-style setter, mostly for tests and adapters
    pub fn with(mut self, attribute: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(attribute.to_string(), value.into());
        self
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.fields.get(attribute)
    }

    pub fn number(&self, attribute: &str) -> Option<f64> {
        if attribute == ID_ATTRIBUTE {
            return Some(self.id as f64);
        }
        self.get(attribute).and_then(Value::as_number)
    }

    pub fn text(&self, attribute: &str) -> Option<&str> {
        self.get(attribute).and_then(Value::as_text)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    fn set(&mut self, attribute: &str, value: Value) {
        self.fields.insert(attribute.to_string(), value);
    }
}

/// Stable category <-> integer codec, codes assigned in ascending lexical order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CategoryCodec {
    categories: Vec<String>,
}

impl CategoryCodec {
    pub fn from_categories<I, S>(iter: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unique: BTreeSet<String> = iter.into_iter().map(Into::into).collect();
        Self { categories: unique.into_iter().collect() }
    }

    pub fn encode(&self, category: &str) -> Option<usize> {
        self.categories.binary_search_by(|c| c.as_str().cmp(category)).ok()
    }

    pub fn decode(&self, code: usize) -> Option<&str> {
        self.categories.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }
}

/// An immutable batch of records as delivered by the data source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    pub records: Vec<Record>,
}

impl RecordBatch {
    pub fn new(records: Vec<Record>) -> Result<Self> {
        let mut seen = HashSet::new();
        for r in &records {
            if !seen.insert(r.id) {
                return Err(EngineError::invalid(format!("duplicate record id {}", r.id)));
            }
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Create a batch from a JSON array of flat objects.
    /// Objects without an `id` field get their position as id.
    pub fn from_json(value: &Json) -> Result<Self> {
        let array = value.as_array().ok_or_else(|| {
            EngineError::invalid("input data must be a JSON array of objects")
        })?;

        let mut records = Vec::with_capacity(array.len());
        for (idx, item) in array.iter().enumerate() {
            let obj = item.as_object().ok_or_else(|| {
                EngineError::invalid("items in array must be objects")
            })?;

            let id = match obj.get(ID_ATTRIBUTE) {
                Some(Json::Number(n)) => n
                    .as_i64()
                    .ok_or_else(|| EngineError::schema("source", idx as i64, ID_ATTRIBUTE))?,
                Some(_) => return Err(EngineError::schema("source", idx as i64, ID_ATTRIBUTE)),
                None => idx as i64,
            };

            let mut record = Record::new(id);
            for (key, val) in obj {
                if key == ID_ATTRIBUTE {
                    continue;
                }
                match val {
                    Json::String(s) => record.set(key, Value::Text(s.clone())),
                    Json::Number(n) => {
                        let n = n.as_f64().ok_or_else(|| EngineError::schema("source", id, key))?;
                        record.set(key, Value::Number(n));
                    }
                    Json::Bool(b) => record.set(key, Value::Number(if *b { 1.0 } else { 0.0 })),
                    Json::Null => {}
                    _ => return Err(EngineError::schema("source", id, key)),
                }
            }
            records.push(record);
        }

        Self::new(records)
    }

    /// Create a batch from CSV text with a header row.
    /// Numeric-looking cells become numbers, empty cells are left absent.
    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let id_col = headers.iter().position(|h| h == ID_ATTRIBUTE);

        let mut records = Vec::new();
        for (idx, row) in rdr.records().enumerate() {
            let row = row?;
            let id = match id_col.and_then(|c| row.get(c)) {
                Some(raw) => raw
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| EngineError::schema("source", idx as i64, ID_ATTRIBUTE))?,
                None => idx as i64,
            };

            let mut record = Record::new(id);
            for (col, cell) in row.iter().enumerate() {
                if Some(col) == id_col {
                    continue;
                }
                let cell = cell.trim();
                if cell.is_empty() {
                    continue;
                }
                let value = match cell.parse::<f64>() {
                    Ok(n) => Value::Number(n),
                    Err(_) => Value::Text(cell.to_string()),
                };
                record.set(&headers[col], value);
            }
            records.push(record);
        }

        Self::new(records)
    }

    /// Add a numeric shadow attribute `<attribute><suffix>` for a categorical
    /// attribute and return the codec used.
    pub fn encode_categorical(&mut self, attribute: &str, suffix: &str) -> CategoryCodec {
        let codec = CategoryCodec::from_categories(
            self.records.iter().filter_map(|r| r.text(attribute)).map(str::to_string),
        );
        let shadow = format!("{}{}", attribute, suffix);
        for record in &mut self.records {
            let code = record.text(attribute).and_then(|c| codec.encode(c));
            if let Some(code) = code {
                record.set(&shadow, Value::Number(code as f64));
            }
        }
        codec
    }

    /// Attributes numeric in every record, sorted by name
    pub fn numeric_attributes(&self) -> Vec<String> {
        let Some(first) = self.records.first() else {
            return Vec::new();
        };
        first
            .attributes()
            .filter(|a| self.records.iter().all(|r| r.number(a).is_some()))
            .map(str::to_string)
            .collect()
    }
}
