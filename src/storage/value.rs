//! Typed values, tables, flags, and predicates for the persistence gateway
//!
//! Callers never build SQL by hand. They describe rows as [`Record`]s and
//! filters as [`Predicate`]s, and the gateway renders both with bound
//! parameters.

use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use std::collections::BTreeMap;
use std::fmt;

/// Sentinel stored for absent text fields
pub const TEXT_SENTINEL: &str = "NA";

/// Sentinel stored for absent numeric fields
pub const NUMERIC_SENTINEL: i64 = -1;

/// Tables owned by the persistence gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    ListingResult,
    Hotel,
    Review,
    UserProfile,
}

impl Table {
    /// SQL table name
    pub fn name(&self) -> &'static str {
        match self {
            Self::ListingResult => "listing_result",
            Self::Hotel => "hotel",
            Self::Review => "review",
            Self::UserProfile => "user_profile",
        }
    }

    pub fn all() -> [Self; 4] {
        [Self::ListingResult, Self::Hotel, Self::Review, Self::UserProfile]
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Completion markers
///
/// The stage flags live on `listing_result`; `geocoded` lives on `hotel` and
/// records that the geocoder answered for the stored address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    HotelScraped,
    ReviewsScraped,
    Geocoded,
}

impl Flag {
    /// Column holding the flag
    pub fn column(&self) -> &'static str {
        match self {
            Self::HotelScraped => "hotel_scraped",
            Self::ReviewsScraped => "reviews_scraped",
            Self::Geocoded => "geocoded",
        }
    }

    /// Returns true if `column` names a flag column
    pub fn is_flag_column(column: &str) -> bool {
        [Self::HotelScraped, Self::ReviewsScraped, Self::Geocoded]
            .iter()
            .any(|flag| flag.column() == column)
    }
}

/// Storage class of a column, as declared in the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
}

impl ColumnKind {
    /// Maps a declared SQLite column type using the affinity rules
    pub fn from_declared_type(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Self::Real
        } else {
            Self::Text
        }
    }

    /// Value stored in place of a missing field
    pub fn sentinel(&self) -> FieldValue {
        match self {
            Self::Integer => FieldValue::Integer(NUMERIC_SENTINEL),
            Self::Real => FieldValue::Real(NUMERIC_SENTINEL as f64),
            Self::Text => FieldValue::Text(TEXT_SENTINEL.to_string()),
        }
    }
}

/// A single column value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    /// Applies the storage coercion rules for a column of `kind`
    ///
    /// Nulls become the column's sentinel and booleans become `1`/`0`.
    pub fn coerce_for(self, kind: ColumnKind) -> FieldValue {
        match self {
            Self::Null => kind.sentinel(),
            Self::Bool(b) => Self::Integer(i64::from(b)),
            other => other,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Real(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for null or either sentinel
    pub fn is_absent(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Integer(v) => *v == NUMERIC_SENTINEL,
            Self::Real(v) => *v == NUMERIC_SENTINEL as f64,
            Self::Text(s) => s == TEXT_SENTINEL,
            Self::Bool(_) => false,
        }
    }

    pub(crate) fn from_sql_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(v) => Self::Integer(v),
            ValueRef::Real(v) => Self::Real(v),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                Self::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Real(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            Self::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            Self::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// A row as a mapping of column name to value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<FieldValue>) {
        self.fields.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(FieldValue::as_i64)
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(FieldValue::as_f64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(FieldValue::as_str)
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.get_i64(column).map(|v| v != 0)
    }

    /// Primary key, if the record carries one
    pub fn id(&self) -> Option<i64> {
        self.get_i64("id")
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One filter term of a [`Predicate`]
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    IdEquals(i64),
    ColumnEquals(String, FieldValue),
    ColumnGreaterThan(String, FieldValue),
    ColumnAtMost(String, FieldValue),
    FlagIs(Flag, bool),
    IdNotIn(Vec<i64>),
}

impl Condition {
    /// Column the condition reads
    pub fn column(&self) -> &str {
        match self {
            Self::IdEquals(_) | Self::IdNotIn(_) => "id",
            Self::ColumnEquals(c, _)
            | Self::ColumnGreaterThan(c, _)
            | Self::ColumnAtMost(c, _) => c,
            Self::FlagIs(flag, _) => flag.column(),
        }
    }
}

/// A conjunction of conditions; the empty predicate matches every row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    /// Matches every row
    pub fn all() -> Self {
        Self::default()
    }

    pub fn id(id: i64) -> Self {
        Self::all().and(Condition::IdEquals(id))
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Renders a `WHERE` clause (possibly empty) and its bound parameters
    pub fn to_sql(&self) -> (String, Vec<FieldValue>) {
        let mut terms = Vec::new();
        let mut params = Vec::new();

        for condition in &self.conditions {
            match condition {
                Condition::IdEquals(id) => {
                    terms.push("id = ?".to_string());
                    params.push(FieldValue::Integer(*id));
                }
                Condition::ColumnEquals(column, value) => {
                    terms.push(format!("{} = ?", column));
                    params.push(value.clone());
                }
                Condition::ColumnGreaterThan(column, value) => {
                    terms.push(format!("{} > ?", column));
                    params.push(value.clone());
                }
                Condition::ColumnAtMost(column, value) => {
                    terms.push(format!("{} <= ?", column));
                    params.push(value.clone());
                }
                Condition::FlagIs(flag, value) => {
                    terms.push(format!("{} = ?", flag.column()));
                    params.push(FieldValue::Integer(i64::from(*value)));
                }
                Condition::IdNotIn(ids) if ids.is_empty() => {}
                Condition::IdNotIn(ids) => {
                    let placeholders = vec!["?"; ids.len()].join(", ");
                    terms.push(format!("id NOT IN ({})", placeholders));
                    params.extend(ids.iter().map(|id| FieldValue::Integer(*id)));
                }
            }
        }

        if terms.is_empty() {
            (String::new(), params)
        } else {
            (format!(" WHERE {}", terms.join(" AND ")), params)
        }
    }
}
