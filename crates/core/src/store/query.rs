//! Structured queries over store collections.
//!
//! A [`Query`] is a conjunction of [`Filter`]s plus an optional sort and offset/limit window.
//! Records expose their queryable fields through [`crate::store::Record::field`], so the
//! same query can be evaluated by any store adapter without reflecting over serialised data.

use care_uuid::RecordId;
use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Ordering;
use std::ops::Bound;

/// A single queryable field value.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Id(RecordId),
    Text(String),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Int(i64),
    Bool(bool),
    /// Multi-valued field. Equality against a list means containment.
    List(Vec<FieldValue>),
    Null,
}

impl FieldValue {
    /// Orders two values of the same variant; mixed variants are incomparable.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        use FieldValue::*;
        match (self, other) {
            (Id(a), Id(b)) => Some(a.cmp(b)),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Null, Null) => Some(Ordering::Equal),
            _ => None,
        }
    }

    fn equals(&self, other: &FieldValue) -> bool {
        match self {
            FieldValue::List(items) => items.iter().any(|item| item == other),
            _ => self == other,
        }
    }

    fn is_present(&self) -> bool {
        !matches!(self, FieldValue::Null)
    }
}

impl From<RecordId> for FieldValue {
    fn from(value: RecordId) -> Self {
        FieldValue::Id(value)
    }
}

impl From<&RecordId> for FieldValue {
    fn from(value: &RecordId) -> Self {
        FieldValue::Id(*value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Predicate over one record.
#[derive(Clone, Debug)]
pub enum Filter {
    /// Field equals value; for list fields, the list contains the value.
    Eq(&'static str, FieldValue),
    /// Field equals one of the values.
    In(&'static str, Vec<FieldValue>),
    /// Field equals none of the values. Missing fields match.
    NotIn(&'static str, Vec<FieldValue>),
    Range {
        field: &'static str,
        lower: Bound<FieldValue>,
        upper: Bound<FieldValue>,
    },
    /// Case-insensitive substring match on a text field.
    Contains { field: &'static str, needle: String },
    /// Field is present and not null.
    Exists(&'static str),
    /// At least one nested filter matches.
    Any(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &'static str, value: impl Into<FieldValue>) -> Self {
        Filter::Eq(field, value.into())
    }

    pub fn is_in<V: Into<FieldValue>>(
        field: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::In(field, values.into_iter().map(Into::into).collect())
    }

    pub fn not_in<V: Into<FieldValue>>(
        field: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::NotIn(field, values.into_iter().map(Into::into).collect())
    }

    /// Half-open range `[from, until)`.
    pub fn between(
        field: &'static str,
        from: impl Into<FieldValue>,
        until: impl Into<FieldValue>,
    ) -> Self {
        Filter::Range {
            field,
            lower: Bound::Included(from.into()),
            upper: Bound::Excluded(until.into()),
        }
    }

    /// Inclusive range with optional ends.
    pub fn within(
        field: &'static str,
        from: Option<FieldValue>,
        to: Option<FieldValue>,
    ) -> Self {
        Filter::Range {
            field,
            lower: from.map_or(Bound::Unbounded, Bound::Included),
            upper: to.map_or(Bound::Unbounded, Bound::Included),
        }
    }

    pub fn contains(field: &'static str, needle: impl Into<String>) -> Self {
        Filter::Contains {
            field,
            needle: needle.into(),
        }
    }

    /// Evaluates this filter against a field accessor.
    pub fn matches(&self, field: &dyn Fn(&str) -> Option<FieldValue>) -> bool {
        match self {
            Filter::Eq(name, expected) => field(name).is_some_and(|v| v.equals(expected)),
            Filter::In(name, candidates) => {
                field(name).is_some_and(|v| candidates.iter().any(|c| v.equals(c)))
            }
            Filter::NotIn(name, excluded) => match field(name) {
                Some(v) => !excluded.iter().any(|c| v.equals(c)),
                None => true,
            },
            Filter::Range { field: name, lower, upper } => {
                let Some(value) = field(name) else {
                    return false;
                };
                let above = match lower {
                    Bound::Unbounded => true,
                    Bound::Included(l) => {
                        matches!(value.compare(l), Some(Ordering::Greater | Ordering::Equal))
                    }
                    Bound::Excluded(l) => matches!(value.compare(l), Some(Ordering::Greater)),
                };
                let below = match upper {
                    Bound::Unbounded => true,
                    Bound::Included(u) => {
                        matches!(value.compare(u), Some(Ordering::Less | Ordering::Equal))
                    }
                    Bound::Excluded(u) => matches!(value.compare(u), Some(Ordering::Less)),
                };
                above && below
            }
            Filter::Contains { field: name, needle } => match field(name) {
                Some(FieldValue::Text(text)) => {
                    text.to_lowercase().contains(&needle.to_lowercase())
                }
                _ => false,
            },
            Filter::Exists(name) => field(name).is_some_and(|v| v.is_present()),
            Filter::Any(filters) => filters.iter().any(|f| f.matches(field)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Clone, Debug)]
pub struct Sort {
    pub field: &'static str,
    pub direction: Direction,
}

impl Sort {
    pub fn asc(field: &'static str) -> Self {
        Self {
            field,
            direction: Direction::Ascending,
        }
    }

    pub fn desc(field: &'static str) -> Self {
        Self {
            field,
            direction: Direction::Descending,
        }
    }
}

/// Filters, sort keys and an offset/limit window.
///
/// Records whose sort keys compare equal keep the store's insertion order.
#[derive(Clone, Debug, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub sort: Vec<Sort>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: &RecordId) -> Self {
        Self::new().filter(Filter::eq("id", id))
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort_by(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn skip(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, field: &dyn Fn(&str) -> Option<FieldValue>) -> bool {
        self.filters.iter().all(|f| f.matches(field))
    }

    /// Compares two records by this query's sort keys.
    ///
    /// Missing or incomparable values sort after present ones regardless of direction.
    pub fn compare(
        &self,
        a: &dyn Fn(&str) -> Option<FieldValue>,
        b: &dyn Fn(&str) -> Option<FieldValue>,
    ) -> Ordering {
        for key in &self.sort {
            let ordering = match (a(key.field), b(key.field)) {
                (Some(x), Some(y)) => match x.compare(&y) {
                    Some(o) if key.direction == Direction::Descending => o.reverse(),
                    Some(o) => o,
                    None => Ordering::Equal,
                },
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}
