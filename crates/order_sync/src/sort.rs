use std::{borrow::Cow, cmp::Ordering};

use serde::{Deserialize, Serialize};

use crate::row::{Dataset, FieldValue, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Anything other than `desc` (case-insensitive) sorts ascending.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl From<&str> for SortDirection {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

/// Field and direction a view is currently sorted by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

fn sort_text(value: &FieldValue) -> Cow<'_, str> {
    match value {
        FieldValue::Text(text) => Cow::Borrowed(text),
        FieldValue::Number(number) => Cow::Owned(number.to_string()),
        FieldValue::Flag(flag) => Cow::Borrowed(if *flag { "true" } else { "false" }),
        FieldValue::Missing => Cow::Borrowed(""),
    }
}

/// Numbers compare numerically and flags as booleans; every other pairing
/// (including a missing field) compares as text.
pub fn compare_fields(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a, b) {
        (FieldValue::Number(x), FieldValue::Number(y)) => x.total_cmp(y),
        (FieldValue::Flag(x), FieldValue::Flag(y)) => x.cmp(y),
        _ => sort_text(a).cmp(&sort_text(b)),
    }
}

/// Returns a reordered copy of `dataset`. Ties keep no particular order.
pub fn sort<R: Row>(dataset: &Dataset<R>, field: &str, direction: SortDirection) -> Dataset<R> {
    let mut keyed: Vec<(FieldValue, &R)> = dataset
        .iter()
        .map(|row| (row.field(field), row))
        .collect();
    keyed.sort_unstable_by(|(a, _), (b, _)| {
        let ordering = compare_fields(a, b);
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
    Dataset::new(keyed.into_iter().map(|(_, row)| row.clone()).collect())
}

pub fn sort_by_spec<R: Row>(dataset: &Dataset<R>, spec: Option<&SortSpec>) -> Dataset<R> {
    match spec {
        Some(spec) => sort(dataset, &spec.field, spec.direction),
        None => dataset.clone(),
    }
}

#[cfg(test)]
#[path = "tests/sort_tests.rs"]
mod tests;
