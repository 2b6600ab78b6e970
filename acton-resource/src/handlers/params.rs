//! Query-string parameters for resource handlers
//!
//! Client input is parsed into the narrow grammar understood by
//! [`Query`](crate::store::Query); nothing is forwarded to the store raw.
//!
//! | Parameter | Meaning |
//! |-----------|---------|
//! | `q`       | JSON object of field conditions |
//! | `p`       | zero-based page number, read from its leading digits |
//! | `sort`    | `name,-created_at` (`-` for descending) |
//! | `select`  | `name price` or `-secret` (never mixed) |
//!
//! # Example
//!
//! ```rust
//! use acton_resource::handlers::ListParams;
//! use acton_resource::store::{FilterOperator, Selection};
//!
//! let pairs = vec![
//!     ("q".to_string(), r#"{"price": {"$lt": 100}, "status": "active"}"#.to_string()),
//!     ("p".to_string(), "2".to_string()),
//!     ("select".to_string(), "name,price".to_string()),
//! ];
//! let params = ListParams::from_pairs(&pairs).unwrap();
//!
//! assert_eq!(params.page, 2);
//! assert_eq!(params.predicate.len(), 2);
//! assert_eq!(params.predicate.conditions()[0].operator, FilterOperator::LessThan);
//! assert_eq!(params.selection, Selection::include(["name", "price"]));
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use super::error::{ApiError, ApiOperation};
use crate::store::{
    FilterCondition, FilterOperator, FilterValue, Predicate, Selection, SortKey,
};

/// Filter parameter name
pub const FILTER_PARAM: &str = "q";
/// Page parameter name
pub const PAGE_PARAM: &str = "p";
/// Sort parameter name
pub const SORT_PARAM: &str = "sort";
/// Selection parameter name
pub const SELECT_PARAM: &str = "select";

/// Dot-separated identifier path
static FIELD_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("field path regex is valid")
});

/// Reasons a query-string parameter is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    /// `q` is not valid JSON
    #[error("Invalid filter: {0}")]
    InvalidJson(String),

    /// `q` is valid JSON but not an object
    #[error("Invalid filter: expected a JSON object")]
    NotAnObject,

    /// A field path contains characters outside the grammar
    #[error("Invalid field path '{0}'")]
    InvalidField(String),

    /// Operator outside the supported set (e.g. `$where`)
    #[error("Unsupported operator '{operator}' on field '{field}'")]
    UnsupportedOperator {
        /// Field the operator was applied to
        field: String,
        /// The rejected operator
        operator: String,
    },

    /// Operand of the wrong shape for its operator
    #[error("Invalid operand for '{operator}' on field '{field}'")]
    InvalidOperand {
        /// Field the operator was applied to
        field: String,
        /// The operator
        operator: String,
    },

    /// Nested document or array used as an equality value
    #[error("Unsupported value for field '{0}'")]
    UnsupportedValue(String),

    /// `select` mixes inclusion and exclusion
    #[error("Cannot mix inclusion and exclusion in select")]
    MixedSelection,
}

impl ParamError {
    /// Convert into a 400 for `operation`
    pub fn into_api_error(self, operation: ApiOperation) -> ApiError {
        ApiError::bad_request(operation, self.to_string())
    }
}

/// Parsed query-string parameters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListParams {
    /// Conditions from `q`
    pub predicate: Predicate,
    /// Page from `p`
    pub page: u64,
    /// Ordering from `sort`
    pub sort: Vec<SortKey>,
    /// Projection from `select`
    pub selection: Selection,
}

impl ListParams {
    /// Parse from decoded query pairs; a repeated parameter keeps its last value
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, ParamError> {
        let last = |name: &str| {
            pairs
                .iter()
                .rev()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };

        Ok(Self {
            predicate: last(FILTER_PARAM).map(parse_filter).transpose()?.unwrap_or_default(),
            page: parse_page(last(PAGE_PARAM)),
            sort: last(SORT_PARAM).map(parse_sort).transpose()?.unwrap_or_default(),
            selection: last(SELECT_PARAM)
                .map(parse_select)
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

/// Page number from its leading digits
///
/// `"3abc"` and `"2.9"` are pages 3 and 2. Negative or digit-less values are
/// page 0; values past `u64::MAX` saturate.
pub fn parse_page(raw: Option<&str>) -> u64 {
    let Some(raw) = raw.map(str::trim) else {
        return 0;
    };
    let (negative, unsigned) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };
    let digits = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .map_or(unsigned, |end| &unsigned[..end]);

    if negative || digits.is_empty() {
        return 0;
    }
    digits.parse::<u64>().unwrap_or(u64::MAX)
}

/// Parse the `q` filter object
pub fn parse_filter(raw: &str) -> Result<Predicate, ParamError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ParamError::InvalidJson(e.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(ParamError::NotAnObject);
    };

    let mut predicate = Predicate::new();
    for (field, value) in fields {
        check_field(&field)?;
        predicate = match value {
            Value::Object(operators) => conditions(&field, operators)?
                .into_iter()
                .fold(predicate, Predicate::and),
            Value::Array(_) => return Err(ParamError::UnsupportedValue(field)),
            Value::Null => predicate.and(FilterCondition::is_null(field)),
            scalar => {
                let value = FilterValue::from_scalar(&scalar)
                    .ok_or_else(|| ParamError::UnsupportedValue(field.clone()))?;
                predicate.and(FilterCondition::new(field, FilterOperator::Equal, value))
            }
        };
    }
    Ok(predicate)
}

fn conditions(
    field: &str,
    operators: Map<String, Value>,
) -> Result<Vec<FilterCondition>, ParamError> {
    if operators.is_empty() {
        return Err(ParamError::UnsupportedValue(field.to_string()));
    }

    operators
        .into_iter()
        .map(|(token, operand)| {
            let invalid = || ParamError::InvalidOperand {
                field: field.to_string(),
                operator: token.clone(),
            };

            if token == "$exists" {
                return match operand {
                    Value::Bool(true) => Ok(FilterCondition::is_not_null(field)),
                    Value::Bool(false) => Ok(FilterCondition::is_null(field)),
                    _ => Err(invalid()),
                };
            }

            let operator = FilterOperator::from_token(&token).ok_or_else(|| {
                if token.starts_with('$') {
                    ParamError::UnsupportedOperator {
                        field: field.to_string(),
                        operator: token.clone(),
                    }
                } else {
                    ParamError::UnsupportedValue(field.to_string())
                }
            })?;

            let value = match operator {
                FilterOperator::In | FilterOperator::NotIn => {
                    FilterValue::from_scalar_list(&operand)
                }
                FilterOperator::Like => operand.as_str().map(FilterValue::from),
                _ => FilterValue::from_scalar(&operand),
            }
            .ok_or_else(invalid)?;

            Ok(FilterCondition::new(field, operator, value))
        })
        .collect()
}

/// Parse `sort`; an empty value means no ordering
pub fn parse_sort(raw: &str) -> Result<Vec<SortKey>, ParamError> {
    tokens(raw)
        .map(|token| match token.strip_prefix('-') {
            Some(field) => check_field(field).map(|()| SortKey::descending(field)),
            None => check_field(token).map(|()| SortKey::ascending(token)),
        })
        .collect()
}

/// Parse `select`; an empty value selects everything
pub fn parse_select(raw: &str) -> Result<Selection, ParamError> {
    let (excluded, included): (Vec<&str>, Vec<&str>) =
        tokens(raw).partition(|token| token.starts_with('-'));

    match (excluded.is_empty(), included.is_empty()) {
        (true, true) => Ok(Selection::All),
        (false, false) => Err(ParamError::MixedSelection),
        (true, false) => {
            for field in &included {
                check_field(field)?;
            }
            Ok(Selection::include(included))
        }
        (false, true) => {
            let fields: Vec<&str> = excluded.iter().map(|token| &token[1..]).collect();
            for field in &fields {
                check_field(field)?;
            }
            Ok(Selection::exclude(fields))
        }
    }
}

fn tokens(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
}

fn check_field(field: &str) -> Result<(), ParamError> {
    if FIELD_PATH.is_match(field) {
        Ok(())
    } else {
        Err(ParamError::InvalidField(field.to_string()))
    }
}
