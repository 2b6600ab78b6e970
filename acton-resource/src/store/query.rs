//! Query types handed to [`Model`](super::Model) implementations
//!
//! A [`Query`] is a plain value built by the binder: a conjunctive
//! [`Predicate`], ordering, field selection, skip/limit and populate
//! directives. Stores translate it into their own query language; nothing
//! here is ever a raw client-supplied expression.
//!
//! # Example
//!
//! ```rust
//! use acton_resource::store::{FilterCondition, Predicate, Query, Selection, SortKey};
//!
//! let query = Query::new()
//!     .filter(Predicate::from(FilterCondition::eq("status", "active")))
//!     .sort(vec![SortKey::descending("created_at")])
//!     .select(Selection::include(["name", "status"]))
//!     .skip(200)
//!     .limit(101);
//!
//! assert_eq!(query.predicate.len(), 1);
//! assert_eq!(query.limit, Some(101));
//! ```

use std::fmt;

use serde_json::Value;

/// Direction for ordering results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Ascending (A-Z, 0-9)
    #[default]
    Ascending,
    /// Descending (Z-A, 9-0)
    Descending,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// One ordering key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Field path
    pub field: String,
    /// Direction
    pub direction: OrderDirection,
}

impl SortKey {
    /// Ascending key
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Ascending,
        }
    }

    /// Descending key
    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Descending,
        }
    }
}

/// Field projection applied by the store
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    /// Every field
    #[default]
    All,
    /// Only the listed fields (the id is always kept)
    Include(Vec<String>),
    /// Every field except the listed ones
    Exclude(Vec<String>),
}

impl Selection {
    /// Inclusion selection
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Include(fields.into_iter().map(Into::into).collect())
    }

    /// Exclusion selection
    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Exclude(fields.into_iter().map(Into::into).collect())
    }

    /// Whether this selection keeps every field
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

/// Comparison operators for filter conditions
///
/// ```rust
/// use acton_resource::store::FilterOperator;
///
/// assert_eq!(FilterOperator::GreaterThanOrEqual.to_string(), "$gte");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// `$eq`
    Equal,
    /// `$ne`
    NotEqual,
    /// `$gt`
    GreaterThan,
    /// `$gte`
    GreaterThanOrEqual,
    /// `$lt`
    LessThan,
    /// `$lte`
    LessThanOrEqual,
    /// `$like`, `%` matches any run of characters
    Like,
    /// `$in`
    In,
    /// `$nin`
    NotIn,
    /// `$exists: false`
    IsNull,
    /// `$exists: true`
    IsNotNull,
}

impl FilterOperator {
    /// Parse a grammar operator token such as `$gte`
    pub fn from_token(token: &str) -> Option<Self> {
        let operator = match token {
            "$eq" => Self::Equal,
            "$ne" => Self::NotEqual,
            "$gt" => Self::GreaterThan,
            "$gte" => Self::GreaterThanOrEqual,
            "$lt" => Self::LessThan,
            "$lte" => Self::LessThanOrEqual,
            "$like" => Self::Like,
            "$in" => Self::In,
            "$nin" => Self::NotIn,
            _ => return None,
        };
        Some(operator)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "$eq"),
            Self::NotEqual => write!(f, "$ne"),
            Self::GreaterThan => write!(f, "$gt"),
            Self::GreaterThanOrEqual => write!(f, "$gte"),
            Self::LessThan => write!(f, "$lt"),
            Self::LessThanOrEqual => write!(f, "$lte"),
            Self::Like => write!(f, "$like"),
            Self::In => write!(f, "$in"),
            Self::NotIn => write!(f, "$nin"),
            Self::IsNull => write!(f, "$exists:false"),
            Self::IsNotNull => write!(f, "$exists:true"),
        }
    }
}

/// A scalar (or list of scalars) that can appear in a condition
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// String value
    String(String),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// List of scalars (for `$in` / `$nin`)
    List(Vec<FilterValue>),
    /// Null
    Null,
}

impl FilterValue {
    /// Convert a JSON scalar; objects and arrays are not scalars
    pub fn from_scalar(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Boolean(*b)),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Convert a JSON array of scalars
    pub fn from_scalar_list(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        items
            .iter()
            .map(Self::from_scalar)
            .collect::<Option<Vec<_>>>()
            .map(Self::List)
    }

    /// Render back to JSON
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Integer(n) => Value::from(*n),
            Self::Float(n) => Value::from(*n),
            Self::Boolean(b) => Value::Bool(*b),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Null => Value::Null,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for FilterValue {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(list: Vec<T>) -> Self {
        Self::List(list.into_iter().map(Into::into).collect())
    }
}

/// A single condition on one field
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    /// Field path (dot separated for nested fields)
    pub field: String,
    /// Comparison operator
    pub operator: FilterOperator,
    /// Value to compare against
    pub value: FilterValue,
}

impl FilterCondition {
    /// Create a new condition
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// `field == value`
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::Equal, value.into())
    }

    /// `field != value`
    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::NotEqual, value.into())
    }

    /// `field > value`
    pub fn gt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::GreaterThan, value.into())
    }

    /// `field >= value`
    pub fn gte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::GreaterThanOrEqual, value.into())
    }

    /// `field < value`
    pub fn lt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::LessThan, value.into())
    }

    /// `field <= value`
    pub fn lte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::LessThanOrEqual, value.into())
    }

    /// Pattern match with `%` wildcards
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::Like, FilterValue::String(pattern.into()))
    }

    /// `field` is one of `values`
    pub fn is_in(field: impl Into<String>, values: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::In, values.into())
    }

    /// `field` is none of `values`
    pub fn not_in(field: impl Into<String>, values: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::NotIn, values.into())
    }

    /// `field` is missing or null
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNull, FilterValue::Null)
    }

    /// `field` is present and not null
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNotNull, FilterValue::Null)
    }
}

/// Conjunction of conditions; the empty predicate matches everything
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate {
    conditions: Vec<FilterCondition>,
}

impl Predicate {
    /// Empty predicate
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition
    #[must_use]
    pub fn and(mut self, condition: FilterCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Merge another predicate into this one
    #[must_use]
    pub fn merge(mut self, other: Predicate) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    /// The conditions, in insertion order
    pub fn conditions(&self) -> &[FilterCondition] {
        &self.conditions
    }

    /// Number of conditions
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// True when the predicate matches everything
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl From<FilterCondition> for Predicate {
    fn from(condition: FilterCondition) -> Self {
        Self {
            conditions: vec![condition],
        }
    }
}

impl From<Vec<FilterCondition>> for Predicate {
    fn from(conditions: Vec<FilterCondition>) -> Self {
        Self { conditions }
    }
}

impl FromIterator<FilterCondition> for Predicate {
    fn from_iter<I: IntoIterator<Item = FilterCondition>>(iter: I) -> Self {
        Self {
            conditions: iter.into_iter().collect(),
        }
    }
}

/// Expansion of a reference field into the referenced document(s)
///
/// Mirrors `populate(path, select, model, match)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Populate {
    /// Field holding the reference id(s)
    pub path: String,
    /// Fields of the referenced document to keep
    pub select: Selection,
    /// Name of the referenced model; defaults to `path`
    pub model: Option<String>,
    /// Only referenced documents matching this predicate are expanded
    pub matching: Predicate,
}

impl Populate {
    /// Populate `path` with every field of the referenced document
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Restrict the fields of the referenced document
    #[must_use]
    pub fn select(mut self, select: Selection) -> Self {
        self.select = select;
        self
    }

    /// Name the referenced model explicitly
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Only expand referenced documents matching `predicate`
    #[must_use]
    pub fn matching(mut self, predicate: Predicate) -> Self {
        self.matching = predicate;
        self
    }

    /// Model the reference resolves against
    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.path)
    }
}

/// A complete store query
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    /// Conditions every returned document satisfies
    pub predicate: Predicate,
    /// Ordering keys, most significant first
    pub sort: Vec<SortKey>,
    /// Field projection
    pub selection: Selection,
    /// Documents to skip
    pub skip: u64,
    /// Maximum documents to return
    pub limit: Option<u64>,
    /// Reference expansions
    pub populates: Vec<Populate>,
}

impl Query {
    /// Query matching every document
    pub fn new() -> Self {
        Self::default()
    }

    /// Narrow by `predicate` (AND-merged with what is already there)
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = std::mem::take(&mut self.predicate).merge(predicate);
        self
    }

    /// Narrow by a single condition
    #[must_use]
    pub fn where_(mut self, condition: FilterCondition) -> Self {
        self.predicate = std::mem::take(&mut self.predicate).and(condition);
        self
    }

    /// Set the ordering
    #[must_use]
    pub fn sort(mut self, keys: Vec<SortKey>) -> Self {
        self.sort = keys;
        self
    }

    /// Set the field selection
    #[must_use]
    pub fn select(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    /// Skip the first `n` documents
    #[must_use]
    pub fn skip(mut self, n: u64) -> Self {
        self.skip = n;
        self
    }

    /// Return at most `n` documents
    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Add a populate directive
    #[must_use]
    pub fn populate(mut self, populate: Populate) -> Self {
        self.populates.push(populate);
        self
    }
}
