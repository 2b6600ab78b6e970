//! In-memory [`Model`] implementation
//!
//! Keeps documents in insertion order behind a lock and evaluates every part
//! of a [`Query`]. Useful as a fixture store and for tests; it also counts
//! store calls so callers can check how often a handler touched the store.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

use regex::Regex;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::document::{Document, ID_FIELD};
use super::error::{FieldError, StoreError, StoreErrorKind, StoreOperation};
use super::model::{Model, StoreResult};
use super::query::{
    FilterCondition, FilterOperator, FilterValue, OrderDirection, Populate, Predicate, Query,
    Selection, SortKey,
};

/// Number of calls made against an [`InMemoryModel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreCalls {
    /// `find` calls
    pub find: u64,
    /// `find_one` calls
    pub find_one: u64,
    /// `save` calls
    pub save: u64,
    /// `remove` calls
    pub remove: u64,
}

impl StoreCalls {
    /// Sum of all calls
    pub fn total(&self) -> u64 {
        self.find + self.find_one + self.save + self.remove
    }
}

#[derive(Debug, Default)]
struct CallCounters {
    find: AtomicU64,
    find_one: AtomicU64,
    save: AtomicU64,
    remove: AtomicU64,
}

/// Document collection held in process memory
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use acton_resource::store::InMemoryModel;
/// use serde_json::json;
///
/// let users = Arc::new(
///     InMemoryModel::new("User").with_documents(vec![json!({"id": "u1", "name": "Ada"})]),
/// );
/// let items = InMemoryModel::new("Item")
///     .required(["name"])
///     .with_relation("owner", users);
///
/// assert_eq!(items.len(), 0);
/// ```
#[derive(Debug)]
pub struct InMemoryModel {
    name: String,
    documents: RwLock<Vec<Document>>,
    required: Vec<String>,
    relations: HashMap<String, Arc<InMemoryModel>>,
    calls: CallCounters,
}

impl InMemoryModel {
    /// Empty collection named `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(Vec::new()),
            required: Vec::new(),
            relations: HashMap::new(),
            calls: CallCounters::default(),
        }
    }

    /// Fields that must be present, non-null and non-empty on save
    #[must_use]
    pub fn required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Register a model that populate directives can resolve against
    #[must_use]
    pub fn with_relation(mut self, name: impl Into<String>, model: Arc<InMemoryModel>) -> Self {
        self.relations.insert(name.into(), model);
        self
    }

    /// Seed documents; objects without an id get one generated
    ///
    /// Non-object values are skipped.
    #[must_use]
    pub fn with_documents(self, documents: Vec<Value>) -> Self {
        {
            let mut store = match self.documents.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for value in documents {
                if let Some(mut doc) = Document::from_value(value) {
                    if doc.id().is_none() {
                        doc.set_id(generate_id());
                    }
                    store.push(doc);
                }
            }
        }
        self
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.documents.read().map(|docs| docs.len()).unwrap_or(0)
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every stored document, in insertion order
    pub fn snapshot(&self) -> Vec<Document> {
        self.documents
            .read()
            .map(|docs| docs.clone())
            .unwrap_or_default()
    }

    /// Calls made so far
    pub fn calls(&self) -> StoreCalls {
        StoreCalls {
            find: self.calls.find.load(AtomicOrdering::Relaxed),
            find_one: self.calls.find_one.load(AtomicOrdering::Relaxed),
            save: self.calls.save.load(AtomicOrdering::Relaxed),
            remove: self.calls.remove.load(AtomicOrdering::Relaxed),
        }
    }

    fn read(&self, operation: StoreOperation) -> StoreResult<Vec<Document>> {
        self.documents
            .read()
            .map(|docs| docs.clone())
            .map_err(|_| poisoned(operation))
    }

    fn run_query(&self, query: &Query, operation: StoreOperation) -> StoreResult<Vec<Document>> {
        let matcher = Matcher::compile(&query.predicate, operation)?;
        let mut matched: Vec<Document> = self
            .read(operation)?
            .into_iter()
            .filter(|doc| matcher.matches(doc))
            .collect();

        sort_documents(&mut matched, &query.sort);

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| {
                let doc = self.populate(doc, &query.populates)?;
                Ok(apply_selection(doc, &query.selection))
            })
            .collect()
    }

    fn populate(&self, mut doc: Document, populates: &[Populate]) -> StoreResult<Document> {
        for directive in populates {
            let related = self.relations.get(directive.model_name()).ok_or_else(|| {
                StoreError::query_failed(
                    StoreOperation::Populate,
                    format!("No relation registered for model '{}'", directive.model_name()),
                )
                .with_entity(self.name.clone(), directive.path.clone())
            })?;

            let Some(reference) = doc.get(&directive.path).cloned() else {
                continue;
            };
            let expanded = related.expand(&reference, directive)?;
            doc.insert(directive.path.clone(), expanded);
        }
        Ok(doc)
    }

    fn expand(&self, reference: &Value, directive: &Populate) -> StoreResult<Value> {
        let matcher = Matcher::compile(&directive.matching, StoreOperation::Populate)?;
        let docs = self.read(StoreOperation::Populate)?;
        let resolve = |id: &str| {
            docs.iter()
                .find(|doc| doc.id().as_deref() == Some(id))
                .filter(|doc| matcher.matches(doc))
                .map(|doc| apply_selection(doc.clone(), &directive.select).into_value())
        };

        let expanded = match reference {
            Value::String(id) => resolve(id).unwrap_or(Value::Null),
            Value::Array(ids) => Value::Array(
                ids.iter()
                    .filter_map(Value::as_str)
                    .filter_map(resolve)
                    .collect(),
            ),
            other => other.clone(),
        };
        Ok(expanded)
    }

    fn validate(&self, doc: &Document) -> StoreResult<()> {
        let errors: Vec<FieldError> = self
            .required
            .iter()
            .filter(|field| match doc.get(field) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            })
            .map(|field| FieldError::required(field.clone()))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(StoreError::validation_failed(errors).with_entity(
                self.name.clone(),
                doc.id().unwrap_or_default(),
            ))
        }
    }
}

impl Model for InMemoryModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, query: &Query) -> StoreResult<Vec<Document>> {
        self.calls.find.fetch_add(1, AtomicOrdering::Relaxed);
        self.run_query(query, StoreOperation::Find)
    }

    async fn find_one(&self, query: &Query) -> StoreResult<Option<Document>> {
        self.calls.find_one.fetch_add(1, AtomicOrdering::Relaxed);
        let single = query.clone().limit(1);
        Ok(self
            .run_query(&single, StoreOperation::FindOne)?
            .into_iter()
            .next())
    }

    fn instantiate(&self, mut fields: Map<String, Value>) -> StoreResult<Document> {
        fields.remove(ID_FIELD);
        Ok(Document::from(fields))
    }

    async fn save(&self, mut document: Document) -> StoreResult<Document> {
        self.calls.save.fetch_add(1, AtomicOrdering::Relaxed);
        self.validate(&document)?;

        let id = match document.id() {
            Some(id) => id,
            None => {
                let id = generate_id();
                document.set_id(id.clone());
                id
            }
        };

        let mut docs = self
            .documents
            .write()
            .map_err(|_| poisoned(StoreOperation::Save))?;
        match docs.iter_mut().find(|doc| doc.id().as_deref() == Some(id.as_str())) {
            Some(existing) => *existing = document.clone(),
            None => docs.push(document.clone()),
        }

        tracing::trace!(model = %self.name, id = %id, "Document saved");
        Ok(document)
    }

    async fn remove(&self, document: &Document) -> StoreResult<()> {
        self.calls.remove.fetch_add(1, AtomicOrdering::Relaxed);
        let id = document.id().ok_or_else(|| {
            StoreError::new(
                StoreOperation::Remove,
                StoreErrorKind::Other,
                "Cannot remove a document without an id",
            )
        })?;

        let mut docs = self
            .documents
            .write()
            .map_err(|_| poisoned(StoreOperation::Remove))?;
        let before = docs.len();
        docs.retain(|doc| doc.id().as_deref() != Some(id.as_str()));

        if docs.len() == before {
            return Err(StoreError::not_found(
                StoreOperation::Remove,
                self.name.clone(),
                id,
            ));
        }
        Ok(())
    }
}

fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn poisoned(operation: StoreOperation) -> StoreError {
    StoreError::new(operation, StoreErrorKind::Other, "Document lock poisoned")
}

/// Predicate with its `$like` patterns compiled
struct Matcher<'a> {
    conditions: Vec<(&'a FilterCondition, Option<Regex>)>,
}

impl<'a> Matcher<'a> {
    fn compile(predicate: &'a Predicate, operation: StoreOperation) -> StoreResult<Self> {
        let conditions = predicate
            .conditions()
            .iter()
            .map(|condition| -> StoreResult<(&'a FilterCondition, Option<Regex>)> {
                let pattern = match (&condition.operator, &condition.value) {
                    (FilterOperator::Like, FilterValue::String(pattern)) => {
                        Some(like_regex(pattern).map_err(|e| {
                            StoreError::query_failed(operation, format!("Invalid pattern: {}", e))
                        })?)
                    }
                    _ => None,
                };
                Ok((condition, pattern))
            })
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Self { conditions })
    }

    fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(condition, pattern)| condition_matches(doc, condition, pattern.as_ref()))
    }
}

fn like_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let body = pattern
        .split('%')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{}$", body))
}

fn condition_matches(doc: &Document, condition: &FilterCondition, pattern: Option<&Regex>) -> bool {
    let field = doc.get(&condition.field);
    match condition.operator {
        FilterOperator::IsNull => matches!(field, None | Some(Value::Null)),
        FilterOperator::IsNotNull => !matches!(field, None | Some(Value::Null)),
        FilterOperator::Equal => field.is_some_and(|v| value_equals(v, &condition.value)),
        FilterOperator::NotEqual => !field.is_some_and(|v| value_equals(v, &condition.value)),
        FilterOperator::In => field.is_some_and(|v| in_list(v, &condition.value)),
        FilterOperator::NotIn => !field.is_some_and(|v| in_list(v, &condition.value)),
        FilterOperator::Like => match (field, pattern) {
            (Some(Value::String(s)), Some(re)) => re.is_match(s),
            _ => false,
        },
        FilterOperator::GreaterThan => compare(field, &condition.value) == Some(Ordering::Greater),
        FilterOperator::GreaterThanOrEqual => matches!(
            compare(field, &condition.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOperator::LessThan => compare(field, &condition.value) == Some(Ordering::Less),
        FilterOperator::LessThanOrEqual => matches!(
            compare(field, &condition.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
    }
}

/// Equality with array-contains semantics for array fields
fn value_equals(field: &Value, expected: &FilterValue) -> bool {
    match field {
        Value::Array(items) if !matches!(expected, FilterValue::List(_)) => {
            items.iter().any(|item| scalar_equals(item, expected))
        }
        other => scalar_equals(other, expected),
    }
}

fn scalar_equals(value: &Value, expected: &FilterValue) -> bool {
    match (value, expected) {
        (Value::Number(a), FilterValue::Integer(_) | FilterValue::Float(_)) => {
            Some(a.as_f64().unwrap_or(f64::NAN)) == filter_number(expected)
        }
        _ => *value == expected.to_json(),
    }
}

fn in_list(field: &Value, list: &FilterValue) -> bool {
    match list {
        FilterValue::List(items) => items.iter().any(|item| value_equals(field, item)),
        single => value_equals(field, single),
    }
}

fn filter_number(value: &FilterValue) -> Option<f64> {
    match value {
        FilterValue::Integer(n) => Some(*n as f64),
        FilterValue::Float(n) => Some(*n),
        _ => None,
    }
}

fn compare(field: Option<&Value>, expected: &FilterValue) -> Option<Ordering> {
    match (field?, expected) {
        (Value::Number(a), _) => a.as_f64()?.partial_cmp(&filter_number(expected)?),
        (Value::String(a), FilterValue::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::Bool(a), FilterValue::Boolean(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn sort_documents(docs: &mut [Document], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        keys.iter()
            .map(|key| {
                let ordering = order_values(a.get(&key.field), b.get(&key.field));
                match key.direction {
                    OrderDirection::Ascending => ordering,
                    OrderDirection::Descending => ordering.reverse(),
                }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

/// Total order over JSON values: missing/null < bool < number < string < other
fn order_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn apply_selection(doc: Document, selection: &Selection) -> Document {
    match selection {
        Selection::All => doc,
        Selection::Include(fields) => {
            let keep: Vec<&str> = fields.iter().map(|f| top_level(f)).collect();
            doc.as_map()
                .iter()
                .filter(|(key, _)| key.as_str() == ID_FIELD || keep.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect::<Map<String, Value>>()
                .into()
        }
        Selection::Exclude(fields) => {
            let mut doc = doc;
            for field in fields {
                doc.remove(top_level(field));
            }
            doc
        }
    }
}

fn top_level(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}
