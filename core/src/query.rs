//! Query-string encoding for resource listings.
//!
//! # Design
//! `build` is a pure function of its inputs. Parameters are appended in a
//! fixed order (`limit_page_length`, `limit_start`, `fields`, `filters` or
//! `or_filters`, `order_by`), so equal queries always produce equal URLs,
//! which also makes the URL usable as a cache key. `fields` and `filters` are
//! JSON-serialized and then percent-encoded as a single value.
//!
//! The flat key/value tier used by `FrappeClient::get` (`encode_params`)
//! shares the same percent-encoder.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

/// Comparison operator of a list filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Operator {
    GreaterThan,
    LessThan,
    Equal,
    NotEqual,
}

impl Operator {
    /// Parses `GT`/`LT`/`EQ`/`NEQ` or `>`/`<`/`=`/`!=`.
    ///
    /// Any other spelling is read as `NotEqual`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "GT" | ">" => Operator::GreaterThan,
            "LT" | "<" => Operator::LessThan,
            "EQ" | "=" => Operator::Equal,
            "NEQ" | "!=" => Operator::NotEqual,
            _ => Operator::NotEqual,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
        }
    }
}

impl From<String> for Operator {
    fn from(raw: String) -> Self {
        Operator::parse(&raw)
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.symbol())
    }
}

/// One listing filter, sent as `[field, operator, value]`.
///
/// Deserializes from that triple or from the four-slot form
/// `[doctype, field, operator, value]`, whose first slot is dropped.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "FilterRepr")]
pub struct Filter {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FilterRepr {
    Triple(String, Operator, Value),
    Quad(String, String, Operator, Value),
}

impl From<FilterRepr> for Filter {
    fn from(repr: FilterRepr) -> Self {
        match repr {
            FilterRepr::Triple(field, operator, value) => Filter { field, operator, value },
            FilterRepr::Quad(_, field, operator, value) => Filter { field, operator, value },
        }
    }
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Equal, value)
    }

    fn to_value(&self) -> Value {
        json!([self.field, self.operator.symbol(), self.value])
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.field, self.operator.symbol(), &self.value).serialize(serializer)
    }
}

/// What to emit for `limit_start` when filters are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOffsetPolicy {
    /// Emit `limit_start=0` whenever filters accompany a start offset.
    #[default]
    ZeroWhenFiltered,
    /// Always emit the requested offset.
    Honor,
}

/// Pagination, projection, filtering and ordering of a resource listing.
///
/// `Some(vec![])` counts as present for both `fields` and `filters`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit_page_length: Option<u32>,
    #[serde(default)]
    pub limit_start: Option<u32>,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub filters: Option<Vec<Filter>>,
    #[serde(default)]
    pub order_by: Option<String>,
    /// Send the filters as `or_filters` instead of `filters`.
    #[serde(default)]
    pub use_or: bool,
    #[serde(default)]
    pub start_policy: StartOffsetPolicy,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_length(mut self, length: u32) -> Self {
        self.limit_page_length = Some(length);
        self
    }

    pub fn start(mut self, start: u32) -> Self {
        self.limit_start = Some(start);
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.get_or_insert_with(Vec::new).push(filter);
        self
    }

    pub fn or_filters(mut self) -> Self {
        self.use_or = true;
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn start_policy(mut self, policy: StartOffsetPolicy) -> Self {
        self.start_policy = policy;
        self
    }

    /// The `limit_start` value that will actually be sent.
    pub fn effective_start(&self) -> Option<u32> {
        let start = self.limit_start?;
        match self.start_policy {
            StartOffsetPolicy::ZeroWhenFiltered if self.filters.is_some() => Some(0),
            _ => Some(start),
        }
    }
}

/// Appends `?key=value` or `&key=value` pairs to a base URL.
struct QueryString {
    url: String,
    has_params: bool,
}

impl QueryString {
    fn new(base: &str) -> Self {
        Self {
            url: base.to_string(),
            has_params: base.contains('?'),
        }
    }

    /// `value` must already be percent-encoded.
    fn push(&mut self, key: &str, value: &str) {
        self.url.push(if self.has_params { '&' } else { '?' });
        self.url.push_str(key);
        self.url.push('=');
        self.url.push_str(value);
        self.has_params = true;
    }

    fn push_json(&mut self, key: &str, value: &Value) {
        self.push(key, &urlencoding::encode(&value.to_string()));
    }
}

/// Builds the listing URL for `base_url` (e.g. `/api/resource/Task`).
///
/// Returns `base_url` unchanged when the query is empty.
pub fn build(base_url: &str, query: &ListQuery) -> String {
    let mut qs = QueryString::new(base_url);

    if let Some(length) = query.limit_page_length {
        qs.push("limit_page_length", &length.to_string());
    }
    if let Some(start) = query.effective_start() {
        qs.push("limit_start", &start.to_string());
    }
    if let Some(fields) = &query.fields {
        qs.push_json("fields", &json!(fields));
    }
    if let Some(filters) = &query.filters {
        let key = if query.use_or { "or_filters" } else { "filters" };
        let lowered = Value::Array(filters.iter().map(Filter::to_value).collect());
        qs.push_json(key, &lowered);
    }
    if let Some(order_by) = &query.order_by {
        qs.push("order_by", &urlencoding::encode(order_by));
    }

    qs.url
}

/// Encodes flat parameters as `k1=v1&k2=v2`, without a leading `?`.
pub fn encode_params<K, V>(params: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    params
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key.as_ref()),
                urlencoding::encode(value.as_ref())
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Appends flat parameters to `path`, choosing `?` or `&` as needed.
pub fn with_params<K, V>(path: &str, params: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    if params.is_empty() {
        return path.to_string();
    }
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}{}", encode_params(params))
}
