use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const ADMIN_USER: &str = "Administrator";
pub const ADMIN_PASSWORD: &str = "admin";
pub const API_KEY: &str = "api-key";
pub const API_SECRET: &str = "api-secret";

const DEFAULT_PAGE_LENGTH: usize = 20;

pub type Doc = Map<String, Value>;

/// In-memory backend state: documents per doctype, users, API tokens and
/// live cookie sessions.
#[derive(Debug, Default)]
pub struct Store {
    docs: HashMap<String, BTreeMap<String, Doc>>,
    users: HashMap<String, String>,
    tokens: HashMap<String, String>,
    sessions: HashMap<String, String>,
}

impl Store {
    /// One administrator with password `ADMIN_PASSWORD` and token
    /// `API_KEY:API_SECRET`.
    pub fn seeded() -> Self {
        let mut store = Self::default();
        store.add_user(ADMIN_USER, ADMIN_PASSWORD);
        store.add_token(API_KEY, API_SECRET, ADMIN_USER);
        store
    }

    pub fn add_user(&mut self, user: &str, password: &str) {
        self.users.insert(user.to_string(), password.to_string());
    }

    pub fn add_token(&mut self, key: &str, secret: &str, user: &str) {
        self.tokens.insert(format!("{key}:{secret}"), user.to_string());
    }

    pub fn insert_doc(&mut self, doctype: &str, doc: Doc) -> Doc {
        let name = doc
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string()[..10].to_string());
        let mut doc = doc;
        doc.insert("name".to_string(), Value::String(name.clone()));
        doc.insert("doctype".to_string(), Value::String(doctype.to_string()));
        self.docs
            .entry(doctype.to_string())
            .or_default()
            .insert(name, doc.clone());
        doc
    }

    fn user_for(&self, headers: &HeaderMap) -> Option<String> {
        let from_token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("token "))
            .and_then(|token| self.tokens.get(token));
        if let Some(user) = from_token {
            return Some(user.clone());
        }
        session_id(headers).and_then(|sid| self.sessions.get(&sid).cloned())
    }
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    app_with(Store::seeded())
}

pub fn app_with(store: Store) -> Router {
    let db: Db = Arc::new(RwLock::new(store));
    Router::new()
        .route("/api/resource/{doctype}", get(list_docs).post(create_doc))
        .route(
            "/api/resource/{doctype}/{name}",
            get(get_doc).put(update_doc).delete(delete_doc),
        )
        .route("/api/method/{method}", get(call_method).post(call_method))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "mock backend serving");
    }
    axum::serve(listener, app()).await
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|pair| pair.trim().strip_prefix("sid="))
        .map(str::to_string)
}

// --- listing ---

/// A `[field, operator, value]` listing filter.
#[derive(Debug, Clone, Deserialize)]
pub struct Condition(pub String, pub String, pub Value);

impl Condition {
    pub fn matches(&self, doc: &Doc) -> Result<bool, String> {
        let actual = doc.get(&self.0).unwrap_or(&Value::Null);
        let ordering = compare(actual, &self.2);
        match self.1.as_str() {
            "=" => Ok(actual == &self.2),
            "!=" => Ok(actual != &self.2),
            ">" => Ok(ordering == Some(Ordering::Greater)),
            "<" => Ok(ordering == Some(Ordering::Less)),
            other => Err(format!("unsupported operator {other}")),
        }
    }
}

/// Numbers compare numerically, strings lexically, anything else not at all.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    limit_start: Option<usize>,
    limit_page_length: Option<usize>,
    fields: Option<String>,
    filters: Option<String>,
    or_filters: Option<String>,
    order_by: Option<String>,
}

fn parse_json<T: serde::de::DeserializeOwned>(key: &str, raw: &Option<String>) -> Result<Option<T>, Response> {
    raw.as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| bad_request(format!("invalid {key}: {e}")))
}

fn filter_docs(docs: Vec<Doc>, conditions: &[Condition], any: bool) -> Result<Vec<Doc>, String> {
    let mut kept = Vec::new();
    for doc in docs {
        let mut results = Vec::with_capacity(conditions.len());
        for condition in conditions {
            results.push(condition.matches(&doc)?);
        }
        let keep = if any {
            results.is_empty() || results.iter().any(|r| *r)
        } else {
            results.iter().all(|r| *r)
        };
        if keep {
            kept.push(doc);
        }
    }
    Ok(kept)
}

fn sort_docs(docs: &mut [Doc], order_by: &str) {
    let mut parts = order_by.split_whitespace();
    let Some(field) = parts.next() else { return };
    let descending = parts.next().is_some_and(|dir| dir.eq_ignore_ascii_case("desc"));
    docs.sort_by(|a, b| {
        let ordering = compare(
            a.get(field).unwrap_or(&Value::Null),
            b.get(field).unwrap_or(&Value::Null),
        )
        .unwrap_or(Ordering::Equal);
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn project(doc: Doc, fields: &[String]) -> Doc {
    if fields.iter().any(|f| f == "*") {
        return doc;
    }
    doc.into_iter()
        .filter(|(key, _)| fields.contains(key))
        .collect()
}

async fn list_docs(
    State(db): State<Db>,
    Path(doctype): Path<String>,
    Query(params): Query<ListParams>,
) -> Response {
    let fields: Vec<String> = match parse_json("fields", &params.fields) {
        Ok(fields) => fields.unwrap_or_else(|| vec!["name".to_string()]),
        Err(resp) => return resp,
    };
    let (raw, any) = match &params.or_filters {
        Some(_) => (&params.or_filters, true),
        None => (&params.filters, false),
    };
    let conditions: Vec<Condition> = match parse_json("filters", raw) {
        Ok(conditions) => conditions.unwrap_or_default(),
        Err(resp) => return resp,
    };

    let store = db.read().await;
    let docs: Vec<Doc> = store
        .docs
        .get(&doctype)
        .map(|docs| docs.values().cloned().collect())
        .unwrap_or_default();
    drop(store);

    let mut docs = match filter_docs(docs, &conditions, any) {
        Ok(docs) => docs,
        Err(message) => return bad_request(message),
    };
    if let Some(order_by) = &params.order_by {
        sort_docs(&mut docs, order_by);
    }

    let start = params.limit_start.unwrap_or(0);
    let length = match params.limit_page_length.unwrap_or(DEFAULT_PAGE_LENGTH) {
        0 => usize::MAX,
        n => n,
    };
    let page: Vec<Doc> = docs
        .into_iter()
        .skip(start)
        .take(length)
        .map(|doc| project(doc, &fields))
        .collect();

    Json(json!({ "data": page })).into_response()
}

// --- documents ---

async fn create_doc(
    State(db): State<Db>,
    Path(doctype): Path<String>,
    Json(doc): Json<Doc>,
) -> Response {
    let mut store = db.write().await;
    let exists = doc
        .get("name")
        .and_then(Value::as_str)
        .and_then(|name| store.docs.get(&doctype).map(|docs| docs.contains_key(name)))
        .unwrap_or(false);
    if exists {
        return (StatusCode::CONFLICT, "Duplicate name").into_response();
    }
    let doc = store.insert_doc(&doctype, doc);
    tracing::debug!(%doctype, name = ?doc.get("name"), "document created");
    Json(json!({ "data": doc })).into_response()
}

async fn get_doc(State(db): State<Db>, Path((doctype, name)): Path<(String, String)>) -> Response {
    let store = db.read().await;
    match store.docs.get(&doctype).and_then(|docs| docs.get(&name)) {
        Some(doc) => Json(json!({ "data": doc })).into_response(),
        None => not_found(),
    }
}

async fn update_doc(
    State(db): State<Db>,
    Path((doctype, name)): Path<(String, String)>,
    Json(patch): Json<Doc>,
) -> Response {
    let mut store = db.write().await;
    let Some(doc) = store.docs.get_mut(&doctype).and_then(|docs| docs.get_mut(&name)) else {
        return not_found();
    };
    for (key, value) in patch {
        if key != "name" && key != "doctype" {
            doc.insert(key, value);
        }
    }
    Json(json!({ "data": doc })).into_response()
}

async fn delete_doc(State(db): State<Db>, Path((doctype, name)): Path<(String, String)>) -> Response {
    let mut store = db.write().await;
    match store.docs.get_mut(&doctype).and_then(|docs| docs.remove(&name)) {
        Some(_) => (StatusCode::ACCEPTED, Json(json!({ "message": "ok" }))).into_response(),
        None => not_found(),
    }
}

// --- methods ---

#[derive(Deserialize)]
struct LoginBody {
    usr: String,
    pwd: String,
}

async fn call_method(
    State(db): State<Db>,
    Path(method): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match method.as_str() {
        "login" => login(db, &body).await,
        "logout" => {
            if let Some(sid) = session_id(&headers) {
                db.write().await.sessions.remove(&sid);
            }
            Json(json!({})).into_response()
        }
        "frappe.auth.get_logged_user" => match db.read().await.user_for(&headers) {
            Some(user) => Json(json!({ "message": user })).into_response(),
            None => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "exc_type": "AuthenticationError" })),
            )
                .into_response(),
        },
        "ping" => Json(json!({ "message": "pong" })).into_response(),
        _ => not_found(),
    }
}

async fn login(db: Db, body: &[u8]) -> Response {
    let credentials: LoginBody = match serde_json::from_slice(body) {
        Ok(credentials) => credentials,
        Err(e) => return bad_request(format!("invalid login body: {e}")),
    };
    let mut store = db.write().await;
    if store.users.get(&credentials.usr) != Some(&credentials.pwd) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid Login. Try again." })),
        )
            .into_response();
    }
    let sid = Uuid::new_v4().simple().to_string();
    store.sessions.insert(sid.clone(), credentials.usr.clone());
    tracing::debug!(user = %credentials.usr, "session started");
    (
        [(header::SET_COOKIE, format!("sid={sid}; Path=/; HttpOnly"))],
        Json(json!({ "message": "Logged In", "full_name": credentials.usr })),
    )
        .into_response()
}
