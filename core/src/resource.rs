//! Document operations and well-known remote methods.
//!
//! Each operation is a single round-trip through `FrappeClient`. Resource
//! endpoints wrap their payload in a `{"data": ...}` envelope, which is
//! removed before returning; `call` returns the method's response as-is.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::client::FrappeClient;
use crate::error::ApiError;
use crate::query::{self, ListQuery};

pub const LOGIN_METHOD: &str = "login";
pub const LOGOUT_METHOD: &str = "logout";
pub const LOGGED_USER_METHOD: &str = "frappe.auth.get_logged_user";

/// The `{"data": ...}` wrapper around resource payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// The `{"message": ...}` wrapper returned by remote methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodResponse<T> {
    pub message: T,
}

/// `/api/resource/{doctype}`, with the doctype percent-encoded.
pub fn collection_path(doctype: &str) -> String {
    format!("/api/resource/{}", urlencoding::encode(doctype))
}

/// `/api/resource/{doctype}/{name}`, both segments percent-encoded.
pub fn document_path(doctype: &str, name: &str) -> String {
    format!("{}/{}", collection_path(doctype), urlencoding::encode(name))
}

pub fn method_path(method: &str) -> String {
    format!("/api/method/{method}")
}

impl FrappeClient {
    pub fn get_doc<T: DeserializeOwned>(&self, doctype: &str, name: &str) -> Result<T, ApiError> {
        let envelope: Envelope<T> = self.get(&document_path(doctype, name))?;
        Ok(envelope.data)
    }

    pub fn get_list<T: DeserializeOwned>(&self, doctype: &str, query: &ListQuery) -> Result<Vec<T>, ApiError> {
        let url = query::build(&collection_path(doctype), query);
        let envelope: Envelope<Vec<T>> = self.get(&url)?;
        Ok(envelope.data)
    }

    pub fn create_doc<T, B>(&self, doctype: &str, data: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let envelope: Envelope<T> = self.post(&collection_path(doctype), data)?;
        Ok(envelope.data)
    }

    /// Updates `name` with the given fields; omitted fields keep their stored values.
    pub fn set_doc<T, B>(&self, doctype: &str, name: &str, data: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let envelope: Envelope<T> = self.put(&document_path(doctype, name), data)?;
        Ok(envelope.data)
    }

    /// Returns the backend's raw response, typically `{"message": "ok"}`.
    pub fn delete_doc(&self, doctype: &str, name: &str) -> Result<Value, ApiError> {
        self.delete(&document_path(doctype, name))
    }

    /// Invokes `/api/method/{method}` with `args` as the POST body.
    pub fn call<T: DeserializeOwned>(&self, method: &str, args: Option<&Value>) -> Result<T, ApiError> {
        match args {
            Some(args) => self.post(&method_path(method), args),
            None => self.post_empty(&method_path(method)),
        }
    }

    /// Starts a cookie session. The response body is backend-defined.
    pub fn login(&self, username: &str, password: &str) -> Result<Value, ApiError> {
        self.post(
            &method_path(LOGIN_METHOD),
            &json!({ "usr": username, "pwd": password }),
        )
    }

    pub fn logout(&self) -> Result<Value, ApiError> {
        self.post_empty(&method_path(LOGOUT_METHOD))
    }

    /// Name of the user the current credentials resolve to.
    pub fn get_logged_user(&self) -> Result<String, ApiError> {
        let response: MethodResponse<String> = self.get(&method_path(LOGGED_USER_METHOD))?;
        Ok(response.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientOptions;
    use crate::http::HttpMethod;
    use crate::query::Filter;
    use crate::testing::StubTransport;
    use std::sync::Arc;

    fn client() -> (FrappeClient, Arc<StubTransport>) {
        let stub = StubTransport::new();
        let client = FrappeClient::new(ClientOptions::new("http://erp.local"), stub.clone()).unwrap();
        (client, stub)
    }

    #[test]
    fn get_doc_issues_one_get_and_unwraps_data() {
        let (client, stub) = client();
        stub.respond(200, r#"{"data":{"name":"T-1","status":"Open"}}"#);

        let doc: Value = client.get_doc("Task", "T-1").unwrap();
        assert_eq!(doc, json!({"name": "T-1", "status": "Open"}));

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Get);
        assert_eq!(requests[0].url, "http://erp.local/api/resource/Task/T-1");
    }

    #[test]
    fn document_path_encodes_segments() {
        assert_eq!(
            document_path("Sales Invoice", "SINV/0001"),
            "/api/resource/Sales%20Invoice/SINV%2F0001"
        );
    }

    #[test]
    fn get_list_builds_query_and_unwraps_data() {
        #[derive(Deserialize)]
        struct Row {
            name: String,
        }

        let (client, stub) = client();
        stub.respond(200, r#"{"data":[{"name":"T-1"},{"name":"T-2"}]}"#);
        let query = ListQuery::new().page_length(2).filter(Filter::eq("status", "Open"));
        let rows: Vec<Row> = client.get_list("Task", &query).unwrap();

        assert_eq!(rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), ["T-1", "T-2"]);
        assert_eq!(
            stub.last_request().url,
            format!("http://erp.local{}", query::build("/api/resource/Task", &query))
        );
    }

    #[test]
    fn create_and_set_unwrap_the_envelope() {
        let (client, stub) = client();
        stub.respond(200, r#"{"data":{"name":"T-9","subject":"New"}}"#)
            .respond(200, r#"{"data":{"name":"T-9","subject":"Renamed"}}"#);

        let created: Value = client.create_doc("Task", &json!({"subject": "New"})).unwrap();
        assert_eq!(created["name"], "T-9");
        let updated: Value = client
            .set_doc("Task", "T-9", &json!({"subject": "Renamed"}))
            .unwrap();
        assert_eq!(updated["subject"], "Renamed");

        let requests = stub.requests();
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(requests[0].url, "http://erp.local/api/resource/Task");
        assert_eq!(requests[1].method, HttpMethod::Put);
        assert_eq!(requests[1].url, "http://erp.local/api/resource/Task/T-9");
    }

    #[test]
    fn delete_returns_raw_response() {
        let (client, stub) = client();
        stub.respond(202, r#"{"message":"ok"}"#);
        let resp = client.delete_doc("Task", "T-1").unwrap();
        assert_eq!(resp, json!({"message": "ok"}));
        assert_eq!(stub.last_request().method, HttpMethod::Delete);
    }

    #[test]
    fn call_posts_args_under_method_prefix() {
        let (client, stub) = client();
        stub.respond(200, r#"{"message":"pong"}"#);
        let resp: Value = client.call("ping", Some(&json!({"echo": 1}))).unwrap();
        assert_eq!(resp["message"], "pong");

        let req = stub.last_request();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://erp.local/api/method/ping");
        assert_eq!(req.body.as_deref(), Some(r#"{"echo":1}"#));
    }

    #[test]
    fn login_sends_usr_and_pwd() {
        let (client, stub) = client();
        stub.respond(200, r#"{"message":"Logged In","full_name":"Administrator"}"#);
        let resp = client.login("Administrator", "admin").unwrap();
        assert_eq!(resp["message"], "Logged In");

        let body: Value = serde_json::from_str(stub.last_request().body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"usr": "Administrator", "pwd": "admin"}));
    }

    #[test]
    fn logged_user_reads_message() {
        let (client, stub) = client();
        stub.respond(200, r#"{"message":"Administrator"}"#);
        assert_eq!(client.get_logged_user().unwrap(), "Administrator");
        assert_eq!(
            stub.last_request().url,
            "http://erp.local/api/method/frappe.auth.get_logged_user"
        );
    }

    #[test]
    fn missing_envelope_is_a_deserialization_error() {
        let (client, stub) = client();
        stub.respond(200, r#"{"name":"T-1"}"#);
        let err = client.get_doc::<Value>("Task", "T-1").unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }
}
