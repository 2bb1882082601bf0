//! Verify the listing encoder and the resource facade against JSON test
//! vectors stored in `test-vectors/`.
//!
//! Each facade vector describes an operation, the request it must produce, a
//! simulated response and the expected result or error. Bodies are compared as
//! parsed JSON (not raw strings) to avoid false negatives from field ordering.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use frappe_core::{
    query, ApiError, ClientOptions, FrappeClient, HttpMethod, HttpRequest, HttpResponse,
    ListQuery, Transport, TransportError,
};
use serde_json::Value;

/// Parse the method string from test vectors into `HttpMethod`.
fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

/// Records requests and answers each with the next queued response.
#[derive(Default)]
struct Replay {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl Transport for Replay {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| "no simulated response queued".into())
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

#[test]
fn query_test_vectors() {
    let raw = include_str!("../../test-vectors/query.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let base = case["base"].as_str().unwrap();
        let query: ListQuery = serde_json::from_value(case["query"].clone()).unwrap();

        let url = query::build(base, &query);
        assert_eq!(url, case["expected"].as_str().unwrap(), "{name}");
    }
}

// ---------------------------------------------------------------------------
// Facade
// ---------------------------------------------------------------------------

fn run_operation(client: &FrappeClient, case: &Value) -> Result<Value, ApiError> {
    let doctype = case["doctype"].as_str().unwrap_or_default();
    let doc_name = case["doc_name"].as_str().unwrap_or_default();
    match case["operation"].as_str().unwrap() {
        "get_doc" => client.get_doc(doctype, doc_name),
        "get_list" => {
            let query: ListQuery = serde_json::from_value(case["query"].clone()).unwrap();
            client.get_list::<Value>(doctype, &query).map(Value::Array)
        }
        "create_doc" => client.create_doc(doctype, &case["data"]),
        "set_doc" => client.set_doc(doctype, doc_name, &case["data"]),
        "delete_doc" => client.delete_doc(doctype, doc_name),
        "call" => client.call(case["method_name"].as_str().unwrap(), Some(&case["data"])),
        other => panic!("unknown operation: {other}"),
    }
}

#[test]
fn resource_test_vectors() {
    let raw = include_str!("../../test-vectors/resource.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let base_url = vectors["base_url"].as_str().unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();

        let mut options = ClientOptions::new(base_url);
        if let Some(token) = case["token"].as_str() {
            options = options.with_token(token);
        }
        let transport = Arc::new(Replay::default());
        let sim = &case["simulated_response"];
        transport.responses.lock().unwrap().push_back(HttpResponse {
            status: sim["status"].as_u64().unwrap() as u16,
            headers: Vec::new(),
            body: sim["body"].as_str().unwrap().to_string(),
        });
        let client = FrappeClient::new(options, transport.clone()).unwrap();

        let result = run_operation(&client, case);

        // Verify the request
        let requests = transport.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1, "{name}: exactly one request");
        let req = &requests[0];
        let expected_req = &case["expected_request"];
        assert_eq!(req.method, parse_method(expected_req["method"].as_str().unwrap()), "{name}: method");
        assert_eq!(req.url, format!("{base_url}{}", expected_req["path"].as_str().unwrap()), "{name}: url");

        let expected_headers: Vec<(String, String)> = expected_req["headers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|h| {
                let arr = h.as_array().unwrap();
                (arr[0].as_str().unwrap().to_string(), arr[1].as_str().unwrap().to_string())
            })
            .collect();
        assert_eq!(req.headers, expected_headers, "{name}: headers");

        match &expected_req["body"] {
            Value::Null => assert!(req.body.is_none(), "{name}: body should be None"),
            expected => {
                let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
                assert_eq!(&body, expected, "{name}: body");
            }
        }

        // Verify the outcome
        if let Some(expected_error) = case.get("expected_error") {
            let err = result.unwrap_err();
            match expected_error["kind"].as_str().unwrap() {
                "Http" => match err {
                    ApiError::Http { status, body } => {
                        assert_eq!(u64::from(status), expected_error["status"].as_u64().unwrap(), "{name}: status");
                        assert_eq!(body, expected_error["body"].as_str().unwrap(), "{name}: body");
                    }
                    other => panic!("{name}: expected Http, got {other:?}"),
                },
                "Deserialization" => {
                    assert!(matches!(err, ApiError::Deserialization(_)), "{name}: expected Deserialization")
                }
                other => panic!("{name}: unknown expected_error: {other}"),
            }
        } else {
            assert_eq!(result.unwrap(), case["expected_result"], "{name}: parsed result");
        }
    }
}
