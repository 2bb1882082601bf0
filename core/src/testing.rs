//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::http::{HttpRequest, HttpResponse, Transport, TransportError};

/// Replays canned responses in order and records every request it receives.
#[derive(Default)]
pub(crate) struct StubTransport {
    replies: Mutex<VecDeque<Result<HttpResponse, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
    resets: Mutex<usize>,
}

impl StubTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, status: u16, body: &str) -> &Self {
        self.replies.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }));
        self
    }

    pub(crate) fn fail(&self, message: &str) -> &Self {
        self.replies.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn resets(&self) -> usize {
        *self.resets.lock().unwrap()
    }

    pub(crate) fn last_request(&self) -> HttpRequest {
        self.requests.lock().unwrap().last().cloned().expect("no request sent")
    }
}

impl Transport for StubTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(message.into()),
            None => Err(format!("no canned reply for {} {}", request.method.as_str(), request.url).into()),
        }
    }

    fn reset_session(&self) {
        *self.resets.lock().unwrap() += 1;
    }
}
