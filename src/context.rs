//! Per-request scratchpad handed to pipeline steps and handlers.

use crate::http::{request::Request, response::Response, types::StatusCode};
use std::collections::HashMap;

/// Bridges the parsed request, the in-progress response, extracted route
/// parameters and opaque key/value state.
///
/// A `Context` is created immediately before routing and dropped right after
/// the handler returns; handlers must not retain it beyond their own return.
pub struct Context<'a> {
    request: &'a Request,
    response: &'a mut Response,
    params: HashMap<String, String>,
    state: HashMap<String, String>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(request: &'a Request, response: &'a mut Response) -> Self {
        Self {
            request,
            response,
            params: HashMap::new(),
            state: HashMap::new(),
        }
    }

    #[inline(always)]
    pub fn request(&self) -> &Request {
        self.request
    }

    #[inline(always)]
    pub fn response(&mut self) -> &mut Response {
        self.response
    }

    /// A URL-decoded route parameter captured by a `:name` pattern segment.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    #[inline]
    pub(crate) fn insert_param(&mut self, name: String, value: String) {
        self.params.insert(name, value);
    }

    /// Opaque scratchpad for middleware/handler communication.
    pub fn state(&self, key: &str) -> Option<&str> {
        self.state.get(key).map(String::as_str)
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.state.insert(key.into(), value.into());
    }

    /// Sets the response status.
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.response.set_status(status);
        self
    }

    /// Finishes the response with a JSON body.
    pub fn json(&mut self, body: impl Into<String>) {
        self.response.set_json_body(body);
    }

    /// Finishes the response with an HTML body.
    pub fn html(&mut self, body: impl Into<String>) {
        self.response.set_html_body(body);
    }

    /// Finishes the response with a plain-text body.
    pub fn text(&mut self, body: impl Into<String>) {
        self.response.set_text_body(body);
    }
}
