//! Scoped invocation context.
//!
//! One [`RequestContext`] is built per inbound request and passed explicitly
//! through the filter chain to the handler. It owns everything request-scoped:
//! the request, the response under construction, the [`Continuation`] naming
//! the remaining stages, request attributes and a lazily acquired pooled
//! connection. Contexts are never shared between invocations.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::component::{Filter, Handler};
use crate::error::InvocationError;
use crate::pool::{Connection, ConnectionPool, PooledConnection};

/// Request verbs with a dedicated handler entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Verb {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
    /// `OPTIONS`
    Options,
    /// `TRACE`
    Trace,
}

/// Inbound request as seen by components.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Request {
    #[serde(rename = "method")]
    verb: Verb,
    path: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session: Option<String>,
}

impl Request {
    /// Creates a request without headers or body.
    #[must_use]
    pub fn new(verb: Verb, path: impl Into<String>) -> Self {
        Self {
            verb,
            path: path.into(),
            headers: BTreeMap::new(),
            body: String::new(),
            session: None,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Associates the request with a session.
    #[must_use]
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// Request verb.
    #[must_use]
    pub const fn verb(&self) -> Verb {
        self.verb
    }

    /// Request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Looks up a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Request body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Session identifier, when the request belongs to one.
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }
}

/// Response under construction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Response {
    status: u16,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    body: String,
}

impl Default for Response {
    fn default() -> Self {
        Self::with_status(200)
    }
}

impl Response {
    /// Empty response with `status`.
    #[must_use]
    pub const fn with_status(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }

    /// Status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Sets the status code.
    pub const fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// Looks up a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Sets a header, replacing any previous value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Appends to the body.
    pub fn write(&mut self, text: &str) {
        self.body.push_str(text);
    }

    /// Body written so far.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }
}

/// One stage of a request pipeline.
#[derive(Clone)]
pub enum Stage {
    /// A filter that may pass control on.
    Filter(Arc<dyn Filter>),
    /// The terminal handler.
    Handler(Arc<dyn Handler>),
}

/// The remaining stages of a request pipeline.
#[derive(Clone)]
pub struct Continuation {
    stages: Arc<[Stage]>,
    cursor: usize,
}

impl Continuation {
    /// Pipeline running `stages` in order.
    #[must_use]
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages: stages.into(),
            cursor: 0,
        }
    }

    /// Pipeline with nothing left to run.
    #[must_use]
    pub fn terminal() -> Self {
        Self::new(Vec::new())
    }

    /// Returns `true` when every stage has been entered.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.stages.len()
    }

    fn advance(&mut self) -> Option<Stage> {
        let stage = self.stages.get(self.cursor).cloned();
        if stage.is_some() {
            self.cursor += 1;
        }
        stage
    }
}

impl std::fmt::Debug for Continuation {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Continuation")
            .field("stages", &self.stages.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// State owned by a single invocation.
pub struct RequestContext {
    request: Request,
    response: Response,
    continuation: Continuation,
    attributes: BTreeMap<String, String>,
    pool: Option<Arc<ConnectionPool>>,
    connection: Option<PooledConnection>,
}

impl RequestContext {
    /// Context for `request` that will run `continuation`.
    #[must_use]
    pub fn new(request: Request, continuation: Continuation) -> Self {
        Self {
            request,
            response: Response::default(),
            continuation,
            attributes: BTreeMap::new(),
            pool: None,
            connection: None,
        }
    }

    /// Makes the managed connection pool reachable from this invocation.
    #[must_use]
    pub fn with_pool(mut self, pool: Option<Arc<ConnectionPool>>) -> Self {
        self.pool = pool;
        self
    }

    /// Inbound request.
    #[must_use]
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Response under construction.
    #[must_use]
    pub const fn response(&self) -> &Response {
        &self.response
    }

    /// Mutable access to the response.
    pub const fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Looks up a request attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Sets a request attribute and returns the previous value.
    pub fn set_attribute(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.attributes.insert(name.into(), value.into())
    }

    /// Removes a request attribute.
    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        self.attributes.remove(name)
    }

    /// Passes control to the next stage. Running past the last stage is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Propagates the failure of any later stage.
    pub fn proceed(&mut self) -> Result<(), InvocationError> {
        match self.continuation.advance() {
            Some(Stage::Filter(filter)) => filter.do_filter(self),
            Some(Stage::Handler(handler)) => handler.service(self),
            None => Ok(()),
        }
    }

    /// Borrows a pooled connection, acquiring one on first use. The
    /// connection returns to the pool when the context is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::NoDataSource`] when no pool is configured,
    /// or the pool's failure when none can be acquired.
    pub fn connection(&mut self) -> Result<&mut dyn Connection, InvocationError> {
        if self.connection.is_none() {
            let pool = self.pool.as_ref().ok_or(InvocationError::NoDataSource)?;
            self.connection = Some(ConnectionPool::acquire(pool)?);
        }
        match self.connection.as_deref_mut() {
            Some(connection) => Ok(connection),
            None => Err(InvocationError::NoDataSource),
        }
    }

    /// Ends the invocation, releasing its connection, and yields the response.
    #[must_use]
    pub fn into_response(self) -> Response {
        self.response
    }
}
