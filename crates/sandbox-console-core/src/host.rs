//! Collaborators the console drives but does not own.
//!
//! The browser crate implements these against the live page; tests use
//! in-process fakes. Everything runs on one thread, so the async traits are
//! `?Send`.

use std::rc::Rc;

use async_trait::async_trait;
use chrono::{FixedOffset, Local, Offset};

use crate::error::{EvalError, HostError};
use crate::value::Value;

pub trait Clock {
    fn now_ms(&self) -> i64;

    /// Current date and time as the page would print it.
    fn date_string(&self) -> String;

    fn utc_offset(&self) -> FixedOffset;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Local::now().timestamp_millis()
    }

    fn date_string(&self) -> String {
        Local::now().format("%a %b %d %Y %H:%M:%S GMT%z").to_string()
    }

    fn utc_offset(&self) -> FixedOffset {
        Local::now().offset().fix()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvalMode {
    /// Source is a single expression whose value is returned.
    Expression,
    /// Source is a statement list; the completion value is returned.
    Statements,
}

/// Runs operator-entered script against the page's global scope.
///
/// Implementations resolve bare names against the global object and await
/// whatever the script produces before returning.
#[async_trait(?Send)]
pub trait Evaluator {
    async fn run(&self, source: &str, mode: EvalMode) -> Result<Value, EvalError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

#[async_trait(?Send)]
pub trait HttpClient {
    /// Uncached GET returning the full body as text.
    async fn get(&self, url: &str) -> Result<HttpResponse, HostError>;
}

#[async_trait(?Send)]
pub trait WorkerRegistration {
    fn scope(&self) -> String;

    async fn unregister(&self) -> Result<bool, HostError>;
}

#[async_trait(?Send)]
pub trait WorkerRegistry {
    /// Registers the worker script and returns the granted scope.
    async fn register(&self, script_path: &str) -> Result<String, HostError>;

    async fn registrations(&self) -> Result<Vec<Rc<dyn WorkerRegistration>>, HostError>;
}

pub trait GlobalScope {
    /// Follows `path` from the global object; `None` when any step is missing.
    fn lookup(&self, path: &[String]) -> Option<Value>;
}

#[async_trait(?Send)]
pub trait Clipboard {
    async fn write_text(&self, text: &str) -> Result<(), HostError>;
}

/// Bundle of collaborators handed to the interpreter.
///
/// `workers` and `clipboard` are optional because pages may lack the
/// capability; the interpreter reports that instead of attempting the call.
#[derive(Clone)]
pub struct Host {
    pub evaluator: Rc<dyn Evaluator>,
    pub http: Rc<dyn HttpClient>,
    pub globals: Rc<dyn GlobalScope>,
    pub clock: Rc<dyn Clock>,
    pub workers: Option<Rc<dyn WorkerRegistry>>,
    pub clipboard: Option<Rc<dyn Clipboard>>,
}

impl Host {
    pub fn new(
        evaluator: Rc<dyn Evaluator>,
        http: Rc<dyn HttpClient>,
        globals: Rc<dyn GlobalScope>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            evaluator,
            http,
            globals,
            clock,
            workers: None,
            clipboard: None,
        }
    }

    pub fn with_workers(mut self, workers: Rc<dyn WorkerRegistry>) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_clipboard(mut self, clipboard: Rc<dyn Clipboard>) -> Self {
        self.clipboard = Some(clipboard);
        self
    }
}
