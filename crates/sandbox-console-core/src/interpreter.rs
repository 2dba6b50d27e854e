//! Command Interpreter: owns the transcript and runs operator commands.
//!
//! Synchronous work (echo, history, built-ins without I/O) is finished before
//! [`Console::submit`] returns. Anything that suspends comes back as a
//! [`PendingCommand`] for the host to drive; its lines land whenever it
//! completes, so concurrent commands append in completion order.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::{Rc, Weak};

use futures::FutureExt;
use futures::future::{LocalBoxFuture, join_all};

use crate::capture::{CaptureBuffer, CapturedEntry, SinkId};
use crate::config::ConsoleConfig;
use crate::error::SinkError;
use crate::format::{format_arguments, format_value};
use crate::history::HistoryStore;
use crate::host::{EvalMode, Host};
use crate::lines::{ConsoleLine, LineBuffer, LineLevel};
use crate::markup::{TokenClass, escape_html, pre_block, span};
use crate::value::Value;

pub type PendingCommand = LocalBoxFuture<'static, ()>;

pub const READY_BANNER: &str =
    r#"Embedded console ready. Type <span class="tok-string">help</span> or run JS."#;
pub const FETCH_BODY_LIMIT: usize = 2500;
pub const HISTORY_LISTING_LIMIT: usize = 50;

const TRUNCATION_MARKER: &str = "\n…(truncated)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Help,
    Clear,
    History,
    Echo,
    Date,
    Fetch,
    WorkerRegister,
    WorkerUnregister,
    Queue,
}

impl Builtin {
    pub const ALL: [Builtin; 9] = [
        Builtin::Help,
        Builtin::Clear,
        Builtin::History,
        Builtin::Echo,
        Builtin::Date,
        Builtin::Fetch,
        Builtin::WorkerRegister,
        Builtin::WorkerUnregister,
        Builtin::Queue,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Help => "help",
            Builtin::Clear => "clear",
            Builtin::History => "history",
            Builtin::Echo => "echo",
            Builtin::Date => "date",
            Builtin::Fetch => "fetch",
            Builtin::WorkerRegister => "sw.register",
            Builtin::WorkerUnregister => "sw.unregister",
            Builtin::Queue => "mindbox.queue",
        }
    }

    /// Exact, case-sensitive match on the first token.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }

    fn usage(self) -> &'static str {
        match self {
            Builtin::Echo => "echo <text>",
            Builtin::Fetch => "fetch [url]",
            other => other.name(),
        }
    }

    fn summary(self, config: &ConsoleConfig) -> String {
        match self {
            Builtin::Help => "list commands".to_string(),
            Builtin::Clear => "clear output (or Ctrl+L)".to_string(),
            Builtin::History => "show command history".to_string(),
            Builtin::Echo => "print text".to_string(),
            Builtin::Date => "current date and time".to_string(),
            Builtin::Fetch => format!("request a URL (default {})", escape_html(&config.default_fetch_url)),
            Builtin::WorkerRegister => "register the Service Worker".to_string(),
            Builtin::WorkerUnregister => "remove Service Worker registrations".to_string(),
            Builtin::Queue => format!("show {}", escape_html(&config.queue_path.join("."))),
        }
    }
}

/// Handle to a console instance. Clones share the same transcript.
#[derive(Clone)]
pub struct Console {
    inner: Rc<ConsoleInner>,
}

struct ConsoleInner {
    config: ConsoleConfig,
    host: Host,
    lines: RefCell<LineBuffer>,
    history: RefCell<HistoryStore>,
    render_hook: RefCell<Option<Rc<dyn Fn()>>>,
    mounted: RefCell<Option<(Rc<CaptureBuffer>, SinkId)>>,
}

impl Console {
    pub fn new(config: ConsoleConfig, host: Host, history: HistoryStore) -> Self {
        Self {
            inner: Rc::new(ConsoleInner {
                config,
                host,
                lines: RefCell::new(LineBuffer::new()),
                history: RefCell::new(history),
                render_hook: RefCell::new(None),
                mounted: RefCell::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.inner.config
    }

    /// Called after every transcript mutation.
    pub fn set_render_hook(&self, hook: impl Fn() + 'static) {
        *self.inner.render_hook.borrow_mut() = Some(Rc::new(hook));
    }

    /// Claims the capture sink, prints the ready banner, and replays
    /// everything captured so far.
    pub fn mount(&self, capture: &Rc<CaptureBuffer>) {
        self.unmount();

        let console = Rc::downgrade(&self.inner);
        let id = capture.register_sink(Rc::new(move |entry: &CapturedEntry| {
            let inner = Weak::upgrade(&console)
                .ok_or_else(|| SinkError("console was dropped".to_string()))?;
            Console { inner }.print_captured(entry)
        }));
        *self.inner.mounted.borrow_mut() = Some((Rc::clone(capture), id));

        self.append(LineLevel::Info, READY_BANNER);
        let replayed = self.drain_captured();
        tracing::debug!(replayed, "embedded console mounted");
    }

    /// Releases the capture sink if this console still owns it.
    pub fn unmount(&self) {
        let mounted = self.inner.mounted.borrow_mut().take();
        if let Some((capture, id)) = mounted {
            capture.unregister_sink(id);
        }
    }

    /// Replays queued captured entries; returns how many were printed.
    pub fn drain_captured(&self) -> usize {
        let capture = self
            .inner
            .mounted
            .borrow()
            .as_ref()
            .map(|(capture, _)| Rc::clone(capture));
        let Some(capture) = capture else {
            return 0;
        };

        let entries = capture.drain();
        let count = entries.len();
        for entry in &entries {
            if let Err(error) = self.print_captured(entry) {
                tracing::warn!(%error, "dropped captured entry during replay");
            }
        }
        count
    }

    /// Renders one captured entry into the transcript.
    ///
    /// Fails only when the transcript is mid-update, in which case the
    /// capture buffer keeps the entry for the next drain.
    pub fn print_captured(&self, entry: &CapturedEntry) -> Result<(), SinkError> {
        let Ok(mut lines) = self.inner.lines.try_borrow_mut() else {
            return Err(SinkError("transcript is busy".to_string()));
        };

        match LineLevel::from_captured(entry.level) {
            None => lines.clear(),
            Some(level) if entry.args.is_empty() => {
                lines.append(level, span(TokenClass::Dim, "(no output)"), entry.timestamp);
            }
            Some(level) => {
                lines.append(level, format_arguments(&entry.args), entry.timestamp);
            }
        }
        drop(lines);
        self.rendered();
        Ok(())
    }

    /// Runs one operator command.
    pub fn submit(&self, raw: &str) -> Option<PendingCommand> {
        let code = raw.trim();
        if code.is_empty() {
            return None;
        }

        self.append(
            LineLevel::Cmd,
            format!("{} {}", span(TokenClass::Dim, ">"), escape_html(code)),
        );
        self.inner.history.borrow_mut().push(code);

        let command = code.split_whitespace().next().unwrap_or_default();
        let rest = code[command.len()..].trim();

        let Some(builtin) = Builtin::from_name(command) else {
            return Some(self.evaluate(code));
        };
        match builtin {
            Builtin::Help => self.help(),
            Builtin::Clear => self.clear(),
            Builtin::History => self.print_history(),
            Builtin::Echo => self.append(LineLevel::Log, escape_html(rest)),
            Builtin::Date => {
                let now = self.inner.host.clock.date_string();
                self.append(LineLevel::Log, span(TokenClass::String, &now));
            }
            Builtin::Fetch => return Some(self.fetch_url(rest)),
            Builtin::WorkerRegister => return self.register_worker(),
            Builtin::WorkerUnregister => return self.unregister_workers(),
            Builtin::Queue => self.print_queue(),
        }
        None
    }

    pub fn help(&self) {
        let mut markup = format!("{}:", span(TokenClass::Key, "Commands"));
        for builtin in Builtin::ALL {
            let _ = write!(
                markup,
                "<br>{} - {}",
                span(TokenClass::String, builtin.usage()),
                builtin.summary(&self.inner.config)
            );
        }
        let _ = write!(
            markup,
            "<br>{} - runs as JS in the page context",
            span(TokenClass::Dim, "Any other line")
        );
        self.append(LineLevel::Info, markup);
    }

    pub fn clear(&self) {
        self.inner.lines.borrow_mut().clear();
        self.rendered();
    }

    fn print_history(&self) {
        let listing = {
            let history = self.inner.history.borrow();
            history
                .recent(HISTORY_LISTING_LIMIT)
                .map(|(position, command)| format!("{}. {command}", position + 1))
                .collect::<Vec<_>>()
        };
        if listing.is_empty() {
            self.append(LineLevel::Info, span(TokenClass::Dim, "History is empty"));
            return;
        }
        self.append(LineLevel::Info, pre_block(&escape_html(&listing.join("\n"))));
    }

    /// GETs `url` (or the configured default) and prints status and body.
    pub fn fetch_url(&self, url: &str) -> PendingCommand {
        let target = match url.trim() {
            "" => self.inner.config.default_fetch_url.trim().to_string(),
            explicit => explicit.to_string(),
        };
        self.append(
            LineLevel::Info,
            format!("fetch {} …", span(TokenClass::String, &target)),
        );

        let console = self.clone();
        async move {
            let http = Rc::clone(&console.inner.host.http);
            match http.get(&target).await {
                Ok(response) => {
                    console.append(
                        LineLevel::Info,
                        format!(
                            "status {} {}",
                            response.status,
                            escape_html(&response.status_text)
                        ),
                    );
                    console.append(
                        LineLevel::Log,
                        pre_block(&escape_html(&truncate_body(&response.body))),
                    );
                }
                Err(error) => {
                    tracing::debug!(%error, url = %target, "fetch command failed");
                    console.append(LineLevel::Error, format_value(&error.into_value()));
                }
            }
        }
        .boxed_local()
    }

    /// Registers the configured worker script; `None` when the page has no
    /// worker support.
    pub fn register_worker(&self) -> Option<PendingCommand> {
        let Some(workers) = self.inner.host.workers.clone() else {
            self.append(
                LineLevel::Warn,
                span(TokenClass::Dim, "Service Worker API is unavailable in this browser"),
            );
            return None;
        };

        let path = self.inner.config.service_worker_path.clone();
        self.append(
            LineLevel::Info,
            format!("register {} …", span(TokenClass::String, &path)),
        );

        let console = self.clone();
        Some(
            async move {
                match workers.register(&path).await {
                    Ok(scope) => console.append(
                        LineLevel::Info,
                        format!("registered scope: {}", span(TokenClass::String, &scope)),
                    ),
                    Err(error) => console.append(LineLevel::Error, format_value(&error.into_value())),
                }
            }
            .boxed_local(),
        )
    }

    /// Unregisters every worker registration and prints each outcome.
    pub fn unregister_workers(&self) -> Option<PendingCommand> {
        let Some(workers) = self.inner.host.workers.clone() else {
            self.append(
                LineLevel::Warn,
                span(TokenClass::Dim, "Service Worker API is unavailable"),
            );
            return None;
        };

        let console = self.clone();
        Some(
            async move {
                let registrations = match workers.registrations().await {
                    Ok(registrations) => registrations,
                    Err(error) => {
                        console.append(LineLevel::Error, format_value(&error.into_value()));
                        return;
                    }
                };
                if registrations.is_empty() {
                    console.append(LineLevel::Info, span(TokenClass::Dim, "No registrations"));
                    return;
                }

                let outcomes = join_all(
                    registrations
                        .iter()
                        .map(|registration| registration.unregister()),
                )
                .await
                .into_iter()
                .collect::<Result<Vec<bool>, _>>();
                match outcomes {
                    Ok(outcomes) => {
                        let encoded = serde_json::Value::from(outcomes).to_string();
                        console.append(
                            LineLevel::Info,
                            format!("unregister: {}", escape_html(&encoded)),
                        );
                    }
                    Err(error) => console.append(LineLevel::Error, format_value(&error.into_value())),
                }
            }
            .boxed_local(),
        )
    }

    /// Prints the tracker queue, or `null` when it is missing or empty-ish.
    pub fn print_queue(&self) {
        let queue = self
            .inner
            .host
            .globals
            .lookup(&self.inner.config.queue_path)
            .filter(Value::is_truthy)
            .unwrap_or(Value::Null);
        let label = escape_html(&self.inner.config.queue_path.join("."));
        self.append(LineLevel::Info, format!("{label} = {}", format_value(&queue)));
    }

    /// Evaluates `code` as an expression, retrying as statements on any failure.
    fn evaluate(&self, code: &str) -> PendingCommand {
        let console = self.clone();
        let code = code.to_string();
        async move {
            let evaluator = Rc::clone(&console.inner.host.evaluator);
            let outcome = match evaluator.run(&code, EvalMode::Expression).await {
                Ok(value) => Ok(value),
                Err(error) => {
                    tracing::debug!(%error, "expression form failed, retrying as statements");
                    evaluator.run(&code, EvalMode::Statements).await
                }
            };
            match outcome {
                Ok(value) if value.is_undefined() => {}
                Ok(value) => console.append(LineLevel::Result, format_value(&value)),
                Err(error) => console.append(LineLevel::Error, format_value(&error.into_value())),
            }
        }
        .boxed_local()
    }

    /// Copies the transcript as plain text.
    pub fn copy_transcript(&self) -> Option<PendingCommand> {
        let text = self
            .inner
            .lines
            .borrow()
            .plain_text(self.inner.host.clock.utc_offset());
        self.copy_text(text)
    }

    pub fn copy_text(&self, text: String) -> Option<PendingCommand> {
        let Some(clipboard) = self.inner.host.clipboard.clone() else {
            self.append(LineLevel::Warn, "copy failed");
            return None;
        };

        let console = self.clone();
        Some(
            async move {
                match clipboard.write_text(&text).await {
                    Ok(()) => console.append(LineLevel::Info, "copied"),
                    Err(error) => {
                        tracing::debug!(%error, "clipboard write failed");
                        console.append(LineLevel::Warn, "copy failed");
                    }
                }
            }
            .boxed_local(),
        )
    }

    pub fn lines(&self) -> Vec<ConsoleLine> {
        self.inner.lines.borrow().snapshot()
    }

    /// Visits lines appended after `after_id` without copying the transcript.
    pub fn for_each_line_since(&self, after_id: u64, mut visit: impl FnMut(&ConsoleLine)) {
        for line in self.inner.lines.borrow().since(after_id) {
            visit(line);
        }
    }

    /// Id of the oldest retained line; `None` when the transcript is empty.
    pub fn first_line_id(&self) -> Option<u64> {
        self.inner.lines.borrow().first_id()
    }

    pub fn line_count(&self) -> usize {
        self.inner.lines.borrow().len()
    }

    pub fn history_entries(&self) -> Vec<String> {
        self.inner.history.borrow().entries().to_vec()
    }

    pub fn history_len(&self) -> usize {
        self.inner.history.borrow().len()
    }

    pub fn history_prev(&self) -> String {
        self.inner.history.borrow_mut().prev().to_string()
    }

    pub fn history_next(&self) -> String {
        self.inner.history.borrow_mut().next().to_string()
    }

    pub fn history_reset_cursor(&self) {
        self.inner.history.borrow_mut().reset_cursor();
    }

    fn append(&self, level: LineLevel, body_html: impl Into<String>) {
        let timestamp = self.inner.host.clock.now_ms();
        self.inner
            .lines
            .borrow_mut()
            .append(level, body_html, timestamp);
        self.rendered();
    }

    fn rendered(&self) {
        let hook = self.inner.render_hook.borrow().clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(FETCH_BODY_LIMIT) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &body[..cut]),
        None => body.to_string(),
    }
}
