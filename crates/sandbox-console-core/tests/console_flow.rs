use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use chrono::{FixedOffset, Offset, Utc};
use futures::channel::oneshot;
use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use sandbox_console_core::{
    CaptureBuffer, Clipboard, Clock, Console, ConsoleConfig, ConsoleLine, ErrorValue, EvalError,
    EvalMode, Evaluator, GlobalScope, HistoryStore, Host, HostError, HttpClient, HttpResponse,
    KeyValueStore, Level, LineLevel, MemoryStore, PendingCommand, StorageError, Value,
    WorkerRegistration, WorkerRegistry,
};

const NOW: i64 = 1_767_225_600_000;

struct FixedClock;

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        NOW
    }

    fn date_string(&self) -> String {
        "Thu Jan 01 2026 00:00:00 GMT+0000".to_string()
    }

    fn utc_offset(&self) -> FixedOffset {
        Utc.fix()
    }
}

/// Answers from a fixed table keyed by source and mode, recording each call.
#[derive(Default)]
struct TableEvaluator {
    answers: HashMap<(String, EvalMode), Result<Value, EvalError>>,
    calls: RefCell<Vec<(String, EvalMode)>>,
}

impl TableEvaluator {
    fn answer(mut self, source: &str, mode: EvalMode, result: Result<Value, EvalError>) -> Self {
        self.answers.insert((source.to_string(), mode), result);
        self
    }
}

#[async_trait(?Send)]
impl Evaluator for TableEvaluator {
    async fn run(&self, source: &str, mode: EvalMode) -> Result<Value, EvalError> {
        self.calls.borrow_mut().push((source.to_string(), mode));
        self.answers
            .get(&(source.to_string(), mode))
            .cloned()
            .unwrap_or_else(|| {
                Err(EvalError::Syntax(Value::Error(ErrorValue::new(
                    "SyntaxError",
                    format!("Unexpected token in {source}"),
                ))))
            })
    }
}

/// Serves canned responses; a URL registered as gated waits for its sender.
#[derive(Default)]
struct FakeHttp {
    responses: HashMap<String, Result<HttpResponse, HostError>>,
    gates: RefCell<HashMap<String, oneshot::Receiver<()>>>,
    requested: RefCell<Vec<String>>,
}

impl FakeHttp {
    fn respond(mut self, url: &str, status: u16, body: &str) -> Self {
        self.responses.insert(
            url.to_string(),
            Ok(HttpResponse {
                status,
                status_text: "OK".to_string(),
                body: body.to_string(),
            }),
        );
        self
    }

    fn fail(mut self, url: &str, message: &str) -> Self {
        self.responses
            .insert(url.to_string(), Err(HostError::Network(message.to_string())));
        self
    }

    fn gate(&self, url: &str) -> oneshot::Sender<()> {
        let (sender, receiver) = oneshot::channel();
        self.gates.borrow_mut().insert(url.to_string(), receiver);
        sender
    }
}

#[async_trait(?Send)]
impl HttpClient for FakeHttp {
    async fn get(&self, url: &str) -> Result<HttpResponse, HostError> {
        self.requested.borrow_mut().push(url.to_string());
        let gate = self.gates.borrow_mut().remove(url);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.responses
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(HostError::Network("Failed to fetch".to_string())))
    }
}

struct FakeRegistration {
    outcome: bool,
}

#[async_trait(?Send)]
impl WorkerRegistration for FakeRegistration {
    fn scope(&self) -> String {
        "https://sandbox.test/".to_string()
    }

    async fn unregister(&self) -> Result<bool, HostError> {
        Ok(self.outcome)
    }
}

#[derive(Default)]
struct FakeWorkers {
    outcomes: Vec<bool>,
    registered: RefCell<Vec<String>>,
}

#[async_trait(?Send)]
impl WorkerRegistry for FakeWorkers {
    async fn register(&self, script_path: &str) -> Result<String, HostError> {
        self.registered.borrow_mut().push(script_path.to_string());
        Ok("https://sandbox.test/".to_string())
    }

    async fn registrations(&self) -> Result<Vec<Rc<dyn WorkerRegistration>>, HostError> {
        Ok(self
            .outcomes
            .iter()
            .map(|outcome| Rc::new(FakeRegistration { outcome: *outcome }) as Rc<dyn WorkerRegistration>)
            .collect())
    }
}

#[derive(Default)]
struct FakeGlobals {
    values: HashMap<Vec<String>, Value>,
}

impl GlobalScope for FakeGlobals {
    fn lookup(&self, path: &[String]) -> Option<Value> {
        self.values.get(path).cloned()
    }
}

#[derive(Default)]
struct FakeClipboard {
    fail: bool,
    written: RefCell<Vec<String>>,
}

#[async_trait(?Send)]
impl Clipboard for FakeClipboard {
    async fn write_text(&self, text: &str) -> Result<(), HostError> {
        if self.fail {
            return Err(HostError::Unavailable("clipboard"));
        }
        self.written.borrow_mut().push(text.to_string());
        Ok(())
    }
}

struct SharedStore(Rc<MemoryStore>);

impl KeyValueStore for SharedStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.0.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.0.set(key, value)
    }
}

struct Harness {
    console: Console,
    capture: Rc<CaptureBuffer>,
    evaluator: Rc<TableEvaluator>,
    http: Rc<FakeHttp>,
    store: Rc<MemoryStore>,
    pool: LocalPool,
}

impl Harness {
    fn run(&mut self, command: &str) {
        if let Some(pending) = self.console.submit(command) {
            self.drive(pending);
        }
    }

    fn drive(&mut self, pending: PendingCommand) {
        self.pool.run_until(pending);
    }

    fn spawn(&self, command: &str) {
        if let Some(pending) = self.console.submit(command) {
            self.pool
                .spawner()
                .spawn_local(pending)
                .unwrap_or_else(|_| unreachable!());
        }
    }

    fn last(&self) -> ConsoleLine {
        self.console
            .lines()
            .pop()
            .unwrap_or_else(|| unreachable!("transcript is empty"))
    }

    fn bodies(&self) -> Vec<(LineLevel, String)> {
        self.console
            .lines()
            .into_iter()
            .map(|line| (line.level, line.body_html))
            .collect()
    }
}

struct Builder {
    config: ConsoleConfig,
    evaluator: TableEvaluator,
    http: FakeHttp,
    globals: FakeGlobals,
    workers: Option<FakeWorkers>,
    clipboard: Option<FakeClipboard>,
}

impl Builder {
    fn new() -> Self {
        Self {
            config: ConsoleConfig::default(),
            evaluator: TableEvaluator::default(),
            http: FakeHttp::default(),
            globals: FakeGlobals::default(),
            workers: None,
            clipboard: None,
        }
    }

    fn build(self) -> Harness {
        let clock: Rc<dyn Clock> = Rc::new(FixedClock);
        let evaluator = Rc::new(self.evaluator);
        let http = Rc::new(self.http);
        let store = Rc::new(MemoryStore::new());

        let mut host = Host::new(
            Rc::clone(&evaluator) as Rc<dyn Evaluator>,
            Rc::clone(&http) as Rc<dyn HttpClient>,
            Rc::new(self.globals),
            Rc::clone(&clock),
        );
        if let Some(workers) = self.workers {
            host = host.with_workers(Rc::new(workers));
        }
        if let Some(clipboard) = self.clipboard {
            host = host.with_clipboard(Rc::new(clipboard));
        }

        let history = HistoryStore::load(
            self.config.history_key("/"),
            Box::new(SharedStore(Rc::clone(&store))),
        );
        let console = Console::new(self.config, host, history);
        let capture = Rc::new(CaptureBuffer::new(clock));
        Harness {
            console,
            capture,
            evaluator,
            http,
            store,
            pool: LocalPool::new(),
        }
    }

    fn mounted(self) -> Harness {
        let harness = self.build();
        harness.console.mount(&harness.capture);
        harness
    }
}

fn number(text: &str) -> String {
    format!(r#"<span class="tok-number">{text}</span>"#)
}

#[test]
fn mount_replays_queued_entries_once_then_goes_live() {
    let harness = Builder::new().build();
    harness.capture.capture(Level::Log, vec![Value::from("early"), Value::from(1_i64)]);
    harness.capture.capture(Level::Warn, Vec::new());

    harness.console.mount(&harness.capture);
    assert!(harness.capture.is_empty());
    harness.capture.capture(Level::Info, vec![Value::from("live")]);

    let bodies = harness.bodies();
    assert_eq!(bodies.len(), 4);
    assert!(bodies[0].1.starts_with("Embedded console ready."));
    assert_eq!(
        bodies[1],
        (
            LineLevel::Log,
            format!(r#"early <span class="tok-dim"> </span>{}"#, number("1"))
        )
    );
    assert_eq!(
        bodies[2],
        (LineLevel::Warn, r#"<span class="tok-dim">(no output)</span>"#.to_string())
    );
    assert_eq!(bodies[3], (LineLevel::Info, "live".to_string()));
    assert!(harness.capture.is_empty());
}

#[test]
fn replayed_entries_keep_their_capture_time() {
    let harness = Builder::new().build();
    harness.capture.capture(Level::Debug, vec![Value::Null]);
    harness.console.mount(&harness.capture);
    let lines = harness.console.lines();
    assert_eq!(lines[1].timestamp, NOW);
    assert_eq!(lines[1].level, LineLevel::Debug);
}

#[test]
fn captured_clear_empties_the_transcript() {
    let harness = Builder::new().mounted();
    harness.capture.capture(Level::Log, vec![Value::from("soon gone")]);
    harness.capture.capture(Level::Clear, Vec::new());
    assert_eq!(harness.console.line_count(), 0);
}

#[test]
fn unmount_returns_capture_to_queueing() {
    let harness = Builder::new().mounted();
    harness.console.unmount();
    harness.capture.capture(Level::Error, vec![Value::from("later")]);
    assert_eq!(harness.capture.len(), 1);
    assert!(!harness.capture.has_sink());
}

#[test]
fn dropped_console_leaves_entries_queued() {
    let harness = Builder::new().mounted();
    let capture = Rc::clone(&harness.capture);
    drop(harness);
    capture.capture(Level::Log, vec![Value::from("orphan")]);
    assert_eq!(capture.len(), 1);
}

#[test]
fn echo_prints_rest_of_line_escaped() {
    let mut harness = Builder::new().mounted();
    harness.run("echo  hello world");
    let bodies = harness.bodies();
    assert_eq!(
        bodies[bodies.len() - 2],
        (
            LineLevel::Cmd,
            r#"<span class="tok-dim">&gt;</span> echo  hello world"#.to_string()
        )
    );
    assert_eq!(bodies[bodies.len() - 1], (LineLevel::Log, "hello world".to_string()));

    harness.run("echo <b>");
    assert_eq!(harness.last().body_html, "&lt;b&gt;");
}

#[test]
fn blank_input_is_ignored() {
    let mut harness = Builder::new().mounted();
    let before = harness.console.line_count();
    harness.run("   \t ");
    assert_eq!(harness.console.line_count(), before);
    assert_eq!(harness.console.history_len(), 0);
}

#[test]
fn clear_empties_a_full_transcript() {
    let mut harness = Builder::new().mounted();
    for index in 0..900 {
        harness.capture.capture(Level::Log, vec![Value::from(index as i64)]);
    }
    assert_eq!(harness.console.line_count(), 800);
    let lines = harness.console.lines();
    assert_eq!(lines[0].body_html, number("100"));

    harness.run("clear");
    assert_eq!(harness.console.line_count(), 0);
    assert_eq!(harness.console.history_entries(), ["clear"]);
}

#[test]
fn date_prints_clock_text_as_string_token() {
    let mut harness = Builder::new().mounted();
    harness.run("date");
    assert_eq!(
        harness.last().body_html,
        r#"<span class="tok-string">Thu Jan 01 2026 00:00:00 GMT+0000</span>"#
    );
}

#[test]
fn help_lists_every_builtin() {
    let mut harness = Builder::new().mounted();
    harness.run("help");
    let help = harness.last();
    assert_eq!(help.level, LineLevel::Info);
    for name in [
        "help",
        "clear",
        "history",
        "echo &lt;text&gt;",
        "date",
        "fetch [url]",
        "sw.register",
        "sw.unregister",
        "mindbox.queue",
    ] {
        assert!(
            help.body_html
                .contains(&format!(r#"<span class="tok-string">{name}</span>"#)),
            "help is missing {name}"
        );
    }
    assert!(help.body_html.contains("/mindbox-tracker.js"));
}

#[test]
fn history_lists_recent_commands_with_true_positions() -> anyhow::Result<()> {
    let mut harness = Builder::new().mounted();
    for index in 0..55 {
        harness.run(&format!("echo {index}"));
    }
    harness.run("history");

    let listing = harness.last().body_html;
    assert!(listing.starts_with(r#"<pre class="pre">7. echo 6"#));
    assert!(listing.ends_with("56. history</pre>"));
    assert_eq!(listing.matches('\n').count(), 49);

    let persisted = harness
        .store
        .get("__embeddedConsoleHistory:/")?
        .unwrap_or_default();
    let persisted: Vec<String> = serde_json::from_str(&persisted)?;
    assert_eq!(persisted.len(), 56);
    assert_eq!(persisted.last().map(String::as_str), Some("history"));
    Ok(())
}

#[test]
fn history_navigation_passes_through() {
    let mut harness = Builder::new().mounted();
    harness.run("echo a");
    harness.run("echo a");
    harness.run("date");
    assert_eq!(harness.console.history_len(), 2);
    assert_eq!(harness.console.history_prev(), "date");
    assert_eq!(harness.console.history_prev(), "echo a");
    assert_eq!(harness.console.history_next(), "date");
    harness.console.history_reset_cursor();
    assert_eq!(harness.console.history_next(), "");
}

#[test]
fn expression_result_is_printed() {
    let mut builder = Builder::new();
    builder.evaluator = TableEvaluator::default().answer("1 + 1", EvalMode::Expression, Ok(Value::from(2_i64)));
    let mut harness = builder.mounted();

    harness.run("1 + 1");
    assert_eq!(harness.last().level, LineLevel::Result);
    assert_eq!(harness.last().body_html, number("2"));
    assert_eq!(
        *harness.evaluator.calls.borrow(),
        vec![("1 + 1".to_string(), EvalMode::Expression)]
    );
}

#[test]
fn statement_form_runs_after_expression_fails() {
    let source = "let x = 1; x + 1";
    let mut builder = Builder::new();
    builder.evaluator = TableEvaluator::default().answer(source, EvalMode::Statements, Ok(Value::from(2_i64)));
    let mut harness = builder.mounted();

    harness.run(source);
    assert_eq!(harness.last().level, LineLevel::Result);
    assert_eq!(harness.last().body_html, number("2"));
    assert_eq!(
        *harness.evaluator.calls.borrow(),
        vec![
            (source.to_string(), EvalMode::Expression),
            (source.to_string(), EvalMode::Statements),
        ]
    );
}

#[test]
fn only_statement_failure_is_reported() {
    let source = "throw new Error('boom')";
    let mut builder = Builder::new();
    builder.evaluator = TableEvaluator::default().answer(
        source,
        EvalMode::Statements,
        Err(EvalError::Thrown(Value::Error(ErrorValue::new("Error", "boom")))),
    );
    let mut harness = builder.mounted();

    harness.run(source);
    let line = harness.last();
    assert_eq!(line.level, LineLevel::Error);
    assert_eq!(line.body_html, r#"<span class="tok-error">boom</span>"#);
    assert!(!harness.bodies().iter().any(|(_, body)| body.contains("Unexpected token")));
}

#[test]
fn undefined_result_prints_nothing() {
    let mut builder = Builder::new();
    builder.evaluator = TableEvaluator::default().answer("void 0", EvalMode::Expression, Ok(Value::Undefined));
    let mut harness = builder.mounted();

    harness.run("void 0");
    assert_eq!(harness.last().level, LineLevel::Cmd);
}

#[test]
fn fetch_prints_progress_status_and_truncated_body() {
    let mut builder = Builder::new();
    builder.http = FakeHttp::default().respond("/big.txt", 200, &"x".repeat(3000));
    let mut harness = builder.mounted();

    harness.run("fetch /big.txt");
    let bodies = harness.bodies();
    let tail = &bodies[bodies.len() - 3..];
    assert_eq!(
        tail[0],
        (
            LineLevel::Info,
            r#"fetch <span class="tok-string">/big.txt</span> …"#.to_string()
        )
    );
    assert_eq!(tail[1], (LineLevel::Info, "status 200 OK".to_string()));
    assert_eq!(tail[2].0, LineLevel::Log);
    assert_eq!(
        tail[2].1,
        format!(r#"<pre class="pre">{}
…(truncated)</pre>"#, "x".repeat(2500))
    );
}

#[test]
fn fetch_without_url_uses_configured_default() {
    let mut builder = Builder::new();
    builder.http = FakeHttp::default().respond("/mindbox-tracker.js", 200, "ok");
    let mut harness = builder.mounted();

    harness.run("fetch");
    assert_eq!(*harness.http.requested.borrow(), vec!["/mindbox-tracker.js".to_string()]);
    assert_eq!(harness.last().body_html, r#"<pre class="pre">ok</pre>"#);
}

#[test]
fn fetch_failure_is_an_error_line() {
    let mut builder = Builder::new();
    builder.http = FakeHttp::default().fail("/down", "Failed to fetch");
    let mut harness = builder.mounted();

    harness.run("fetch /down");
    let line = harness.last();
    assert_eq!(line.level, LineLevel::Error);
    assert_eq!(line.body_html, r#"<span class="tok-error">Failed to fetch</span>"#);
}

#[test]
fn async_commands_append_in_completion_order() {
    let mut builder = Builder::new();
    builder.http = FakeHttp::default()
        .respond("/slow", 200, "slow")
        .respond("/fast", 200, "fast");
    let mut harness = builder.mounted();
    let slow = harness.http.gate("/slow");
    let fast = harness.http.gate("/fast");

    harness.spawn("fetch /slow");
    harness.spawn("fetch /fast");
    harness.spawn("echo meanwhile");
    harness.pool.run_until_stalled();
    assert_eq!(harness.last().body_html, "meanwhile");

    let _ = fast.send(());
    harness.pool.run_until_stalled();
    let _ = slow.send(());
    harness.pool.run_until_stalled();

    let bodies = harness
        .bodies()
        .into_iter()
        .filter(|(level, _)| *level == LineLevel::Log)
        .map(|(_, body)| body)
        .collect::<Vec<_>>();
    assert_eq!(
        bodies,
        vec![
            "meanwhile".to_string(),
            r#"<pre class="pre">fast</pre>"#.to_string(),
            r#"<pre class="pre">slow</pre>"#.to_string(),
        ]
    );
}

#[test]
fn worker_commands_warn_without_support() {
    let mut harness = Builder::new().mounted();
    assert!(harness.console.submit("sw.register").is_none());
    assert_eq!(harness.last().level, LineLevel::Warn);
    assert!(harness.last().body_html.contains("unavailable"));

    harness.run("sw.unregister");
    assert_eq!(harness.last().level, LineLevel::Warn);
}

#[test]
fn worker_register_reports_scope() {
    let mut builder = Builder::new();
    builder.workers = Some(FakeWorkers::default());
    let mut harness = builder.mounted();

    harness.run("sw.register");
    let bodies = harness.bodies();
    assert_eq!(
        bodies[bodies.len() - 2].1,
        r#"register <span class="tok-string">/mindbox-services-worker.js</span> …"#
    );
    assert_eq!(
        bodies[bodies.len() - 1].1,
        r#"registered scope: <span class="tok-string">https://sandbox.test/</span>"#
    );
}

#[test]
fn worker_unregister_reports_each_outcome() {
    let mut builder = Builder::new();
    builder.workers = Some(FakeWorkers {
        outcomes: vec![true, false],
        ..FakeWorkers::default()
    });
    let mut harness = builder.mounted();

    harness.run("sw.unregister");
    assert_eq!(harness.last().body_html, "unregister: [true,false]");
}

#[test]
fn worker_unregister_with_nothing_registered() {
    let mut builder = Builder::new();
    builder.workers = Some(FakeWorkers::default());
    let mut harness = builder.mounted();

    harness.run("sw.unregister");
    assert_eq!(
        harness.last().body_html,
        r#"<span class="tok-dim">No registrations</span>"#
    );
}

#[test]
fn queue_prints_null_when_absent() {
    let mut harness = Builder::new().mounted();
    harness.run("mindbox.queue");
    assert_eq!(
        harness.last().body_html,
        r#"mindbox.queue = <span class="tok-null">null</span>"#
    );
}

#[test]
fn queue_prints_structured_contents() {
    let mut builder = Builder::new();
    builder.globals.values.insert(
        vec!["mindbox".to_string(), "queue".to_string()],
        Value::array([Value::from("sync")]),
    );
    let mut harness = builder.mounted();

    harness.run("mindbox.queue");
    assert_eq!(
        harness.last().body_html,
        "mindbox.queue = <pre class=\"pre\">[\n  <span class=\"tok-string\">&quot;sync&quot;</span>\n]</pre>"
    );
}

#[test]
fn copy_transcript_uses_clipboard() {
    let mut builder = Builder::new();
    builder.clipboard = Some(FakeClipboard::default());
    let mut harness = builder.mounted();

    harness.run("echo a&b");
    let pending = harness.console.copy_transcript();
    assert!(pending.is_some());
    if let Some(pending) = pending {
        harness.drive(pending);
    }
    assert_eq!(harness.last().body_html, "copied");
}

#[test]
fn copy_reports_failure() {
    let mut builder = Builder::new();
    builder.clipboard = Some(FakeClipboard {
        fail: true,
        ..FakeClipboard::default()
    });
    let mut harness = builder.mounted();

    if let Some(pending) = harness.console.copy_text("x".to_string()) {
        harness.drive(pending);
    }
    assert_eq!(harness.last().level, LineLevel::Warn);
    assert_eq!(harness.last().body_html, "copy failed");

    let harness = Builder::new().mounted();
    assert!(harness.console.copy_transcript().is_none());
    assert_eq!(harness.last().body_html, "copy failed");
}

#[test]
fn render_hook_fires_on_every_mutation() {
    let mut harness = Builder::new().build();
    let renders = Rc::new(Cell::new(0));
    let counter = Rc::clone(&renders);
    harness.console.set_render_hook(move || counter.set(counter.get() + 1));

    harness.console.mount(&harness.capture);
    assert_eq!(renders.get(), 1);
    harness.run("echo hi");
    assert_eq!(renders.get(), 3);
    harness.capture.capture(Level::Log, vec![Value::from("x")]);
    assert_eq!(renders.get(), 4);
    harness.run("clear");
    assert_eq!(renders.get(), 6);
}

/// Appends unseen line bodies to `rendered`, advancing `last_id`.
fn sync_view(console: &Console, last_id: &mut u64, rendered: &mut Vec<String>) {
    console.for_each_line_since(*last_id, |line| {
        rendered.push(line.body_html.clone());
        *last_id = line.id;
    });
}

#[test]
fn incremental_view_sees_each_line_once() {
    let mut harness = Builder::new().mounted();
    let mut rendered = Vec::new();
    let mut last_id = 0;

    sync_view(&harness.console, &mut last_id, &mut rendered);
    let banner_only = rendered.len();
    harness.run("echo one");
    sync_view(&harness.console, &mut last_id, &mut rendered);
    assert_eq!(rendered.len(), banner_only + 2);
    assert_eq!(rendered.last().map(String::as_str), Some("one"));

    sync_view(&harness.console, &mut last_id, &mut rendered);
    assert_eq!(rendered.len(), banner_only + 2);

    harness.run("clear");
    assert_eq!(harness.console.first_line_id(), None);
    harness.run("echo two");
    assert!(harness.console.first_line_id().is_some_and(|first| first > last_id));
    sync_view(&harness.console, &mut last_id, &mut rendered);
    assert_eq!(rendered.last().map(String::as_str), Some("two"));
}

#[test]
fn cyclic_capture_is_rendered_with_marker() {
    let harness = Builder::new().mounted();
    let node = sandbox_console_core::ObjectRef::new();
    node.insert("self", Value::Object(node.downgrade()));
    harness.capture.capture(Level::Log, vec![Value::Object(node)]);
    assert!(harness.last().body_html.contains("[Circular]"));
}
