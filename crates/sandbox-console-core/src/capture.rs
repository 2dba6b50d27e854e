//! Capture Buffer: early capture of diagnostic output.
//!
//! The buffer exists before any console UI. Each intercepted call becomes a
//! [`CapturedEntry`] that is either handed to the registered sink or queued
//! until one is registered and the queue is drained. An entry is held in
//! exactly one place: the queue, or whatever the sink did with it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Once;

use crate::error::SinkError;
use crate::host::Clock;
use crate::value::{ErrorValue, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Log,
    Info,
    Warn,
    Error,
    Debug,
    /// Pseudo-level recorded when the channel is cleared.
    Clear,
}

impl Level {
    pub const ALL: [Level; 6] = [
        Level::Log,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Debug,
        Level::Clear,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Log => "log",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Debug => "debug",
            Level::Clear => "clear",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_str() == name)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CapturedEntry {
    pub timestamp: i64,
    pub level: Level,
    pub args: Vec<Value>,
}

/// Live receiver of captured entries. Returning an error leaves the entry queued.
pub type Sink = Rc<dyn Fn(&CapturedEntry) -> Result<(), SinkError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkId(u64);

pub struct CaptureBuffer {
    clock: Rc<dyn Clock>,
    queue: RefCell<Vec<CapturedEntry>>,
    sink: RefCell<Option<(SinkId, Sink)>>,
    next_sink_id: Cell<u64>,
}

impl CaptureBuffer {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            queue: RefCell::new(Vec::new()),
            sink: RefCell::new(None),
            next_sink_id: Cell::new(1),
        }
    }

    pub fn capture(&self, level: Level, args: Vec<Value>) {
        let entry = CapturedEntry {
            timestamp: self.clock.now_ms(),
            level,
            args,
        };
        self.deliver(entry);
    }

    /// Records the call, then always runs `forward` so the original
    /// diagnostic function still sees it.
    pub fn intercept<R>(&self, level: Level, args: Vec<Value>, forward: impl FnOnce() -> R) -> R {
        self.capture(level, args);
        forward()
    }

    pub fn report_uncaught(&self, event: UncaughtEvent) {
        self.capture(Level::Error, vec![event.into_value()]);
    }

    /// Claims the single sink slot, replacing any previous sink.
    pub fn register_sink(&self, sink: Sink) -> SinkId {
        let id = SinkId(self.next_sink_id.get());
        self.next_sink_id.set(id.0 + 1);
        if self.sink.borrow_mut().replace((id, sink)).is_some() {
            tracing::debug!("replaced an existing console sink");
        }
        id
    }

    /// Releases the slot if `id` still owns it.
    pub fn unregister_sink(&self, id: SinkId) -> bool {
        let mut slot = self.sink.borrow_mut();
        if slot.as_ref().is_some_and(|(current, _)| *current == id) {
            *slot = None;
            return true;
        }
        false
    }

    pub fn has_sink(&self) -> bool {
        self.sink.borrow().is_some()
    }

    /// Takes every queued entry, leaving the queue empty.
    pub fn drain(&self) -> Vec<CapturedEntry> {
        std::mem::take(&mut *self.queue.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    fn deliver(&self, entry: CapturedEntry) {
        let sink = self.sink.borrow().as_ref().map(|(_, sink)| Rc::clone(sink));
        if let Some(sink) = sink {
            match sink(&entry) {
                Ok(()) => return,
                Err(error) => tracing::debug!(%error, level = %entry.level, "console sink rejected entry"),
            }
        }
        self.queue.borrow_mut().push(entry);
    }
}

/// Uncaught failure observed by the page-level hooks.
#[derive(Debug, Clone)]
pub enum UncaughtEvent {
    WindowError { error: Value, message: String },
    UnhandledRejection { reason: Value },
}

impl UncaughtEvent {
    pub fn into_value(self) -> Value {
        match self {
            UncaughtEvent::WindowError { error, message } => {
                if error.is_truthy() {
                    error
                } else if !message.is_empty() {
                    Value::Error(ErrorValue::new("Error", message))
                } else {
                    Value::from("Window error")
                }
            }
            UncaughtEvent::UnhandledRejection { reason } => {
                if reason.is_truthy() {
                    reason
                } else {
                    Value::from("Unhandled rejection")
                }
            }
        }
    }
}

/// Process-wide one-time initialization.
///
/// `init` may be called any number of times; only the first call runs the
/// initializer. Used for console capture and page error hooks.
pub struct InitOnce(Once);

impl InitOnce {
    pub const fn new() -> Self {
        Self(Once::new())
    }

    /// Returns `true` when this call performed the initialization.
    pub fn init(&self, initializer: impl FnOnce()) -> bool {
        let mut ran = false;
        self.0.call_once(|| {
            initializer();
            ran = true;
        });
        ran
    }

    pub fn is_done(&self) -> bool {
        self.0.is_completed()
    }
}

impl Default for InitOnce {
    fn default() -> Self {
        Self::new()
    }
}
