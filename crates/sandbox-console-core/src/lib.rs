//! Embedded sandbox console runtime.
//!
//! Diagnostic output is captured into a [`CaptureBuffer`] from page start.
//! Once a [`Console`] mounts it takes over as the live sink, replays what was
//! queued, and from then on renders every value through the formatter into a
//! capped transcript. Operator input runs either as a built-in command or as
//! script through the host [`Evaluator`].

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod capture;
pub mod config;
pub mod error;
pub mod format;
pub mod history;
pub mod host;
pub mod interpreter;
pub mod lines;
pub mod markup;
pub mod value;

pub use capture::{CaptureBuffer, CapturedEntry, InitOnce, Level, Sink, SinkId, UncaughtEvent};
pub use config::ConsoleConfig;
pub use error::{ConfigError, EvalError, HostError, SinkError, StorageError};
pub use format::{classify, format_arguments, format_value, Kind};
pub use history::{HistoryStore, KeyValueStore, MemoryStore};
pub use host::{
    Clipboard, Clock, EvalMode, Evaluator, GlobalScope, Host, HttpClient, HttpResponse,
    SystemClock, WorkerRegistration, WorkerRegistry,
};
pub use interpreter::{Builtin, Console, PendingCommand};
pub use lines::{ConsoleLine, LineBuffer, LineLevel};
pub use value::{ElementValue, ErrorValue, FunctionValue, ObjectRef, Value};
