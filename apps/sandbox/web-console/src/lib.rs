#![allow(clippy::needless_pass_by_value)]

#[cfg(any(target_arch = "wasm32", test))]
mod input;
#[cfg(any(target_arch = "wasm32", test))]
mod script;
#[cfg(target_arch = "wasm32")]
mod wasm_constants;

#[cfg(target_arch = "wasm32")]
mod wasm {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use sandbox_console_core::{
        CaptureBuffer, Console, ConsoleConfig, HistoryStore, Host, InitOnce,
    };
    use serde::Serialize;
    use wasm_bindgen::JsCast;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen_futures::spawn_local;
    use web_sys::{HtmlElement, HtmlInputElement};

    use crate::input::{KeyAction, KeyPress, is_near_bottom, key_action};
    use crate::wasm_constants::*;

    mod bootstrap;
    mod bridge;
    mod dom;
    mod host;

    use bootstrap::*;
    use dom::*;
    use host::*;

    static CAPTURE_INSTALL: InitOnce = InitOnce::new();
    static ERROR_HOOKS_INSTALL: InitOnce = InitOnce::new();

    thread_local! {
        static CAPTURE: Rc<CaptureBuffer> = Rc::new(CaptureBuffer::new(Rc::new(JsClock)));
        static CONSOLE: RefCell<Option<Console>> = const { RefCell::new(None) };
        static DIAGNOSTICS: RefCell<BootDiagnostics> = RefCell::new(BootDiagnostics::default());
        static STICK_TO_BOTTOM: Cell<bool> = const { Cell::new(true) };
        static LAST_RENDERED_LINE_ID: Cell<u64> = const { Cell::new(0) };
        static CONSOLE_METHOD_WRAPPERS: RefCell<Vec<Closure<dyn FnMut(js_sys::Array)>>> = const { RefCell::new(Vec::new()) };
        static WINDOW_ERROR_HANDLER: RefCell<Option<Closure<dyn FnMut(web_sys::Event)>>> = const { RefCell::new(None) };
        static UNHANDLED_REJECTION_HANDLER: RefCell<Option<Closure<dyn FnMut(web_sys::Event)>>> = const { RefCell::new(None) };
        static DOM_READY_HANDLER: RefCell<Option<Closure<dyn FnMut(web_sys::Event)>>> = const { RefCell::new(None) };
        static INPUT_KEYDOWN_HANDLER: RefCell<Option<Closure<dyn FnMut(web_sys::KeyboardEvent)>>> = const { RefCell::new(None) };
        static OUTPUT_SCROLL_HANDLER: RefCell<Option<Closure<dyn FnMut(web_sys::Event)>>> = const { RefCell::new(None) };
        static RUN_CLICK_HANDLER: RefCell<Option<Closure<dyn FnMut(web_sys::Event)>>> = const { RefCell::new(None) };
        static HELP_CLICK_HANDLER: RefCell<Option<Closure<dyn FnMut(web_sys::Event)>>> = const { RefCell::new(None) };
        static COPY_CLICK_HANDLER: RefCell<Option<Closure<dyn FnMut(web_sys::Event)>>> = const { RefCell::new(None) };
        static CLEAR_CLICK_HANDLER: RefCell<Option<Closure<dyn FnMut(web_sys::Event)>>> = const { RefCell::new(None) };
    }

    #[derive(Debug, Clone, Default, Serialize)]
    struct BootDiagnostics {
        phase: String,
        detail: String,
        captured_before_mount: usize,
        last_error: Option<String>,
    }

    fn set_boot_phase(phase: &str, detail: &str) {
        DIAGNOSTICS.with(|state| {
            let mut state = state.borrow_mut();
            state.phase = phase.to_string();
            state.detail = detail.to_string();
        });
    }

    fn set_boot_error(message: &str) {
        tracing::warn!(error = %message, "embedded console failed to mount");
        DIAGNOSTICS.with(|state| {
            let mut state = state.borrow_mut();
            state.phase = "error".to_string();
            state.detail = "mount failed".to_string();
            state.last_error = Some(message.to_string());
        });
    }

    pub(crate) fn capture_buffer() -> Rc<CaptureBuffer> {
        CAPTURE.with(Rc::clone)
    }

    fn with_console<R>(f: impl FnOnce(&Console) -> R) -> Option<R> {
        let console = CONSOLE.with(|slot| slot.borrow().clone())?;
        Some(f(&console))
    }

    /// Runs a command and drives whatever it left pending.
    fn run_command(console: &Console, command: &str) {
        if let Some(pending) = console.submit(command) {
            spawn_local(pending);
        }
    }

    #[wasm_bindgen(start)]
    pub fn start() {
        console_error_panic_hook::set_once();
        set_boot_phase("booting", "installing console capture");
        CAPTURE_INSTALL.init(install_console_capture);
        ERROR_HOOKS_INSTALL.init(install_error_hooks);

        set_boot_phase("waiting", "waiting for document");
        if let Err(error) = when_dom_ready(|| {
            if let Err(error) = mount_console() {
                set_boot_error(&error);
            }
        }) {
            set_boot_error(&error);
        }
    }

    fn mount_console() -> Result<(), String> {
        if CONSOLE.with(|slot| slot.borrow().is_some()) {
            return Ok(());
        }

        let window = web_sys::window().ok_or_else(|| "window is unavailable".to_string())?;
        let config = read_sandbox_config(&window);
        let pathname = window.location().pathname().unwrap_or_else(|_| "/".to_string());
        let history = HistoryStore::load(config.history_key(&pathname), Box::new(LocalStorageStore));

        let mut host = Host::new(
            Rc::new(JsEvaluator),
            Rc::new(GlooHttpClient),
            Rc::new(WindowScope),
            Rc::new(JsClock),
        )
        .with_clipboard(Rc::new(JsClipboard));
        if let Some(workers) = ServiceWorkerRegistry::from_window(&window) {
            host = host.with_workers(Rc::new(workers));
        }

        let view = ensure_console_dom()?;
        let console = Console::new(config, host, history);
        CONSOLE.with(|slot| *slot.borrow_mut() = Some(console.clone()));
        install_view_handlers(&view, &console)?;
        console.set_render_hook(render_console);

        let capture = capture_buffer();
        DIAGNOSTICS.with(|state| state.borrow_mut().captured_before_mount = capture.len());
        console.mount(&capture);
        render_console();

        if should_autofocus(&window, console.config()) {
            let _ = view.input.focus();
        }
        set_boot_phase("ready", "console mounted");
        Ok(())
    }

    fn read_sandbox_config(window: &web_sys::Window) -> ConsoleConfig {
        let raw = js_sys::Reflect::get(window, &JsValue::from_str(CONFIG_GLOBAL))
            .ok()
            .filter(|value| value.is_object())
            .and_then(|value| js_sys::JSON::stringify(&value).ok())
            .and_then(|json| json.as_string());
        let Some(raw) = raw else {
            return ConsoleConfig::default();
        };
        ConsoleConfig::from_json(&raw).unwrap_or_else(|error| {
            tracing::warn!(%error, "ignoring malformed sandbox config");
            ConsoleConfig::default()
        })
    }

    #[wasm_bindgen]
    pub fn console_run(command: String) {
        let _ = with_console(|console| run_command(console, &command));
    }

    #[wasm_bindgen]
    pub fn console_lines_json() -> String {
        with_console(|console| {
            serde_json::to_string(&console.lines()).unwrap_or_else(|_| "[]".to_string())
        })
        .unwrap_or_else(|| "[]".to_string())
    }

    #[wasm_bindgen]
    pub fn console_history_json() -> String {
        with_console(|console| {
            serde_json::to_string(&console.history_entries()).unwrap_or_else(|_| "[]".to_string())
        })
        .unwrap_or_else(|| "[]".to_string())
    }

    #[wasm_bindgen]
    pub fn console_diagnostics_json() -> String {
        DIAGNOSTICS.with(|state| {
            serde_json::to_string(&*state.borrow()).unwrap_or_else(|_| {
                "{\"phase\":\"error\",\"detail\":\"diagnostics serialization failed\"}".to_string()
            })
        })
    }
}
