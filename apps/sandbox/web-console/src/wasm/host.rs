//! Page-backed implementations of the console's collaborator traits.

use super::*;

use async_trait::async_trait;
use chrono::{FixedOffset, Offset, Utc};
use gloo_net::http::Request;
use sandbox_console_core::{
    Clipboard, Clock, ErrorValue, EvalError, EvalMode, Evaluator, GlobalScope, HostError,
    HttpClient, HttpResponse, KeyValueStore, StorageError, Value, WorkerRegistration,
    WorkerRegistry,
};
use wasm_bindgen_futures::JsFuture;

use super::bridge::to_value;
use crate::script::{
    CONTEXT_PARAMETER, SOURCE_PARAMETER, STARTED_KEY, STATE_PARAMETER, expression_body,
    function_body, retry_as_function_body, statement_eval_body,
};

pub(super) struct JsClock;

impl Clock for JsClock {
    fn now_ms(&self) -> i64 {
        js_sys::Date::now() as i64
    }

    fn date_string(&self) -> String {
        String::from(js_sys::Date::new_0().to_string())
    }

    fn utc_offset(&self) -> FixedOffset {
        let minutes_west = js_sys::Date::new_0().get_timezone_offset();
        FixedOffset::west_opt((minutes_west * 60.0) as i32).unwrap_or_else(|| Utc.fix())
    }
}

pub(super) struct LocalStorageStore;

fn local_storage() -> Result<web_sys::Storage, StorageError> {
    web_sys::window()
        .ok_or(StorageError::Unavailable)?
        .local_storage()
        .map_err(|_| StorageError::Unavailable)?
        .ok_or(StorageError::Unavailable)
}

impl KeyValueStore for LocalStorageStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        local_storage()?
            .get_item(key)
            .map_err(|_| StorageError::Read(format!("failed to read {key} from local storage")))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        local_storage()?
            .set_item(key, value)
            .map_err(|_| StorageError::Write(format!("failed to write {key} to local storage")))
    }
}

pub(super) struct GlooHttpClient;

#[async_trait(?Send)]
impl HttpClient for GlooHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, HostError> {
        let response = Request::get(url)
            .cache(web_sys::RequestCache::NoStore)
            .send()
            .await
            .map_err(map_network_error)?;
        let status = response.status();
        let status_text = response.status_text();
        let body = response.text().await.map_err(map_network_error)?;
        Ok(HttpResponse {
            status,
            status_text,
            body,
        })
    }
}

fn map_network_error(error: gloo_net::Error) -> HostError {
    match error {
        gloo_net::Error::JsError(error) => {
            HostError::Raised(Value::Error(ErrorValue::new(error.name, error.message)))
        }
        other => HostError::Network(other.to_string()),
    }
}

fn raised(error: JsValue) -> HostError {
    HostError::Raised(to_value(&error))
}

pub(super) struct ServiceWorkerRegistry {
    container: web_sys::ServiceWorkerContainer,
}

impl ServiceWorkerRegistry {
    /// `None` when the page cannot use service workers (insecure origin, old browser).
    pub(super) fn from_window(window: &web_sys::Window) -> Option<Self> {
        let container =
            js_sys::Reflect::get(&window.navigator(), &JsValue::from_str("serviceWorker")).ok()?;
        if container.is_undefined() || container.is_null() {
            return None;
        }
        Some(Self {
            container: container.unchecked_into(),
        })
    }
}

#[async_trait(?Send)]
impl WorkerRegistry for ServiceWorkerRegistry {
    async fn register(&self, script_path: &str) -> Result<String, HostError> {
        let registration = JsFuture::from(self.container.register(script_path))
            .await
            .map_err(raised)?
            .unchecked_into::<web_sys::ServiceWorkerRegistration>();
        Ok(registration.scope())
    }

    async fn registrations(&self) -> Result<Vec<Rc<dyn WorkerRegistration>>, HostError> {
        let registrations = JsFuture::from(self.container.get_registrations())
            .await
            .map_err(raised)?;
        Ok(js_sys::Array::from(&registrations)
            .iter()
            .map(|registration| {
                Rc::new(JsWorkerRegistration(registration.unchecked_into())) as Rc<dyn WorkerRegistration>
            })
            .collect())
    }
}

struct JsWorkerRegistration(web_sys::ServiceWorkerRegistration);

#[async_trait(?Send)]
impl WorkerRegistration for JsWorkerRegistration {
    fn scope(&self) -> String {
        self.0.scope()
    }

    async fn unregister(&self) -> Result<bool, HostError> {
        let promise = self.0.unregister().map_err(raised)?;
        let outcome = JsFuture::from(promise).await.map_err(raised)?;
        Ok(outcome.as_bool().unwrap_or(false))
    }
}

/// Resolves dotted global paths such as `mindbox.queue` against `window`.
pub(super) struct WindowScope;

impl GlobalScope for WindowScope {
    fn lookup(&self, path: &[String]) -> Option<Value> {
        let mut current: JsValue = web_sys::window()?.into();
        for segment in path {
            if current.is_undefined() || current.is_null() {
                return None;
            }
            current = js_sys::Reflect::get(&current, &JsValue::from_str(segment)).ok()?;
        }
        if current.is_undefined() {
            return None;
        }
        Some(to_value(&current))
    }
}

pub(super) struct JsClipboard;

#[async_trait(?Send)]
impl Clipboard for JsClipboard {
    async fn write_text(&self, text: &str) -> Result<(), HostError> {
        let window = web_sys::window().ok_or(HostError::Unavailable("window"))?;
        let clipboard = js_sys::Reflect::get(&window.navigator(), &JsValue::from_str("clipboard"))
            .ok()
            .filter(JsValue::is_object);
        let write_text = clipboard
            .as_ref()
            .and_then(|clipboard| js_sys::Reflect::get(clipboard, &JsValue::from_str("writeText")).ok())
            .and_then(|method| method.dyn_into::<js_sys::Function>().ok());

        if let (Some(clipboard), Some(write_text)) = (clipboard, write_text) {
            let pending = write_text
                .call1(&clipboard, &JsValue::from_str(text))
                .map_err(raised)?;
            JsFuture::from(js_sys::Promise::resolve(&pending))
                .await
                .map_err(raised)?;
            return Ok(());
        }
        copy_with_selection(&window, text)
    }
}

/// Legacy copy through a hidden textarea and `execCommand("copy")`.
fn copy_with_selection(window: &web_sys::Window, text: &str) -> Result<(), HostError> {
    let document = window.document().ok_or(HostError::Unavailable("document"))?;
    let body = document.body().ok_or(HostError::Unavailable("document body"))?;
    let textarea = document
        .create_element("textarea")
        .map_err(raised)?
        .dyn_into::<HtmlElement>()
        .map_err(raised)?;
    js_sys::Reflect::set(&textarea, &JsValue::from_str("value"), &JsValue::from_str(text))
        .map_err(raised)?;
    let _ = textarea.style().set_property("position", "fixed");
    let _ = textarea.style().set_property("left", "-9999px");
    body.append_child(&textarea).map_err(raised)?;

    let copied = call_method(&textarea, "select", &js_sys::Array::new())
        .and_then(|_| {
            call_method(&document, "execCommand", &js_sys::Array::of1(&JsValue::from_str("copy")))
        })
        .map(|outcome| outcome.as_bool().unwrap_or(false));
    let _ = body.remove_child(&textarea);

    match copied {
        Ok(true) => Ok(()),
        Ok(false) => Err(HostError::Unavailable("clipboard")),
        Err(error) => Err(raised(error)),
    }
}

fn call_method(target: &JsValue, name: &str, args: &js_sys::Array) -> Result<JsValue, JsValue> {
    js_sys::Reflect::get(target, &JsValue::from_str(name))?
        .dyn_into::<js_sys::Function>()?
        .apply(target, args)
}

/// Looks up a constructor such as `Function` on the global object.
pub(super) fn global_constructor(name: &str) -> Result<js_sys::Function, JsValue> {
    js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str(name))?.dyn_into::<js_sys::Function>()
}

/// `new constructor(...params, body)`; parse errors come back as `Err`.
pub(super) fn compile_function(
    constructor: &js_sys::Function,
    params: &[&str],
    body: &str,
) -> Result<js_sys::Function, JsValue> {
    let args = params
        .iter()
        .map(|param| JsValue::from_str(param))
        .chain(std::iter::once(JsValue::from_str(body)))
        .collect::<js_sys::Array>();
    js_sys::Reflect::construct(constructor, &args)?.dyn_into::<js_sys::Function>()
}

fn async_function_constructor() -> Result<js_sys::Function, JsValue> {
    let sample = compile_function(&global_constructor("Function")?, &[], "return async function () {};")?
        .call0(&JsValue::NULL)?;
    let prototype = js_sys::Object::get_prototype_of(&sample);
    js_sys::Reflect::get(&prototype, &JsValue::from_str("constructor"))?.dyn_into::<js_sys::Function>()
}

/// Awaits whatever a compiled async function returned.
async fn settle(called: Result<JsValue, JsValue>) -> Result<JsValue, JsValue> {
    JsFuture::from(js_sys::Promise::resolve(&called?)).await
}

fn eval_started(state: &js_sys::Object) -> bool {
    js_sys::Reflect::get(state, &JsValue::from_str(STARTED_KEY))
        .ok()
        .and_then(|started| started.as_bool())
        .unwrap_or(false)
}

/// Runs operator script with `window` as an implicit `with` scope.
///
/// Expressions run as `return (<source>)` in an async function. Statements
/// run through a direct `eval` so the completion value comes back; sources
/// `eval` refuses to parse (`return`, top-level `await`) run as an async
/// function body instead.
pub(super) struct JsEvaluator;

#[async_trait(?Send)]
impl Evaluator for JsEvaluator {
    async fn run(&self, source: &str, mode: EvalMode) -> Result<Value, EvalError> {
        let window = web_sys::window()
            .ok_or_else(|| EvalError::Unavailable("window is unavailable".to_string()))?;
        let async_function = async_function_constructor()
            .map_err(|_| EvalError::Unavailable("async functions are unavailable".to_string()))?;
        let syntax = |error: JsValue| EvalError::Syntax(to_value(&error));

        let settled = match mode {
            EvalMode::Expression => {
                let function = compile_function(
                    &async_function,
                    &[CONTEXT_PARAMETER],
                    &expression_body(source),
                )
                .map_err(syntax)?;
                settle(function.call1(&JsValue::UNDEFINED, &window)).await
            }
            EvalMode::Statements => {
                let state = js_sys::Object::new();
                let function = compile_function(
                    &async_function,
                    &[CONTEXT_PARAMETER, SOURCE_PARAMETER, STATE_PARAMETER],
                    &statement_eval_body(),
                )
                .map_err(syntax)?;
                let evaluated = settle(function.call3(
                    &JsValue::UNDEFINED,
                    &window,
                    &JsValue::from_str(source),
                    &state,
                ))
                .await;

                if retry_as_function_body(evaluated.is_err(), eval_started(&state)) {
                    let function = compile_function(
                        &async_function,
                        &[CONTEXT_PARAMETER],
                        &function_body(source),
                    )
                    .map_err(syntax)?;
                    settle(function.call1(&JsValue::UNDEFINED, &window)).await
                } else {
                    evaluated
                }
            }
        };

        settled
            .map(|value| to_value(&value))
            .map_err(|error| EvalError::Thrown(to_value(&error)))
    }
}
