use super::*;

use sandbox_console_core::{Level, UncaughtEvent, Value};

use super::bridge::to_value;

/// Replaces the console's diagnostic methods with capturing wrappers.
///
/// Each wrapper records the call and then forwards it to the method it
/// replaced, so devtools output is unchanged.
pub(super) fn install_console_capture() {
    let Some(window) = web_sys::window() else {
        return;
    };
    let Ok(console) = js_sys::Reflect::get(&window, &JsValue::from_str("console")) else {
        return;
    };
    if !console.is_object() {
        return;
    }

    let make_variadic = match variadic_adapter() {
        Ok(adapter) => adapter,
        Err(_) => {
            tracing::warn!("console capture unavailable: cannot compile method adapter");
            return;
        }
    };

    CONSOLE_METHOD_WRAPPERS.with(|slot| {
        let mut wrappers = slot.borrow_mut();
        if !wrappers.is_empty() {
            return;
        }
        for name in CAPTURED_LEVELS {
            let Some(level) = Level::from_name(name) else {
                continue;
            };
            let original = js_sys::Reflect::get(&console, &JsValue::from_str(name))
                .ok()
                .and_then(|value| value.dyn_into::<js_sys::Function>().ok());

            let receiver = console.clone();
            let wrapper = Closure::<dyn FnMut(js_sys::Array)>::wrap(Box::new(
                move |args: js_sys::Array| {
                    let values = if level == Level::Clear {
                        Vec::new()
                    } else {
                        args.iter().map(|arg| to_value(&arg)).collect::<Vec<Value>>()
                    };
                    capture_buffer().intercept(level, values, || {
                        if let Some(original) = original.as_ref() {
                            let _ = original.apply(&receiver, &args);
                        }
                    });
                },
            ));

            match make_variadic.call1(&JsValue::NULL, wrapper.as_ref()) {
                Ok(patched) => {
                    let _ = js_sys::Reflect::set(&console, &JsValue::from_str(name), &patched);
                    wrappers.push(wrapper);
                }
                Err(_) => tracing::warn!(level = name, "failed to wrap console method"),
            }
        }
    });
}

/// `(receiver) => function () { receiver(Array.prototype.slice.call(arguments)) }`
fn variadic_adapter() -> Result<js_sys::Function, JsValue> {
    compile_function(
        &global_constructor("Function")?,
        &["receiver"],
        "return function () { receiver(Array.prototype.slice.call(arguments)); };",
    )
}

/// Routes uncaught errors and unhandled rejections into the capture buffer.
pub(super) fn install_error_hooks() {
    let Some(window) = web_sys::window() else {
        return;
    };

    WINDOW_ERROR_HANDLER.with(|slot| {
        if slot.borrow().is_some() {
            return;
        }
        let callback = Closure::<dyn FnMut(web_sys::Event)>::wrap(Box::new(move |event: web_sys::Event| {
            let (error, message) = match event.dyn_ref::<web_sys::ErrorEvent>() {
                Some(error_event) => (to_value(&error_event.error()), error_event.message()),
                None => (Value::Undefined, String::new()),
            };
            capture_buffer().report_uncaught(UncaughtEvent::WindowError { error, message });
        }));
        let _ = window.add_event_listener_with_callback("error", callback.as_ref().unchecked_ref());
        *slot.borrow_mut() = Some(callback);
    });

    UNHANDLED_REJECTION_HANDLER.with(|slot| {
        if slot.borrow().is_some() {
            return;
        }
        let callback = Closure::<dyn FnMut(web_sys::Event)>::wrap(Box::new(move |event: web_sys::Event| {
            let reason = event
                .dyn_ref::<web_sys::PromiseRejectionEvent>()
                .map_or(Value::Undefined, |rejection| to_value(&rejection.reason()));
            capture_buffer().report_uncaught(UncaughtEvent::UnhandledRejection { reason });
        }));
        let _ = window
            .add_event_listener_with_callback("unhandledrejection", callback.as_ref().unchecked_ref());
        *slot.borrow_mut() = Some(callback);
    });
}

/// Runs `ready` now if the document has parsed, else on `DOMContentLoaded`.
pub(super) fn when_dom_ready(ready: impl FnOnce() + 'static) -> Result<(), String> {
    let window = web_sys::window().ok_or_else(|| "window is unavailable".to_string())?;
    let document = window
        .document()
        .ok_or_else(|| "document is unavailable".to_string())?;

    if document.ready_state() != "loading" {
        ready();
        return Ok(());
    }

    DOM_READY_HANDLER.with(|slot| {
        if slot.borrow().is_some() {
            return Ok(());
        }
        let mut ready = Some(ready);
        let callback = Closure::<dyn FnMut(web_sys::Event)>::wrap(Box::new(move |_event| {
            if let Some(ready) = ready.take() {
                ready();
            }
        }));
        document
            .add_event_listener_with_callback("DOMContentLoaded", callback.as_ref().unchecked_ref())
            .map_err(|_| "failed to listen for DOMContentLoaded".to_string())?;
        *slot.borrow_mut() = Some(callback);
        Ok(())
    })
}
