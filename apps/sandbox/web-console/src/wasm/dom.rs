use super::*;

use chrono::FixedOffset;
use sandbox_console_core::lines::time_label;
use sandbox_console_core::{Clock, ConsoleLine};

pub(super) struct ConsoleView {
    pub(super) output: HtmlElement,
    pub(super) input: HtmlInputElement,
    run: HtmlElement,
    help: HtmlElement,
    copy: HtmlElement,
    clear: HtmlElement,
}

/// Finds the console markup on the page, building it when the page has none.
pub(super) fn ensure_console_dom() -> Result<ConsoleView, String> {
    let window = web_sys::window().ok_or_else(|| "window is unavailable".to_string())?;
    let document = window
        .document()
        .ok_or_else(|| "document is unavailable".to_string())?;

    ensure_stylesheet(&document)?;
    if document.get_element_by_id(CONSOLE_OUTPUT_ID).is_none() {
        build_console_dom(&document)?;
    }

    Ok(ConsoleView {
        output: element_by_id(&document, CONSOLE_OUTPUT_ID)?,
        input: document
            .get_element_by_id(CONSOLE_INPUT_ID)
            .ok_or_else(|| "missing console input".to_string())?
            .dyn_into::<HtmlInputElement>()
            .map_err(|_| "console input is not HtmlInputElement".to_string())?,
        run: element_by_id(&document, CONSOLE_RUN_ID)?,
        help: element_by_id(&document, CONSOLE_HELP_ID)?,
        copy: element_by_id(&document, CONSOLE_COPY_ID)?,
        clear: element_by_id(&document, CONSOLE_CLEAR_ID)?,
    })
}

fn element_by_id(document: &web_sys::Document, id: &str) -> Result<HtmlElement, String> {
    document
        .get_element_by_id(id)
        .ok_or_else(|| format!("missing #{id}"))?
        .dyn_into::<HtmlElement>()
        .map_err(|_| format!("#{id} is not HtmlElement"))
}

fn create_html_element(document: &web_sys::Document, tag: &str) -> Result<HtmlElement, String> {
    document
        .create_element(tag)
        .map_err(|_| format!("failed to create {tag}"))?
        .dyn_into::<HtmlElement>()
        .map_err(|_| format!("{tag} is not HtmlElement"))
}

fn set_styles(element: &HtmlElement, what: &str, styles: &[(&str, &str)]) -> Result<(), String> {
    for (property, value) in styles {
        element
            .style()
            .set_property(property, value)
            .map_err(|_| format!("failed to style {what}"))?;
    }
    Ok(())
}

fn ensure_stylesheet(document: &web_sys::Document) -> Result<(), String> {
    if document.get_element_by_id(CONSOLE_STYLE_ID).is_some() {
        return Ok(());
    }
    let head = document
        .head()
        .ok_or_else(|| "document head is unavailable".to_string())?;
    let style = document
        .create_element("style")
        .map_err(|_| "failed to create console stylesheet".to_string())?;
    style.set_id(CONSOLE_STYLE_ID);
    style.set_text_content(Some(CONSOLE_STYLESHEET));
    head.append_child(&style)
        .map_err(|_| "failed to append console stylesheet".to_string())?;
    Ok(())
}

fn build_console_dom(document: &web_sys::Document) -> Result<(), String> {
    let body = document
        .body()
        .ok_or_else(|| "document body is unavailable".to_string())?;

    let root = match document.get_element_by_id(CONSOLE_ROOT_ID) {
        Some(existing) => existing
            .dyn_into::<HtmlElement>()
            .map_err(|_| "console root is not HtmlElement".to_string())?,
        None => {
            let root = create_html_element(document, "section")?;
            root.set_id(CONSOLE_ROOT_ID);
            body.append_child(&root)
                .map_err(|_| "failed to append console root".to_string())?;
            root
        }
    };
    set_styles(
        &root,
        "console root",
        &[
            ("display", "flex"),
            ("flex-direction", "column"),
            ("gap", "8px"),
            ("padding", "12px"),
            ("box-sizing", "border-box"),
            ("background", "#0f172a"),
            ("color", "#e2e8f0"),
            ("border-radius", "10px"),
            ("font-family", "ui-monospace, SFMono-Regular, Menlo, monospace"),
            ("font-size", "12px"),
        ],
    )?;

    let head = create_html_element(document, "div")?;
    set_styles(
        &head,
        "console toolbar",
        &[("display", "flex"), ("justify-content", "flex-end"), ("gap", "6px")],
    )?;
    for (id, label) in [
        (CONSOLE_HELP_ID, "Help"),
        (CONSOLE_COPY_ID, "Copy"),
        (CONSOLE_CLEAR_ID, "Clear"),
    ] {
        let button = toolbar_button(document, id, label)?;
        let _ = head.append_child(&button);
    }
    let _ = root.append_child(&head);

    let output = create_html_element(document, "div")?;
    output.set_id(CONSOLE_OUTPUT_ID);
    let _ = output.set_attribute("role", "log");
    let _ = output.set_attribute("aria-live", "polite");
    set_styles(
        &output,
        "console output",
        &[
            ("height", "320px"),
            ("overflow-y", "auto"),
            ("padding", "6px 8px"),
            ("background", "#020617"),
            ("border-radius", "8px"),
        ],
    )?;
    let _ = root.append_child(&output);

    let input_row = create_html_element(document, "div")?;
    set_styles(
        &input_row,
        "console input row",
        &[("display", "flex"), ("align-items", "center"), ("gap", "6px")],
    )?;
    let prompt = create_html_element(document, "span")?;
    prompt.set_inner_text(">");
    let _ = prompt.style().set_property("color", "#64748b");
    let _ = input_row.append_child(&prompt);

    let input = document
        .create_element("input")
        .map_err(|_| "failed to create console input".to_string())?
        .dyn_into::<HtmlInputElement>()
        .map_err(|_| "console input is not HtmlInputElement".to_string())?;
    input.set_id(CONSOLE_INPUT_ID);
    input.set_type("text");
    input.set_placeholder(INPUT_PLACEHOLDER);
    input.set_autocomplete("off");
    let _ = input.set_attribute("spellcheck", "false");
    set_styles(
        &input,
        "console input",
        &[
            ("flex", "1"),
            ("min-width", "0"),
            ("height", "32px"),
            ("padding", "0 8px"),
            ("border", "1px solid #334155"),
            ("border-radius", "6px"),
            ("background", "#020617"),
            ("color", "#e2e8f0"),
            ("font", "inherit"),
        ],
    )?;
    let _ = input_row.append_child(&input);

    let run = toolbar_button(document, CONSOLE_RUN_ID, "Run")?;
    let _ = run.style().set_property("background", "#334155");
    let _ = input_row.append_child(&run);
    let _ = root.append_child(&input_row);

    let hint = create_html_element(document, "div")?;
    hint.set_inner_text(INPUT_HINT);
    let _ = hint.style().set_property("color", "#64748b");
    let _ = root.append_child(&hint);
    Ok(())
}

fn toolbar_button(
    document: &web_sys::Document,
    id: &str,
    label: &str,
) -> Result<HtmlElement, String> {
    let button = create_html_element(document, "button")?;
    button.set_id(id);
    let _ = button.set_attribute("type", "button");
    button.set_inner_text(label);
    set_styles(
        &button,
        label,
        &[
            ("height", "28px"),
            ("padding", "0 10px"),
            ("border", "1px solid #334155"),
            ("border-radius", "6px"),
            ("background", "transparent"),
            ("color", "#e2e8f0"),
            ("font", "inherit"),
            ("cursor", "pointer"),
        ],
    )?;
    Ok(button)
}

/// Submits whatever is in the input box and empties it.
fn submit_input(console: &Console, input: &HtmlInputElement) {
    let command = input.value();
    input.set_value("");
    run_command(console, &command);
}

pub(super) fn install_view_handlers(view: &ConsoleView, console: &Console) -> Result<(), String> {
    INPUT_KEYDOWN_HANDLER.with(|slot| {
        if slot.borrow().is_some() {
            return Ok(());
        }
        let console = console.clone();
        let input = view.input.clone();
        let callback = Closure::<dyn FnMut(web_sys::KeyboardEvent)>::wrap(Box::new(
            move |event: web_sys::KeyboardEvent| {
                let key = event.key();
                let press = KeyPress {
                    key: &key,
                    ctrl: event.ctrl_key(),
                    meta: event.meta_key(),
                };
                let Some(action) = key_action(press, console.history_len()) else {
                    return;
                };
                event.prevent_default();
                match action {
                    KeyAction::Submit => submit_input(&console, &input),
                    KeyAction::Clear => console.clear(),
                    KeyAction::HistoryPrev => input.set_value(&console.history_prev()),
                    KeyAction::HistoryNext => input.set_value(&console.history_next()),
                }
            },
        ));
        view.input
            .add_event_listener_with_callback("keydown", callback.as_ref().unchecked_ref())
            .map_err(|_| "failed to listen for console keydown".to_string())?;
        *slot.borrow_mut() = Some(callback);
        Ok(())
    })?;

    OUTPUT_SCROLL_HANDLER.with(|slot| {
        if slot.borrow().is_some() {
            return;
        }
        let output = view.output.clone();
        let callback = Closure::<dyn FnMut(web_sys::Event)>::wrap(Box::new(move |_event| {
            STICK_TO_BOTTOM.set(is_near_bottom(
                f64::from(output.scroll_top()),
                f64::from(output.client_height()),
                f64::from(output.scroll_height()),
            ));
        }));
        let _ = view
            .output
            .add_event_listener_with_callback("scroll", callback.as_ref().unchecked_ref());
        *slot.borrow_mut() = Some(callback);
    });

    RUN_CLICK_HANDLER.with(|slot| {
        if slot.borrow().is_some() {
            return;
        }
        let console = console.clone();
        let input = view.input.clone();
        let callback = Closure::<dyn FnMut(web_sys::Event)>::wrap(Box::new(move |_event| {
            submit_input(&console, &input);
            let _ = input.focus();
        }));
        let _ = view
            .run
            .add_event_listener_with_callback("click", callback.as_ref().unchecked_ref());
        *slot.borrow_mut() = Some(callback);
    });

    HELP_CLICK_HANDLER.with(|slot| {
        if slot.borrow().is_some() {
            return;
        }
        let console = console.clone();
        let callback = Closure::<dyn FnMut(web_sys::Event)>::wrap(Box::new(move |_event| {
            console.help();
        }));
        let _ = view
            .help
            .add_event_listener_with_callback("click", callback.as_ref().unchecked_ref());
        *slot.borrow_mut() = Some(callback);
    });

    COPY_CLICK_HANDLER.with(|slot| {
        if slot.borrow().is_some() {
            return;
        }
        let console = console.clone();
        let callback = Closure::<dyn FnMut(web_sys::Event)>::wrap(Box::new(move |_event| {
            if let Some(pending) = console.copy_transcript() {
                spawn_local(pending);
            }
        }));
        let _ = view
            .copy
            .add_event_listener_with_callback("click", callback.as_ref().unchecked_ref());
        *slot.borrow_mut() = Some(callback);
    });

    CLEAR_CLICK_HANDLER.with(|slot| {
        if slot.borrow().is_some() {
            return;
        }
        let console = console.clone();
        let callback = Closure::<dyn FnMut(web_sys::Event)>::wrap(Box::new(move |_event| {
            console.clear();
        }));
        let _ = view
            .clear
            .add_event_listener_with_callback("click", callback.as_ref().unchecked_ref());
        *slot.borrow_mut() = Some(callback);
    });

    Ok(())
}

/// Brings the output element in line with the transcript.
///
/// Line ids only grow, so rows older than the first retained line are
/// dropped from the top and rows newer than the last rendered id are
/// appended. Nothing already on screen is rebuilt.
pub(super) fn render_console() {
    let Some(console) = CONSOLE.with(|slot| slot.borrow().clone()) else {
        return;
    };
    let Some(document) = web_sys::window().and_then(|window| window.document()) else {
        return;
    };
    let Some(output) = document
        .get_element_by_id(CONSOLE_OUTPUT_ID)
        .and_then(|element| element.dyn_into::<HtmlElement>().ok())
    else {
        return;
    };

    prune_rendered_lines(&output, console.first_line_id());

    let offset = JsClock.utc_offset();
    let mut last_rendered = LAST_RENDERED_LINE_ID.get();
    console.for_each_line_since(last_rendered, |line| {
        match line_element(&document, line, offset) {
            Ok(row) => {
                let _ = output.append_child(&row);
            }
            Err(error) => tracing::debug!(%error, line = line.id, "failed to render console line"),
        }
        last_rendered = line.id;
    });
    LAST_RENDERED_LINE_ID.set(last_rendered);

    if STICK_TO_BOTTOM.get() {
        output.set_scroll_top(output.scroll_height());
    }
}

fn prune_rendered_lines(output: &HtmlElement, first_retained: Option<u64>) {
    while let Some(row) = output.first_element_child() {
        let id = row
            .get_attribute(LINE_ID_ATTRIBUTE)
            .and_then(|id| id.parse::<u64>().ok())
            .unwrap_or(0);
        if first_retained.is_some_and(|first| id >= first) {
            break;
        }
        row.remove();
    }
}

fn line_element(
    document: &web_sys::Document,
    line: &ConsoleLine,
    offset: FixedOffset,
) -> Result<HtmlElement, String> {
    let row = create_html_element(document, "div")?;
    row.set_class_name(&format!("console-line lvl-{}", line.level.as_str()));
    let _ = row.set_attribute(LINE_ID_ATTRIBUTE, &line.id.to_string());

    let time = create_html_element(document, "div")?;
    time.set_class_name("console-time");
    time.set_inner_text(&time_label(line.timestamp, offset));
    let _ = row.append_child(&time);

    let body = create_html_element(document, "div")?;
    body.set_class_name("console-body");
    body.set_inner_html(&line.body_html);
    let _ = row.append_child(&body);
    Ok(row)
}

pub(super) fn should_autofocus(window: &web_sys::Window, config: &ConsoleConfig) -> bool {
    let matches = |query: &str| {
        window
            .match_media(query)
            .ok()
            .flatten()
            .is_some_and(|list| list.matches())
    };
    config.should_autofocus(matches(COARSE_POINTER_QUERY), matches(HOVER_NONE_QUERY))
}
