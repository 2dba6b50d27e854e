//! Keyboard and scroll decisions for the console view.

/// Distance from the bottom, in pixels, that still counts as "at the bottom".
pub(crate) const STICK_TO_BOTTOM_SLACK: f64 = 18.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyAction {
    Submit,
    Clear,
    HistoryPrev,
    HistoryNext,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct KeyPress<'a> {
    pub(crate) key: &'a str,
    pub(crate) ctrl: bool,
    pub(crate) meta: bool,
}

/// Maps a keydown in the console input to an action. History keys do
/// nothing while history is empty so the caret keeps its default behavior.
pub(crate) fn key_action(press: KeyPress<'_>, history_len: usize) -> Option<KeyAction> {
    match press.key {
        "Enter" => Some(KeyAction::Submit),
        "ArrowUp" if history_len > 0 => Some(KeyAction::HistoryPrev),
        "ArrowDown" if history_len > 0 => Some(KeyAction::HistoryNext),
        key if (press.ctrl || press.meta) && key.eq_ignore_ascii_case("l") => Some(KeyAction::Clear),
        _ => None,
    }
}

pub(crate) fn is_near_bottom(scroll_top: f64, client_height: f64, scroll_height: f64) -> bool {
    scroll_top + client_height >= scroll_height - STICK_TO_BOTTOM_SLACK
}
