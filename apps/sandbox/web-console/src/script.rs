//! Source text for the script evaluator.
//!
//! Statements first run through a direct `eval` so the completion value comes
//! back. `eval` parses as a script, which rejects `return` and top-level
//! `await`; such sources run again as an async function body. The eval source
//! opens by setting a start marker, so a rejection without the marker is a
//! parse error and nothing from the operator's source has run yet.

pub(crate) const CONTEXT_PARAMETER: &str = "context";
pub(crate) const SOURCE_PARAMETER: &str = "__consoleSource";
pub(crate) const STATE_PARAMETER: &str = "__consoleState";
pub(crate) const STARTED_KEY: &str = "started";

/// Async function body returning `source` as a single expression.
pub(crate) fn expression_body(source: &str) -> String {
    format!("with ({CONTEXT_PARAMETER}) {{ return ({source}); }}")
}

/// Async function body that evals the source parameter in the page scope.
///
/// The marker statement is `void`, so it leaves the completion value of the
/// operator's source unchanged.
pub(crate) fn statement_eval_body() -> String {
    format!(
        "with ({CONTEXT_PARAMETER}) {{ return eval(\"void ({STATE_PARAMETER}.{STARTED_KEY} = true);\" + {SOURCE_PARAMETER}); }}"
    )
}

/// Async function body running `source` as statements; `return` and `await`
/// are allowed.
pub(crate) fn function_body(source: &str) -> String {
    format!("with ({CONTEXT_PARAMETER}) {{ {source}\n }}")
}

/// Whether a failed eval attempt should run again as a function body.
pub(crate) fn retry_as_function_body(failed: bool, eval_started: bool) -> bool {
    failed && !eval_started
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_body_marks_start_before_operator_source() {
        let body = statement_eval_body();
        let marker = body.find("void (__consoleState.started = true);");
        let source = body.find("+ __consoleSource");
        assert!(marker.is_some());
        assert!(marker < source);
        assert!(body.starts_with("with (context) {"));
    }

    #[test]
    fn parse_rejections_retry_as_function_body() {
        assert!(retry_as_function_body(true, false));
        assert!(!retry_as_function_body(true, true));
        assert!(!retry_as_function_body(false, false));
        assert!(!retry_as_function_body(false, true));
    }

    #[test]
    fn function_body_keeps_return_and_trailing_comments_inside() {
        let body = function_body("const a = 1; return a // done");
        assert_eq!(body, "with (context) { const a = 1; return a // done\n }");
    }

    #[test]
    fn expression_body_wraps_in_return() {
        assert_eq!(expression_body("1 + 1"), "with (context) { return (1 + 1); }");
    }
}
