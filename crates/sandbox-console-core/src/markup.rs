//! Markup primitives shared by the formatter and the interpreter.

use once_cell::sync::Lazy;
use regex::Regex;

pub const PRE_OPEN: &str = r#"<pre class="pre">"#;
pub const PRE_CLOSE: &str = "</pre>";

static STRUCTURED_TOKEN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r#""(\\u[a-fA-F0-9]{4}|\\[^u]|[^\\"])*"(\s*:)?|\btrue\b|\bfalse\b|\bnull\b|-?\d+(?:\.\d*)?(?:[eE][+-]?\d+)?"#,
    )
    .ok()
});

static TAG: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"<br\s*/?>|<[^>]*>").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Undefined,
    Null,
    Number,
    Boolean,
    String,
    Key,
    Error,
    Dim,
}

impl TokenClass {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenClass::Undefined => "tok-undefined",
            TokenClass::Null => "tok-null",
            TokenClass::Number => "tok-number",
            TokenClass::Boolean => "tok-boolean",
            TokenClass::String => "tok-string",
            TokenClass::Key => "tok-key",
            TokenClass::Error => "tok-error",
            TokenClass::Dim => "tok-dim",
        }
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Wraps already-escaped text in a class-tagged span.
pub fn span_raw(class: TokenClass, escaped: &str) -> String {
    format!(r#"<span class="{}">{escaped}</span>"#, class.as_str())
}

pub fn span(class: TokenClass, text: &str) -> String {
    span_raw(class, &escape_html(text))
}

pub fn pre_block(escaped: &str) -> String {
    format!("{PRE_OPEN}{escaped}{PRE_CLOSE}")
}

/// Highlights structured text token by token.
///
/// Tokens and the text between them are escaped separately so entity text
/// produced by escaping is never itself matched as a token.
pub fn highlight_structured(text: &str) -> String {
    let Some(pattern) = STRUCTURED_TOKEN.as_ref() else {
        return escape_html(text);
    };

    let mut highlighted = String::with_capacity(text.len() * 2);
    let mut cursor = 0;
    for token in pattern.find_iter(text) {
        highlighted.push_str(&escape_html(&text[cursor..token.start()]));
        highlighted.push_str(&span(classify_token(token.as_str()), token.as_str()));
        cursor = token.end();
    }
    highlighted.push_str(&escape_html(&text[cursor..]));
    highlighted
}

fn classify_token(token: &str) -> TokenClass {
    if token.starts_with('"') {
        if token.trim_end().ends_with(':') {
            TokenClass::Key
        } else {
            TokenClass::String
        }
    } else if token == "true" || token == "false" {
        TokenClass::Boolean
    } else if token == "null" {
        TokenClass::Null
    } else {
        TokenClass::Number
    }
}

/// Renders a number the way page script prints it.
///
/// Uses the shortest digits that round-trip, in plain notation while the
/// decimal point sits between 1e-7 and 1e21, and `d.ddde±x` otherwise.
pub fn number_text(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let scientific = format!("{:e}", value.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let digits = mantissa.replace('.', "");
    let exponent = exponent.parse::<i32>().unwrap_or(0);
    let sign = if value.is_sign_negative() { "-" } else { "" };

    let count = digits.len() as i32;
    let point = exponent + 1;
    let body = if count <= point && point <= 21 {
        format!("{digits}{}", "0".repeat((point - count) as usize))
    } else if 0 < point && point <= 21 {
        let (whole, fraction) = digits.split_at(point as usize);
        format!("{whole}.{fraction}")
    } else if -6 < point && point <= 0 {
        format!("0.{}{digits}", "0".repeat((-point) as usize))
    } else {
        let exponent_sign = if exponent < 0 { '-' } else { '+' };
        let (lead, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{lead}e{exponent_sign}{}", exponent.abs())
        } else {
            format!("{lead}.{rest}e{exponent_sign}{}", exponent.abs())
        }
    };
    format!("{sign}{body}")
}

/// Text a reader would see for a markup fragment: tags removed, `<br>` as a
/// newline, entities decoded.
pub fn markup_to_text(markup: &str) -> String {
    let stripped = match TAG.as_ref() {
        Some(tag) => tag
            .replace_all(markup, |captures: &regex::Captures<'_>| {
                if captures[0].starts_with("<br") {
                    "\n"
                } else {
                    ""
                }
            })
            .into_owned(),
        None => markup.to_string(),
    };
    unescape_html(&stripped)
}

fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
