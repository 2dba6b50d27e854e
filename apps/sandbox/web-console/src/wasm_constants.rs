pub(crate) const CONFIG_GLOBAL: &str = "__SANDBOX_CONFIG";
pub(crate) const CONSOLE_ROOT_ID: &str = "embedded-console";
pub(crate) const CONSOLE_OUTPUT_ID: &str = "console-output";
pub(crate) const CONSOLE_INPUT_ID: &str = "console-input";
pub(crate) const CONSOLE_RUN_ID: &str = "console-run";
pub(crate) const CONSOLE_HELP_ID: &str = "console-help";
pub(crate) const CONSOLE_COPY_ID: &str = "console-copy";
pub(crate) const CONSOLE_CLEAR_ID: &str = "console-clear";
pub(crate) const LINE_ID_ATTRIBUTE: &str = "data-line-id";
pub(crate) const INPUT_PLACEHOLDER: &str = "Command (help) or JS (e.g. mindbox.queue)";
pub(crate) const INPUT_HINT: &str = "Enter runs, Up/Down recall history, Ctrl+L clears.";
pub(crate) const COARSE_POINTER_QUERY: &str = "(pointer: coarse)";
pub(crate) const HOVER_NONE_QUERY: &str = "(hover: none)";
pub(crate) const CAPTURED_LEVELS: [&str; 6] = ["log", "info", "warn", "error", "debug", "clear"];
/// Nesting beyond this is summarized instead of converted.
pub(crate) const MAX_BRIDGE_DEPTH: usize = 256;
pub(crate) const CONSOLE_STYLE_ID: &str = "embedded-console-style";
pub(crate) const CONSOLE_STYLESHEET: &str = "\
#embedded-console .console-line{display:flex;gap:8px;padding:2px 0;white-space:pre-wrap;word-break:break-word}\
#embedded-console .console-time{color:#64748b;flex:none}\
#embedded-console .console-body{flex:1;min-width:0}\
#embedded-console .console-body pre{margin:0;white-space:pre-wrap}\
#embedded-console .lvl-info{color:#93c5fd}\
#embedded-console .lvl-warn{color:#fcd34d}\
#embedded-console .lvl-error{color:#fca5a5}\
#embedded-console .lvl-debug{color:#94a3b8}\
#embedded-console .lvl-cmd{color:#e2e8f0}\
#embedded-console .tok-key{color:#c4b5fd}\
#embedded-console .tok-string{color:#86efac}\
#embedded-console .tok-number,#embedded-console .tok-boolean{color:#fdba74}\
#embedded-console .tok-null,#embedded-console .tok-undefined,#embedded-console .tok-dim{color:#64748b}\
#embedded-console .tok-error{color:#f87171}";
