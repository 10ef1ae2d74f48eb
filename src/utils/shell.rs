//! Shell escaping and quoting utilities.

/// Escape a value for use inside single quotes.
/// Replaces `'` with `'\''` (end quote, escaped quote, start quote).
pub fn escape_single_quote_content(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Quote a single argument for shell execution.
/// - Empty strings become `''`
/// - Strings with shell metacharacters are wrapped in single quotes
/// - Embedded single quotes are escaped
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    // Characters that require quoting
    const SHELL_META: &[char] = &[
        ' ', '\t', '\n', '\'', '"', '\\', '$', '`', '!', '*', '?', '[', ']', '(', ')', '{', '}',
        '<', '>', '|', '&', ';', '#', '~',
    ];

    if !arg.contains(SHELL_META) {
        return arg.to_string();
    }

    format!("'{}'", escape_single_quote_content(arg))
}

/// Quote a path for shell execution (always quotes).
pub fn quote_path(path: &str) -> String {
    format!("'{}'", escape_single_quote_content(path))
}

/// Quote a remote path, keeping a leading `~` expandable.
///
/// `~` and `~/rest` become `"$HOME"` and `"$HOME"/'rest'`; any other path is
/// quoted as with [`quote_path`].
pub fn quote_remote_path(path: &str) -> String {
    if path == "~" {
        return "\"$HOME\"".to_string();
    }
    match path.strip_prefix("~/") {
        Some("") => "\"$HOME\"/".to_string(),
        Some(rest) => format!("\"$HOME\"/{}", quote_path(rest)),
        None => quote_path(path),
    }
}

/// Shell fragment that writes `value` plus a trailing newline to stdout.
///
/// Uses `printf '%s\n'` so the value is never interpreted as a format string,
/// and single-quotes it so no expansion happens. Intended to be piped into a
/// program reading a secret from stdin.
pub fn printf_line(value: &str) -> String {
    format!("printf '%s\\n' {}", quote_path(value))
}
