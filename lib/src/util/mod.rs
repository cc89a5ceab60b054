mod path_ext;

pub use path_ext::*;

use std::time::Duration;

/// Lowercase ASCII transliteration of `string` in which every run of
/// characters other than alphanumerics and `_` becomes one `-`. Leading and
/// trailing runs are dropped.
pub fn slugify(string: &str) -> String {
    let ascii: String = string.chars()
        .map(|c| match c.is_alphanumeric() || c == '_' {
            true => deunicode::deunicode_char(c).unwrap_or("-"),
            false => "-",
        })
        .collect();

    ascii.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .map(|word| word.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// Strips a leading `.` so that `".lua"` and `"lua"` name the same extension.
pub fn normalize_extension(ext: &str) -> &str {
    ext.strip_prefix('.').unwrap_or(ext)
}

/// Formats `duration` as fractional milliseconds, i.e, `12.34ms`.
pub fn ms(duration: Duration) -> String {
    format!("{:.2}ms", duration.as_secs_f64() * 1000.0)
}
