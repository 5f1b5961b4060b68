// Upload filename validation and sanitization

/// Extensions accepted for decoding
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Returns the lowercased extension after the last `.`, if any.
pub fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Checks that `filename` has an allowed image extension.
///
/// Purely syntactic: the file contents are never inspected.
pub fn allowed_file(filename: &str) -> bool {
    extension_of(filename)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Turns a client-supplied filename into one that is safe to store.
///
/// Non-ASCII characters are dropped, path separators become spaces, runs of
/// whitespace collapse into `_` and anything outside `[A-Za-z0-9_.-]` is
/// removed. Leading and trailing dots and underscores are stripped, so the
/// result can never be `..` or a hidden file. May return an empty string.
pub fn sanitize_filename(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}
