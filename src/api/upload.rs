//! Upload filename checks

/// Extensions accepted by the upload endpoint (compared lowercased)
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Whether the filename carries an accepted image extension
///
/// Only the suffix after the last `.` counts, so `photo.txt.png` passes and
/// `png` (no dot) does not.
#[must_use]
pub fn allowed_file(filename: &str) -> bool {
    filename.rsplit_once('.').is_some_and(|(_, ext)| {
        let ext = ext.to_ascii_lowercase();
        ALLOWED_EXTENSIONS.contains(&ext.as_str())
    })
}

/// Reduce a client-supplied filename to a safe flat name
///
/// Non-ASCII letters are transliterated first (`café` becomes `cafe`); other
/// non-ASCII characters such as emoji are dropped. Path separators become
/// word breaks, whitespace runs become `_`, and any character outside
/// `[A-Za-z0-9_.-]` is dropped. The result can be empty.
#[must_use]
pub fn secure_filename(filename: &str) -> String {
    let flattened: String = to_ascii(filename)
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");

    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');

    let stem = trimmed.split('.').next().unwrap_or_default();
    if !trimmed.is_empty() && WINDOWS_DEVICE_NAMES.contains(&stem.to_ascii_uppercase().as_str()) {
        format!("_{trimmed}")
    } else {
        trimmed.to_string()
    }
}

fn to_ascii(filename: &str) -> String {
    let mut ascii = String::with_capacity(filename.len());
    for c in filename.chars() {
        if c.is_ascii() {
            ascii.push(c);
        } else if c.is_alphabetic() {
            ascii.push_str(deunicode::deunicode_char(c).unwrap_or_default());
        }
    }
    ascii
}
