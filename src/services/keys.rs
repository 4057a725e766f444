//! Object key naming.
//!
//! Every key produced here is a single storage-safe path segment that can be
//! used verbatim as an object-store key and as a URL path segment. Both the
//! photo upload path and the profile/banner upsert path go through
//! [`sanitize_file_name`], so the two never disagree on what a filename maps to.

use uuid::Uuid;

/// Longest key any backend is handed: a key plus the `.json` suffix of its
/// head file must fit in a 255-byte filename.
pub const MAX_KEY_LEN: usize = 250;

/// Escaped extensions longer than this are treated as part of the stem.
const MAX_EXTENSION_LEN: usize = 16;

/// Derive a fresh, collision-free key for an uploaded file:
/// `<random token>_<sanitized filename>`.
///
/// The owner id is accepted for symmetry with the metadata partitioning but
/// does not appear in the key; uniqueness comes from the random token alone.
pub fn generate_key(_owner_id: &str, original_file_name: &str) -> String {
    sanitize_file_name(&unique_file_name(original_file_name))
}

/// Prefix `file_name` with a random token so no two calls name the same object.
pub fn unique_file_name(file_name: &str) -> String {
    format!("{}_{}", Uuid::new_v4().simple(), file_name)
}

/// Swap the extension of `file_name` for `extension`, adding one if missing.
pub fn replace_extension(file_name: &str, extension: &str) -> String {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    format!("{stem}.{extension}")
}

/// Make a caller-supplied filename safe for use as a storage key.
///
/// Whitespace becomes `_`, everything outside the RFC 3986 unreserved set is
/// percent-escaped, and leading dots are escaped so the result can never be
/// `.`, `..`, or a hidden file. Names longer than [`MAX_KEY_LEN`] once escaped
/// lose characters from the end of the stem; the extension is kept.
pub fn sanitize_file_name(file_name: &str) -> String {
    let (stem, suffix) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            let ext: String = ext.chars().map(escape_char).collect();
            if ext.len() <= MAX_EXTENSION_LEN {
                (stem, format!(".{ext}"))
            } else {
                (file_name, String::new())
            }
        }
        _ => (file_name, String::new()),
    };

    let budget = MAX_KEY_LEN - suffix.len();
    let mut out = String::with_capacity(budget.min(stem.len() * 3) + suffix.len());
    let mut leading = true;
    for c in stem.chars() {
        let unit = if leading && c == '.' {
            "%2E".to_string()
        } else {
            leading = false;
            escape_char(c)
        };
        // Whole escape units only, so a `%XX` sequence is never split.
        if out.len() + unit.len() > budget {
            break;
        }
        out.push_str(&unit);
    }
    out.push_str(&suffix);
    out
}

fn escape_char(c: char) -> String {
    if c.is_whitespace() {
        return "_".to_string();
    }
    let mut buf = [0u8; 4];
    urlencoding::encode(c.encode_utf8(&mut buf)).into_owned()
}
