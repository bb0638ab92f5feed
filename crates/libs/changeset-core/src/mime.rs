//! MIME inference table for the resource URI parser (spec §4.4). Fixed,
//! extensible, and deliberately small: the core system serves artifacts
//! opaquely and never interprets their contents beyond this hint.

const EXECUTABLE_SUFFIXES: &[&str] = &["exe", "bat", "cmd", "com", "scr"];

const TABLE: &[(&str, &str)] = &[
    ("md", "text/markdown"),
    ("markdown", "text/markdown"),
    ("json", "application/json"),
    ("yaml", "application/yaml"),
    ("yml", "application/yaml"),
    ("toml", "application/toml"),
    ("txt", "text/plain"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("ts", "application/typescript"),
    ("rs", "text/x-rust"),
    ("py", "text/x-python"),
    ("go", "text/x-go"),
    ("csv", "text/csv"),
    ("xml", "application/xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
];

pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Infer a MIME type from the last path segment's suffix. Executable
/// suffixes are forced to the default irrespective of the table, per spec.
pub fn infer(segment: &str) -> &'static str {
    let Some(ext) = segment.rsplit('.').next().filter(|e| *e != segment) else {
        return DEFAULT_MIME;
    };
    let ext_lower = ext.to_ascii_lowercase();

    if EXECUTABLE_SUFFIXES.contains(&ext_lower.as_str()) {
        return DEFAULT_MIME;
    }

    TABLE
        .iter()
        .find(|(suffix, _)| *suffix == ext_lower)
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME)
}
