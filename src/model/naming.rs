//! Unique names for new files: `stub (N).ext` with the lowest free `N`.
//!
//! Names are compared case-insensitively so the result is safe on FAT
//! formatted memory cards as well.

use std::collections::HashSet;

/// Second-level extensions kept together with the last one.
const DOUBLE_EXTENSION_STEMS: &[&str] = &["tar"];

/// Splits `name` into stub and extension (dot included). Dot-files have no
/// extension and `.tar.gz` style extensions stay in one piece.
pub fn split_extension(name: &str) -> (&str, &str) {
    let Some(dot) = name.rfind('.') else {
        return (name, "");
    };
    if dot == 0 || dot + 1 == name.len() {
        return (name, "");
    }
    let stub = &name[..dot];
    if let Some(inner) = stub.rfind('.') {
        if inner > 0 && DOUBLE_EXTENSION_STEMS.iter().any(|s| stub[inner + 1..].eq_ignore_ascii_case(s)) {
            return (&name[..inner], &name[inner..]);
        }
    }
    (stub, &name[dot..])
}

/// `"file (3)"` gives 3.
pub fn parse_autonaming_number(stub: &str) -> Option<u32> {
    let inner = stub.strip_suffix(')')?;
    let open = inner.rfind(" (")?;
    let digits = &inner[open + 2..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `"file (3)"` gives `"file"`; anything else is returned unchanged.
pub fn strip_autonaming(stub: &str) -> &str {
    if parse_autonaming_number(stub).is_none() {
        return stub;
    }
    match stub.rfind(" (") {
        Some(open) if open > 0 => &stub[..open],
        _ => stub,
    }
}

/// First of `stub+ext`, `stub (1)+ext`, `stub (2)+ext`, ... not in `existing`.
pub fn unique_name<'a>(existing: impl IntoIterator<Item = &'a str>, stub: &str, ext: &str) -> String {
    let taken: HashSet<String> = existing.into_iter().map(str::to_lowercase).collect();
    let plain = format!("{}{}", stub, ext);
    if !taken.contains(&plain.to_lowercase()) {
        return plain;
    }
    let mut n: u32 = 1;
    loop {
        let candidate = format!("{} ({}){}", stub, n, ext);
        if !taken.contains(&candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

/// Free name derived from `name`, dropping any counter it already carries.
pub fn autoname<'a>(existing: impl IntoIterator<Item = &'a str>, name: &str) -> String {
    let (stub, ext) = split_extension(name);
    unique_name(existing, strip_autonaming(stub), ext)
}
