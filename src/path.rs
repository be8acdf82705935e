//! Canonical URI keys for tree nodes.
//!
//! Every node is keyed by a [`FilePath`], a normalized `scheme://authority/path`
//! string. Normalization collapses repeated slashes and drops a trailing slash
//! (except on the root of an authority), so normalizing twice is the same as
//! normalizing once and `path_to_uri(uri_to_path(u)) == u` holds for every
//! canonical `u`.

use std::fmt;
use std::path::{Path, PathBuf};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{FsError, FsErrorKind, FsResult};

/// Characters escaped inside a single path segment.
const SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'?')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^')
    .add(b'%')
    .add(b'/');

pub const LOCAL_SCHEME: &str = "file";

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilePath {
    uri: String,
    /// Byte offset where the path component starts (always a '/').
    path_start: usize,
}

impl FilePath {
    /// Parses and normalizes a URI, or an absolute local path.
    pub fn parse(input: &str) -> FsResult<Self> {
        uri_to_path(input)
    }

    pub fn from_local_path(path: &Path) -> FsResult<Self> {
        if !path.is_absolute() {
            return Err(FsError::new(
                FsErrorKind::InvalidArg,
                format!("Not an absolute path: {}", path.display()),
            ));
        }
        let encoded = path
            .to_string_lossy()
            .split('/')
            .map(|segment| utf8_percent_encode(segment, SEGMENT_ENCODE_SET).to_string())
            .collect::<Vec<_>>()
            .join("/");
        uri_to_path(&format!("{}://{}", LOCAL_SCHEME, encoded))
    }

    pub fn as_uri(&self) -> &str {
        &self.uri
    }

    pub fn scheme(&self) -> &str {
        self.uri.split("://").next().unwrap_or("")
    }

    pub fn authority(&self) -> &str {
        let start = self.scheme().len() + 3;
        &self.uri[start..self.path_start]
    }

    /// The raw (still percent-encoded) path component.
    pub fn path_part(&self) -> &str {
        &self.uri[self.path_start..]
    }

    pub fn is_local(&self) -> bool {
        self.scheme() == LOCAL_SCHEME && self.authority().is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.path_part() == "/"
    }

    /// Decoded last segment; `"/"` for the root of an authority.
    pub fn basename(&self) -> String {
        if self.is_root() {
            if self.authority().is_empty() {
                return "/".to_string();
            }
            return self.authority().to_string();
        }
        let raw = self.path_part().rsplit('/').next().unwrap_or("");
        percent_decode_str(raw).decode_utf8_lossy().into_owned()
    }

    pub fn parent(&self) -> Option<FilePath> {
        if self.is_root() {
            return None;
        }
        let path = self.path_part();
        let cut = path.rfind('/').unwrap_or(0);
        let parent_path = if cut == 0 { "/" } else { &path[..cut] };
        Some(FilePath {
            uri: format!("{}{}", &self.uri[..self.path_start], parent_path),
            path_start: self.path_start,
        })
    }

    /// Builds the path of a direct child named `name` (unencoded).
    pub fn child(&self, name: &str) -> FsResult<FilePath> {
        if name.is_empty() || name == "." || name == ".." {
            return Err(FsError::new(
                FsErrorKind::InvalidArg,
                format!("Invalid child name: {:?}", name),
            ));
        }
        if name.contains('/') {
            return Err(FsError::new(
                FsErrorKind::InvalidArg,
                format!("Child name contains a separator: {:?}", name),
            ));
        }
        let encoded = utf8_percent_encode(name, SEGMENT_ENCODE_SET).to_string();
        let uri = if self.is_root() {
            format!("{}{}", self.uri, encoded)
        } else {
            format!("{}/{}", self.uri, encoded)
        };
        Ok(FilePath {
            uri,
            path_start: self.path_start,
        })
    }

    /// True when `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &FilePath) -> bool {
        if self.uri[..self.path_start] != other.uri[..other.path_start] || self == other {
            return false;
        }
        if self.is_root() {
            return true;
        }
        other.uri.starts_with(&self.uri) && other.uri.as_bytes().get(self.uri.len()) == Some(&b'/')
    }

    /// `self` itself, an ancestor of `other`, or the authority-less root of
    /// the scheme `other` lives in (`obex:///` holds `obex://[addr]/...`).
    pub fn contains(&self, other: &FilePath) -> bool {
        if self == other || self.is_ancestor_of(other) {
            return true;
        }
        self.is_root()
            && self.authority().is_empty()
            && !other.authority().is_empty()
            && self.scheme() == other.scheme()
    }

    /// Local file name for `file://` paths.
    pub fn to_local_path(&self) -> Option<PathBuf> {
        if !self.is_local() {
            return None;
        }
        let decoded = percent_decode_str(self.path_part()).decode_utf8_lossy();
        Some(PathBuf::from(decoded.into_owned()))
    }

    /// Replaces the raw path component, keeping scheme and authority.
    pub(crate) fn with_path_part(&self, path: &str) -> FsResult<FilePath> {
        uri_to_path(&format!("{}{}", &self.uri[..self.path_start], path))
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

impl fmt::Debug for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FilePath({})", self.uri)
    }
}

/// Parses `input` into a canonical [`FilePath`].
///
/// Absolute local paths (`/home/user`) are accepted and mapped onto
/// `file://`. Input that looks like the beginning of a URI (`file:`,
/// `file:/`, `obex://[00:11`) fails with [`FsErrorKind::PartialInput`].
pub fn uri_to_path(input: &str) -> FsResult<FilePath> {
    if input.is_empty() {
        return Err(FsError::new(FsErrorKind::PartialInput, "Empty path"));
    }
    if input.starts_with('/') {
        return FilePath::from_local_path(Path::new(input));
    }

    let Some(sep) = input.find("://") else {
        if is_scheme_prefix(input) {
            return Err(FsError::new(
                FsErrorKind::PartialInput,
                format!("Incomplete URI: {}", input),
            ));
        }
        return Err(FsError::new(
            FsErrorKind::InvalidArg,
            format!("Not a URI or absolute path: {}", input),
        ));
    };

    let scheme = &input[..sep];
    if scheme.is_empty() || !scheme.chars().all(is_scheme_char) {
        return Err(FsError::new(
            FsErrorKind::InvalidArg,
            format!("Invalid URI scheme: {}", input),
        ));
    }

    let rest = &input[sep + 3..];
    let authority_end = if rest.starts_with('[') {
        match rest.find(']') {
            Some(close) => close + 1,
            None => {
                return Err(FsError::new(
                    FsErrorKind::PartialInput,
                    format!("Unterminated address in URI: {}", input),
                ))
            }
        }
    } else {
        rest.find('/').unwrap_or(rest.len())
    };
    let authority = &rest[..authority_end];
    let path = normalize_path(&rest[authority_end..]);

    let prefix = format!("{}://{}", scheme.to_ascii_lowercase(), authority);
    let path_start = prefix.len();
    Ok(FilePath {
        uri: format!("{}{}", prefix, path),
        path_start,
    })
}

pub fn path_to_uri(path: &FilePath) -> String {
    path.uri.clone()
}

fn normalize_path(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 1);
    out.push('/');
    for segment in raw.split('/').filter(|s| !s.is_empty()) {
        if out.len() > 1 {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

fn is_scheme_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'
}

/// `file`, `file:`, `file:/` are all a URI being typed.
fn is_scheme_prefix(input: &str) -> bool {
    match input.find(':') {
        Some(colon) => {
            let scheme = &input[..colon];
            let tail = &input[colon + 1..];
            !scheme.is_empty() && scheme.chars().all(is_scheme_char) && tail.chars().all(|c| c == '/')
        }
        None => false,
    }
}
