//! Mapping of inbound request paths onto upstream target URLs.
//!
//! The resolver is a pure function with no I/O and no logging. The inbound
//! path is percent-decoded before it is split, so `/api/post%73/%31` resolves
//! like `/api/posts/1`. Accepted shapes:
//!
//! ```text
//! /api/posts        → {base}/posts        (collection)
//! /api/posts/{id}   → {base}/posts/{id}   (item, id = ASCII digits)
//! ```

use percent_encoding::percent_decode_str;

use crate::error::ProxyError;

/// Mount point every proxied path is expected under.
pub const API_PREFIX: &str = "/api/";

/// The only resource name the upstream exposes.
pub const RESOURCE: &str = "posts";

/// Whether a target addresses the whole collection or a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Collection,
    Item,
}

/// Why a path could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    EmptyPath,
    InvalidEndpoint,
    InvalidItemId,
    PathTooLong,
}

impl From<Rejection> for ProxyError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::EmptyPath => ProxyError::EmptyPath,
            Rejection::InvalidEndpoint => ProxyError::InvalidEndpoint,
            Rejection::InvalidItemId => ProxyError::InvalidItemId,
            Rejection::PathTooLong => ProxyError::PathTooLong,
        }
    }
}

/// Outcome of resolving one inbound path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetResolution {
    Resolved { url: String, shape: Shape },
    Rejected(Rejection),
}

/// Resolve `inbound_path` against the upstream `base_url`.
///
/// `base_url` is used verbatim as the URL root, so it should not end with `/`
/// (`Config` strips it). `inbound_path` is the raw request path; it is
/// percent-decoded first, and invalid UTF-8 is replaced rather than rejected.
/// Item ids are kept as opaque digit strings and never parsed, so ids of any
/// length are accepted. Only decoded digits reach the target URL.
pub fn resolve(base_url: &str, inbound_path: &str) -> TargetResolution {
    let decoded = percent_decode_str(inbound_path).decode_utf8_lossy();
    let path = decoded
        .strip_prefix(API_PREFIX)
        .unwrap_or(decoded.as_ref())
        .trim_matches('/');

    if path.is_empty() {
        return TargetResolution::Rejected(Rejection::EmptyPath);
    }

    let mut segments = path.split('/');
    if segments.next() != Some(RESOURCE) {
        return TargetResolution::Rejected(Rejection::InvalidEndpoint);
    }

    match (segments.next(), segments.next()) {
        (None, _) => TargetResolution::Resolved {
            url: format!("{base_url}/{RESOURCE}"),
            shape: Shape::Collection,
        },
        (Some(id), None) if is_item_id(id) => TargetResolution::Resolved {
            url: format!("{base_url}/{RESOURCE}/{id}"),
            shape: Shape::Item,
        },
        (Some(_), None) => TargetResolution::Rejected(Rejection::InvalidItemId),
        (Some(_), Some(_)) => TargetResolution::Rejected(Rejection::PathTooLong),
    }
}

/// `^[0-9]+$`
fn is_item_id(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}
