//! Allowed HTTP methods per target shape.

use axum::http::Method;

use super::resolver::Shape;

const COLLECTION_METHODS: &[Method] = &[Method::GET, Method::POST];

const ITEM_METHODS: &[Method] = &[Method::GET, Method::PUT, Method::PATCH, Method::DELETE];

/// Ordered, immutable set of methods a target shape accepts.
///
/// Order is part of the contract: it is rendered as-is into the `Allow` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSet(&'static [Method]);

impl MethodSet {
    pub fn as_slice(&self) -> &'static [Method] {
        self.0
    }

    pub fn contains(&self, method: &Method) -> bool {
        self.0.contains(method)
    }

    /// Value for the `Allow` response header, e.g. `GET, POST`.
    pub fn allow_header(&self) -> String {
        self.0
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Methods accepted for a target of the given shape.
pub fn allowed_methods(shape: Shape) -> MethodSet {
    match shape {
        Shape::Collection => MethodSet(COLLECTION_METHODS),
        Shape::Item => MethodSet(ITEM_METHODS),
    }
}
