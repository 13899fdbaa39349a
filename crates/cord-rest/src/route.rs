//! Routes and queued request descriptions

use reqwest::Method;
use serde_json::Value;
use std::fmt;

/// HTTP method plus path relative to the versioned API root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    /// Path starting with `/`, e.g. `/channels/123/messages`
    pub path: String,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Self { method, path }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// A request as handed to the executor
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub route: Route,
    pub body: Option<Value>,
}

impl RestRequest {
    pub fn new(route: Route, body: Option<Value>) -> Self {
        Self { route, body }
    }
}
