//! Cross-origin policy layer

use axum::http::{header::HeaderName, HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

use crate::config::CorsConfig;

/// Build the CORS middleware from configuration
///
/// Returns `None` when no usable origin is configured, in which case
/// browsers fall back to the same-origin policy.
#[must_use]
pub fn build_cors_layer(cors: &CorsConfig) -> Option<CorsLayer> {
    let (any_origin, origins) = parse_allowed_origins(&cors.allowed_origins);
    if !any_origin && origins.is_empty() {
        tracing::warn!("No valid CORS origins configured, cross-origin requests stay blocked");
        return None;
    }

    let (any_methods, methods) = parse_allowed_methods(&cors.allowed_methods);
    let (any_headers, headers) = parse_header_names(&cors.allowed_headers);

    let mut layer = CorsLayer::new();

    layer = if any_origin {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    };

    if any_methods {
        layer = layer.allow_methods(Any);
    } else if !methods.is_empty() {
        layer = layer.allow_methods(methods);
    }

    if any_headers {
        layer = layer.allow_headers(Any);
    } else if !headers.is_empty() {
        layer = layer.allow_headers(headers);
    }

    Some(layer)
}

fn parse_allowed_origins(values: &[String]) -> (bool, Vec<HeaderValue>) {
    let mut any = false;
    let mut origins = Vec::new();
    for value in values.iter().map(|raw| raw.trim()).filter(|v| !v.is_empty()) {
        if value == "*" {
            any = true;
            continue;
        }
        match HeaderValue::from_str(value) {
            Ok(origin) => origins.push(origin),
            Err(_) => tracing::warn!(origin = value, "Ignoring invalid CORS origin"),
        }
    }
    (any, origins)
}

fn parse_allowed_methods(values: &[String]) -> (bool, Vec<Method>) {
    let mut any = false;
    let mut methods = Vec::new();
    for value in values.iter().map(|raw| raw.trim()).filter(|v| !v.is_empty()) {
        if value == "*" {
            any = true;
            continue;
        }
        match Method::from_bytes(value.to_ascii_uppercase().as_bytes()) {
            Ok(method) => methods.push(method),
            Err(_) => tracing::warn!(method = value, "Ignoring invalid CORS method"),
        }
    }
    (any, methods)
}

fn parse_header_names(values: &[String]) -> (bool, Vec<HeaderName>) {
    let mut any = false;
    let mut headers = Vec::new();
    for value in values.iter().map(|raw| raw.trim()).filter(|v| !v.is_empty()) {
        if value == "*" {
            any = true;
            continue;
        }
        match HeaderName::from_bytes(value.to_ascii_lowercase().as_bytes()) {
            Ok(header) => headers.push(header),
            Err(_) => tracing::warn!(header = value, "Ignoring invalid CORS header"),
        }
    }
    (any, headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::CONTENT_TYPE;

    #[test]
    fn test_default_policy_builds() {
        assert!(build_cors_layer(&CorsConfig::default()).is_some());
    }

    #[test]
    fn test_skipped_without_origins() {
        let cors = CorsConfig {
            allowed_origins: vec![" ".to_string(), "bad\norigin".to_string()],
            ..CorsConfig::default()
        };
        assert!(build_cors_layer(&cors).is_none());
    }

    #[test]
    fn test_wildcard_origin() {
        let (any, origins) = parse_allowed_origins(&["*".to_string()]);
        assert!(any);
        assert!(origins.is_empty());
    }

    #[test]
    fn test_methods_normalised_to_uppercase() {
        let input = vec!["get".to_string(), " POST ".to_string(), "options".to_string()];
        let (any, methods) = parse_allowed_methods(&input);
        assert!(!any);
        assert_eq!(methods, vec![Method::GET, Method::POST, Method::OPTIONS]);
    }

    #[test]
    fn test_header_names_normalised() {
        let (any, headers) = parse_header_names(&["Content-Type".to_string()]);
        assert!(!any);
        assert_eq!(headers, vec![CONTENT_TYPE]);
    }
}
