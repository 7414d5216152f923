//! Compiled API endpoint rules.

use axum::http::request::Parts;

use crate::config::schema::ApiEndpointConfig;
use crate::routing::matcher::{HostMatcher, Matcher, MethodMatcher, PathPattern};

/// An API endpoint compiled from its configuration entry.
///
/// Host, method and path conditions combine with AND semantics; any one
/// of the path patterns may match.
#[derive(Debug, Clone)]
pub struct EndpointRule {
    name: String,
    host: HostMatcher,
    methods: MethodMatcher,
    paths: Vec<PathPattern>,
}

impl EndpointRule {
    pub fn new(name: impl Into<String>, config: &ApiEndpointConfig) -> Self {
        let host = config
            .host
            .as_deref()
            .map(HostMatcher::new)
            .unwrap_or(HostMatcher::Any);
        let paths = if config.paths.is_empty() {
            vec![PathPattern::new("/*")]
        } else {
            config.paths.iter().map(|p| PathPattern::new(p)).collect()
        };
        Self {
            name: name.into(),
            host,
            methods: MethodMatcher::new(&config.methods),
            paths,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the matched pattern's static prefix when the request matches.
    pub fn matches(&self, parts: &Parts) -> Option<String> {
        if !self.host.matches(parts) || !self.methods.matches(parts) {
            return None;
        }
        let path = parts.uri.path();
        self.paths
            .iter()
            .find_map(|pattern| pattern.match_path(path))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(method: &str, uri: &str, host: &str) -> Parts {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("host", host)
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn test_defaults_match_everything() {
        let rule = EndpointRule::new("all", &ApiEndpointConfig::default());
        assert_eq!(rule.matches(&parts("PATCH", "/x/y", "any.host")), Some(String::new()));
    }

    #[test]
    fn test_all_conditions_must_hold() {
        let config = ApiEndpointConfig {
            host: Some("api.example.com".into()),
            paths: vec!["/v1/*".into(), "/health".into()],
            methods: vec!["GET".into()],
        };
        let rule = EndpointRule::new("api", &config);

        assert_eq!(
            rule.matches(&parts("GET", "/v1/users", "api.example.com")),
            Some("/v1".to_string())
        );
        assert_eq!(
            rule.matches(&parts("GET", "/health", "api.example.com")),
            Some("/health".to_string())
        );
        assert!(rule.matches(&parts("POST", "/v1/users", "api.example.com")).is_none());
        assert!(rule.matches(&parts("GET", "/v1/users", "www.example.com")).is_none());
        assert!(rule.matches(&parts("GET", "/v2", "api.example.com")).is_none());
    }

    #[test]
    fn test_unparseable_method_list_is_not_a_wildcard() {
        let config = ApiEndpointConfig {
            host: None,
            paths: vec!["/admin-only".into()],
            methods: vec!["G ET".into()],
        };
        let rule = EndpointRule::new("restricted", &config);
        assert!(rule.matches(&parts("DELETE", "/admin-only", "gw.local")).is_none());
    }
}
