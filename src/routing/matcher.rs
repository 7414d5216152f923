//! Request matching logic.
//!
//! # Responsibilities
//! - Match the request host (any, subdomain wildcard, exact)
//! - Match the request method
//! - Match the request path against segment patterns
//!
//! # Design Decisions
//! - Host and method matching are case-insensitive
//! - Path matching is case-sensitive and segment based
//! - Empty condition = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use axum::http::{request::Parts, Method};

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, parts: &Parts) -> bool;
}

/// Host of a request without the port, from the `Host` header or the URI.
pub fn request_host(parts: &Parts) -> Option<String> {
    let raw = parts
        .headers
        .get("host")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.as_str().to_string()))?;
    Some(strip_port(&raw).to_ascii_lowercase())
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Matches the request host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMatcher {
    Any,
    /// `*.example.com`: any subdomain, stored as `.example.com`.
    Subdomain(String),
    Exact(String),
}

impl HostMatcher {
    /// Parse a host rule. The host is normalized to lowercase.
    pub fn new(host: &str) -> Self {
        let host = host.trim().to_ascii_lowercase();
        if host.is_empty() || host == "*" {
            HostMatcher::Any
        } else if let Some(suffix) = host.strip_prefix('*') {
            HostMatcher::Subdomain(suffix.to_string())
        } else {
            HostMatcher::Exact(host)
        }
    }

    fn matches_host(&self, host: &str) -> bool {
        match self {
            HostMatcher::Any => true,
            HostMatcher::Subdomain(suffix) => host.len() > suffix.len() && host.ends_with(suffix),
            HostMatcher::Exact(expected) => host == expected,
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, parts: &Parts) -> bool {
        match self {
            HostMatcher::Any => true,
            _ => request_host(parts)
                .map(|host| self.matches_host(&host))
                .unwrap_or(false),
        }
    }
}

/// Matches the request method against an allow-list.
#[derive(Debug, Clone)]
pub enum MethodMatcher {
    Any,
    /// Only these methods. Unparseable names are dropped, so a list of
    /// nothing but unparseable names matches no request at all.
    Only(Vec<Method>),
}

impl MethodMatcher {
    /// Build from method names. An empty list means any method.
    pub fn new<S: AsRef<str>>(methods: &[S]) -> Self {
        if methods.is_empty() {
            return MethodMatcher::Any;
        }
        MethodMatcher::Only(
            methods
                .iter()
                .filter_map(|m| Method::from_bytes(m.as_ref().to_ascii_uppercase().as_bytes()).ok())
                .collect(),
        )
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, parts: &Parts) -> bool {
        match self {
            MethodMatcher::Any => true,
            MethodMatcher::Only(methods) => methods.contains(&parts.method),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

/// A compiled path pattern.
///
/// Supported forms: `*` (everything), exact paths, `:name` segments and a
/// trailing `/*` that matches the prefix itself and anything below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
    wildcard: bool,
    /// Leading literal segments, used to strip the matched part of a path.
    prefix: String,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Self {
        let pattern = pattern.trim();
        if pattern == "*" {
            return Self {
                segments: Vec::new(),
                wildcard: true,
                prefix: String::new(),
            };
        }

        let mut parts: Vec<&str> = split_segments(pattern).collect();
        let wildcard = parts.last() == Some(&"*");
        if wildcard {
            parts.pop();
        }

        let segments: Vec<Segment> = parts
            .into_iter()
            .map(|s| {
                if s.starts_with(':') {
                    Segment::Param
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();

        let prefix = segments
            .iter()
            .map_while(|s| match s {
                Segment::Literal(lit) => Some(format!("/{lit}")),
                Segment::Param => None,
            })
            .collect();

        Self {
            segments,
            wildcard,
            prefix,
        }
    }

    /// Returns the static prefix of the pattern if `path` matches.
    pub fn match_path(&self, path: &str) -> Option<&str> {
        let mut actual = split_segments(path);
        for expected in &self.segments {
            let segment = actual.next()?;
            match expected {
                Segment::Literal(lit) if lit != segment => return None,
                _ => {}
            }
        }
        if self.wildcard || actual.next().is_none() {
            Some(self.prefix.as_str())
        } else {
            None
        }
    }
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
