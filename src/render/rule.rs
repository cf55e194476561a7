//! Domain rule classification.
//!
//! # Responsibilities
//! - Decide how a service's `Domain` matches requests
//! - Produce the HAProxy ACL criterion for it
//! - Provide the key used for conflict detection
//!
//! # Design Decisions
//! - Leading `/` is a path prefix, leading `.` a host suffix, anything else an exact host
//! - All matching is case-insensitive (`-i`), so conflict keys are lowercased
//! - No regex: criteria are fixed-string matches only

/// How a domain string routes requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainRule {
    /// `/api` → `path_beg -i /api`
    PathPrefix(String),
    /// `.example.com` → `hdr_end(host) -i .example.com`
    HostSuffix(String),
    /// `app.example.com` → `hdr(host) -i app.example.com`
    ExactHost(String),
}

impl DomainRule {
    pub fn parse(domain: &str) -> Self {
        if domain.starts_with('/') {
            DomainRule::PathPrefix(domain.to_string())
        } else if domain.starts_with('.') {
            DomainRule::HostSuffix(domain.to_string())
        } else {
            DomainRule::ExactHost(domain.to_string())
        }
    }

    /// ACL criterion, e.g. `hdr_end(host) -i .example.com`.
    pub fn criterion(&self) -> String {
        match self {
            DomainRule::PathPrefix(path) => format!("path_beg -i {}", path),
            DomainRule::HostSuffix(suffix) => format!("hdr_end(host) -i {}", suffix),
            DomainRule::ExactHost(host) => format!("hdr(host) -i {}", host),
        }
    }

    /// Two rules with equal keys match exactly the same requests.
    pub fn conflict_key(&self) -> String {
        match self {
            DomainRule::PathPrefix(v) | DomainRule::HostSuffix(v) | DomainRule::ExactHost(v) => {
                v.to_ascii_lowercase()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_classifies_domains() {
        assert_eq!(DomainRule::parse("/api"), DomainRule::PathPrefix("/api".into()));
        assert_eq!(
            DomainRule::parse(".example.com"),
            DomainRule::HostSuffix(".example.com".into())
        );
        assert_eq!(
            DomainRule::parse("app.example.com"),
            DomainRule::ExactHost("app.example.com".into())
        );
    }

    #[test]
    fn test_criteria() {
        assert_eq!(DomainRule::parse("/api").criterion(), "path_beg -i /api");
        assert_eq!(
            DomainRule::parse(".example.com").criterion(),
            "hdr_end(host) -i .example.com"
        );
        assert_eq!(
            DomainRule::parse("app.example.com").criterion(),
            "hdr(host) -i app.example.com"
        );
    }

    #[test]
    fn test_conflict_key_is_case_insensitive() {
        assert_eq!(
            DomainRule::parse(".Example.COM").conflict_key(),
            DomainRule::parse(".example.com").conflict_key()
        );
    }
}
