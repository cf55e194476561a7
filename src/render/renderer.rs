//! Registry snapshot → HAProxy configuration text.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::config::RenderConfig;
use crate::registry::{ServiceEntry, Snapshot};
use crate::render::rule::DomainRule;

/// Used when no preamble file is configured.
pub const DEFAULT_PREAMBLE: &str = "\
global
  daemon
  maxconn 4096

defaults
  mode http
  timeout connect 5s
  timeout client 30s
  timeout server 30s
";

const HEADER: &str = "# Generated by haproxy-manager. Manual edits are overwritten.\n";

/// Everything the renderer needs besides the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    pub frontend_name: String,
    pub bind: String,
    pub backend_host: String,
    pub check_inter_ms: u64,
    /// `global`/`defaults` sections emitted verbatim before the frontend.
    pub preamble: String,
}

impl RenderSettings {
    pub fn from_config(config: &RenderConfig, preamble: Option<String>) -> Self {
        Self {
            frontend_name: config.frontend_name.clone(),
            bind: config.bind.clone(),
            backend_host: config.backend_host.clone(),
            check_inter_ms: config.check_inter_ms,
            preamble: preamble.unwrap_or_else(|| DEFAULT_PREAMBLE.to_string()),
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::from_config(&RenderConfig::default(), None)
    }
}

/// Configuration text derived from one registry snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    version: u64,
    text: String,
}

impl RenderedConfig {
    pub fn new(version: u64, text: impl Into<String>) -> Self {
        Self {
            version,
            text: text.into(),
        }
    }

    /// Registry version of the snapshot this was rendered from.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Errors that abort a render.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The same domain would route to two different targets.
    #[error("domain '{domain}' is claimed by '{first}' ({first_target}) and '{second}' ({second_target})")]
    DomainConflict {
        domain: String,
        first: String,
        first_target: String,
        second: String,
        second_target: String,
    },

    /// More than one entry asks to be the default backend.
    #[error("both '{first}' and '{second}' are marked as the default backend")]
    DefaultConflict { first: String, second: String },
}

impl RenderError {
    /// Services involved in the conflict.
    pub fn services(&self) -> [&str; 2] {
        match self {
            RenderError::DomainConflict { first, second, .. } => [first.as_str(), second.as_str()],
            RenderError::DefaultConflict { first, second } => [first.as_str(), second.as_str()],
        }
    }
}

/// Render `snapshot` into HAProxy configuration text.
///
/// Entries are emitted in snapshot order, so identical snapshots produce
/// byte-identical output. Pure: performs no I/O.
pub fn render(snapshot: &Snapshot, settings: &RenderSettings) -> Result<RenderedConfig, RenderError> {
    check_conflicts(&snapshot.entries, &settings.backend_host)?;

    let mut out = String::with_capacity(512 + snapshot.entries.len() * 160);
    out.push_str(HEADER);
    out.push('\n');
    let preamble = settings.preamble.trim_end();
    if !preamble.is_empty() {
        out.push_str(preamble);
        out.push_str("\n\n");
    }

    out.push_str(&format!("frontend {}\n", settings.frontend_name));
    out.push_str(&format!("  bind {}\n", settings.bind));
    for entry in &snapshot.entries {
        let rule = DomainRule::parse(&entry.domain);
        out.push_str(&format!("  acl is_{} {}\n", entry.name, rule.criterion()));
        out.push_str(&format!("  use_backend {} if is_{}\n", entry.name, entry.name));
    }
    if let Some(default) = snapshot.entries.iter().find(|e| e.default) {
        out.push_str(&format!("  default_backend {}\n", default.name));
    }

    for entry in &snapshot.entries {
        out.push('\n');
        out.push_str(&format!("backend {}\n", entry.name));
        out.push_str(&format!(
            "  server {} {} check inter {}\n",
            entry.name,
            entry.target(&settings.backend_host),
            settings.check_inter_ms
        ));
    }

    Ok(RenderedConfig::new(snapshot.version, out))
}

fn check_conflicts(entries: &[ServiceEntry], backend_host: &str) -> Result<(), RenderError> {
    let mut claimed: BTreeMap<String, &ServiceEntry> = BTreeMap::new();
    let mut default: Option<&ServiceEntry> = None;

    for entry in entries {
        let key = DomainRule::parse(&entry.domain).conflict_key();
        if let Some(first) = claimed.get(&key) {
            let first_target = first.target(backend_host);
            let second_target = entry.target(backend_host);
            if first_target != second_target {
                return Err(RenderError::DomainConflict {
                    domain: entry.domain.clone(),
                    first: first.name.clone(),
                    first_target,
                    second: entry.name.clone(),
                    second_target,
                });
            }
        } else {
            claimed.insert(key, entry);
        }

        if entry.default {
            if let Some(first) = default {
                return Err(RenderError::DefaultConflict {
                    first: first.name.clone(),
                    second: entry.name.clone(),
                });
            }
            default = Some(entry);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(entries: Vec<ServiceEntry>) -> Snapshot {
        let mut entries = entries;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Snapshot { version: 1, entries }
    }

    fn settings() -> RenderSettings {
        RenderSettings {
            preamble: String::new(),
            ..RenderSettings::default()
        }
    }

    #[test]
    fn test_render_layout() {
        let rendered = render(
            &snapshot(vec![
                ServiceEntry::new("myapp", 7777, ".example.com"),
                ServiceEntry::new("api", 9000, "/api").with_host("10.0.0.5").as_default(),
            ]),
            &settings(),
        )
        .unwrap();

        let expected = "\
# Generated by haproxy-manager. Manual edits are overwritten.

frontend http-in
  bind *:80
  acl is_api path_beg -i /api
  use_backend api if is_api
  acl is_myapp hdr_end(host) -i .example.com
  use_backend myapp if is_myapp
  default_backend api

backend api
  server api 10.0.0.5:9000 check inter 10000

backend myapp
  server myapp 127.0.0.1:7777 check inter 10000
";
        assert_eq!(rendered.text(), expected);
        assert_eq!(rendered.version(), 1);
    }

    #[test]
    fn test_render_is_deterministic() {
        let snap = snapshot(vec![
            ServiceEntry::new("b", 81, ".b.com"),
            ServiceEntry::new("a", 80, ".a.com"),
            ServiceEntry::new("c", 82, "/c"),
        ]);
        let settings = RenderSettings::default();

        let first = render(&snap, &settings).unwrap();
        let second = render(&snap.clone(), &settings).unwrap();
        assert_eq!(first.text().as_bytes(), second.text().as_bytes());
    }

    #[test]
    fn test_default_preamble_is_included() {
        let rendered = render(&snapshot(vec![]), &RenderSettings::default()).unwrap();
        assert!(rendered.text().contains("\ndefaults\n  mode http\n"));
        assert!(rendered.text().contains("frontend http-in\n"));
    }

    #[test]
    fn test_same_domain_different_port_conflicts() {
        let err = render(
            &snapshot(vec![
                ServiceEntry::new("a", 80, "d"),
                ServiceEntry::new("b", 81, "D"),
            ]),
            &settings(),
        )
        .unwrap_err();

        assert_eq!(
            err,
            RenderError::DomainConflict {
                domain: "D".into(),
                first: "a".into(),
                first_target: "127.0.0.1:80".into(),
                second: "b".into(),
                second_target: "127.0.0.1:81".into(),
            }
        );
        assert_eq!(err.services(), ["a", "b"]);
    }

    #[test]
    fn test_same_domain_same_target_is_allowed() {
        let rendered = render(
            &snapshot(vec![
                ServiceEntry::new("a", 80, ".shared.com"),
                ServiceEntry::new("b", 80, ".shared.com"),
            ]),
            &settings(),
        );
        assert!(rendered.is_ok());
    }

    #[test]
    fn test_two_defaults_conflict() {
        let err = render(
            &snapshot(vec![
                ServiceEntry::new("a", 80, ".a.com").as_default(),
                ServiceEntry::new("b", 81, ".b.com").as_default(),
            ]),
            &settings(),
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::DefaultConflict { .. }));
    }

    #[test]
    fn test_removed_entry_leaves_no_trace() {
        let registry = crate::registry::ServiceRegistry::new();
        registry.upsert(ServiceEntry::new("keep", 80, ".keep.com")).unwrap();
        registry.upsert(ServiceEntry::new("gone", 81, ".gone.com")).unwrap();
        registry.remove("gone").unwrap();

        let rendered = render(&registry.snapshot(), &settings()).unwrap();
        assert!(!rendered.text().contains("gone"));
        assert!(rendered.text().contains("backend keep\n"));
    }
}
