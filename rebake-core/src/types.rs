//! Domain types for the per-project configuration record.
//!
//! All types round-trip through serde + serde_json. Variable maps keep their
//! insertion order so rewritten records diff cleanly.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// An opaque template revision identifier (a git commit id in practice).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub String);

impl Revision {
    /// Abbreviated form for human-facing output.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Revision {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Revision {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Variable name → value mapping, in declaration order.
pub type Variables = Map<String, Value>;

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// The saved rendering context.
///
/// Template variables live under `cookiecutter`; any sibling keys are kept
/// verbatim so records written by other tools survive a rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProjectContext {
    #[serde(default)]
    pub cookiecutter: Variables,
    #[serde(flatten)]
    pub extra: Variables,
}

impl ProjectContext {
    /// The saved variables overlaid with `collected`; collected values win.
    pub fn overlay(&self, collected: &Variables) -> Variables {
        let mut merged = self.cookiecutter.clone();
        for (name, value) in collected {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }
}

/// A generated project's relationship to its template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Template location (URL or path).
    pub template: String,
    /// Template revision the project currently reflects.
    pub commit: Revision,
    #[serde(default)]
    pub context: ProjectContext,
    /// Pinned ref tracked instead of the template's default branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout: Option<String>,
    /// Path globs excluded when applying template changes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn revision_short_truncates_to_eight_chars() {
        let rev = Revision::from("0123456789abcdef");
        assert_eq!(rev.short(), "01234567");
        assert_eq!(Revision::from("abc").short(), "abc");
    }

    #[test]
    fn revision_display() {
        assert_eq!(Revision::from("deadbeef").to_string(), "deadbeef");
    }

    #[test]
    fn overlay_prefers_collected_values() {
        let ctx = ProjectContext {
            cookiecutter: json!({"name": "x", "license": "MIT"})
                .as_object()
                .cloned()
                .unwrap(),
            extra: Variables::new(),
        };
        let collected = json!({"license": "Apache-2.0", "ci": true})
            .as_object()
            .cloned()
            .unwrap();

        let merged = ctx.overlay(&collected);
        assert_eq!(merged["name"], "x");
        assert_eq!(merged["license"], "Apache-2.0");
        assert_eq!(merged["ci"], true);
        let keys: Vec<_> = merged.keys().cloned().collect();
        assert_eq!(keys, ["name", "license", "ci"], "existing keys keep their position");
    }

    #[test]
    fn optional_fields_are_omitted_when_empty() {
        let config = ProjectConfig {
            template: "https://example.com/tpl".to_string(),
            commit: Revision::from("abc123"),
            context: ProjectContext::default(),
            checkout: None,
            skip: vec![],
        };
        let value = serde_json::to_value(&config).expect("serialize");
        assert!(value.get("checkout").is_none());
        assert!(value.get("skip").is_none());
        assert_eq!(value["context"], json!({"cookiecutter": {}}));
    }

    #[test]
    fn context_extra_keys_survive_roundtrip() {
        let raw = json!({
            "template": "t",
            "commit": "c",
            "context": {"cookiecutter": {"a": 1}, "_meta": {"tool": "other"}}
        });
        let config: ProjectConfig = serde_json::from_value(raw.clone()).expect("deserialize");
        assert_eq!(config.context.extra["_meta"]["tool"], "other");
        assert_eq!(serde_json::to_value(&config).expect("serialize"), raw);
    }
}
