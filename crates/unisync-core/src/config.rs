//! Typed contributor configs and the merge policies that turn a set of
//! [`ConfigSource`]s into one desired configuration.
//!
//! Sources are persisted as untyped JSON; this module is the validation
//! boundary. Everything downstream of [`extract_config`] works with
//! [`MergedConfig`].
//!
//! ## Merge policies
//!
//! - One-contributor types (`Rule`, `DnsRecord`): the source with the lowest
//!   priority value wins, the rest are ignored.
//! - Multi-contributor types (`List`, `Ruleset`): scalar fields take the first
//!   value seen in priority order; entries are unioned and deduplicated by key,
//!   first-seen wins.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{CoreError, Result};
use crate::resource_type::{ContributionMode, ResourceType};
use crate::sync_state::ConfigSource;

const DNS_RECORD_TYPES: &[&str] = &["A", "AAAA", "CAA", "CNAME", "MX", "NS", "SRV", "TXT"];

fn default_true() -> bool {
    true
}

fn default_ttl() -> u32 {
    1
}

fn default_list_kind() -> String {
    "ip".to_string()
}

/// A single filtering rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// A DNS record. `ttl = 1` means "automatic".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DnsRecordConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default)]
    pub proxied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListItem {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Merged list: header from the highest-priority contributor, items from all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListConfig {
    pub name: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub items: Vec<ListItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesetRule {
    #[serde(rename = "ref")]
    pub rule_ref: String,
    pub expression: String,
    pub action: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Merged ruleset: rules from all contributors, deduplicated by `ref`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesetConfig {
    pub name: String,
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub rules: Vec<RulesetRule>,
}

/// What one contributor may say about a list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListFragment {
    name: Option<String>,
    kind: Option<String>,
    description: Option<String>,
    #[serde(default)]
    items: Vec<ListItem>,
}

/// What one contributor may say about a ruleset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RulesetFragment {
    name: Option<String>,
    phase: Option<String>,
    description: Option<String>,
    #[serde(default)]
    rules: Vec<RulesetRule>,
}

/// Desired configuration for one external resource, validated and merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resourceType", content = "config")]
pub enum MergedConfig {
    Rule(RuleConfig),
    DnsRecord(DnsRecordConfig),
    List(ListConfig),
    Ruleset(RulesetConfig),
}

impl MergedConfig {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            MergedConfig::Rule(_) => ResourceType::Rule,
            MergedConfig::DnsRecord(_) => ResourceType::DnsRecord,
            MergedConfig::List(_) => ResourceType::List,
            MergedConfig::Ruleset(_) => ResourceType::Ruleset,
        }
    }

    /// Display name of the resource in the external system.
    pub fn name(&self) -> &str {
        match self {
            MergedConfig::Rule(c) => &c.name,
            MergedConfig::DnsRecord(c) => &c.name,
            MergedConfig::List(c) => &c.name,
            MergedConfig::Ruleset(c) => &c.name,
        }
    }

    /// Request body for Create/Update calls.
    pub fn to_params(&self) -> Result<Value> {
        let value = match self {
            MergedConfig::Rule(c) => serde_json::to_value(c)?,
            MergedConfig::DnsRecord(c) => serde_json::to_value(c)?,
            MergedConfig::List(c) => serde_json::to_value(c)?,
            MergedConfig::Ruleset(c) => serde_json::to_value(c)?,
        };
        Ok(value)
    }
}

/// Merges the given sources into the desired configuration for `resource_type`.
///
/// Result is independent of the order in which sources were registered.
pub fn extract_config(resource_type: ResourceType, sources: &[ConfigSource]) -> Result<MergedConfig> {
    let mut ordered: Vec<&ConfigSource> = sources.iter().collect();
    ordered.sort_by(|a, b| ConfigSource::merge_order(a, b));

    let Some(primary) = ordered.first() else {
        return Err(CoreError::NoSources(resource_type.to_string()));
    };

    if resource_type.contribution_mode() == ContributionMode::Single && ordered.len() > 1 {
        tracing::debug!(
            resource_type = %resource_type,
            winner = %primary.owner_ref,
            ignored = ordered.len() - 1,
            "Ignoring lower-priority sources for one-contributor resource type"
        );
    }

    match resource_type {
        ResourceType::Rule => {
            let config: RuleConfig = parse_source(primary)?;
            validate_rule(primary, &config)?;
            Ok(MergedConfig::Rule(config))
        }
        ResourceType::DnsRecord => {
            let config: DnsRecordConfig = parse_source(primary)?;
            validate_dns_record(primary, &config)?;
            Ok(MergedConfig::DnsRecord(config))
        }
        ResourceType::List => merge_list(&ordered).map(MergedConfig::List),
        ResourceType::Ruleset => merge_ruleset(&ordered).map(MergedConfig::Ruleset),
    }
}

fn parse_source<T: DeserializeOwned>(source: &ConfigSource) -> Result<T> {
    serde_json::from_value(source.config.clone())
        .map_err(|e| CoreError::invalid_config(source.owner_ref.to_string(), e.to_string()))
}

fn require_non_empty(source: &ConfigSource, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CoreError::invalid_config(
            source.owner_ref.to_string(),
            format!("`{field}` must not be empty"),
        ));
    }
    Ok(())
}

fn validate_rule(source: &ConfigSource, config: &RuleConfig) -> Result<()> {
    require_non_empty(source, "name", &config.name)?;
    require_non_empty(source, "action", &config.action)
}

fn validate_dns_record(source: &ConfigSource, config: &DnsRecordConfig) -> Result<()> {
    require_non_empty(source, "name", &config.name)?;
    require_non_empty(source, "content", &config.content)?;
    if !DNS_RECORD_TYPES.contains(&config.record_type.as_str()) {
        return Err(CoreError::invalid_config(
            source.owner_ref.to_string(),
            format!("unsupported record type `{}`", config.record_type),
        ));
    }
    if config.ttl != 1 && !(60..=86_400).contains(&config.ttl) {
        return Err(CoreError::invalid_config(
            source.owner_ref.to_string(),
            format!("ttl {} out of range (1 or 60..=86400)", config.ttl),
        ));
    }
    Ok(())
}

fn merge_list(ordered: &[&ConfigSource]) -> Result<ListConfig> {
    let mut name = None;
    let mut kind = None;
    let mut description = None;
    let mut items = Vec::new();
    let mut seen = HashSet::new();

    for source in ordered {
        let fragment: ListFragment = parse_source(source)?;
        name = name.or(fragment.name);
        kind = kind.or(fragment.kind);
        description = description.or(fragment.description);
        for item in fragment.items {
            require_non_empty(source, "items[].value", &item.value)?;
            if seen.insert(item.value.clone()) {
                items.push(item);
            }
        }
    }

    let name = name.ok_or_else(|| missing_field(ordered, "name"))?;
    Ok(ListConfig {
        name,
        kind: kind.unwrap_or_else(default_list_kind),
        description,
        items,
    })
}

fn merge_ruleset(ordered: &[&ConfigSource]) -> Result<RulesetConfig> {
    let mut name = None;
    let mut phase = None;
    let mut description = None;
    let mut rules = Vec::new();
    let mut seen = HashSet::new();

    for source in ordered {
        let fragment: RulesetFragment = parse_source(source)?;
        name = name.or(fragment.name);
        phase = phase.or(fragment.phase);
        description = description.or(fragment.description);
        for rule in fragment.rules {
            require_non_empty(source, "rules[].ref", &rule.rule_ref)?;
            if seen.insert(rule.rule_ref.clone()) {
                rules.push(rule);
            }
        }
    }

    Ok(RulesetConfig {
        name: name.ok_or_else(|| missing_field(ordered, "name"))?,
        phase: phase.ok_or_else(|| missing_field(ordered, "phase"))?,
        description,
        rules,
    })
}

/// Attributes a field no contributor supplied to the highest-priority source.
fn missing_field(ordered: &[&ConfigSource], field: &str) -> CoreError {
    let owner = ordered
        .first()
        .map(|s| s.owner_ref.to_string())
        .unwrap_or_default();
    CoreError::invalid_config(owner, format!("no source provides `{field}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::OwnerRef;
    use serde_json::json;

    fn source(name: &str, priority: i32, config: Value) -> ConfigSource {
        ConfigSource::new(OwnerRef::cluster("Contributor", name), priority, config)
    }

    #[test]
    fn test_single_contributor_picks_lowest_priority_value() {
        let a = source("A", 1, json!({"name": "r1", "action": "block"}));
        let b = source("B", 5, json!({"name": "r2", "action": "allow"}));

        for sources in [vec![a.clone(), b.clone()], vec![b, a]] {
            let merged = extract_config(ResourceType::Rule, &sources).unwrap();
            match merged {
                MergedConfig::Rule(rule) => {
                    assert_eq!(rule.name, "r1");
                    assert_eq!(rule.action, "block");
                    assert!(rule.enabled);
                }
                other => panic!("unexpected config: {other:?}"),
            }
        }
    }

    #[test]
    fn test_single_contributor_ignores_malformed_loser() {
        let sources = vec![
            source("A", 1, json!({"name": "r1", "action": "block"})),
            source("B", 5, json!({"bogus": true})),
        ];
        assert!(extract_config(ResourceType::Rule, &sources).is_ok());
    }

    #[test]
    fn test_extraction_failure_names_the_owner() {
        let sources = vec![source("A", 1, json!({"name": "r1"}))];
        let err = extract_config(ResourceType::Rule, &sources).unwrap_err();
        assert!(err.is_extraction_error());
        assert!(err.to_string().contains("Contributor/A"));
    }

    #[test]
    fn test_no_sources_is_extraction_error() {
        let err = extract_config(ResourceType::List, &[]).unwrap_err();
        assert!(matches!(err, CoreError::NoSources(_)));
    }

    #[test]
    fn test_dns_record_validation() {
        let ok = vec![source(
            "www",
            0,
            json!({"name": "www.example.com", "type": "A", "content": "192.0.2.1"}),
        )];
        let merged = extract_config(ResourceType::DnsRecord, &ok).unwrap();
        assert_eq!(merged.name(), "www.example.com");
        assert_eq!(merged.to_params().unwrap()["ttl"], json!(1));

        let bad_type = vec![source(
            "www",
            0,
            json!({"name": "www", "type": "BOGUS", "content": "x"}),
        )];
        assert!(extract_config(ResourceType::DnsRecord, &bad_type).is_err());

        let bad_ttl = vec![source(
            "www",
            0,
            json!({"name": "www", "type": "A", "content": "x", "ttl": 5}),
        )];
        assert!(extract_config(ResourceType::DnsRecord, &bad_ttl).is_err());
    }

    #[test]
    fn test_list_merges_items_first_seen_wins() {
        let sources = vec![
            source(
                "b",
                20,
                json!({"items": [
                    {"value": "10.0.0.2", "comment": "from b"},
                    {"value": "10.0.0.3"}
                ]}),
            ),
            source(
                "a",
                10,
                json!({"name": "blocklist", "items": [
                    {"value": "10.0.0.1"},
                    {"value": "10.0.0.2", "comment": "from a"}
                ]}),
            ),
        ];

        let merged = extract_config(ResourceType::List, &sources).unwrap();
        let MergedConfig::List(list) = merged else {
            panic!("expected list config");
        };
        assert_eq!(list.name, "blocklist");
        assert_eq!(list.kind, "ip");
        let values: Vec<&str> = list.items.iter().map(|i| i.value.as_str()).collect();
        assert_eq!(values, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        assert_eq!(list.items[1].comment.as_deref(), Some("from a"));
    }

    #[test]
    fn test_list_requires_a_name_from_some_source() {
        let sources = vec![source("a", 1, json!({"items": [{"value": "x"}]}))];
        assert!(extract_config(ResourceType::List, &sources).is_err());
    }

    #[test]
    fn test_ruleset_dedups_by_ref() {
        let sources = vec![
            source(
                "base",
                0,
                json!({"name": "edge", "phase": "request", "rules": [
                    {"ref": "r1", "expression": "true", "action": "log"}
                ]}),
            ),
            source(
                "team",
                1,
                json!({"rules": [
                    {"ref": "r1", "expression": "false", "action": "block"},
                    {"ref": "r2", "expression": "ip.src eq 1.1.1.1", "action": "block"}
                ]}),
            ),
        ];

        let MergedConfig::Ruleset(ruleset) = extract_config(ResourceType::Ruleset, &sources).unwrap()
        else {
            panic!("expected ruleset config");
        };
        assert_eq!(ruleset.rules.len(), 2);
        assert_eq!(ruleset.rules[0].action, "log");
        assert_eq!(ruleset.rules[1].rule_ref, "r2");
    }
}
