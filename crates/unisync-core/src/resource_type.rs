use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// How many declarative objects may contribute to one external resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContributionMode {
    /// The highest-priority source wins; the rest are ignored.
    Single,
    /// Entries from all sources are unioned in priority order.
    Multi,
}

/// Catalog of external resource kinds the engine can keep in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    Rule,
    DnsRecord,
    List,
    Ruleset,
}

impl ResourceType {
    /// All catalog entries, in declaration order.
    pub const ALL: [ResourceType; 4] = [
        ResourceType::Rule,
        ResourceType::DnsRecord,
        ResourceType::List,
        ResourceType::Ruleset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Rule => "Rule",
            ResourceType::DnsRecord => "DnsRecord",
            ResourceType::List => "List",
            ResourceType::Ruleset => "Ruleset",
        }
    }

    pub fn contribution_mode(&self) -> ContributionMode {
        match self {
            ResourceType::Rule | ResourceType::DnsRecord => ContributionMode::Single,
            ResourceType::List | ResourceType::Ruleset => ContributionMode::Multi,
        }
    }

    /// Whether the external API addresses this kind under a zone rather than an account.
    pub fn requires_zone(&self) -> bool {
        matches!(self, ResourceType::DnsRecord)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Rule" | "rule" => Ok(ResourceType::Rule),
            "DnsRecord" | "dns_record" | "dnsrecord" => Ok(ResourceType::DnsRecord),
            "List" | "list" => Ok(ResourceType::List),
            "Ruleset" | "ruleset" => Ok(ResourceType::Ruleset),
            other => Err(CoreError::invalid_resource_type(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_roundtrip() {
        for rt in ResourceType::ALL {
            assert_eq!(rt.as_str().parse::<ResourceType>().unwrap(), rt);
        }
        assert_eq!("dns_record".parse::<ResourceType>().unwrap(), ResourceType::DnsRecord);
        assert!("Widget".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_contribution_modes() {
        assert_eq!(ResourceType::Rule.contribution_mode(), ContributionMode::Single);
        assert_eq!(ResourceType::DnsRecord.contribution_mode(), ContributionMode::Single);
        assert_eq!(ResourceType::List.contribution_mode(), ContributionMode::Multi);
        assert_eq!(ResourceType::Ruleset.contribution_mode(), ContributionMode::Multi);
    }
}
