//! Typed Headscale ACL policy documents.
//!
//! The `rules` column holds either a full policy document or a bare list of
//! rules. Both are parsed into these types when read from the `acls` table and
//! validated before anything is written back. Stored JSON of any other shape is
//! kept verbatim so the row still lists and can be corrected.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::error::{AppError, Result};

const GROUP_PREFIX: &str = "group:";
const TAG_PREFIX: &str = "tag:";

/// AclRules
///
/// What an ACL row stores. Variants are tried in order when reading a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(untagged)]
#[ts(export)]
pub enum AclRules {
    /// `[{"action":"accept","src":["*"],"dst":["*:*"]}]`
    Rules(Vec<AclRule>),
    Policy(AclPolicy),
    /// Stored JSON that is neither; shown as-is and rejected on save.
    Unrecognized(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct AclPolicy {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hosts: BTreeMap<String, String>,
    #[serde(default, rename = "tagOwners", skip_serializing_if = "BTreeMap::is_empty")]
    pub tag_owners: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub acls: Vec<AclRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh: Vec<SshRule>,
    #[serde(default, rename = "autoApprovers", skip_serializing_if = "Option::is_none")]
    pub auto_approvers: Option<AutoApprovers>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum AclAction {
    #[default]
    Accept,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct AclRule {
    pub action: AclAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<String>,
    pub src: Vec<String>,
    // Each destination is `host:ports`, e.g. `tag:web:80,443` or `*:*`.
    pub dst: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum SshAction {
    #[default]
    Accept,
    Check,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct SshRule {
    pub action: SshAction,
    pub src: Vec<String>,
    pub dst: Vec<String>,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct AutoApprovers {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub routes: BTreeMap<String, Vec<String>>,
    #[serde(default, rename = "exitNode", skip_serializing_if = "Vec::is_empty")]
    pub exit_node: Vec<String>,
}

impl AclRules {
    /// parse
    ///
    /// Parses the JSON text typed into the ACL form: an array is a rule list, an
    /// object a policy document. Anything else, or a document that fails
    /// validation, is rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let rules = match read_json(text)? {
            value @ Value::Array(_) => {
                let rules: Vec<AclRule> = serde_json::from_value(value)
                    .map_err(|e| invalid(format!("Invalid ACL rule list: {e}")))?;
                AclRules::Rules(rules)
            }
            value @ Value::Object(_) => AclRules::Policy(AclPolicy::from_value(value)?),
            other => {
                return Err(invalid(format!(
                    "rules must be a JSON array of rules or a policy object, got {other}"
                )));
            }
        };
        rules.validate()?;
        Ok(rules)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            AclRules::Rules(rules) => rules
                .iter()
                .enumerate()
                .try_for_each(|(i, rule)| check_rule(rule, &format!("[{i}]"))),
            AclRules::Policy(policy) => policy.validate(),
            AclRules::Unrecognized(_) => Err(invalid(
                "rules are neither a rule list nor a policy document".to_string(),
            )),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, AclRules::Unrecognized(_))
    }

    /// Pretty-printed JSON, as shown in the edit form.
    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl AclPolicy {
    /// parse
    ///
    /// Parses a policy document and validates it.
    pub fn parse(text: &str) -> Result<Self> {
        let policy = Self::from_value(read_json(text)?)?;
        policy.validate()?;
        Ok(policy)
    }

    fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| invalid(format!("Invalid ACL policy: {e}")))
    }

    /// Pretty-printed JSON, as shown in the edit form.
    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// validate
    ///
    /// Semantic checks serde cannot express: key prefixes, non-empty rule sides,
    /// destination port specs, host addresses and group references.
    pub fn validate(&self) -> Result<()> {
        for (name, members) in &self.groups {
            if !name.starts_with(GROUP_PREFIX) || name.len() == GROUP_PREFIX.len() {
                return Err(invalid(format!("group name {name:?} must start with \"group:\"")));
            }
            if members.iter().any(|m| m.trim().is_empty()) {
                return Err(invalid(format!("group {name:?} has an empty member")));
            }
        }

        for (tag, owners) in &self.tag_owners {
            if !tag.starts_with(TAG_PREFIX) || tag.len() == TAG_PREFIX.len() {
                return Err(invalid(format!("tag owner key {tag:?} must start with \"tag:\"")));
            }
            self.check_refs(owners, &format!("tagOwners[{tag:?}]"))?;
        }

        for (host, addr) in &self.hosts {
            if addr.parse::<IpAddr>().is_err() && parse_prefix(addr).is_none() {
                return Err(invalid(format!("host {host:?} has invalid address {addr:?}")));
            }
        }

        for (i, rule) in self.acls.iter().enumerate() {
            let at = format!("acls[{i}]");
            check_rule(rule, &at)?;
            self.check_refs(&rule.src, &at)?;
            for dst in &rule.dst {
                if let Some((target, _)) = dst.rsplit_once(':') {
                    self.check_ref(target, &at)?;
                }
            }
        }

        for (i, rule) in self.ssh.iter().enumerate() {
            let at = format!("ssh[{i}]");
            if rule.src.is_empty() || rule.dst.is_empty() || rule.users.is_empty() {
                return Err(invalid(format!("{at}: src, dst and users must not be empty")));
            }
            self.check_refs(&rule.src, &at)?;
            self.check_refs(&rule.dst, &at)?;
        }

        if let Some(approvers) = &self.auto_approvers {
            for (prefix, owners) in &approvers.routes {
                if parse_prefix(prefix).is_none() {
                    return Err(invalid(format!("autoApprovers: invalid route {prefix:?}")));
                }
                self.check_refs(owners, "autoApprovers.routes")?;
            }
            self.check_refs(&approvers.exit_node, "autoApprovers.exitNode")?;
        }

        Ok(())
    }

    fn check_refs(&self, entries: &[String], at: &str) -> Result<()> {
        entries.iter().try_for_each(|entry| self.check_ref(entry, at))
    }

    fn check_ref(&self, entry: &str, at: &str) -> Result<()> {
        if entry.starts_with(GROUP_PREFIX) && !self.groups.contains_key(entry) {
            return Err(invalid(format!("{at}: undefined group {entry:?}")));
        }
        Ok(())
    }
}

/// parse_prefix
///
/// Parses a CIDR prefix such as `10.0.0.0/24` or `fd7a::/48`.
pub fn parse_prefix(text: &str) -> Option<(IpAddr, u8)> {
    let (addr, len) = text.trim().split_once('/')?;
    let addr: IpAddr = addr.parse().ok()?;
    let len: u8 = len.parse().ok()?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    (len <= max).then_some((addr, len))
}

/// Shape checks for a single rule. Group references are checked by the policy
/// that defines the groups; a bare rule list refers to groups defined elsewhere.
fn check_rule(rule: &AclRule, at: &str) -> Result<()> {
    if rule.src.is_empty() || rule.dst.is_empty() {
        return Err(invalid(format!("{at}: src and dst must not be empty")));
    }
    for dst in &rule.dst {
        let Some((target, ports)) = dst.rsplit_once(':') else {
            return Err(invalid(format!("{at}: destination {dst:?} is missing a port")));
        };
        if target.is_empty() || !is_port_spec(ports) {
            return Err(invalid(format!("{at}: invalid destination {dst:?}")));
        }
    }
    Ok(())
}

fn read_json(text: &str) -> Result<Value> {
    serde_json::from_str(text)
        .map_err(|e| invalid(format!("Invalid JSON format for rules: {e}")))
}

fn is_port_spec(ports: &str) -> bool {
    ports == "*"
        || ports.split(',').all(|part| match part.split_once('-') {
            Some((lo, hi)) => matches!(
                (lo.parse::<u16>(), hi.parse::<u16>()),
                (Ok(lo), Ok(hi)) if lo <= hi
            ),
            None => part.parse::<u16>().is_ok(),
        })
}

fn invalid(message: String) -> AppError {
    AppError::Validation(message)
}
