//! Operation matcher
//!
//! Picks the RBAC operations in a provider catalog that correspond to a CLI
//! command. Commands are classified into control plane or data plane, then
//! resource types are selected by plane-specific rules and their operations
//! filtered by verb.
//!
//! The plane classification is structural (a multi-word service is treated
//! as data plane), an approximation rather than a fact reported by the
//! provider. The data-plane thresholds live in [`MatchPolicy`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::Command;
use crate::provider::catalog::{ProviderCatalog, ResourceType};

/// Which plane a command operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plane {
    /// ARM-level management of the resource itself
    Control,
    /// Operations on data held inside a resource
    Data,
}

/// Tunable thresholds for data-plane resource-type selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchPolicy {
    /// The sub-resource must sit within this many trailing path segments
    pub max_segments_from_end: usize,
    /// Minimum number of `/` separators in a data-plane resource type
    pub min_depth: usize,
    /// Skip insights/monitoring resource types unless asked for
    pub exclude_monitoring: bool,
    /// Operation fragments that count as asking for monitoring
    pub monitoring_keywords: Vec<String>,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            max_segments_from_end: 2,
            min_depth: 1,
            exclude_monitoring: true,
            monitoring_keywords: vec![
                "monitor".to_string(),
                "metric".to_string(),
                "diagnostic".to_string(),
            ],
        }
    }
}

/// Predicate-to-classification rule
struct PlaneRule {
    name: &'static str,
    applies: fn(&Command) -> bool,
    plane: Plane,
}

/// Evaluated in order; the first rule that applies decides. Commands no
/// rule claims are control plane.
const PLANE_RULES: &[PlaneRule] = &[PlaneRule {
    name: "multi-word-service",
    applies: has_multi_word_service,
    plane: Plane::Data,
}];

fn has_multi_word_service(cmd: &Command) -> bool {
    cmd.service_words().count() >= 2
}

/// Classify a command as control plane or data plane.
#[must_use]
pub fn classify(cmd: &Command) -> Plane {
    PLANE_RULES
        .iter()
        .find(|rule| (rule.applies)(cmd))
        .map_or(Plane::Control, |rule| {
            debug!(rule = rule.name, plane = ?rule.plane, command = cmd.full_command(), "classified command");
            rule.plane
        })
}

/// Control-plane (service, operation) to accepted resource types.
/// Compared after removing `/` and lowercasing.
const CONTROL_PLANE_TYPES: &[(&str, &str, &[&str])] = &[
    ("group", "create", &["subscriptions/resourcegroups"]),
    ("group", "delete", &["subscriptions/resourcegroups"]),
    ("group", "list", &["subscriptions/resourcegroups"]),
    ("group", "show", &["subscriptions/resourcegroups"]),
    ("vm", "create", &["virtualmachines"]),
    ("vm", "delete", &["virtualmachines"]),
    ("vm", "start", &["virtualmachines"]),
    ("vm", "stop", &["virtualmachines"]),
    ("vm", "restart", &["virtualmachines"]),
    ("vm", "list", &["virtualmachines"]),
    ("vm", "show", &["virtualmachines", "virtualmachines/instanceview"]),
    ("storage", "create", &["storageaccounts"]),
    ("storage", "delete", &["storageaccounts"]),
    ("storage", "list", &["storageaccounts"]),
    ("storage", "show", &["storageaccounts"]),
    ("webapp", "create", &["sites"]),
    ("webapp", "delete", &["sites"]),
    ("webapp", "list", &["sites"]),
    ("webapp", "show", &["sites"]),
    ("webapp", "start", &["sites"]),
    ("webapp", "stop", &["sites"]),
    ("webapp", "restart", &["sites"]),
    ("keyvault", "create", &["vaults"]),
    ("keyvault", "delete", &["vaults"]),
    ("keyvault", "list", &["vaults"]),
    ("keyvault", "show", &["vaults"]),
    ("aks", "create", &["managedclusters"]),
    ("aks", "delete", &["managedclusters"]),
    ("aks", "list", &["managedclusters"]),
    ("aks", "show", &["managedclusters"]),
    ("aks", "start", &["managedclusters"]),
    ("aks", "stop", &["managedclusters"]),
];

/// Base-service names that appear differently in resource-type paths
const SERVICE_ALIASES: &[(&str, &[&str])] = &[
    ("keyvault", &["vault", "vaults"]),
    ("storage", &["storageaccount", "storageaccounts"]),
    ("cosmosdb", &["documentdb", "cosmos"]),
];

/// CLI verb to operation-name fragments, used for filtering
const VERB_SYNONYMS: &[(&str, &[&str])] = &[
    ("create", &["write", "create"]),
    ("update", &["write", "update"]),
    (
        "set",
        &["write", "set", "setsecret", "setkey", "setcertificate"],
    ),
    (
        "delete",
        &[
            "delete",
            "remove",
            "deletesecret",
            "deletekey",
            "deletecertificate",
        ],
    ),
    ("remove", &["delete", "remove"]),
    (
        "list",
        &["read", "list", "getsecret", "getkey", "getcertificate"],
    ),
    (
        "show",
        &["read", "get", "getsecret", "getkey", "getcertificate"],
    ),
    (
        "get",
        &["read", "get", "getsecret", "getkey", "getcertificate"],
    ),
    ("start", &["start"]),
    ("stop", &["poweroff", "stop"]),
    ("restart", &["restart"]),
    ("upload", &["write", "put"]),
    ("download", &["read", "get"]),
];

/// Narrower verb table for the suggestion pass
const SUGGESTION_SYNONYMS: &[(&str, &[&str])] = &[
    ("create", &["write"]),
    ("update", &["write"]),
    ("set", &["write"]),
    ("delete", &["delete"]),
    ("remove", &["delete"]),
    ("list", &["read"]),
    ("show", &["read"]),
    ("get", &["read"]),
    ("start", &["start"]),
    ("stop", &["poweroff", "stop"]),
    ("restart", &["restart"]),
];

fn lookup<'a>(table: &'a [(&str, &'a [&'a str])], verb: &str) -> &'a [&'a str] {
    table
        .iter()
        .find(|(key, _)| *key == verb)
        .map_or(&[] as &[&str], |&(_, synonyms)| synonyms)
}

/// Operation-name fragments accepted for a CLI verb
#[must_use]
pub fn verb_synonyms(verb: &str) -> &'static [&'static str] {
    lookup(VERB_SYNONYMS, &verb.to_lowercase())
}

/// Whether an RBAC operation name matches a CLI verb.
///
/// Matches when the name contains the verb, contains one of its synonyms,
/// or is an `/action` whose action name contains either.
#[must_use]
pub fn operation_matches(cmd_op: &str, op_name: &str) -> bool {
    let cmd_op = cmd_op.to_lowercase();
    let op_name = op_name.to_lowercase();

    if op_name.contains(&cmd_op) {
        return true;
    }

    let synonyms = verb_synonyms(&cmd_op);
    if synonyms.iter().any(|s| op_name.contains(s)) {
        return true;
    }

    op_name.strip_suffix("/action").is_some_and(|action| {
        action.contains(&cmd_op) || synonyms.iter().any(|s| action.contains(s))
    })
}

/// Everything a data-plane check needs, lowercased once
struct DataPlaneQuery<'a> {
    base_service: &'a str,
    sub_resource: &'a str,
    operation: String,
    resource_type: String,
    policy: &'a MatchPolicy,
}

impl DataPlaneQuery<'_> {
    fn segments(&self) -> Vec<&str> {
        self.resource_type.split('/').collect()
    }
}

/// A named data-plane predicate; a resource type must pass them all
struct DataPlaneCheck {
    name: &'static str,
    passes: for<'a> fn(&DataPlaneQuery<'a>) -> bool,
}

const DATA_PLANE_CHECKS: &[DataPlaneCheck] = &[
    DataPlaneCheck {
        name: "base-service",
        passes: mentions_base_service,
    },
    DataPlaneCheck {
        name: "sub-resource",
        passes: mentions_sub_resource,
    },
    DataPlaneCheck {
        name: "hierarchy-depth",
        passes: is_deep_enough,
    },
    DataPlaneCheck {
        name: "specificity",
        passes: sub_resource_near_end,
    },
    DataPlaneCheck {
        name: "monitoring",
        passes: monitoring_requested_or_absent,
    },
];

fn mentions_base_service(q: &DataPlaneQuery<'_>) -> bool {
    let aliases = lookup(SERVICE_ALIASES, q.base_service);
    if aliases.is_empty() {
        q.resource_type.contains(q.base_service)
    } else {
        aliases.iter().any(|alias| q.resource_type.contains(alias))
    }
}

fn mentions_sub_resource(q: &DataPlaneQuery<'_>) -> bool {
    q.resource_type.contains(q.sub_resource)
}

fn is_deep_enough(q: &DataPlaneQuery<'_>) -> bool {
    q.resource_type.matches('/').count() >= q.policy.min_depth
}

/// Position of the sub-resource in the path, scanning from the end. An
/// exact segment (`secret` or `secrets`) stops the scan; otherwise the
/// earliest segment containing it is taken.
fn sub_resource_position(segments: &[&str], sub_resource: &str) -> Option<usize> {
    let plural = format!("{sub_resource}s");
    let mut position = None;
    for (i, part) in segments.iter().enumerate().rev() {
        if part.contains(sub_resource) {
            position = Some(i);
            if *part == sub_resource || *part == plural {
                break;
            }
        }
    }
    position
}

fn sub_resource_near_end(q: &DataPlaneQuery<'_>) -> bool {
    let segments = q.segments();
    sub_resource_position(&segments, q.sub_resource)
        .is_some_and(|pos| pos + q.policy.max_segments_from_end >= segments.len())
}

fn monitoring_requested_or_absent(q: &DataPlaneQuery<'_>) -> bool {
    if !q.policy.exclude_monitoring {
        return true;
    }
    let is_monitoring =
        q.resource_type.contains("insights") || q.resource_type.contains("monitoring");
    !is_monitoring
        || q
            .policy
            .monitoring_keywords
            .iter()
            .any(|kw| q.operation.contains(kw.as_str()))
}

/// Matches commands against provider catalogs
#[derive(Debug, Clone, Default)]
pub struct OperationMatcher {
    policy: MatchPolicy,
}

impl OperationMatcher {
    /// Create a matcher with the given policy
    #[must_use]
    pub const fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    /// Permission names in `catalog` required by `cmd`. Never contains
    /// duplicates. Falls back to [`Self::suggest`] when nothing matches.
    #[must_use]
    pub fn match_operations(&self, cmd: &Command, catalog: &ProviderCatalog) -> BTreeSet<String> {
        let plane = classify(cmd);
        let mut found = BTreeSet::new();

        if plane == Plane::Control {
            for op in &catalog.operations {
                if operation_matches(cmd.operation(), &op.name) {
                    debug!(operation = %op.name, "matched provider operation");
                    found.insert(op.name.clone());
                }
            }
        }

        for resource_type in &catalog.resource_types {
            if !self.resource_type_matches(cmd, plane, &resource_type.name) {
                continue;
            }
            debug!(resource_type = %resource_type.name, "matched resource type");
            for op in &resource_type.operations {
                if operation_matches(cmd.operation(), &op.name) {
                    debug!(operation = %op.name, "matched operation");
                    found.insert(op.name.clone());
                }
            }
        }

        if found.is_empty() {
            debug!(command = cmd.full_command(), "no exact matches, using suggestions");
            found = self.suggest(cmd, catalog);
        }

        found
    }

    /// Best-effort pass: take the first structurally matching resource type
    /// (or the catalog's first) and return its operations for the verb, or
    /// its first read operation.
    #[must_use]
    pub fn suggest(&self, cmd: &Command, catalog: &ProviderCatalog) -> BTreeSet<String> {
        let plane = classify(cmd);
        let Some(best) = catalog
            .resource_types
            .iter()
            .find(|rt| self.resource_type_matches(cmd, plane, &rt.name))
            .or_else(|| catalog.resource_types.first())
        else {
            return BTreeSet::new();
        };

        let patterns = lookup(SUGGESTION_SYNONYMS, &cmd.operation().to_lowercase());
        let mut suggestions: BTreeSet<String> = best
            .operations
            .iter()
            .filter(|op| {
                let name = op.name.to_lowercase();
                patterns.iter().any(|p| name.contains(p))
            })
            .map(|op| op.name.clone())
            .collect();

        if suggestions.is_empty() {
            if let Some(read) = first_read_operation(best) {
                suggestions.insert(read.to_string());
            }
        }

        suggestions
    }

    /// Whether a catalog resource type belongs to the command
    #[must_use]
    pub fn resource_type_matches(&self, cmd: &Command, plane: Plane, resource_type: &str) -> bool {
        match plane {
            Plane::Control => control_plane_matches(cmd, resource_type),
            Plane::Data => self.data_plane_matches(cmd, resource_type),
        }
    }

    fn data_plane_matches(&self, cmd: &Command, resource_type: &str) -> bool {
        let service = cmd.service().to_lowercase();
        let mut words = service.split_whitespace();
        let (Some(base_service), Some(sub_resource)) = (words.next(), words.next()) else {
            return false;
        };

        let query = DataPlaneQuery {
            base_service,
            sub_resource,
            operation: cmd.operation().to_lowercase(),
            resource_type: resource_type.to_lowercase(),
            policy: &self.policy,
        };

        match DATA_PLANE_CHECKS.iter().find(|check| !(check.passes)(&query)) {
            Some(check) => {
                if query.resource_type.contains(sub_resource) {
                    debug!(resource_type, check = check.name, "rejected resource type");
                }
                false
            }
            None => true,
        }
    }
}

fn control_plane_matches(cmd: &Command, resource_type: &str) -> bool {
    let service = cmd.service().to_lowercase();
    let operation = cmd.operation().to_lowercase();
    let normalized = normalize_resource_type(resource_type);

    CONTROL_PLANE_TYPES
        .iter()
        .find(|(svc, op, _)| *svc == service && *op == operation)
        .is_some_and(|(_, _, accepted)| {
            accepted
                .iter()
                .any(|pattern| normalize_resource_type(pattern) == normalized)
        })
}

fn normalize_resource_type(name: &str) -> String {
    name.replace('/', "").to_lowercase()
}

fn first_read_operation(resource_type: &ResourceType) -> Option<&str> {
    resource_type
        .operations
        .iter()
        .find(|op| op.name.to_lowercase().contains("read"))
        .map(|op| op.name.as_str())
}
