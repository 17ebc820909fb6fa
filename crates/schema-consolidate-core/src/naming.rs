//! Canonical Namer: one representative name per duplicate group.
//!
//! An ordered table of [`NamingRule`]s. A rule applies only when its matcher
//! accepts *every* name of the group; the first applicable rule produces the
//! name. Names are matched with a trailing `Dto` removed. When nothing
//! applies, the shortest member wins (ties broken lexicographically).

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;

use crate::config::NamingRuleConfig;
use crate::error::ConsolidateError;

/// Decides whether one (stemmed) name belongs to a rule.
enum Matcher {
    Builtin(fn(&str) -> bool),
    Pattern(Regex),
}

/// Produces the canonical name once a rule applies.
enum Producer {
    Fixed(String),
    Derived(fn(&[&str]) -> String),
}

/// One row of the naming table.
pub struct NamingRule {
    label: String,
    matcher: Matcher,
    producer: Producer,
}

impl NamingRule {
    /// Rule backed by a regular expression, as loaded from configuration.
    pub fn from_config(config: &NamingRuleConfig) -> Result<Self, ConsolidateError> {
        let regex = Regex::new(&config.pattern).map_err(|e| ConsolidateError::InvalidNamingRule {
            pattern: config.pattern.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            label: format!("pattern {}", config.pattern),
            matcher: Matcher::Pattern(regex),
            producer: Producer::Fixed(config.canonical.clone()),
        })
    }

    fn builtin(label: &str, matches: fn(&str) -> bool, canonical: &str) -> Self {
        Self {
            label: label.to_string(),
            matcher: Matcher::Builtin(matches),
            producer: Producer::Fixed(canonical.to_string()),
        }
    }

    fn derived(label: &str, matches: fn(&str) -> bool, produce: fn(&[&str]) -> String) -> Self {
        Self {
            label: label.to_string(),
            matcher: Matcher::Builtin(matches),
            producer: Producer::Derived(produce),
        }
    }

    /// Human-readable rule name, used in debug logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether this rule accepts one stemmed name.
    pub fn matches(&self, stem: &str) -> bool {
        match &self.matcher {
            Matcher::Builtin(f) => f(stem),
            Matcher::Pattern(re) => re.is_match(stem),
        }
    }

    /// Whether this rule accepts every stemmed name of a group.
    pub fn matches_all(&self, stems: &[&str]) -> bool {
        !stems.is_empty() && stems.iter().all(|s| self.matches(s))
    }

    fn produce(&self, stems: &[&str]) -> String {
        match &self.producer {
            Producer::Fixed(name) => name.clone(),
            Producer::Derived(f) => f(stems),
        }
    }
}

impl fmt::Debug for NamingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamingRule").field("label", &self.label).finish()
    }
}

/// The ordered naming table.
#[derive(Debug)]
pub struct CanonicalNamer {
    rules: Vec<NamingRule>,
}

impl Default for CanonicalNamer {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CanonicalNamer {
    /// The built-in conventions only.
    pub fn builtin() -> Self {
        Self {
            rules: builtin_rules(),
        }
    }

    /// Configured rules first, then the built-in conventions.
    pub fn with_rules(configs: &[NamingRuleConfig]) -> Result<Self, ConsolidateError> {
        let mut rules = configs
            .iter()
            .map(NamingRule::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        rules.extend(builtin_rules());
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[NamingRule] {
        &self.rules
    }

    /// Pick the canonical name for a group.
    ///
    /// Depends only on the set of names: the input is sorted and deduplicated
    /// before any rule runs. Empty input yields an empty string.
    pub fn choose_name(&self, names: &[String]) -> String {
        let mut sorted: Vec<&str> = names.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let stems: Vec<&str> = sorted.iter().map(|n| stem(n)).collect();
        for rule in &self.rules {
            if rule.matches_all(&stems) {
                let name = rule.produce(&stems);
                tracing::debug!(rule = rule.label(), canonical = %name, "naming rule applied");
                return name;
            }
        }

        shortest_name(&sorted).to_string()
    }
}

/// [`CanonicalNamer::choose_name`] with the built-in table.
pub fn choose_name(names: &[String]) -> String {
    CanonicalNamer::builtin().choose_name(names)
}

/// Name with a trailing `Dto` removed.
pub fn stem(name: &str) -> &str {
    name.strip_suffix("Dto").unwrap_or(name)
}

fn shortest_name<'a>(sorted: &[&'a str]) -> &'a str {
    sorted
        .iter()
        .copied()
        .min_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
        .unwrap_or("")
}

// ---------------------------------------------------------------------------
// Built-in conventions
// ---------------------------------------------------------------------------

fn builtin_rules() -> Vec<NamingRule> {
    vec![
        NamingRule::builtin("event action", is_event_action, "EventResponse"),
        NamingRule::builtin("delete response", is_delete_response, "DeleteResponse"),
        NamingRule::builtin("bulk user action", is_bulk_user_action, "BulkActionResponse"),
        NamingRule::builtin("auth entry", is_auth_entry, "TokenResponse"),
        NamingRule::builtin("passkey options", is_passkey_options, "PasskeyOptions"),
        NamingRule::builtin("user crud", is_user_crud, "UserResponse"),
        NamingRule::derived("listing", is_listing, listing_name),
        NamingRule::builtin("reorder request", is_reorder_request, "ReorderRequest"),
        NamingRule::builtin("bulk uuids request", is_bulk_uuids_request, "BulkUuidsRequest"),
    ]
}

/// `BulkAll*`, `Restart*`, `(Add|Remove)UsersTo|From*`, `ResetNodeTraffic`.
fn is_event_action(stem: &str) -> bool {
    let Some(action) = stem.strip_suffix("Response") else {
        return false;
    };
    if action.starts_with("BulkAll") || action.starts_with("Restart") {
        return true;
    }
    if action == "ResetNodeTraffic" {
        return true;
    }
    action
        .strip_prefix("Add")
        .or_else(|| action.strip_prefix("Remove"))
        .is_some_and(|rest| {
            ["UsersTo", "UsersFrom"]
                .iter()
                .any(|p| rest.strip_prefix(p).is_some_and(|target| !target.is_empty()))
        })
}

fn is_delete_response(stem: &str) -> bool {
    stem.strip_prefix("Delete")
        .and_then(|rest| rest.strip_suffix("Response"))
        .is_some()
}

/// `Bulk(Delete|Reset|Revoke|Update)Users*Response`.
fn is_bulk_user_action(stem: &str) -> bool {
    let Some(action) = stem
        .strip_prefix("Bulk")
        .and_then(|rest| rest.strip_suffix("Response"))
    else {
        return false;
    };
    ["Delete", "Reset", "Revoke", "Update"]
        .iter()
        .filter_map(|verb| action.strip_prefix(verb))
        .any(|rest| rest.starts_with("Users"))
}

fn is_auth_entry(stem: &str) -> bool {
    stem.strip_suffix("Response").is_some_and(|entry| {
        matches!(
            entry,
            "Login" | "Register" | "TelegramCallback" | "VerifyPasskeyAuthentication"
        ) || entry.starts_with("OAuth2")
    })
}

/// `(Get|Verify)Passkey(Authentication|Registration)[Options][Response]` and
/// `VerifyPasskey(Authentication|Registration)*Request`: one shape used for
/// both directions of the WebAuthn handshake.
fn is_passkey_options(stem: &str) -> bool {
    let (rest, verify) = match stem.strip_prefix("GetPasskey") {
        Some(rest) => (rest, false),
        None => match stem.strip_prefix("VerifyPasskey") {
            Some(rest) => (rest, true),
            None => return false,
        },
    };
    let Some(rest) = ["Authentication", "Registration"]
        .iter()
        .find_map(|ceremony| rest.strip_prefix(*ceremony))
    else {
        return false;
    };
    if verify && rest.starts_with("Request") {
        return true;
    }
    let rest = rest.strip_prefix("Options").unwrap_or(rest);
    rest.is_empty() || rest == "Response"
}

/// `(Create|Update|Get)User[By…]Response`.
fn is_user_crud(stem: &str) -> bool {
    let Some(action) = stem.strip_suffix("Response") else {
        return false;
    };
    ["Create", "Update", "Get"]
        .iter()
        .filter_map(|verb| action.strip_prefix(verb))
        .any(|rest| rest == "User" || rest.starts_with("UserBy"))
}

fn listed_entity(stem: &str) -> Option<&str> {
    stem.strip_prefix("GetAll")?
        .strip_suffix("Response")
        .filter(|entity| !entity.is_empty())
}

fn is_listing(stem: &str) -> bool {
    listed_entity(stem).is_some()
}

/// `<Entity>ListResponse` from the most common singular entity; ties go to
/// the lexicographically smallest.
fn listing_name(stems: &[&str]) -> String {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for entity in stems.iter().filter_map(|s| listed_entity(s)) {
        *counts.entry(singular(entity).to_string()).or_insert(0) += 1;
    }
    let entity = counts
        .iter()
        .max_by(|(a_name, a_count), (b_name, b_count)| {
            a_count.cmp(b_count).then_with(|| b_name.cmp(a_name))
        })
        .map(|(name, _)| name.as_str())
        .unwrap_or("");
    format!("{entity}ListResponse")
}

fn singular(entity: &str) -> &str {
    if entity.len() > 3 && entity.ends_with('s') && !entity.ends_with("ss") {
        &entity[..entity.len() - 1]
    } else {
        entity
    }
}

fn is_reorder_request(stem: &str) -> bool {
    stem.strip_prefix("Reorder")
        .and_then(|rest| rest.strip_suffix("Request"))
        .is_some_and(|entity| !entity.is_empty())
}

fn is_bulk_uuids_request(stem: &str) -> bool {
    let Some(action) = stem
        .strip_prefix("Bulk")
        .and_then(|rest| rest.strip_suffix("Request"))
    else {
        return false;
    };
    ["Delete", "Disable", "Enable", "Reset", "Revoke"]
        .iter()
        .any(|verb| action.starts_with(verb))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_delete_responses() {
        let group = names(&[
            "DeleteHostResponseDto",
            "DeleteNodeResponseDto",
            "DeleteUserResponseDto",
        ]);
        assert_eq!(choose_name(&group), "DeleteResponse");
    }

    #[test]
    fn test_auth_entries() {
        assert_eq!(
            choose_name(&names(&["LoginResponseDto", "RegisterResponseDto"])),
            "TokenResponse"
        );
        assert_eq!(
            choose_name(&names(&["LoginResponseDto", "OAuth2CallbackResponseDto"])),
            "TokenResponse"
        );
        assert_eq!(
            choose_name(&names(&[
                "TelegramCallbackResponseDto",
                "VerifyPasskeyAuthenticationResponseDto",
            ])),
            "TokenResponse"
        );
    }

    #[test]
    fn test_bulk_user_actions() {
        let group = names(&[
            "BulkDeleteUsersByStatusResponseDto",
            "BulkResetUserTrafficResponseDto",
            "BulkRevokeUsersSubscriptionResponseDto",
        ]);
        // `BulkResetUserTraffic` is singular: not a user bulk action.
        assert_eq!(choose_name(&group), "BulkResetUserTrafficResponseDto");
        assert_eq!(
            choose_name(&names(&[
                "BulkDeleteUsersByStatusResponseDto",
                "BulkUpdateUsersResponseDto",
            ])),
            "BulkActionResponse"
        );
    }

    #[test]
    fn test_passkey_options_cover_both_directions() {
        let group = names(&[
            "GetPasskeyAuthenticationOptionsResponseDto",
            "GetPasskeyRegistrationOptionsResponseDto",
            "VerifyPasskeyRegistrationRequestDto",
        ]);
        assert_eq!(choose_name(&group), "PasskeyOptions");
        // Auth wins when every name is an auth entry.
        assert_eq!(
            choose_name(&names(&["LoginResponseDto", "VerifyPasskeyAuthenticationResponseDto"])),
            "TokenResponse"
        );
    }

    #[test]
    fn test_event_actions() {
        let group = names(&[
            "AddUsersToInternalSquadResponseDto",
            "BulkAllResetTrafficUsersResponseDto",
            "RemoveUsersFromExternalSquadResponseDto",
            "RestartAllNodesResponseDto",
        ]);
        assert_eq!(choose_name(&group), "EventResponse");
    }

    #[test]
    fn test_user_crud() {
        let group = names(&[
            "CreateUserResponseDto",
            "GetUserByUuidResponseDto",
            "UpdateUserResponseDto",
        ]);
        assert_eq!(choose_name(&group), "UserResponse");
    }

    #[test]
    fn test_listing_uses_singular_entity() {
        let group = names(&["GetAllHostsResponseDto", "GetAllHostResponseDto"]);
        assert_eq!(choose_name(&group), "HostListResponse");

        let mixed = names(&["GetAllNodesResponseDto", "GetAllHostsResponseDto"]);
        // One each: tie broken lexicographically.
        assert_eq!(choose_name(&mixed), "HostListResponse");
    }

    #[test]
    fn test_rule_requires_every_name() {
        // One name breaks the Delete convention, so the fallback applies.
        let group = names(&["DeleteNodeResponseDto", "NodeGone"]);
        assert_eq!(choose_name(&group), "NodeGone");
    }

    #[test]
    fn test_fallback_shortest_then_lexicographic() {
        assert_eq!(choose_name(&names(&["Pet", "Animal", "Cat"])), "Cat");
        assert_eq!(choose_name(&names(&["PetInfo", "Pet"])), "Pet");
    }

    #[test]
    fn test_choice_is_order_independent() {
        let a = names(&["UpdateUserResponseDto", "CreateUserResponseDto"]);
        let b = names(&["CreateUserResponseDto", "UpdateUserResponseDto"]);
        assert_eq!(choose_name(&a), choose_name(&b));
        assert_eq!(choose_name(&a), choose_name(&a));
    }

    #[test]
    fn test_configured_rules_run_first() {
        let namer = CanonicalNamer::with_rules(&[NamingRuleConfig {
            pattern: "^Delete(Host|Node)Response$".to_string(),
            canonical: "InfraDeleteResponse".to_string(),
        }])
        .unwrap();
        let group = names(&["DeleteHostResponseDto", "DeleteNodeResponseDto"]);
        assert_eq!(namer.choose_name(&group), "InfraDeleteResponse");
        assert_eq!(namer.rules().len(), builtin_rules().len() + 1);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = CanonicalNamer::with_rules(&[NamingRuleConfig {
            pattern: "^(unclosed".to_string(),
            canonical: "X".to_string(),
        }])
        .unwrap_err();
        assert!(matches!(err, ConsolidateError::InvalidNamingRule { .. }));
    }

    #[test]
    fn test_each_builtin_rule_match_set() {
        assert!(is_event_action("ResetNodeTrafficResponse"));
        assert!(!is_event_action("AddUsersToResponse"));
        assert!(is_delete_response("DeleteResponse"));
        assert!(!is_delete_response("DeleteUserRequest"));
        assert!(!is_auth_entry("LogoutResponse"));
        assert!(is_user_crud("GetUserByShortUuidResponse"));
        assert!(!is_user_crud("GetUsersResponse"));
        assert!(!is_listing("GetAllResponse"));
        assert!(is_reorder_request("ReorderNodesRequest"));
        assert!(is_bulk_uuids_request("BulkDisableHostsRequest"));
        assert!(!is_bulk_uuids_request("BulkAllUpdateUsersRequest"));
        assert!(is_bulk_user_action("BulkRevokeUsersSubscriptionResponse"));
        assert!(!is_bulk_user_action("BulkAllResetTrafficUsersResponse"));
        assert!(is_passkey_options("GetPasskeyAuthentication"));
        assert!(is_passkey_options("VerifyPasskeyAuthenticationRequest"));
        assert!(!is_passkey_options("GetPasskeyRegistrationRequest"));
        assert!(!is_passkey_options("GetAllPasskeysResponse"));
    }

    #[test]
    fn test_stem() {
        assert_eq!(stem("UserResponseDto"), "UserResponse");
        assert_eq!(stem("Dto"), "");
        assert_eq!(stem("Plain"), "Plain");
    }
}
