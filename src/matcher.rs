use std::fmt;
use std::str::FromStr;

use crate::client::ClientIdentity;
use crate::error::{Error, Result};
use crate::rules::{BrowserRule, DeviceRule, RuleSet};

/// Polarity of a filter: whether a rule match means "redirect away" or
/// "let through".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Matching clients are the only ones let through.
    Allow,
    /// Matching clients are redirected away.
    Block,
}

impl FilterKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Allow => "allow",
            FilterKind::Block => "block",
        }
    }

    /// The redirect decision for a client that did or did not match.
    pub const fn needs_redirect(&self, matched: bool) -> bool {
        match self {
            FilterKind::Allow => !matched,
            FilterKind::Block => matched,
        }
    }
}

impl FromStr for FilterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "allow" => Ok(FilterKind::Allow),
            "block" => Ok(FilterKind::Block),
            other => Err(Error::InvalidFilterKind(other.to_string())),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether any rule applies to the client. The checks are independent and
/// OR-ed: a wildcard on the client's device family, a wildcard on its
/// browser family, or any version constraint on that browser that holds
/// against the client's browser version. Families absent from the rules
/// never match.
pub fn is_matched(rules: &RuleSet, client: &ClientIdentity) -> bool {
    matches_device(rules, client)
        || matches_browser(rules, client)
        || matches_browser_version(rules, client)
}

pub fn matches_device(rules: &RuleSet, client: &ClientIdentity) -> bool {
    matches!(
        rules.device_rule(&client.device_family),
        Some(DeviceRule::Wildcard)
    )
}

pub fn matches_browser(rules: &RuleSet, client: &ClientIdentity) -> bool {
    matches!(
        rules.browser_rule(&client.device_family, &client.browser_family),
        Some(BrowserRule::Wildcard)
    )
}

pub fn matches_browser_version(rules: &RuleSet, client: &ClientIdentity) -> bool {
    match rules.browser_rule(&client.device_family, &client.browser_family) {
        Some(BrowserRule::Versions(versions)) => versions
            .iter()
            .any(|(operator, reference)| operator.compare(&client.browser_version, reference)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{is_matched, FilterKind};
    use crate::client::ClientIdentity;
    use crate::dsl::parse_filter_string;
    use crate::error::Error;

    #[test]
    fn a_device_wildcard_matches_every_browser_on_it() {
        let rules = parse_filter_string("Tablet").unwrap();
        assert!(is_matched(
            &rules,
            &ClientIdentity::new("Tablet", "Safari", "9.0")
        ));
        assert!(is_matched(&rules, &ClientIdentity::new("Tablet", "Opera", "")));
        assert!(!is_matched(
            &rules,
            &ClientIdentity::new("Mobile", "Safari", "9.0")
        ));
    }

    #[test]
    fn a_browser_wildcard_matches_every_version_of_it() {
        let rules = parse_filter_string("Mobile/Safari").unwrap();
        assert!(is_matched(
            &rules,
            &ClientIdentity::new("Mobile", "Safari", "4")
        ));
        assert!(!is_matched(
            &rules,
            &ClientIdentity::new("Mobile", "Chrome", "4")
        ));
        assert!(!is_matched(
            &rules,
            &ClientIdentity::new("Other", "Safari", "4")
        ));
    }

    #[test]
    fn version_constraints_are_ored() {
        let rules = parse_filter_string("Other/IE/<9|>=11").unwrap();
        let client = |version: &str| ClientIdentity::new("Other", "IE", version);
        assert!(is_matched(&rules, &client("8.0")));
        assert!(is_matched(&rules, &client("11")));
        assert!(is_matched(&rules, &client("12.5")));
        assert!(!is_matched(&rules, &client("9.0")));
        assert!(!is_matched(&rules, &client("10.9.1")));

        // Overlapping constraints still match when both hold.
        let rules = parse_filter_string("Other/IE/>=1|<11").unwrap();
        assert!(is_matched(&rules, &client("10.5")));
    }

    #[test]
    fn families_absent_from_the_rules_never_match() {
        let rules = parse_filter_string("Other/IE/<9").unwrap();
        assert!(!is_matched(
            &rules,
            &ClientIdentity::new("Other", "Firefox", "2")
        ));
        assert!(!is_matched(
            &rules,
            &ClientIdentity::new("Mobile", "IE", "2")
        ));
    }

    #[test]
    fn an_empty_version_map_matches_nothing() {
        let rules = parse_filter_string("Other/IE/|").unwrap();
        assert!(!is_matched(&rules, &ClientIdentity::new("Other", "IE", "8")));
    }

    #[test]
    fn redirect_follows_the_filter_kind() {
        assert!(FilterKind::Block.needs_redirect(true));
        assert!(!FilterKind::Block.needs_redirect(false));
        assert!(!FilterKind::Allow.needs_redirect(true));
        assert!(FilterKind::Allow.needs_redirect(false));
    }

    #[test]
    fn filter_kinds_parse_from_their_configured_names() {
        assert_eq!("allow".parse::<FilterKind>().unwrap(), FilterKind::Allow);
        assert_eq!("block".parse::<FilterKind>().unwrap(), FilterKind::Block);
        assert!(matches!(
            "deny".parse::<FilterKind>(),
            Err(Error::InvalidFilterKind(_))
        ));
    }
}
