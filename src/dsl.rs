use crate::error::Result;
use crate::rules::{Operator, RuleSet};

/// Parses the compact filter-string form into a rule set.
///
/// Segments are separated by `;`. Each segment holds up to three
/// `/`-separated fields: device family, browser family and versions, in
/// that order after empty fields are dropped; missing fields default to
/// `*`. The versions field is one or more `|`-separated constraints, each
/// written as an operator (defaulting to `=`) directly followed by a
/// version, e.g. `Tablet;Mobile/Safari;Other/IE/<9|>=11`.
///
/// Later segments merge into earlier ones: version constraints accumulate
/// per browser, while a wildcard segment replaces everything recorded
/// below its path.
pub fn parse_filter_string(filter_string: &str) -> Result<RuleSet> {
    let mut rules = RuleSet::new();
    for segment in filter_string.split(';').filter(|s| !s.is_empty()) {
        extract_rule(&mut rules, segment)?;
    }
    Ok(rules)
}

fn extract_rule(rules: &mut RuleSet, segment: &str) -> Result<()> {
    let mut fields = segment.splitn(3, '/').filter(|f| !f.is_empty());
    let device = fields.next().unwrap_or("*");
    let browser = fields.next().unwrap_or("*");
    let versions = fields.next().unwrap_or("*");
    if browser == "*" {
        rules.set_device_wildcard(device);
    } else if versions == "*" {
        rules.set_browser_wildcard(device, browser);
    } else {
        let constraints = versions
            .split('|')
            .filter(|token| !token.is_empty())
            .map(parse_constraint)
            .collect::<Result<Vec<_>>>()?;
        rules.merge_browser_versions(device, browser, constraints);
    }
    Ok(())
}

/// The operator is the leading run of non-digit characters, the version is
/// the remainder from the first digit on.
fn parse_constraint(token: &str) -> Result<(Operator, String)> {
    let (operator, reference) = match token.find(|c: char| c.is_ascii_digit()) {
        Some(at) => token.split_at(at),
        None => (token, ""),
    };
    let operator = if operator.is_empty() {
        Operator::Eq
    } else {
        operator.parse()?
    };
    Ok((operator, reference.to_string()))
}
