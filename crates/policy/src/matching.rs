//! Whether a single `Policy` applies to a proposed tool call.

use gov_domain::{ArgValue, Policy};

/// A policy matches when its tool pattern matches (`"*"` or an exact,
/// case-sensitive tool name) **and**, if present, its `url_regex` matches
/// a `url` field found in the call's arguments and its `args_regex`
/// matches the flattened argument string. An absent regex field is not a
/// constraint; a present one that fails to match excludes the policy.
pub fn matches(policy: &Policy, tool: &str, args: &ArgValue, flattened: &str) -> bool {
    if !tool_matches(&policy.target_tool_pattern, tool) {
        return false;
    }
    if let Some(pattern) = &policy.url_regex {
        match extract_url(args) {
            Some(url) => {
                let re = regex::Regex::new(pattern).expect("policy regex validated at write time");
                if !re.is_match(url) {
                    return false;
                }
            }
            None => return false,
        }
    }
    if let Some(pattern) = &policy.args_regex {
        let re = regex::Regex::new(pattern).expect("policy regex validated at write time");
        if !re.is_match(flattened) {
            return false;
        }
    }
    true
}

fn tool_matches(pattern: &str, tool: &str) -> bool {
    pattern == "*" || pattern == tool
}

/// Looks for a URL at the conventional `url` key, falling back to
/// `context.url` for nested call shapes.
fn extract_url(args: &ArgValue) -> Option<&str> {
    args.get_path("url").or_else(|| args.get_path("context.url"))
}
