//! Chain Analyzer (C5): matches a current tool call against a recent
//! session history for one of 11 documented multi-step attack patterns.
//! Patterns are evaluated in descending declared boost; the first match
//! wins and its boost is added to the base risk. A 100 ms soft cap bounds
//! the whole scan — on overrun the remaining patterns are skipped and the
//! outcome is marked `degraded`.

use std::time::{Duration, Instant};

use chrono::Duration as ChronoDuration;
use gov_domain::action::Action;
use gov_domain::session::SessionHistory;
use gov_domain::{ArgValue, Decision};

const SOFT_CAP: Duration = Duration::from_millis(100);

/// Tools treated as equivalent to an outbound network send for the
/// `credential-then-http`, `delayed-exfil`, `data-staging`, and
/// `browse-then-exfil` triggers.
const NETWORK_SEND_TOOLS: &[&str] = &["http_request", "webhook_post"];
const MESSAGING_TOOLS: &[&str] = &["messaging_send"];

fn is_network_send(tool: &str) -> bool {
    NETWORK_SEND_TOOLS.contains(&tool) || MESSAGING_TOOLS.contains(&tool)
}

fn is_shell(tool: &str) -> bool {
    tool == "shell" || tool == "shell_exec"
}

fn is_system_path_write(tool: &str, args: &ArgValue) -> bool {
    if tool != "file_write" {
        return false;
    }
    const SYSTEM_PREFIXES: &[&str] = &["/etc", "/usr", "/bin", "/sys", "/boot"];
    args.get_path("path")
        .map(|p| SYSTEM_PREFIXES.iter().any(|prefix| p.starts_with(prefix)))
        .unwrap_or(false)
}

fn scope_blocked(action: &Action) -> bool {
    action
        .execution_trace
        .iter()
        .any(|step| step.name == "scope_enforcer" && matches!(step.outcome, gov_domain::Outcome::Block))
}

fn privilege_tokens(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("sudo") || lower.contains("admin") || lower.contains(" root ") || lower.ends_with("root")
}

fn env_recon_read(action: &Action) -> bool {
    if action.tool != "file_read" {
        return false;
    }
    let lower = action.flattened_args.to_lowercase();
    lower.contains(".env") || lower.contains("config") || lower.contains("environ")
}

fn is_write(tool: &str) -> bool {
    tool.contains("write")
}

/// One matched pattern: its declared id and risk boost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainMatch {
    pub pattern_id: &'static str,
    pub boost: i32,
}

/// Result of running the analyzer for one current call against its
/// session history.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub matched: Option<ChainMatch>,
    pub combined_risk: u8,
    pub elevate_to_review: bool,
    pub degraded: bool,
}

pub struct ChainAnalyzer;

struct Pattern {
    id: &'static str,
    boost: i32,
    min_prior: usize,
    check: fn(&[Action], &str, &str, &ArgValue, chrono::DateTime<chrono::Utc>) -> bool,
}

fn patterns() -> &'static [Pattern] {
    const PATTERNS: &[Pattern] = &[
        Pattern {
            id: "repeated-scope-probing",
            boost: 60,
            min_prior: 2,
            check: |history, _tool, _flat, _args, _now| {
                history.iter().filter(|a| scope_blocked(a)).count() >= 2
            },
        },
        Pattern {
            id: "multi-cred-harvest",
            boost: 60,
            min_prior: 2,
            check: |history, _tool, _flat, _args, _now| {
                history
                    .iter()
                    .filter(|a| gov_risk::contains_credential_keywords(&a.flattened_args))
                    .count()
                    >= 2
            },
        },
        Pattern {
            id: "credential-then-http",
            boost: 55,
            min_prior: 1,
            check: |history, tool, _flat, _args, _now| {
                is_network_send(tool)
                    && history.iter().any(|a| gov_risk::contains_credential_keywords(&a.flattened_args))
            },
        },
        Pattern {
            id: "privilege-escalation",
            boost: 50,
            min_prior: 1,
            check: |history, tool, _flat, args, _now| {
                (is_shell(tool) || is_system_path_write(tool, args))
                    && history.iter().any(|a| privilege_tokens(&a.flattened_args))
            },
        },
        Pattern {
            id: "read-write-exec",
            boost: 45,
            min_prior: 2,
            check: |history, tool, _flat, _args, _now| {
                if !is_shell(tool) {
                    return false;
                }
                let mut saw_read = false;
                let mut saw_read_then_write = false;
                for a in history {
                    if a.tool == "file_read" {
                        saw_read = true;
                    } else if a.tool == "file_write" && saw_read {
                        saw_read_then_write = true;
                    }
                }
                saw_read_then_write
            },
        },
        Pattern {
            id: "delayed-exfil",
            boost: 45,
            min_prior: 1,
            check: |history, tool, _flat, _args, now| {
                is_network_send(tool)
                    && history.iter().any(|a| {
                        gov_risk::contains_credential_keywords(&a.flattened_args)
                            && now - a.timestamp >= ChronoDuration::minutes(10)
                    })
            },
        },
        Pattern {
            id: "block-bypass-retry",
            boost: 40,
            min_prior: 1,
            check: |history, tool, flat, _args, _now| {
                let current = format!("{tool} {flat}");
                history.iter().filter(|a| a.decision == Decision::Block).any(|a| {
                    let prior = format!("{} {}", a.tool, a.flattened_args);
                    strsim::levenshtein(&current, &prior) <= 3
                })
            },
        },
        Pattern {
            id: "data-staging",
            boost: 40,
            min_prior: 2,
            check: |history, tool, _flat, _args, _now| {
                is_network_send(tool) && history.iter().filter(|a| a.tool == "file_read").count() >= 2
            },
        },
        Pattern {
            id: "browse-then-exfil",
            boost: 35,
            min_prior: 1,
            check: |history, tool, _flat, _args, _now| {
                MESSAGING_TOOLS.contains(&tool) && history.iter().any(|a| a.tool == "http_request")
            },
        },
        Pattern {
            id: "env-recon",
            boost: 35,
            min_prior: 1,
            check: |history, tool, _flat, _args, _now| is_write(tool) && history.iter().any(env_recon_read),
        },
        Pattern {
            id: "rapid-tool-switching",
            boost: 30,
            min_prior: 3,
            check: |history, tool, _flat, _args, _now| {
                let mut tools: Vec<&str> = history.iter().rev().take(5).map(|a| a.tool.as_str()).collect();
                tools.push(tool);
                tools.sort_unstable();
                tools.dedup();
                tools.len() >= 5
            },
        },
    ];
    PATTERNS
}

impl ChainAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Runs all 11 patterns against `history` for the current call, adds
    /// the first matching boost to `base_risk`, and applies the `>= 80 on
    /// tentative allow => review` elevation rule. The elevation rule is
    /// keyed on the combined risk alone, not on whether a pattern matched —
    /// a tentative-`allow` call can already clear 80 on base risk with no
    /// chain history at all.
    pub fn analyze(
        &self,
        history: &SessionHistory,
        current_tool: &str,
        current_flattened: &str,
        current_args: &ArgValue,
        now: chrono::DateTime<chrono::Utc>,
        base_risk: u8,
        tentative: Decision,
    ) -> ChainOutcome {
        let started = Instant::now();
        let mut matched = None;
        let mut degraded = false;

        for pattern in patterns() {
            if started.elapsed() > SOFT_CAP {
                degraded = true;
                break;
            }
            if history.actions.len() < pattern.min_prior {
                continue;
            }
            if (pattern.check)(&history.actions, current_tool, current_flattened, current_args, now) {
                matched = Some(ChainMatch { pattern_id: pattern.id, boost: pattern.boost });
                break;
            }
        }

        let boost = matched.map(|m| m.boost).unwrap_or(0);
        let combined_risk = ((base_risk as i32 + boost).clamp(0, 100)) as u8;
        let elevate_to_review = tentative == Decision::Allow && (base_risk as i32 + boost) >= 80;

        ChainOutcome { matched, combined_risk, elevate_to_review, degraded }
    }
}

impl Default for ChainAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
