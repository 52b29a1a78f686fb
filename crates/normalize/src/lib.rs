//! Payload Normalizer (C1).
//!
//! Pure function, no side effects: takes a proposed tool call and returns
//! a normalized tool name plus a single flattened string used by every
//! regex/keyword layer downstream. The original argument tree is never
//! touched — only the derived flattening is lossy.

use unicode_normalization::UnicodeNormalization;

use gov_domain::ArgValue;

pub mod injection;
pub use injection::InjectionScanner;

/// Zero-width code points stripped after NFKC folding. NFKC is applied
/// first because some compatibility decompositions can themselves
/// surface one of these before the final strip.
const ZERO_WIDTH: [char; 4] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}'];

/// Unicode-NFKC-fold a string and strip zero-width code points.
pub fn normalize_text(input: &str) -> String {
    let folded: String = input.nfkc().collect();
    strip_zero_width(&folded)
}

fn strip_zero_width(input: &str) -> String {
    input.chars().filter(|c| !ZERO_WIDTH.contains(c)).collect()
}

/// Normalize a tool name: trim + NFKC fold. Tool names are matched
/// case-sensitively elsewhere (policy matching), so no case-folding here.
pub fn normalize_tool_name(tool: &str) -> String {
    normalize_text(tool.trim())
}

/// Depth-first traversal of an argument tree, concatenating scalar
/// values (numbers stringified, booleans lowercased) and all nested
/// strings, separated by single spaces. The result is normalized as a
/// whole at the end (NFKC + zero-width strip) so injected zero-width
/// characters spanning a join boundary can't evade the scan.
pub fn flatten_args(args: &ArgValue) -> String {
    let mut parts = Vec::new();
    collect(args, &mut parts);
    normalize_text(&parts.join(" "))
}

fn collect(value: &ArgValue, out: &mut Vec<String>) {
    match value {
        ArgValue::Null => {}
        ArgValue::Bool(b) => out.push(b.to_string()),
        ArgValue::Number(n) => out.push(n.to_string()),
        ArgValue::String(s) => out.push(s.clone()),
        ArgValue::List(items) => {
            for item in items {
                collect(item, out);
            }
        }
        ArgValue::Map(map) => {
            for value in map.values() {
                collect(value, out);
            }
        }
    }
}

/// Result of normalizing a proposed tool call: the tool name and the
/// flattened, searchable argument string. The caller keeps the original
/// `ArgValue` tree for storage; this is purely a derived view.
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    pub tool: String,
    pub flattened: String,
}

pub fn normalize_request(tool: &str, args: &ArgValue) -> NormalizedRequest {
    NormalizedRequest {
        tool: normalize_tool_name(tool),
        flattened: flatten_args(args),
    }
}
