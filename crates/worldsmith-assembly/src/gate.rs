//! Structural gate: a closed table of model-free rules over program text.
//!
//! Each rule owns exactly one [`ViolationCode`]. [`check`] runs every rule in
//! table order and reports each code at most once. An empty program
//! short-circuits with `E_CODE_010` alone.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use worldsmith_types::{GeneratedProgram, ViolationCode, ViolationReport};

/// Programs shorter than this many non-empty lines are rejected.
pub const MIN_NON_EMPTY_LINES: usize = 40;

// ---------------------------------------------------------------------------
// Source scan
// ---------------------------------------------------------------------------

/// Facts about a program gathered in one pass, shared by every rule.
#[derive(Debug)]
pub struct ProgramScan<'a> {
    pub source: &'a str,
    pub non_empty_lines: usize,
    /// Contents of every string and template literal, outside comments.
    pub string_literals: Vec<String>,
    /// Names of functions declared at column zero, in order of appearance.
    pub top_level_functions: Vec<String>,
}

static TOP_LEVEL_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:export\s+(?:default\s+)?)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*\(")
        .unwrap()
});

impl<'a> ProgramScan<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            non_empty_lines: source.lines().filter(|l| !l.trim().is_empty()).count(),
            string_literals: string_literals(source),
            top_level_functions: TOP_LEVEL_FUNCTION
                .captures_iter(source)
                .map(|c| c[1].to_string())
                .collect(),
        }
    }
}

/// Collect the bodies of `'…'`, `"…"` and `` `…` `` literals, skipping
/// `//` and `/* */` comments. Escapes are kept verbatim.
fn string_literals(source: &str) -> Vec<String> {
    let mut literals = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            '"' | '\'' | '`' => {
                let quote = c;
                let mut body = String::new();
                while let Some(next) = chars.next() {
                    if next == '\\' {
                        body.push(next);
                        if let Some(escaped) = chars.next() {
                            body.push(escaped);
                        }
                        continue;
                    }
                    // Plain quotes end at a newline; only template literals span lines.
                    if next == quote || (next == '\n' && quote != '`') {
                        break;
                    }
                    body.push(next);
                }
                literals.push(body);
            }
            _ => {}
        }
    }

    literals
}

// ---------------------------------------------------------------------------
// GateRule trait
// ---------------------------------------------------------------------------

pub trait GateRule: Send + Sync {
    fn code(&self) -> ViolationCode;
    fn violated(&self, scan: &ProgramScan<'_>) -> bool;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// The program must contain `marker` somewhere.
struct RequiredMarker {
    code: ViolationCode,
    marker: &'static str,
}

impl GateRule for RequiredMarker {
    fn code(&self) -> ViolationCode {
        self.code
    }

    fn violated(&self, scan: &ProgramScan<'_>) -> bool {
        !scan.source.contains(self.marker)
    }
}

/// The program must not match `pattern` anywhere.
struct ForbiddenPattern {
    code: ViolationCode,
    pattern: &'static LazyLock<Regex>,
}

impl GateRule for ForbiddenPattern {
    fn code(&self) -> ViolationCode {
        self.code
    }

    fn violated(&self, scan: &ProgramScan<'_>) -> bool {
        self.pattern.is_match(scan.source)
    }
}

static DOCTYPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<!doctype\b").unwrap());
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<html\b").unwrap());
static HEAD_OR_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(?:head|body)\b").unwrap());
static SCRIPT_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<script\b").unwrap());
static FORBIDDEN_API: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"document\.write\s*\(|(?:inner|outer)HTML\s*\+?=(?:[^=]|$)|window\.location\s*=(?:[^=]|$)|location\.href\s*=(?:[^=]|$)|\beval\s*\(",
    )
    .unwrap()
});
static MARKDOWN_EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*[^*\s](?:[^*\n]*[^*\s])?\*\*|__[^_\s](?:[^_\n]*[^_\s])?__").unwrap());

struct DuplicateFunctionRule;

impl GateRule for DuplicateFunctionRule {
    fn code(&self) -> ViolationCode {
        ViolationCode::DuplicateFunction
    }

    fn violated(&self, scan: &ProgramScan<'_>) -> bool {
        let mut seen = HashSet::new();
        !scan.top_level_functions.iter().all(|name| seen.insert(name))
    }
}

struct MarkdownInStringRule;

impl GateRule for MarkdownInStringRule {
    fn code(&self) -> ViolationCode {
        ViolationCode::MarkdownInString
    }

    fn violated(&self, scan: &ProgramScan<'_>) -> bool {
        scan.string_literals
            .iter()
            .any(|s| MARKDOWN_EMPHASIS.is_match(s))
    }
}

struct MinimumLengthRule;

impl GateRule for MinimumLengthRule {
    fn code(&self) -> ViolationCode {
        ViolationCode::ProgramTooShort
    }

    fn violated(&self, scan: &ProgramScan<'_>) -> bool {
        scan.non_empty_lines < MIN_NON_EMPTY_LINES
    }
}

/// Every rule in report order. `E_CODE_010` is handled before the table runs.
fn rules() -> Vec<Box<dyn GateRule>> {
    vec![
        Box::new(RequiredMarker {
            code: ViolationCode::MissingEntryPoint,
            marker: "function World(",
        }),
        Box::new(RequiredMarker {
            code: ViolationCode::MissingDefaultExport,
            marker: "export default",
        }),
        Box::new(RequiredMarker {
            code: ViolationCode::MissingModuleCompletion,
            marker: "runtime.completeModule(",
        }),
        Box::new(RequiredMarker {
            code: ViolationCode::MissingWorldCompletion,
            marker: "runtime.completeWorld(",
        }),
        Box::new(ForbiddenPattern {
            code: ViolationCode::DoctypePresent,
            pattern: &DOCTYPE,
        }),
        Box::new(ForbiddenPattern {
            code: ViolationCode::HtmlTagPresent,
            pattern: &HTML_TAG,
        }),
        Box::new(ForbiddenPattern {
            code: ViolationCode::HeadOrBodyPresent,
            pattern: &HEAD_OR_BODY,
        }),
        Box::new(ForbiddenPattern {
            code: ViolationCode::ScriptTagPresent,
            pattern: &SCRIPT_TAG,
        }),
        Box::new(ForbiddenPattern {
            code: ViolationCode::ForbiddenApi,
            pattern: &FORBIDDEN_API,
        }),
        Box::new(DuplicateFunctionRule),
        Box::new(MarkdownInStringRule),
        Box::new(MinimumLengthRule),
    ]
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run the full rule table over `source`.
pub fn check(source: &str) -> ViolationReport {
    if source.trim().is_empty() {
        return ViolationReport {
            codes: vec![ViolationCode::EmptyProgram],
        };
    }

    let scan = ProgramScan::new(source);
    let mut codes: Vec<ViolationCode> = rules()
        .iter()
        .filter(|rule| rule.violated(&scan))
        .map(|rule| rule.code())
        .collect();
    codes.sort();
    codes.dedup();

    tracing::debug!(
        lines = scan.non_empty_lines,
        codes = ?codes,
        "structural gate checked"
    );
    ViolationReport { codes }
}

pub fn check_program(program: &GeneratedProgram) -> ViolationReport {
    check(&program.source)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
