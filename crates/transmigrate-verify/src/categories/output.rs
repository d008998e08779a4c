//! `core`: program output compared token by token.

use transmigrate_core::domain::CategoryResult;
use transmigrate_core::rules::{Category, CategoryParams, CategoryRule, CoreParams, RuleSet};

use super::{excerpt, CategoryHandler, EvaluationContext};
use crate::observation::{Observed, Probe};

const PUNCTUATION: &[char] = &[',', ';', ':', '(', ')', '[', ']', '{', '}', '"', '\'', '='];

/// A whitespace-separated output token and the line it came from (1-based).
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub line: usize,
    pub text: String,
}

/// Tokens of `text`, skipping lines that mention an ignorable difference.
pub fn tokenize(text: &str, rules: &RuleSet) -> Vec<Token> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !rules.is_ignorable(line))
        .flat_map(|(i, line)| {
            line.split_whitespace().map(move |tok| Token {
                line: i + 1,
                text: tok.to_string(),
            })
        })
        .collect()
}

/// Split `tok` into surrounding punctuation and the numeric core, if any.
fn numeric_parts(tok: &str) -> Option<(&str, f64, bool, &str)> {
    let core = tok.trim_start_matches(PUNCTUATION);
    let prefix = &tok[..tok.len() - core.len()];
    let trimmed = core.trim_end_matches(PUNCTUATION);
    let suffix = &core[trimmed.len()..];
    let value: f64 = trimmed.parse().ok()?;
    let is_float = trimmed.contains(['.', 'e', 'E']) || !value.is_finite();
    Some((prefix, value, is_float, suffix))
}

/// Exact match, or numeric match within `tolerance` when either side is a
/// floating-point literal.
pub fn tokens_match(original: &str, candidate: &str, tolerance: f64) -> bool {
    if original == candidate {
        return true;
    }
    match (numeric_parts(original), numeric_parts(candidate)) {
        (Some((op, ov, of, os)), Some((cp, cv, cf, cs))) if op == cp && os == cs && (of || cf) => {
            (ov.is_nan() && cv.is_nan()) || ov == cv || (ov - cv).abs() <= tolerance
        }
        _ => false,
    }
}

/// Compare two outputs; `Err` explains the first difference.
pub fn compare_outputs(
    original: &str,
    candidate: &str,
    rules: &RuleSet,
    tolerance: f64,
) -> Result<(), String> {
    let expected = tokenize(original, rules);
    let actual = tokenize(candidate, rules);

    for (i, (e, a)) in expected.iter().zip(actual.iter()).enumerate() {
        if !tokens_match(&e.text, &a.text, tolerance) {
            return Err(format!(
                "token {} differs: original `{}` (line {}), candidate `{}` (line {})",
                i + 1,
                e.text,
                e.line,
                a.text,
                a.line
            ));
        }
    }

    if expected.len() != actual.len() {
        let detail = if expected.len() > actual.len() {
            format!("first missing token `{}`", expected[actual.len()].text)
        } else {
            format!("first extra token `{}`", actual[expected.len()].text)
        };
        return Err(format!(
            "original printed {} tokens, candidate printed {}; {}",
            expected.len(),
            actual.len(),
            detail
        ));
    }
    Ok(())
}

fn params(rule: &CategoryRule) -> CoreParams {
    match &rule.params {
        CategoryParams::Core(p) => p.clone(),
        _ => CoreParams::default(),
    }
}

pub struct CoreHandler;

impl CategoryHandler for CoreHandler {
    fn category(&self) -> Category {
        Category::Core
    }

    fn probes(&self, rule: &CategoryRule) -> Vec<Probe> {
        params(rule).effective_cases().into_iter().map(Probe::run).collect()
    }

    fn evaluate(&self, rule: &CategoryRule, ctx: &EvaluationContext<'_>) -> CategoryResult {
        let params = params(rule);
        let cases = params.effective_cases();
        let mut failures = Vec::new();

        for case in &cases {
            let probe = Probe::run(case.clone());
            let (original, candidate) = match ctx.observations.pair(&probe) {
                Ok(pair) => pair,
                Err(reason) => return CategoryResult::execution_error(Category::Core, reason),
            };
            let (Observed::Output(original), Observed::Output(candidate)) = (original, candidate)
            else {
                return CategoryResult::execution_error(
                    Category::Core,
                    format!("{}: expected program output", probe.label()),
                );
            };

            if original.exit_code != candidate.exit_code {
                let mut msg = format!(
                    "{}: exit code differs: original {:?}, candidate {:?}",
                    case.label(),
                    original.exit_code,
                    candidate.exit_code
                );
                let tail = candidate.stderr_tail(5);
                if !tail.is_empty() {
                    msg.push_str(&format!(" (candidate stderr: {})", excerpt(&tail, 300)));
                }
                failures.push(msg);
                continue;
            }

            if let Err(diff) = compare_outputs(
                &original.stdout_text(),
                &candidate.stdout_text(),
                ctx.rules,
                params.float_tolerance,
            ) {
                failures.push(format!("{}: {}", case.label(), diff));
            }
        }

        if failures.is_empty() {
            CategoryResult::pass(
                Category::Core,
                format!("outputs match on {} case(s)", cases.len()),
            )
        } else {
            CategoryResult::fail(Category::Core, failures.join("; "))
        }
    }
}
