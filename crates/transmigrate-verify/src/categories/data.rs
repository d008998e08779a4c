//! `data`: extracted values (e.g. plotted points) compared exactly.

use regex::Regex;
use transmigrate_core::domain::CategoryResult;
use transmigrate_core::rules::{Category, CategoryParams, CategoryRule, DataArtifact};

use super::{excerpt, CategoryHandler, EvaluationContext};
use crate::observation::Probe;

/// Every match of `pattern` in `text`; the first capture group when present.
pub fn extract(pattern: &Regex, text: &str) -> Vec<String> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn compare_values(original: &[String], candidate: &[String]) -> Result<(), String> {
    if let Some(i) = original
        .iter()
        .zip(candidate.iter())
        .position(|(o, c)| o != c)
    {
        return Err(format!(
            "value {} differs: original `{}`, candidate `{}`",
            i + 1,
            excerpt(&original[i], 80),
            excerpt(&candidate[i], 80)
        ));
    }
    if original.len() != candidate.len() {
        return Err(format!(
            "original has {} value(s), candidate {}",
            original.len(),
            candidate.len()
        ));
    }
    Ok(())
}

fn artifacts(rule: &CategoryRule) -> &[DataArtifact] {
    match &rule.params {
        CategoryParams::Data(p) => &p.artifacts,
        _ => &[],
    }
}

pub struct DataHandler;

impl DataHandler {
    fn evaluate_artifact(
        artifact: &DataArtifact,
        ctx: &EvaluationContext<'_>,
    ) -> Result<Result<usize, String>, String> {
        let probe = Probe::for_source(&artifact.source)
            .ok_or_else(|| format!("{}: source cannot be resolved", artifact.name))?;
        let pattern = Regex::new(&artifact.pattern)
            .map_err(|e| format!("{}: invalid pattern: {}", artifact.name, e))?;
        let (original, candidate) = ctx.observations.pair(&probe)?;

        let expected = extract(&pattern, &original.artifact_text());
        if expected.is_empty() {
            return Err(format!(
                "{}: pattern matched nothing in the original's {}",
                artifact.name,
                probe.label()
            ));
        }
        let actual = extract(&pattern, &candidate.artifact_text());
        Ok(compare_values(&expected, &actual)
            .map(|()| expected.len())
            .map_err(|diff| format!("{}: {}", artifact.name, diff)))
    }
}

impl CategoryHandler for DataHandler {
    fn category(&self) -> Category {
        Category::Data
    }

    fn probes(&self, rule: &CategoryRule) -> Vec<Probe> {
        artifacts(rule)
            .iter()
            .filter_map(|a| Probe::for_source(&a.source))
            .collect()
    }

    fn evaluate(&self, rule: &CategoryRule, ctx: &EvaluationContext<'_>) -> CategoryResult {
        let artifacts = artifacts(rule);
        if artifacts.is_empty() {
            return CategoryResult::execution_error(Category::Data, "no data artifacts to compare");
        }

        let mut failures = Vec::new();
        let mut values = 0;
        for artifact in artifacts {
            match Self::evaluate_artifact(artifact, ctx) {
                Ok(Ok(n)) => values += n,
                Ok(Err(diff)) => failures.push(diff),
                Err(reason) => return CategoryResult::execution_error(Category::Data, reason),
            }
        }

        if failures.is_empty() {
            CategoryResult::pass(
                Category::Data,
                format!(
                    "{} artifact(s) match ({} values)",
                    artifacts.len(),
                    values
                ),
            )
        } else {
            CategoryResult::fail(Category::Data, failures.join("; "))
        }
    }
}
