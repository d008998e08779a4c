//! `build`: restates the Build Runner's verdict.

use transmigrate_core::domain::CategoryResult;
use transmigrate_core::rules::{Category, CategoryRule};

use super::{CategoryHandler, EvaluationContext};
use crate::observation::Probe;

pub struct BuildHandler;

impl CategoryHandler for BuildHandler {
    fn category(&self) -> Category {
        Category::Build
    }

    fn probes(&self, _rule: &CategoryRule) -> Vec<Probe> {
        Vec::new()
    }

    fn evaluate(&self, _rule: &CategoryRule, ctx: &EvaluationContext<'_>) -> CategoryResult {
        let report = ctx.build;
        if !report.passed() {
            let first = report
                .blocking_diagnostics()
                .next()
                .map(|d| d.message.clone())
                .unwrap_or_else(|| "build failed".to_string());
            return CategoryResult::fail(
                Category::Build,
                format!("{} blocking error(s); first: {}", report.error_count(), first),
            );
        }

        let mut codes: Vec<String> = report
            .advisory_findings()
            .map(|d| d.code.clone().unwrap_or_else(|| d.message.clone()))
            .collect();
        codes.sort();
        codes.dedup();
        if codes.is_empty() {
            CategoryResult::pass(Category::Build, "build and lint clean")
        } else {
            CategoryResult::pass(
                Category::Build,
                format!("builds; advisory lint findings: {}", codes.join(", ")),
            )
        }
    }
}
