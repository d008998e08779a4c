//! Critical-difference category handlers.
//!
//! Each handler declares the probes it needs and judges the observations of
//! both programs. The registry is closed: one handler per [`Category`].

pub mod build;
pub mod data;
pub mod image;
pub mod output;
pub mod routing;
pub mod template;

use std::collections::BTreeMap;

use transmigrate_core::domain::{BuildReport, CategoryResult};
use transmigrate_core::rules::{Category, CategoryRule, RuleSet};

use crate::observation::{Observations, Probe};

/// Everything a handler may look at.
pub struct EvaluationContext<'a> {
    pub observations: &'a Observations,
    pub rules: &'a RuleSet,
    pub build: &'a BuildReport,
}

/// Comparison for one critical-difference category.
pub trait CategoryHandler: Send + Sync {
    fn category(&self) -> Category;

    /// Observations this category needs from both programs.
    fn probes(&self, rule: &CategoryRule) -> Vec<Probe>;

    fn evaluate(&self, rule: &CategoryRule, ctx: &EvaluationContext<'_>) -> CategoryResult;
}

/// Handlers keyed by category.
pub struct HandlerRegistry {
    handlers: BTreeMap<Category, Box<dyn CategoryHandler>>,
}

impl HandlerRegistry {
    /// Registry with a handler for every category.
    pub fn builtin() -> Self {
        let handlers: Vec<Box<dyn CategoryHandler>> = vec![
            Box::new(output::CoreHandler),
            Box::new(routing::RoutingHandler),
            Box::new(image::ImageHandler),
            Box::new(template::TemplateHandler),
            Box::new(data::DataHandler),
            Box::new(build::BuildHandler),
        ];
        Self {
            handlers: handlers.into_iter().map(|h| (h.category(), h)).collect(),
        }
    }

    pub fn get(&self, category: Category) -> Option<&dyn CategoryHandler> {
        self.handlers.get(&category).map(|h| h.as_ref())
    }

    /// Deduplicated probes for every category in `rules`.
    pub fn probes(&self, rules: &RuleSet) -> Vec<Probe> {
        let mut probes: Vec<Probe> = rules
            .rules()
            .filter_map(|rule| self.get(rule.category()).map(|h| h.probes(rule)))
            .flatten()
            .collect();
        probes.sort();
        probes.dedup();
        probes
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Short, single-line excerpt for explanations.
pub(crate) fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.trim().replace('\n', "\\n");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
