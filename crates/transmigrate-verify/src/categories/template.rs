//! `template`: structured markup compared by tag-tree shape.

use std::sync::OnceLock;

use regex::Regex;
use transmigrate_core::domain::CategoryResult;
use transmigrate_core::rules::{Category, CategoryParams, CategoryRule};

use super::{CategoryHandler, EvaluationContext};
use crate::observation::Probe;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

struct Patterns {
    comment: Regex,
    script: Regex,
    style: Regex,
    tag: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        comment: Regex::new(r"(?s)<!--.*?-->").expect("comment regex"),
        script: Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("script regex"),
        style: Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").expect("style regex"),
        tag: Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9:-]*)(?:\s[^>]*?)?(/?)>").expect("tag regex"),
    })
}

/// Element paths in document order, e.g. `html > body > ul > li`.
///
/// Text, attributes, comments and script/style bodies are ignored; void
/// and self-closing elements open no scope.
pub fn outline(markup: &str) -> Vec<String> {
    let p = patterns();
    let cleaned = p.comment.replace_all(markup, "");
    let cleaned = p.script.replace_all(&cleaned, "<script></script>");
    let cleaned = p.style.replace_all(&cleaned, "<style></style>");

    let mut stack: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for caps in p.tag.captures_iter(&cleaned) {
        let name = caps[2].to_ascii_lowercase();
        if &caps[1] == "/" {
            if let Some(depth) = stack.iter().rposition(|open| *open == name) {
                stack.truncate(depth);
            }
            continue;
        }

        let path = if stack.is_empty() {
            name.clone()
        } else {
            format!("{} > {}", stack.join(" > "), name)
        };
        out.push(path);
        if &caps[3] != "/" && !VOID_ELEMENTS.contains(&name.as_str()) {
            stack.push(name);
        }
    }
    out
}

/// Compare two outlines; `Err` explains the first difference.
pub fn compare_outlines(original: &[String], candidate: &[String]) -> Result<(), String> {
    for (i, (o, c)) in original.iter().zip(candidate.iter()).enumerate() {
        if o != c {
            return Err(format!(
                "element {} differs: original `{}`, candidate `{}`",
                i + 1,
                o,
                c
            ));
        }
    }
    match original.len().cmp(&candidate.len()) {
        std::cmp::Ordering::Greater => Err(format!(
            "candidate is missing `{}` and {} more element(s)",
            original[candidate.len()],
            original.len() - candidate.len() - 1
        )),
        std::cmp::Ordering::Less => Err(format!(
            "candidate has extra `{}` and {} more element(s)",
            candidate[original.len()],
            candidate.len() - original.len() - 1
        )),
        std::cmp::Ordering::Equal => Ok(()),
    }
}

pub struct TemplateHandler;

impl CategoryHandler for TemplateHandler {
    fn category(&self) -> Category {
        Category::Template
    }

    fn probes(&self, rule: &CategoryRule) -> Vec<Probe> {
        match &rule.params {
            CategoryParams::Template(p) => p.sources.iter().filter_map(Probe::for_source).collect(),
            _ => Vec::new(),
        }
    }

    fn evaluate(&self, rule: &CategoryRule, ctx: &EvaluationContext<'_>) -> CategoryResult {
        let probes = self.probes(rule);
        if probes.is_empty() {
            return CategoryResult::execution_error(
                Category::Template,
                "no markup sources to compare",
            );
        }

        let mut failures = Vec::new();
        let mut elements = 0;
        for probe in &probes {
            let (original, candidate) = match ctx.observations.pair(probe) {
                Ok(pair) => pair,
                Err(reason) => return CategoryResult::execution_error(Category::Template, reason),
            };
            let original = outline(&original.artifact_text());
            if original.is_empty() {
                return CategoryResult::execution_error(
                    Category::Template,
                    format!("{}: original program produced no markup", probe.label()),
                );
            }
            let candidate = outline(&candidate.artifact_text());
            match compare_outlines(&original, &candidate) {
                Ok(()) => elements += original.len(),
                Err(diff) => failures.push(format!("{}: {}", probe.label(), diff)),
            }
        }

        if failures.is_empty() {
            CategoryResult::pass(
                Category::Template,
                format!("tag trees match ({} elements)", elements),
            )
        } else {
            CategoryResult::fail(Category::Template, failures.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outline_nesting() {
        let html = r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><title>Primes</title></head>
<body><ul class="list"><li>2</li><li>3</li></ul><br/><img src="x.png"></body></html>"#;
        assert_eq!(
            outline(html),
            vec![
                "html",
                "html > head",
                "html > head > meta",
                "html > head > title",
                "html > body",
                "html > body > ul",
                "html > body > ul > li",
                "html > body > ul > li",
                "html > body > br",
                "html > body > img",
            ]
        );
    }

    #[test]
    fn test_outline_ignores_text_attributes_comments_scripts() {
        let a = r#"<div id="a"><!-- <span> --><p>Hello</p><script>if (a < b) { x = "<b>"; }</script></div>"#;
        let b = "<DIV><p>Bonjour, le monde</p><script></script></DIV>";
        assert_eq!(outline(a), outline(b));
    }

    #[test]
    fn test_compare_outlines() {
        let original = outline("<ul><li>a</li><li>b</li></ul>");
        let flat = outline("<ul><li>a</li></ul><li>b</li>");
        let err = compare_outlines(&original, &flat).expect_err("shape");
        assert!(err.contains("element 3 differs"));

        let short = outline("<ul><li>a</li></ul>");
        let err = compare_outlines(&original, &short).expect_err("missing");
        assert!(err.contains("missing `ul > li`"));
        assert!(compare_outlines(&original, &original).is_ok());
    }
}
