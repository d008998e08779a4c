//! `routing`: the candidate answers the same requests the same way.

use transmigrate_core::domain::CategoryResult;
use transmigrate_core::rules::{Category, CategoryParams, CategoryRule};

use super::{CategoryHandler, EvaluationContext};
use crate::observation::{HttpResponse, Observed, Probe};

/// Media type without parameters, lowercased (`text/html; charset=utf-8` -> `text/html`).
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Content-type family used for comparison.
///
/// Top-level type (`text`, `image`), except `application/*` which keeps the
/// full media type.
pub fn content_family(content_type: Option<&str>) -> String {
    let Some(ct) = content_type else {
        return "none".to_string();
    };
    let media = media_type(ct);
    match media.split_once('/') {
        Some(("application", _)) => media,
        Some((top, _)) => top.to_string(),
        None => media,
    }
}

fn compare_response(original: &HttpResponse, candidate: &HttpResponse) -> Result<(), String> {
    if original.status != candidate.status {
        return Err(format!(
            "original {}, candidate {}",
            original.status, candidate.status
        ));
    }
    let (of, cf) = (
        content_family(original.content_type.as_deref()),
        content_family(candidate.content_type.as_deref()),
    );
    if of != cf {
        return Err(format!(
            "content type differs: original {}, candidate {}",
            original.content_type.as_deref().unwrap_or("none"),
            candidate.content_type.as_deref().unwrap_or("none")
        ));
    }
    Ok(())
}

pub struct RoutingHandler;

impl RoutingHandler {
    fn endpoints(rule: &CategoryRule) -> Vec<Probe> {
        match &rule.params {
            CategoryParams::Routing(p) => p
                .endpoints
                .iter()
                .filter_map(|e| e.resolve().ok())
                .map(Probe::Http)
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl CategoryHandler for RoutingHandler {
    fn category(&self) -> Category {
        Category::Routing
    }

    fn probes(&self, rule: &CategoryRule) -> Vec<Probe> {
        Self::endpoints(rule)
    }

    fn evaluate(&self, rule: &CategoryRule, ctx: &EvaluationContext<'_>) -> CategoryResult {
        let probes = Self::endpoints(rule);
        if probes.is_empty() {
            return CategoryResult::execution_error(Category::Routing, "no endpoints to compare");
        }

        let mut failures = Vec::new();
        for probe in &probes {
            let (original, candidate) = match ctx.observations.pair(probe) {
                Ok(pair) => pair,
                Err(reason) => return CategoryResult::execution_error(Category::Routing, reason),
            };
            let (Observed::Response(original), Observed::Response(candidate)) =
                (original, candidate)
            else {
                return CategoryResult::execution_error(
                    Category::Routing,
                    format!("{}: expected an HTTP response", probe.label()),
                );
            };
            if let Err(diff) = compare_response(original, candidate) {
                failures.push(format!("{}: {}", probe.label(), diff));
            }
        }

        if failures.is_empty() {
            CategoryResult::pass(
                Category::Routing,
                format!("{} endpoint(s) answer alike", probes.len()),
            )
        } else {
            CategoryResult::fail(Category::Routing, failures.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, ct: Option<&str>) -> HttpResponse {
        HttpResponse {
            status,
            content_type: ct.map(str::to_string),
            body: Vec::new(),
        }
    }

    #[test]
    fn test_content_family() {
        assert_eq!(content_family(Some("text/html; charset=utf-8")), "text");
        assert_eq!(content_family(Some("Text/Plain")), "text");
        assert_eq!(content_family(Some("image/png")), "image");
        assert_eq!(content_family(Some("application/json")), "application/json");
        assert_eq!(content_family(None), "none");
    }

    #[test]
    fn test_compare_response() {
        let ok = response(200, Some("text/html; charset=utf-8"));
        assert!(compare_response(&ok, &response(200, Some("text/html"))).is_ok());

        let err = compare_response(&ok, &response(404, Some("text/html"))).expect_err("status");
        assert_eq!(err, "original 200, candidate 404");

        let err = compare_response(
            &response(200, Some("application/json")),
            &response(200, Some("application/octet-stream")),
        )
        .expect_err("family");
        assert!(err.contains("content type differs"));
    }
}
