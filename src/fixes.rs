//! Fix plans and their application to the document.
//!
//! The model's final answer must carry a JSON fix plan (bare or inside a
//! ```json fence); there is deliberately no free-text scraping. Application
//! is first-occurrence verbatim replacement, with a property-scoped
//! fallback for color fixes whose original snippet is not found as written.

use anyhow::{anyhow, Context, Result};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::contrast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixType {
    ColorContrast,
    AltText,
    Aria,
    Form,
    Heading,
    #[serde(other)]
    Other,
}

/// One proposed code-level fix from the model's plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fix {
    #[serde(rename = "type")]
    pub fix_type: FixType,
    #[serde(default)]
    pub description: String,
    pub original_code: String,
    pub fixed_code: String,
    #[serde(default)]
    pub explanation: String,
}

/// Policy for color fixes whose replacement colors still fail AA locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ContrastPolicy {
    /// Skip the fix and report it as not applied.
    #[default]
    Skip,
    /// Apply it anyway; the failed validation is only logged.
    ApplyAnyway,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStrategy {
    /// `original_code` was found verbatim; its first occurrence was swapped.
    Verbatim,
    /// The property-scoped color substitution matched.
    ColorFallback,
}

#[derive(Debug, Clone)]
pub struct AppliedFix {
    pub fix: Fix,
    pub strategy: ApplyStrategy,
}

#[derive(Debug, Clone)]
pub struct SkippedFix {
    pub fix: Fix,
    pub reason: String,
}

/// Outcome of applying a fix plan to a document.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub patched: String,
    pub applied: Vec<AppliedFix>,
    pub skipped: Vec<SkippedFix>,
}

impl ApplyReport {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Parse the fix plan out of the model's final answer.
///
/// Accepts a bare JSON array, an object with a `fixes` field, or either of
/// those inside a ```json fence.
pub fn parse_fix_plan(text: &str) -> Result<Vec<Fix>> {
    let payload =
        extract_json_payload(text).ok_or_else(|| anyhow!("no JSON fix plan in the final answer"))?;
    let value: serde_json::Value =
        serde_json::from_str(payload).context("fix plan is not valid JSON")?;

    let fixes_value = if value.is_array() {
        value
    } else {
        value
            .get("fixes")
            .cloned()
            .ok_or_else(|| anyhow!("fix plan object has no \"fixes\" array"))?
    };

    serde_json::from_value(fixes_value).context("fix plan entries have the wrong shape")
}

fn extract_json_payload(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + "```json".len()..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim());
        }
    }

    let start = text.find(['[', '{'])?;
    let end = text.rfind([']', '}'])?;
    if end > start {
        Some(text[start..=end].trim())
    } else {
        None
    }
}

pub struct FixApplier {
    policy: ContrastPolicy,
}

impl FixApplier {
    pub fn new(policy: ContrastPolicy) -> Self {
        Self { policy }
    }

    /// Apply fixes in order, each onto the progressively patched document.
    /// Unmatched fixes are skipped, never an error.
    pub fn apply(&self, document: &str, fixes: &[Fix]) -> ApplyReport {
        let mut patched = document.to_string();
        let mut applied = Vec::new();
        let mut skipped = Vec::new();

        for fix in fixes {
            if fix.fix_type == FixType::ColorContrast {
                if let Some(reason) = failing_contrast(fix) {
                    match self.policy {
                        ContrastPolicy::Skip => {
                            debug!("skipping color fix that fails validation: {}", reason);
                            skipped.push(SkippedFix {
                                fix: fix.clone(),
                                reason,
                            });
                            continue;
                        }
                        ContrastPolicy::ApplyAnyway => {
                            warn!("applying color fix despite failed validation: {}", reason);
                        }
                    }
                }
            }

            match apply_one(&patched, fix) {
                Some((next, strategy)) => {
                    patched = next;
                    applied.push(AppliedFix {
                        fix: fix.clone(),
                        strategy,
                    });
                }
                None => skipped.push(SkippedFix {
                    fix: fix.clone(),
                    reason: "original code not found in document".to_string(),
                }),
            }
        }

        ApplyReport {
            patched,
            applied,
            skipped,
        }
    }
}

/// Validate a color fix against the local contrast math. Only a pair of
/// parseable hex colors that still fails AA is grounds for a veto; anything
/// we cannot evaluate passes through.
fn failing_contrast(fix: &Fix) -> Option<String> {
    let fg = css_value(&fix.fixed_code, "color")?;
    let bg = css_value(&fix.fixed_code, "background-color")?;
    if contrast::parse_color(&fg).is_none() || contrast::parse_color(&bg).is_none() {
        return None;
    }

    let result = contrast::contrast_ratio(&fg, &bg);
    if result.passes {
        None
    } else {
        Some(format!(
            "proposed colors {} on {} still fail AA ({:.2}:1)",
            fg, bg, result.contrast_ratio
        ))
    }
}

fn apply_one(document: &str, fix: &Fix) -> Option<(String, ApplyStrategy)> {
    if !fix.original_code.is_empty() && document.contains(&fix.original_code) {
        let next = document.replacen(&fix.original_code, &fix.fixed_code, 1);
        return Some((next, ApplyStrategy::Verbatim));
    }

    if fix.fix_type == FixType::ColorContrast {
        // Foreground property first, then background.
        for property in ["color", "background-color"] {
            let old = css_value(&fix.original_code, property);
            let new = css_value(&fix.fixed_code, property);
            if let (Some(old), Some(new)) = (old, new) {
                if let Some(next) = replace_property(document, property, &old, &new) {
                    return Some((next, ApplyStrategy::ColorFallback));
                }
            }
        }
    }

    None
}

/// Extract the value of a CSS declaration from a snippet. The property name
/// must sit on a boundary so `color:` never matches inside
/// `background-color:`.
fn css_value(code: &str, property: &str) -> Option<String> {
    let pattern = format!(r"(?:^|[^-\w]){}\s*:\s*([^;}}\n]+)", regex::escape(property));
    let re = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .ok()?;
    re.captures(code).map(|caps| caps[1].trim().to_string())
}

/// Replace every `property: old` declaration with the new value,
/// case-insensitively, with the old value taken literally.
fn replace_property(document: &str, property: &str, old: &str, new: &str) -> Option<String> {
    let pattern = format!(
        r"(^|[^-\w]){}\s*:\s*{}",
        regex::escape(property),
        regex::escape(old)
    );
    let re = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .ok()?;
    if !re.is_match(document) {
        return None;
    }

    let replacement = format!("${{1}}{}: {}", property, new);
    Some(re.replace_all(document, replacement.as_str()).into_owned())
}
