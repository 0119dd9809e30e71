// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// The option translator & validator. Collects job options out of an
// IPP request's job/operation attribute groups, normalizes the handful of
// keys with non-trivial shapes (job-sheets, media-col, page-ranges), and
// validates the merged option map against a synthesized `Caps` set and the
// PPD's UI constraints, following a queue-options-merging
// idiom and `ipp_server.rs`'s attribute-group walking, generalized from a
// fixed struct of print settings to an open keyword map per the wire
// protocol's actual shape.

use std::collections::HashMap;

use cupsd_core::error::{Error, Result};

use crate::capabilities::{self, Caps};
use crate::codec::{Group, Value};
use crate::ppd::ParsedPpd;

/// Keyword allow-list for job options collected off a request (the wire
/// protocol carries arbitrary attributes; only these are meaningful here).
const ALLOWED_KEYS: &[&str] = &[
    "job-sheets",
    "job-sheets-col",
    "media",
    "media-col",
    "media-source",
    "media-type",
    "sides",
    "print-color-mode",
    "printer-resolution",
    "output-bin",
    "copies",
    "finishings",
    "print-quality",
    "number-up",
    "orientation-requested",
    "page-ranges",
    "job-hold-until",
    "job-name",
    "job-priority",
    "multiple-document-handling",
    "number-up-layout",
    "page-delivery",
    "print-scaling",
    "print-as-raster",
    "job-cancel-after",
    "number-of-retries",
    "retry-interval",
    "retry-time-out",
    "confirmation-sheet-print",
    "cover-sheet-info",
];

/// Collects allow-listed job options from a request's job/operation groups
/// into a flat string-keyed map, applying the non-trivial normalizations.
pub fn collect(groups: &[Group]) -> HashMap<String, String> {
    let mut options = HashMap::new();

    for group in groups {
        for attr in &group.attributes {
            if !ALLOWED_KEYS.contains(&attr.name.as_str()) {
                continue;
            }
            match attr.name.as_str() {
                "job-sheets" => {
                    if let Some(normalized) = normalize_job_sheets(&attr.values) {
                        options.insert("job-sheets".to_string(), normalized);
                    }
                }
                "job-sheets-col" => {
                    // inner `job-sheets` string wins over a top-level one
                    if let Some(Value::Collection(members)) = attr.values.first() {
                        if let Some(inner) = members.iter().find(|a| a.name == "job-sheets") {
                            if let Some(normalized) = normalize_job_sheets(&inner.values) {
                                options.insert("job-sheets".to_string(), normalized);
                            }
                        }
                    }
                }
                "media-col" => {
                    if let Some(Value::Collection(members)) = attr.values.first() {
                        extract_media_col(members, &mut options);
                    }
                }
                "page-ranges" => {
                    if let Some(Value::Range { lo, hi }) = attr.values.first() {
                        let serialized = if lo == hi { lo.to_string() } else { format!("{lo}-{hi}") };
                        options.insert("page-ranges".to_string(), serialized);
                    }
                }
                key => {
                    if let Some(v) = attr.values.first() {
                        if let Some(display) = display_value(v) {
                            options.insert(key.to_string(), display);
                        }
                    }
                }
            }
        }
    }

    options
}

/// Renders a scalar value as a plain string for the flat option map; numeric
/// values are decimal, keyword/text/uri values pass through as-is.
fn display_value(value: &Value) -> Option<String> {
    if let Some(s) = value.as_str() {
        return Some(s.to_string());
    }
    if let Some(i) = value.as_integer() {
        return Some(i.to_string());
    }
    if let Some(b) = value.as_boolean() {
        return Some(b.to_string());
    }
    None
}

/// `job-sheets` accepts one or two values; normalized to `"start,end"`
/// (missing end -> `none`).
fn normalize_job_sheets(values: &[Value]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let start = display_value(&values[0])?;
    let end = values.get(1).and_then(display_value).unwrap_or_else(|| "none".to_string());
    Some(format!("{start},{end}"))
}

/// Extracts `media-size-name` if present; else recognises size by `(x,y)`
/// dimensions with tolerance. Inner `media-type`/`media-source` map directly.
fn extract_media_col(members: &[crate::codec::Attribute], options: &mut HashMap<String, String>) {
    if let Some(name) = members.iter().find(|a| a.name == "media-size-name") {
        if let Some(v) = name.values.first().and_then(display_value) {
            options.insert("media".to_string(), v);
        }
    } else if let Some(size) = members.iter().find(|a| a.name == "media-size") {
        if let Some(Value::Collection(dims)) = size.values.first() {
            let x = dims.iter().find(|a| a.name == "x-dimension").and_then(|a| a.values.first()).and_then(Value::as_integer);
            let y = dims.iter().find(|a| a.name == "y-dimension").and_then(|a| a.values.first()).and_then(Value::as_integer);
            if let (Some(x), Some(y)) = (x, y) {
                if let Some(name) = capabilities::media_size_by_dimensions(x, y) {
                    options.insert("media".to_string(), name.to_string());
                }
            }
        }
    }
    if let Some(t) = members.iter().find(|a| a.name == "media-type") {
        if let Some(v) = t.values.first().and_then(display_value) {
            options.insert("media-type".to_string(), v);
        }
    }
    if let Some(s) = members.iter().find(|a| a.name == "media-source") {
        if let Some(v) = s.values.first().and_then(display_value) {
            options.insert("media-source".to_string(), v);
        }
    }
}

/// Bidirectional IPP keyword <-> PPD option keyword map.
pub fn ipp_key_to_ppd(ipp_key: &str) -> Option<&'static str> {
    match ipp_key {
        "media" => Some("PageSize"),
        "media-source" => Some("InputSlot"),
        "media-type" => Some("MediaType"),
        "output-bin" => Some("OutputBin"),
        "sides" => Some("Duplex"),
        "printer-resolution" => Some("Resolution"),
        "print-color-mode" => Some("ColorModel"),
        _ => None,
    }
}

pub fn ppd_key_to_ipp(ppd_key: &str) -> Option<&'static str> {
    match ppd_key {
        "PageSize" => Some("media"),
        "InputSlot" => Some("media-source"),
        "MediaType" => Some("media-type"),
        "OutputBin" => Some("output-bin"),
        "Duplex" => Some("sides"),
        "Resolution" => Some("printer-resolution"),
        "ColorModel" | "ColorMode" | "ColorSpace" => Some("print-color-mode"),
        _ => None,
    }
}

/// Folds a color-ish keyword to `"monochrome"` or `"color"`: values
/// containing gray/mono/black/none/off fold to monochrome, else color.
pub fn fold_color_keyword(value: &str) -> &'static str {
    let lower = value.to_ascii_lowercase();
    if ["gray", "grey", "mono", "black", "none", "off"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        "monochrome"
    } else {
        "color"
    }
}

/// Validates a merged option map against the synthesized caps and the PPD's
/// UI constraints (pre-create and pre-modify). Unknown/out-of-range values
/// fail with `attributes-or-values-not-supported`; constraint violations
/// fail the same way.
pub fn validate(options: &HashMap<String, String>, caps: &Caps, ppd: Option<&ParsedPpd>) -> Result<()> {
    if let Some(media) = options.get("media") {
        if !caps.media_supported.iter().any(|m| m == media) {
            return Err(unsupported("media", media));
        }
    }
    if let Some(sides) = options.get("sides") {
        if !caps.sides.iter().any(|s| s == sides) {
            return Err(unsupported("sides", sides));
        }
    }
    if let Some(mode) = options.get("print-color-mode") {
        let folded = fold_color_keyword(mode);
        if folded == "color" && !caps.supports_color() {
            return Err(unsupported("print-color-mode", mode));
        }
    }
    if let Some(bin) = options.get("output-bin") {
        if !caps.output_bins.iter().any(|b| b == bin) {
            return Err(unsupported("output-bin", bin));
        }
    }
    if let Some(source) = options.get("media-source") {
        if !caps.media_sources.iter().any(|s| s == source) {
            return Err(unsupported("media-source", source));
        }
    }

    if let Some(ppd) = ppd {
        let merged = merge_with_ppd_keys(options);
        if let Some((a, b)) = ppd.violates_constraint(&merged) {
            return Err(Error::AttributesOrValuesNotSupported(format!(
                "PPD constraint violated: {a} x {b}"
            )));
        }
    }

    Ok(())
}

/// Rewrites an IPP-keyed option map to PPD keys for constraint checking.
fn merge_with_ppd_keys(options: &HashMap<String, String>) -> HashMap<String, String> {
    let mut merged = HashMap::new();
    for (k, v) in options {
        if let Some(ppd_key) = ipp_key_to_ppd(k) {
            merged.insert(ppd_key.to_string(), v.clone());
        }
    }
    merged
}

fn unsupported(key: &str, value: &str) -> Error {
    Error::AttributesOrValuesNotSupported(format!("{key}={value} not supported by this destination"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Attribute;

    fn attr(name: &str, values: Vec<Value>) -> Attribute {
        Attribute { name: name.to_string(), values }
    }

    #[test]
    fn job_sheets_single_value_defaults_end_to_none() {
        let values = vec![Value::Keyword("classified".to_string())];
        assert_eq!(normalize_job_sheets(&values).unwrap(), "classified,none");
    }

    #[test]
    fn job_sheets_two_values_joined() {
        let values = vec![
            Value::Keyword("banner".to_string()),
            Value::Keyword("standard".to_string()),
        ];
        assert_eq!(normalize_job_sheets(&values).unwrap(), "banner,standard");
    }

    #[test]
    fn page_ranges_single_value_omits_dash() {
        let group = Group {
            tag: crate::codec::group_tag::OPERATION,
            attributes: vec![attr("page-ranges", vec![Value::Range { lo: 3, hi: 3 }])],
        };
        let options = collect(&[group]);
        assert_eq!(options.get("page-ranges").unwrap(), "3");
    }

    #[test]
    fn page_ranges_range_serialized_as_lo_hi() {
        let group = Group {
            tag: crate::codec::group_tag::OPERATION,
            attributes: vec![attr("page-ranges", vec![Value::Range { lo: 1, hi: 5 }])],
        };
        let options = collect(&[group]);
        assert_eq!(options.get("page-ranges").unwrap(), "1-5");
    }

    #[test]
    fn color_keyword_folds_monochrome_variants() {
        assert_eq!(fold_color_keyword("monochrome"), "monochrome");
        assert_eq!(fold_color_keyword("Gray8"), "monochrome");
        assert_eq!(fold_color_keyword("none"), "monochrome");
        assert_eq!(fold_color_keyword("RGB"), "color");
    }

    #[test]
    fn unsupported_media_rejected() {
        let caps = Caps::default();
        let mut options = HashMap::new();
        options.insert("media".to_string(), "na_legal_8.5x14in".to_string());
        assert!(validate(&options, &caps, None).is_err());
    }

    #[test]
    fn ppd_constraint_violation_rejected() {
        let ppd = ParsedPpd::parse("Constraint: InputSlot, Envelope, Duplex, DuplexNoTumble\n");
        let mut caps = Caps::default();
        caps.media_sources.push("Envelope".to_string());
        caps.sides.push("two-sided-long-edge".to_string());
        let mut options = HashMap::new();
        options.insert("media-source".to_string(), "Envelope".to_string());
        options.insert("sides".to_string(), "two-sided-long-edge".to_string());
        assert!(validate(&options, &caps, Some(&ppd)).is_err());
    }

    #[test]
    fn bidirectional_key_map_round_trips() {
        assert_eq!(ipp_key_to_ppd("sides"), Some("Duplex"));
        assert_eq!(ppd_key_to_ipp("Duplex"), Some("sides"));
    }
}
