// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// The capability synthesizer. Derives a per-printer `Caps` record from an
// optional parsed PPD plus the printer's stored defaults, instead of
// querying a remote device's Get-Printer-Attributes response.

use std::collections::HashMap;

use crate::ppd::ParsedPpd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub x: u32,
    pub y: u32,
    pub units: u8, // 3 = dpi, 4 = dots/cm, matching codec::ResolutionUnits wire values
}

#[derive(Debug, Clone)]
pub struct Caps {
    pub media_supported: Vec<String>,
    pub media_sources: Vec<String>,
    pub media_types: Vec<String>,
    pub output_bins: Vec<String>,
    pub sides: Vec<String>,
    pub color_modes: Vec<String>,
    pub raster_color_types: Vec<String>,
    pub resolutions: Vec<Resolution>,
    pub finishings: Vec<i32>,
    pub print_quality: Vec<i32>,
    pub number_up: Vec<i32>,
    pub orientation: Vec<i32>,
    pub page_delivery: Vec<String>,
    pub print_scaling: Vec<String>,
    pub job_hold_until: Vec<String>,
    pub multiple_document_handling: Vec<String>,
    pub job_sheets: Vec<String>,
    pub document_format_supported: Vec<String>,
}

impl Default for Caps {
    /// Hard-coded safe baselines: A4, one-sided, monochrome, 300dpi.
    fn default() -> Self {
        Self {
            media_supported: vec!["iso_a4_210x297mm".to_string()],
            media_sources: vec!["auto".to_string()],
            media_types: vec!["stationery".to_string()],
            output_bins: vec!["face-down".to_string()],
            sides: vec!["one-sided".to_string()],
            color_modes: vec!["monochrome".to_string()],
            raster_color_types: vec!["sgray_8".to_string()],
            resolutions: vec![Resolution { x: 300, y: 300, units: 3 }],
            finishings: vec![3], // none
            print_quality: vec![4], // normal
            number_up: vec![1],
            orientation: vec![3], // portrait
            page_delivery: vec!["same-order".to_string()],
            print_scaling: vec!["auto".to_string()],
            job_hold_until: vec!["no-hold".to_string()],
            multiple_document_handling: vec!["separate-documents-uncollated-copies".to_string()],
            job_sheets: vec!["none".to_string()],
            document_format_supported: vec![
                "application/octet-stream".to_string(),
                "application/vnd.cups-raw".to_string(),
            ],
        }
    }
}

impl Caps {
    /// Synthesizes a `Caps` record: baseline, overridden by the PPD, then
    /// overlaid by stored per-printer defaults.
    pub fn synthesize(ppd: Option<&ParsedPpd>, default_options: &HashMap<String, String>) -> Self {
        let mut caps = Self::default();

        if let Some(ppd) = ppd {
            if let Some(sizes) = ppd.options.get("PageSize") {
                caps.media_supported = sizes.iter().map(|s| ppd_size_to_ipp_media(s)).collect();
            }
            if let Some(sources) = ppd.options.get("InputSlot") {
                caps.media_sources = sources.clone();
            }
            if let Some(types) = ppd.options.get("MediaType") {
                caps.media_types = types.clone();
            }
            if let Some(bins) = ppd.options.get("OutputBin") {
                caps.output_bins = bins.clone();
            }
            if let Some(duplex) = ppd.options.get("Duplex") {
                caps.sides = duplex.iter().map(|d| duplex_to_ipp_sides(d).to_string()).collect();
            }
            if let Some(resolutions) = ppd.options.get("Resolution") {
                let parsed: Vec<Resolution> =
                    resolutions.iter().filter_map(|r| parse_resolution(r)).collect();
                if !parsed.is_empty() {
                    caps.resolutions = dedup_resolutions(parsed);
                }
            }
            if ppd.has_color_option() {
                caps.color_modes = vec!["monochrome".to_string(), "color".to_string()];
                caps.raster_color_types = vec!["sgray_8".to_string(), "srgb_8".to_string()];
            }
            if !ppd.filters.is_empty() {
                // A PPD that declares filters extends the supported-format
                // set beyond the raw/octet-stream baseline. A PPD with no
                // filters must not gain formats it can't convert.
                caps.document_format_supported
                    .extend(ppd.filters.iter().cloned());
                caps.document_format_supported.sort();
                caps.document_format_supported.dedup();
            }
        }

        // Overlay stored per-printer defaults; auto-append any defaulted
        // value missing from its supported list.
        if let Some(media) = default_options.get("media") {
            ensure_present(&mut caps.media_supported, media);
        }
        if let Some(sides) = default_options.get("sides") {
            ensure_present(&mut caps.sides, sides);
        }
        if let Some(mode) = default_options.get("print-color-mode") {
            ensure_present(&mut caps.color_modes, mode);
        }
        if let Some(res) = default_options
            .get("printer-resolution")
            .and_then(|r| parse_resolution(r))
        {
            if !caps.resolutions.contains(&res) {
                caps.resolutions.push(res);
            }
        }

        caps
    }

    pub fn supports_color(&self) -> bool {
        self.color_modes.iter().any(|m| m == "color")
    }

    pub fn max_resolution(&self) -> Resolution {
        self.resolutions
            .iter()
            .copied()
            .max_by_key(|r| r.x.max(r.y))
            .unwrap_or(Resolution { x: 300, y: 300, units: 3 })
    }

    /// `urf-supported` advertisement:
    /// `["W8"] + (color ? "SRGB24" : "SGRAY8") + "RS<max-res>" + ("DM1" if duplex)`.
    pub fn urf_supported(&self) -> Vec<String> {
        let mut urf = vec!["W8".to_string()];
        urf.push(if self.supports_color() { "SRGB24".to_string() } else { "SGRAY8".to_string() });
        urf.push(format!("RS{}", self.max_resolution().x));
        if self.sides.iter().any(|s| s != "one-sided") {
            urf.push("DM1".to_string());
        }
        urf
    }
}

fn ensure_present(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// `Duplex=None|DuplexNoTumble|DuplexTumble` -> IPP `sides` keyword, folding
/// case-insensitively.
pub fn duplex_to_ipp_sides(ppd_value: &str) -> &'static str {
    match ppd_value.to_ascii_lowercase().as_str() {
        "duplexnotumble" => "two-sided-long-edge",
        "duplextumble" => "two-sided-short-edge",
        _ => "one-sided",
    }
}

pub fn ipp_sides_to_duplex(ipp_value: &str) -> &'static str {
    match ipp_value {
        "two-sided-long-edge" => "DuplexNoTumble",
        "two-sided-short-edge" => "DuplexTumble",
        _ => "None",
    }
}

fn ppd_size_to_ipp_media(ppd_size: &str) -> String {
    match ppd_size {
        "A4" => "iso_a4_210x297mm".to_string(),
        "A3" => "iso_a3_297x420mm".to_string(),
        "A5" => "iso_a5_148x210mm".to_string(),
        "Letter" => "na_letter_8.5x11in".to_string(),
        "Legal" => "na_legal_8.5x14in".to_string(),
        other => other.to_ascii_lowercase(),
    }
}

/// Parses `"NxMdpi"` / `"Ndpi"` into a `Resolution`, deduplicated by the
/// caller on the `(x, y, units)` triple.
fn parse_resolution(raw: &str) -> Option<Resolution> {
    let raw = raw.trim().strip_suffix("dpi")?;
    if let Some((x, y)) = raw.split_once('x') {
        Some(Resolution {
            x: x.parse().ok()?,
            y: y.parse().ok()?,
            units: 3,
        })
    } else {
        let v: u32 = raw.parse().ok()?;
        Some(Resolution { x: v, y: v, units: 3 })
    }
}

fn dedup_resolutions(mut resolutions: Vec<Resolution>) -> Vec<Resolution> {
    resolutions.sort_by_key(|r| (r.x, r.y, r.units));
    resolutions.dedup();
    resolutions
}

/// Recognizes a media size by `(x, y)` dimensions in hundredths-of-a-mm with
/// +-200 tolerance: A4, Letter, Legal, A5.
pub fn media_size_by_dimensions(x_hundredths_mm: i32, y_hundredths_mm: i32) -> Option<&'static str> {
    const TOLERANCE: i32 = 200;
    const SIZES: &[(&str, i32, i32)] = &[
        ("iso_a4_210x297mm", 21000, 29700),
        ("na_letter_8.5x11in", 21590, 27940),
        ("na_legal_8.5x14in", 21590, 35560),
        ("iso_a5_148x210mm", 14800, 21000),
    ];
    for (name, w, h) in SIZES {
        let matches_upright = (x_hundredths_mm - w).abs() <= TOLERANCE && (y_hundredths_mm - h).abs() <= TOLERANCE;
        let matches_rotated = (x_hundredths_mm - h).abs() <= TOLERANCE && (y_hundredths_mm - w).abs() <= TOLERANCE;
        if matches_upright || matches_rotated {
            return Some(name);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_baseline_is_a4_simplex_mono_300dpi() {
        let caps = Caps::default();
        assert_eq!(caps.media_supported, vec!["iso_a4_210x297mm"]);
        assert_eq!(caps.sides, vec!["one-sided"]);
        assert!(!caps.supports_color());
        assert_eq!(caps.resolutions[0], Resolution { x: 300, y: 300, units: 3 });
    }

    #[test]
    fn ppd_duplex_option_maps_to_ipp_sides() {
        let ppd = ParsedPpd::parse("Duplex=None,DuplexNoTumble,DuplexTumble\n");
        let caps = Caps::synthesize(Some(&ppd), &HashMap::new());
        assert!(caps.sides.contains(&"two-sided-long-edge".to_string()));
        assert!(caps.sides.contains(&"two-sided-short-edge".to_string()));
    }

    #[test]
    fn stored_default_auto_appends_when_missing() {
        let mut defaults = HashMap::new();
        defaults.insert("media".to_string(), "na_legal_8.5x14in".to_string());
        let caps = Caps::synthesize(None, &defaults);
        assert!(caps.media_supported.contains(&"na_legal_8.5x14in".to_string()));
    }

    #[test]
    fn ppd_with_no_filters_keeps_octet_stream_only() {
        let ppd = ParsedPpd::default();
        let caps = Caps::synthesize(Some(&ppd), &HashMap::new());
        assert!(caps.document_format_supported.contains(&"application/octet-stream".to_string()));
        assert!(caps.document_format_supported.contains(&"application/vnd.cups-raw".to_string()));
        assert_eq!(caps.document_format_supported.len(), 2);
    }

    #[test]
    fn media_size_recognized_within_tolerance() {
        assert_eq!(media_size_by_dimensions(21000, 29700), Some("iso_a4_210x297mm"));
        assert_eq!(media_size_by_dimensions(21050, 29650), Some("iso_a4_210x297mm"));
        assert_eq!(media_size_by_dimensions(99999, 99999), None);
    }

    #[test]
    fn urf_reflects_color_and_duplex() {
        let ppd = ParsedPpd::parse("ColorDevice: true\nDuplex=None,DuplexNoTumble\n");
        let caps = Caps::synthesize(Some(&ppd), &HashMap::new());
        let urf = caps.urf_supported();
        assert!(urf.contains(&"SRGB24".to_string()));
        assert!(urf.contains(&"DM1".to_string()));
    }
}
