// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// A minimal stand-in for a real PPD parser. PPD parsing is an explicit
// The daemon only needs a handful of fields
// consume — options, their supported/default values, UI constraints, and
// whether the device is color-capable. `ParsedPpd::load` reads a tiny
// `Option: value1,value2,...` / `Default<Option>: value` convention file
// rather than a real Adobe PPD grammar; swapping in a real parser only
// touches this module.

use std::collections::HashMap;

use cupsd_core::error::Result;

#[derive(Debug, Clone, Default)]
pub struct ParsedPpd {
    /// PPD option keyword -> ordered list of supported values
    /// (e.g. `"PageSize" -> ["A4", "Letter", ...]`).
    pub options: HashMap<String, Vec<String>>,
    /// PPD option keyword -> default value.
    pub defaults: HashMap<String, String>,
    /// UI constraints: each entry is `(option_a, value_a, option_b, value_b)`
    /// meaning that combination is forbidden.
    pub constraints: Vec<(String, String, String, String)>,
    /// Whether the PPD marks the device as color-capable.
    pub color_device: bool,
    /// MIME types the PPD's filters can consume, if declared.
    pub filters: Vec<String>,
}

impl ParsedPpd {
    /// Loads a `key=value` convention file. Missing file or malformed lines
    /// degrade gracefully to an empty PPD (callers fall back to capability
    /// baselines in that case).
    pub fn load(path: &str) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(_) => return Ok(Self::default()),
        };
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let mut ppd = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("ColorDevice:") {
                ppd.color_device = rest.trim().eq_ignore_ascii_case("true");
            } else if let Some(rest) = line.strip_prefix("Filter:") {
                ppd.filters.push(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("Constraint:") {
                let parts: Vec<&str> = rest.split(',').map(str::trim).collect();
                if parts.len() == 4 {
                    ppd.constraints.push((
                        parts[0].to_string(),
                        parts[1].to_string(),
                        parts[2].to_string(),
                        parts[3].to_string(),
                    ));
                }
            } else if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();
                if let Some(opt) = key.strip_prefix("Default") {
                    ppd.defaults.insert(opt.to_string(), value.to_string());
                } else {
                    ppd.options.insert(
                        key.to_string(),
                        value.split(',').map(|s| s.trim().to_string()).collect(),
                    );
                }
            }
        }
        ppd
    }

    pub fn has_color_option(&self) -> bool {
        self.color_device
            || self.options.contains_key("ColorModel")
            || self.options.contains_key("ColorMode")
    }

    /// Checks whether `(option_a=value_a, option_b=value_b)` violates any
    /// declared UI constraint, in either order.
    pub fn violates_constraint(&self, merged: &HashMap<String, String>) -> Option<(String, String)> {
        for (opt_a, val_a, opt_b, val_b) in &self.constraints {
            let a_match = merged.get(opt_a).is_some_and(|v| v == val_a);
            let b_match = merged.get(opt_b).is_some_and(|v| v == val_b);
            if a_match && b_match {
                return Some((opt_a.clone(), opt_b.clone()));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_options_defaults_and_constraints() {
        let text = "\
ColorDevice: true
PageSize=A4,Letter,Legal
DefaultPageSize=A4
Duplex=None,DuplexNoTumble,DuplexTumble
Constraint: InputSlot, Envelope, Duplex, DuplexNoTumble
";
        let ppd = ParsedPpd::parse(text);
        assert!(ppd.color_device);
        assert_eq!(ppd.options["PageSize"], vec!["A4", "Letter", "Legal"]);
        assert_eq!(ppd.defaults["PageSize"], "A4");
        assert_eq!(ppd.constraints.len(), 1);
    }

    #[test]
    fn detects_constraint_violation() {
        let ppd = ParsedPpd::parse("Constraint: InputSlot, Envelope, Duplex, DuplexNoTumble\n");
        let mut merged = HashMap::new();
        merged.insert("InputSlot".to_string(), "Envelope".to_string());
        merged.insert("Duplex".to_string(), "DuplexNoTumble".to_string());
        assert!(ppd.violates_constraint(&merged).is_some());
        merged.insert("Duplex".to_string(), "None".to_string());
        assert!(ppd.violates_constraint(&merged).is_none());
    }

    #[test]
    fn missing_file_degrades_to_default() {
        let ppd = ParsedPpd::load("/nonexistent/path.ppd-conf").unwrap();
        assert!(ppd.options.is_empty());
        assert!(!ppd.color_device);
    }
}
