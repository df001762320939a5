//! Role script rendering.
//!
//! A role script is the shared helper fragment followed by the role template.
//! `{{KEY}}` placeholders are expanded in a single pass and every value is
//! shell-quoted, so substituted text is never expanded again.

use std::collections::HashMap;

use regex::{Captures, Regex};

use crate::errors::FleetError;
use crate::provision::request::JobClass;
use crate::utils::shell_quote;

const COMMON_FRAGMENT: &str = include_str!("assets/common.sh.inc");
const DISPLAY_TEMPLATE: &str = include_str!("assets/display.sh.tmpl");
const STOPS_TEMPLATE: &str = include_str!("assets/stops.sh.tmpl");

const PLACEHOLDER: &str = r"\{\{\s*([A-Z][A-Z0-9_]*)\s*\}\}";

fn role_template(class: JobClass) -> &'static str {
    match class {
        JobClass::Display => DISPLAY_TEMPLATE,
        JobClass::StationStops => STOPS_TEMPLATE,
    }
}

/// Render the full script for `class`.
pub fn render_role_script(class: JobClass, params: &[(&str, String)]) -> Result<String, FleetError> {
    let combined = format!("{}\n\n{}", COMMON_FRAGMENT, role_template(class));
    expand(&combined, params)
}

/// Expand placeholders in `template`; an unknown placeholder is an error.
pub fn expand(template: &str, params: &[(&str, String)]) -> Result<String, FleetError> {
    let placeholder =
        Regex::new(PLACEHOLDER).map_err(|e| FleetError::Internal(format!("placeholder pattern: {}", e)))?;
    let values: HashMap<&str, &str> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();

    let mut missing = Vec::new();
    let rendered = placeholder.replace_all(template, |caps: &Captures| {
        let key = &caps[1];
        match values.get(key) {
            Some(value) => shell_quote(value),
            None => {
                missing.push(key.to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        return Err(FleetError::Internal(format!(
            "render script: no value for {}",
            missing.join(", ")
        )));
    }
    Ok(rendered.into_owned())
}
