//! Standalone template commands

use anyhow::Result;
use std::collections::HashMap;

use promptflow_core::{extract_variable_names, missing_variables, resolve, value_to_text};

use super::{parse_key_values, read_template};

pub fn variables(template: &str, is_text: bool) -> Result<()> {
    let text = read_template(template, is_text)?;
    for name in extract_variable_names(&text) {
        println!("{}", name);
    }
    Ok(())
}

pub fn render(
    template: &str,
    is_text: bool,
    inputs: &[String],
    defaults: &[String],
    strict: bool,
) -> Result<()> {
    let text = read_template(template, is_text)?;
    let values = parse_key_values(inputs)?;
    let defaults: HashMap<String, String> = parse_key_values(defaults)?
        .into_iter()
        .map(|(k, v)| (k, value_to_text(&v)))
        .collect();

    let names = extract_variable_names(&text);
    let missing = missing_variables(&names, &values, &defaults);
    if !missing.is_empty() {
        if strict {
            anyhow::bail!("Missing template variables: {}", missing.join(", "));
        }
        tracing::warn!("Rendering with empty values for: {}", missing.join(", "));
    }

    println!("{}", resolve(&text, &values, &defaults));
    Ok(())
}
