use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use promptflow_core::EngineConfig;
use promptflow_runtime::{BatchExecutor, BatchItem};

use super::{build_router, print_structured, read_template, read_value_file};
use crate::cli::OutputFormat;

pub async fn execute(
    config: &EngineConfig,
    template: &Path,
    inputs_file: &Path,
    model: Option<&str>,
    concurrency: usize,
    output: OutputFormat,
) -> Result<()> {
    let template_text = read_template(&template.to_string_lossy(), false)?;

    let variable_sets = match read_value_file(inputs_file)? {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => Ok(map),
                _ => anyhow::bail!("Item {} in {} is not an object", i, inputs_file.display()),
            })
            .collect::<Result<Vec<_>>>()?,
        _ => anyhow::bail!("{} must contain an array of objects", inputs_file.display()),
    };

    let router = Arc::new(build_router(config)?);
    let model_id = model.unwrap_or(&config.execution.default_model);

    let items = BatchExecutor::new(router, config.retry.clone())
        .with_concurrency(concurrency)
        .run(&template_text, model_id, variable_sets)
        .await
        .context("Batch run failed")?;

    match output {
        OutputFormat::Text => print_items(&items),
        format => print_structured(&items, format)?,
    }

    let failed = items.iter().filter(|i| !i.response.success).count();
    if failed > 0 {
        anyhow::bail!("{} of {} prompts failed", failed, items.len());
    }
    Ok(())
}

fn print_items(items: &[BatchItem]) {
    for item in items {
        let marker = if item.response.success { "✓" } else { "✗" };
        println!(
            "{} [{}] {} attempt(s), {} tokens",
            marker, item.index, item.attempts, item.response.tokens_used
        );
        if !item.missing_variables.is_empty() {
            println!("    missing: {}", item.missing_variables.join(", "));
        }
        match &item.response.error_message {
            Some(err) if !item.response.success => println!("    error: {}", err),
            _ => println!("    {}", item.response.content.as_deref().unwrap_or("")),
        }
    }
}
