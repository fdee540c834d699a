//! Command implementations and shared loaders

pub mod batch;
pub mod completion;
pub mod describe;
pub mod models;
pub mod run;
pub mod template;
pub mod validate;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::Path;

use promptflow_core::{load_config, load_flow_file, EngineConfig, Flow};
use promptflow_llm::ProviderRouter;

/// Load the engine config from `--config` / `PROMPTFLOW_CONFIG`, else defaults
pub fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig> {
    load_config(path).context("Failed to load engine configuration")
}

/// Build the provider router from config
pub fn build_router(config: &EngineConfig) -> Result<ProviderRouter> {
    let router = ProviderRouter::from_config(config).context("Failed to create providers")?;
    if router.is_empty() {
        tracing::warn!("No model providers configured; prompt nodes will fail");
    }
    Ok(router)
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map_or(false, |e| e.eq_ignore_ascii_case("json"))
}

/// Parse a JSON or YAML file into an untyped value
pub fn read_value_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if is_json(path) {
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML in {}", path.display()))
    }
}

/// Read a flow file in either the flat or the `flowData` definition form
pub fn read_flow(path: &Path) -> Result<Flow> {
    Ok(load_flow_file(path)?)
}

/// Parse `key=value` pairs. Values are JSON when they parse as JSON,
/// otherwise plain strings.
pub fn parse_key_values(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .with_context(|| format!("Expected KEY=VALUE, got '{}'", pair))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("Empty variable name in '{}'", pair);
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        map.insert(key.to_string(), value);
    }
    Ok(map)
}

/// Template text from a file, or the argument itself with `--text`
pub fn read_template(template: &str, is_text: bool) -> Result<String> {
    if is_text {
        return Ok(template.to_string());
    }
    std::fs::read_to_string(template).with_context(|| format!("Failed to read template {}", template))
}

/// Print a value in a structured format
pub fn print_structured<T: serde::Serialize>(value: &T, format: crate::cli::OutputFormat) -> Result<()> {
    match format {
        crate::cli::OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        _ => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_key_values() {
        let pairs = vec![
            "name=Ada".to_string(),
            "count=3".to_string(),
            "flags=[1,2]".to_string(),
            "eq=a=b".to_string(),
        ];
        let map = parse_key_values(&pairs).unwrap();
        assert_eq!(map["name"], json!("Ada"));
        assert_eq!(map["count"], json!(3));
        assert_eq!(map["flags"], json!([1, 2]));
        assert_eq!(map["eq"], json!("a=b"));

        assert!(parse_key_values(&["novalue".to_string()]).is_err());
        assert!(parse_key_values(&["=x".to_string()]).is_err());
    }

    #[test]
    fn test_read_flow_reports_field_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(
            &path,
            "name: broken\nnodes:\n  - id: a\n    type: 42\n",
        )
        .unwrap();

        let err = read_flow(&path).unwrap_err().to_string();
        assert!(err.contains("nodes[0]"), "{}", err);
    }

    #[test]
    fn test_read_flow_definition_form() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("imported.json");
        std::fs::write(
            &path,
            r#"{"name":"imp","flowData":{"nodes":[{"id":"a","type":"input","data":{}}],"edges":[]}}"#,
        )
        .unwrap();

        let flow = read_flow(&path).unwrap();
        assert_eq!(flow.id, "imported");
        assert_eq!(flow.nodes.len(), 1);
    }
}
