use anyhow::Result;
use std::path::Path;

use super::read_flow;

/// Validate a flow file: structure first, then every config issue
pub fn execute(path: &Path) -> Result<()> {
    let flow = read_flow(path)?;

    if let Err(issues) = flow.validate() {
        println!("✗ {} has {} issue(s):", path.display(), issues.len());
        for issue in &issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Flow validation failed");
    }
    flow.validate_structure()?;

    if flow.has_cycle() {
        println!("⚠ Flow contains a cycle; execution starts from the first declared node");
    }

    println!(
        "✓ {} is valid ({} nodes, {} edges)",
        flow.name,
        flow.nodes.len(),
        flow.edges.len()
    );
    Ok(())
}
