use anyhow::Result;
use std::path::Path;

use promptflow_core::{extract_variable_names, Flow};

use super::read_flow;

pub fn execute(path: &Path) -> Result<()> {
    let flow = read_flow(path)?;

    println!("Flow:        {}", flow.name);
    println!("ID:          {}", flow.id);
    println!("Version:     {}", flow.version);
    println!("Status:      {:?}", flow.status);
    if let Some(desc) = &flow.description {
        println!("Description: {}", desc);
    }

    println!("\nNodes ({}):", flow.nodes.len());
    for node in &flow.nodes {
        match &node.config.label {
            Some(label) => println!("  {:<20} {:<12} {}", node.id, node.node_type.as_str(), label),
            None => println!("  {:<20} {}", node.id, node.node_type),
        }
    }

    println!("\nEdges ({}):", flow.edges.len());
    for edge in &flow.edges {
        match &edge.source_handle {
            Some(handle) => println!("  {} -> {} [{}]", edge.source, edge.target, handle),
            None => println!("  {} -> {}", edge.source, edge.target),
        }
    }

    let starts: Vec<&str> = flow.start_nodes().iter().map(|n| n.id.as_str()).collect();
    if starts.is_empty() {
        println!("\nStart nodes: (none; cyclic graph)");
    } else {
        println!("\nStart nodes: {}", starts.join(", "));
    }

    let variables = referenced_variables(&flow);
    if !variables.is_empty() {
        println!("Variables:   {}", variables.join(", "));
    }
    Ok(())
}

/// Variables a flow expects from its inputs. Node outputs are excluded.
fn referenced_variables(flow: &Flow) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for node in &flow.nodes {
        let config = &node.config;
        let texts = [
            config.content.as_deref(),
            config.system_message.as_deref(),
            config.condition.as_deref(),
            config.template.as_deref(),
        ];
        for text in texts.into_iter().flatten() {
            for name in extract_variable_names(text) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        if let Some(name) = &config.name {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names.retain(|n| !(n.starts_with("node_") && n.ends_with("_output")));
    names
}
