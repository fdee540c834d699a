use anyhow::Result;
use std::collections::HashMap;

use promptflow_core::EngineConfig;

use super::build_router;

/// List every model in the provider catalogues, optionally with liveness
pub async fn execute(config: &EngineConfig, check: bool) -> Result<()> {
    let router = build_router(config)?;
    if router.is_empty() {
        println!("No providers configured.");
        return Ok(());
    }

    let availability: HashMap<String, bool> = if check {
        router.availability().await.into_iter().collect()
    } else {
        HashMap::new()
    };

    println!("{:<28} {:<10} {:<12} DESCRIPTION", "MODEL", "PROVIDER", "STATUS");
    for (provider, model) in router.list_models().await {
        let status = match availability.get(&provider) {
            Some(true) => "available",
            Some(false) => "offline",
            None => "-",
        };
        println!(
            "{:<28} {:<10} {:<12} {}",
            model.id,
            provider,
            status,
            model.description
        );
    }
    Ok(())
}
