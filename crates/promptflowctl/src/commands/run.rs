//! Execute a flow file

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use promptflow_core::EngineConfig;
use promptflow_runtime::{FlowEvent, FlowExecutor, FlowService, InMemoryFlowStore};

use super::{build_router, parse_key_values, print_structured, read_flow, read_value_file};
use crate::cli::OutputFormat;
use crate::output::TraceOutput;

pub struct RunArgs {
    pub config: EngineConfig,
    pub flow: PathBuf,
    pub inputs: Vec<String>,
    pub inputs_file: Option<PathBuf>,
    pub model: Option<String>,
    pub timeout: Option<u64>,
    pub events: bool,
    pub output: OutputFormat,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let flow = read_flow(&args.flow)?;
    if flow.has_cycle() {
        warn!("Flow '{}' contains a cycle; only the first declared node starts it", flow.name);
    }

    let mut inputs = match &args.inputs_file {
        Some(path) => match read_value_file(path)? {
            serde_json::Value::Object(map) => map,
            _ => anyhow::bail!("Inputs file {} must contain an object", path.display()),
        },
        None => serde_json::Map::new(),
    };
    inputs.extend(parse_key_values(&args.inputs)?);

    let router = Arc::new(build_router(&args.config)?);
    let default_model = args
        .model
        .clone()
        .unwrap_or_else(|| args.config.execution.default_model.clone());

    let mut executor = FlowExecutor::with_router(router, default_model);
    let event_printer = if args.events {
        let (tx, rx) = mpsc::channel(args.config.execution.event_buffer.max(1));
        executor = executor.with_event_channel(tx);
        Some(tokio::spawn(print_events(rx)))
    } else {
        None
    };

    let timeout = match args.timeout {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => args.config.execution.timeout(),
    };

    let service = Arc::new(
        FlowService::new(Arc::new(InMemoryFlowStore::new()), Arc::new(executor))
            .with_timeout(timeout),
    );

    let interrupt = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                for id in service.running_executions() {
                    service.stop_execution(&id);
                }
            }
        })
    };

    info!("Running flow '{}' with {} inputs", flow.name, inputs.len());
    let flow_name = flow.name.clone();
    let result = service.execute_definition(flow, inputs).await;
    interrupt.abort();
    let _ = interrupt.await;

    // the service owns the last event sender; dropping it ends the printer
    drop(service);
    if let Some(printer) = event_printer {
        let _ = printer.await;
    }

    match args.output {
        OutputFormat::Text => TraceOutput::new().print_result(&flow_name, &result),
        format => print_structured(&result, format)?,
    }

    if !result.success {
        anyhow::bail!(
            "Flow execution failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn print_events(mut rx: mpsc::Receiver<FlowEvent>) {
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => eprintln!("{}", line),
            Err(e) => warn!("Failed to encode event: {}", e),
        }
    }
}
