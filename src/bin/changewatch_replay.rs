//! changewatch replay tool
//!
//! Replays a recorded change feed through the engine against an in-memory
//! host and prints one JSON line per event, followed by the variable writes.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use crossbeam_channel::bounded;
use log::{info, warn, LevelFilter};
use serde::Deserialize;
use serde_json::json;

use changewatch::host::{InMemoryDevices, InMemoryVariables, RecordingActions};
use changewatch::{
    describe_listeners, ActionSink, ChangeEvent, ChangeFeed, DeviceSnapshot, Dispatcher, EngineConfig,
    RawListenerConfig, VariableSnapshot, VariableStore,
};

#[derive(Parser, Debug)]
#[command(name = "changewatch-replay", about = "Replay a change feed fixture")]
struct Args {
    /// Fixture with objects, listeners and events.
    #[arg(long)]
    fixture: PathBuf,
    /// Engine configuration (JSON).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the listener report before replaying.
    #[arg(long)]
    list: bool,
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    variables: Vec<VariableSnapshot>,
    #[serde(default)]
    devices: Vec<DeviceSnapshot>,
    #[serde(default)]
    listeners: Vec<RawListenerConfig>,
    #[serde(default)]
    events: Vec<ChangeEvent>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::from_json(&fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        config.log_level()
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let fixture: Fixture = serde_json::from_str(&fs::read_to_string(&args.fixture)?)?;

    let variables = Arc::new(InMemoryVariables::new());
    for variable in fixture.variables {
        variables.insert(variable)?;
    }
    let devices = InMemoryDevices::new();
    for device in fixture.devices {
        devices.insert(device)?;
    }
    let actions = Arc::new(RecordingActions::new());

    let dispatcher = Arc::new(Dispatcher::new(
        &config,
        Arc::clone(&variables) as Arc<dyn VariableStore>,
        Arc::clone(&actions) as Arc<dyn ActionSink>,
    ));

    for raw in &fixture.listeners {
        match dispatcher.activate(raw) {
            Ok(activation) => {
                if let Some(props) = activation.migrated_props {
                    info!("listener {} migrated: {}", raw.id, serde_json::Value::Object(props));
                }
            }
            Err(err) => warn!("listener {} not activated: {err}", raw.id),
        }
    }

    if args.list {
        for summary in describe_listeners(&dispatcher.listeners()?, &devices, &*variables) {
            println!("{}", serde_json::to_string(&summary)?);
        }
    }

    let (report_tx, report_rx) = bounded(fixture.events.len().max(1));
    let feed = ChangeFeed::spawn(Arc::clone(&dispatcher), &config, Some(report_tx))?;
    for event in fixture.events {
        feed.deliver(event)?;
    }
    feed.drain()?;
    feed.shutdown()?;

    for (index, report) in report_rx.try_iter().enumerate() {
        let errors: Vec<String> = report.errors.iter().map(ToString::to_string).collect();
        let line = json!({
            "event": index,
            "event_id": report.event_id.to_string(),
            "fired": report.fired,
            "errors": errors
        });
        println!("{line}");
    }

    for (variable, value) in variables.writes()? {
        println!("{}", json!({ "write": variable, "value": value }));
    }
    info!("{} actions requested", actions.fired().len());

    Ok(())
}
