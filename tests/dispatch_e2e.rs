use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use crossbeam_channel::bounded;
use serde_json::{json, Value as Json};

use changewatch::host::{InMemoryDevices, InMemoryVariables, RecordingActions};
use changewatch::listener::config::Props;
use changewatch::{
    describe_listeners, ActionSink, ChangeEvent, ChangeFeed, DeviceId, DeviceSnapshot, Dispatcher, EngineConfig,
    ExecutionError, ListenerError, ListenerId, ObjectKind, RawListenerConfig, UpdatePair, VariableId,
    VariableSnapshot, VariableStore,
};

struct Host {
    variables: Arc<InMemoryVariables>,
    actions: Arc<RecordingActions>,
    dispatcher: Arc<Dispatcher>,
}

fn host() -> Host {
    let _ = env_logger::builder().is_test(true).try_init();
    let variables = Arc::new(InMemoryVariables::new());
    let actions = Arc::new(RecordingActions::new());
    let dispatcher = Arc::new(Dispatcher::new(
        &EngineConfig::default(),
        Arc::clone(&variables) as Arc<dyn VariableStore>,
        Arc::clone(&actions) as Arc<dyn ActionSink>,
    ));
    Host {
        variables,
        actions,
        dispatcher,
    }
}

fn props(value: Json) -> Props {
    match value {
        Json::Object(map) => map,
        _ => panic!("expected object"),
    }
}

fn raw(id: u64, value: Json) -> RawListenerConfig {
    RawListenerConfig::new(ListenerId::new(id), format!("listener {id}"), props(value))
}

fn porch(temperature: i64, battery: i64) -> DeviceSnapshot {
    DeviceSnapshot::new(DeviceId::new(100), "Porch Sensor")
        .with_state("temperature", temperature)
        .with_state("battery", battery)
}

#[test]
fn battery_filter_ignores_battery_only_changes() {
    let h = host();
    h.dispatcher
        .activate(&raw(
            1,
            json!({
                "watchedDevices": [100],
                "watchedVariables": [],
                "advancedMode": true,
                "filterLogic": "ignore",
                "stateFilter": ["battery"]
            }),
        ))
        .unwrap();

    let report = h.dispatcher.on_device_updated(&porch(70, 50), &porch(72, 50));
    assert!(report.has_fired(ListenerId::new(1)));

    let report = h.dispatcher.on_device_updated(&porch(70, 50), &porch(70, 40));
    assert!(report.fired.is_empty());

    assert_eq!(h.actions.fired(), vec![ListenerId::new(1)]);
}

#[test]
fn save_target_receives_device_name_once() {
    let h = host();
    h.variables
        .insert(VariableSnapshot::new(VariableId::new(55), "lastPorchTrigger", ""))
        .unwrap();
    h.dispatcher
        .activate(&raw(
            1,
            json!({
                "watchedDevices": [100],
                "watchedVariables": [],
                "saveTarget": 55,
                "saveValueKind": "name"
            }),
        ))
        .unwrap();

    let report = h.dispatcher.on_device_updated(&porch(70, 50), &porch(71, 50));
    assert!(report.errors.is_empty());
    assert_eq!(
        h.variables.writes().unwrap(),
        vec![(VariableId::new(55), "Porch Sensor".to_string())]
    );
    assert_eq!(
        h.variables.read_variable(VariableId::new(55)).unwrap().value,
        "Porch Sensor"
    );
}

#[test]
fn missing_save_target_still_fires_action() {
    let h = host();
    h.dispatcher
        .activate(&raw(
            7,
            json!({
                "watchedDevices": [100],
                "watchedVariables": [],
                "saveTarget": 999
            }),
        ))
        .unwrap();

    let report = h.dispatcher.on_device_updated(&porch(70, 50), &porch(71, 50));

    assert_eq!(report.fired, vec![ListenerId::new(7)]);
    assert_eq!(h.actions.fired(), vec![ListenerId::new(7)]);
    assert_eq!(
        report.errors,
        vec![ListenerError::Execution(ExecutionError::MissingReferencedObject {
            listener: ListenerId::new(7),
            kind: ObjectKind::Variable,
            id: 999,
        })]
    );
    assert!(h.variables.writes().unwrap().is_empty());
}

#[test]
fn one_failing_listener_does_not_block_others() {
    let h = host();
    h.variables
        .insert(VariableSnapshot::new(VariableId::new(55), "last", ""))
        .unwrap();
    h.dispatcher
        .activate(&raw(1, json!({ "watchedDevices": [100], "watchedVariables": [], "saveTarget": 999 })))
        .unwrap();
    h.dispatcher
        .activate(&raw(2, json!({ "watchedDevices": [100], "watchedVariables": [], "saveTarget": 55 })))
        .unwrap();

    let report = h.dispatcher.on_device_updated(&porch(70, 50), &porch(71, 50));

    assert_eq!(report.fired, vec![ListenerId::new(1), ListenerId::new(2)]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].listener(), Some(ListenerId::new(1)));
    assert_eq!(h.variables.writes().unwrap().len(), 1);
}

#[test]
fn legacy_configuration_is_migrated_on_activation() {
    let h = host();
    h.variables
        .insert(VariableSnapshot::new(VariableId::new(55), "last", ""))
        .unwrap();
    let activation = h
        .dispatcher
        .activate(&raw(
            3,
            json!({
                "triggerDevices": ["100"],
                "triggerVariables": [],
                "advancedMode": "true",
                "ignoreStates": "temperature, humidity,",
                "saveBool": true,
                "saveVar": "55",
                "version": "1.0"
            }),
        ))
        .unwrap();

    assert!(activation.obsolete.is_none());
    let stored = activation.migrated_props.expect("legacy props must be rewritten");
    assert_eq!(stored["schemaVersion"], "4.0");
    assert_eq!(stored["stateFilter"], json!(["humidity", "temperature"]));
    assert!(stored.get("triggerDevices").is_none());
    assert!(stored.get("saveBool").is_none());

    let old = DeviceSnapshot::new(DeviceId::new(100), "Porch Sensor").with_state("temperature", 70);
    let report = h
        .dispatcher
        .on_device_updated(&old, &old.clone().with_state("temperature", 71));
    assert!(report.fired.is_empty());

    let report = h
        .dispatcher
        .on_device_updated(&old, &old.clone().with_state("motion", true));
    assert!(report.has_fired(ListenerId::new(3)));
    assert_eq!(
        h.variables.writes().unwrap(),
        vec![(VariableId::new(55), "Porch Sensor".to_string())]
    );
}

#[test]
fn first_schema_ignore_list_still_ignores_after_migration() {
    let h = host();
    let activation = h
        .dispatcher
        .activate(&raw(
            1,
            json!({
                "triggerDevices": ["100"],
                "triggerVariables": [],
                "ignoreStates": "battery",
                "version": "1.0"
            }),
        ))
        .unwrap();

    let stored = activation.migrated_props.expect("legacy props must be rewritten");
    assert_eq!(stored["advancedMode"], json!(true));
    assert_eq!(stored["stateFilter"], json!(["battery"]));

    let report = h.dispatcher.on_device_updated(&porch(70, 50), &porch(70, 40));
    assert!(report.fired.is_empty());

    let report = h.dispatcher.on_device_updated(&porch(70, 50), &porch(71, 50));
    assert!(report.has_fired(ListenerId::new(1)));
}

#[test]
fn obsolete_configuration_activates_with_defaults() {
    let h = host();
    let activation = h
        .dispatcher
        .activate(&raw(4, json!({ "triggerDevices": [100], "version": "2.0" })))
        .unwrap();

    let Some(ListenerError::Execution(ExecutionError::ConfigurationObsolete { fields, .. })) =
        activation.obsolete
    else {
        panic!("expected an obsolete-configuration report");
    };
    assert_eq!(fields, vec!["watchedVariables".to_string()]);

    let report = h.dispatcher.on_device_updated(&porch(70, 50), &porch(71, 50));
    assert!(report.has_fired(ListenerId::new(4)));
}

#[test]
fn variable_touch_with_same_value_never_fires() {
    let h = host();
    h.dispatcher
        .activate(&raw(1, json!({ "watchedVariables": ["7"] })))
        .unwrap();

    let mode = VariableSnapshot::new(VariableId::new(7), "mode", "home");
    assert!(h.dispatcher.on_variable_updated(&mode, &mode.clone()).fired.is_empty());
    assert!(h
        .dispatcher
        .on_variable_updated(&mode, &mode.with_value("away"))
        .has_fired(ListenerId::new(1)));
}

#[test]
fn listeners_can_change_while_dispatching() {
    let h = host();
    h.dispatcher
        .activate(&raw(1, json!({ "watchedDevices": [100], "watchedVariables": [] })))
        .unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let churn = {
        let dispatcher = Arc::clone(&h.dispatcher);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut cycles = 0_u32;
            while !stop.load(Ordering::Relaxed) {
                dispatcher
                    .activate(&raw(2, json!({ "watchedDevices": [100], "watchedVariables": [] })))
                    .unwrap();
                dispatcher.deactivate(ListenerId::new(2)).unwrap();
                cycles += 1;
            }
            cycles
        })
    };

    for i in 0..500 {
        let report = h.dispatcher.on_device_updated(&porch(i, 50), &porch(i + 1, 50));
        assert!(report.has_fired(ListenerId::new(1)));
        assert!(report.errors.is_empty());
        assert!(report.fired.len() <= 2);
    }
    stop.store(true, Ordering::Relaxed);
    churn.join().unwrap();

    assert_eq!(h.dispatcher.listeners().unwrap().len(), 1);
}

#[test]
fn change_feed_preserves_delivery_order() {
    let h = host();
    h.variables
        .insert(VariableSnapshot::new(VariableId::new(55), "last", ""))
        .unwrap();
    h.dispatcher
        .activate(&raw(
            1,
            json!({ "watchedDevices": [100, 101], "watchedVariables": [], "saveTarget": 55 }),
        ))
        .unwrap();

    let (report_tx, report_rx) = bounded(64);
    let feed = ChangeFeed::spawn(
        Arc::clone(&h.dispatcher),
        &EngineConfig {
            feed_queue_capacity: 2,
            ..EngineConfig::default()
        },
        Some(report_tx),
    )
    .unwrap();

    let names = ["Porch Sensor", "Garage Door"];
    for round in 0..10 {
        for (offset, name) in names.iter().enumerate() {
            let old = DeviceSnapshot::new(DeviceId::new(100 + offset as u64), *name).with_state("n", round);
            let new = old.clone().with_state("n", round + 1);
            feed.deliver(ChangeEvent::Device(UpdatePair::new(old, new).unwrap()))
                .unwrap();
        }
    }
    feed.drain().unwrap();
    assert_eq!(feed.processed(), 20);
    feed.shutdown().unwrap();

    assert_eq!(report_rx.try_iter().count(), 20);
    let written: Vec<String> = h
        .variables
        .writes()
        .unwrap()
        .into_iter()
        .map(|(_, value)| value)
        .collect();
    let expected: Vec<String> = (0..10)
        .flat_map(|_| names.iter().map(|n| (*n).to_string()))
        .collect();
    assert_eq!(written, expected);
}

#[test]
fn report_lists_missing_objects() {
    let h = host();
    let devices = InMemoryDevices::new();
    devices.insert(porch(70, 50)).unwrap();
    let before = Utc::now();
    h.dispatcher
        .activate(&raw(1, json!({ "watchedDevices": [100, 404], "watchedVariables": [], "saveTarget": 999 })))
        .unwrap();
    let after = Utc::now();

    let summaries = describe_listeners(&h.dispatcher.listeners().unwrap(), &devices, &*h.variables);
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert!(before <= summary.activated_at && summary.activated_at <= after);
    assert_eq!(summary.devices.len(), 2);
    assert_eq!(summary.devices[0].name.as_deref(), Some("Porch Sensor"));
    assert!(summary.devices[1].is_missing());
    assert!(summary.save_target.as_ref().is_some_and(|t| t.is_missing()));
    assert_eq!(summary.problems.len(), 2);
}
