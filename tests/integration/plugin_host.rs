//! Discovery through instantiation on a mock plugin tree.

use std::sync::Arc;

use annot_core::config::plugin::HelperConfig;
use annot_plugin::{LoadStatus, PluginHost, PluginIdentifier, PluginType, ScanState};

use crate::helpers::TestPlugins;

#[tokio::test]
async fn test_scan_registers_loadable_plugins_and_reports_the_rest() {
    let plugins = TestPlugins::new();
    plugins.install_standard_set();
    let host = plugins.host();

    let report = host.scan().await;

    assert!(report.succeeded);
    assert_eq!(host.state(PluginType::Ladspa).await, ScanState::Scanned { count: 2 });
    assert_eq!(host.state(PluginType::Vamp).await, ScanState::Scanned { count: 3 });

    let labels: Vec<String> = host
        .identifiers(PluginType::Ladspa)
        .await
        .iter()
        .map(|i| i.label().to_string())
        .collect();
    assert_eq!(labels, vec!["amp_mono", "amp_stereo"]);

    let statuses: Vec<(String, LoadStatus)> = report
        .failures
        .iter()
        .map(|f| {
            let name = f.path.file_name().expect("file name").to_string_lossy().into_owned();
            (name, f.status)
        })
        .collect();
    assert!(statuses.contains(&("junk.so".to_string(), LoadStatus::FailedToLoadLibrary)));
    assert!(statuses.contains(&("nosym.so".to_string(), LoadStatus::FailedToFindDescriptor)));
    assert!(statuses.iter().any(|(name, _)| name == "delay.so"));

    let text = report.failure_report().expect("failure report");
    assert!(text.contains("junk.so"));
    assert!(!text.contains("amp.so"));
}

#[tokio::test]
async fn test_canonical_identifier_instantiates_and_runs() {
    let plugins = TestPlugins::new();
    let path = plugins.install(plugins.ladspa_dir.path(), "amp.so", annot_plugin::mock::MockFixture::LadspaAmp);
    let host = plugins.host();
    host.scan().await;

    let id = PluginIdentifier::parse("ladspa:amp:amp_mono").expect("parse");
    let record = host
        .descriptors(PluginType::Ladspa)
        .await
        .into_iter()
        .find(|r| r.identifier.canonical() == id)
        .expect("amp_mono record");
    assert_eq!(record.name, "Mono Amplifier");
    assert_eq!(record.audio_input_count(), 1);
    assert_eq!(record.control_output_names(), vec!["Peak"]);

    let mut instance = host.instantiate(&id, 44100.0).expect("instantiate");

    let mut gain = 0.5f32;
    let mut input = vec![1.0f32, -0.5, 0.0, 2.0];
    let mut output = vec![0.0f32; 4];
    let mut peak = 0.0f32;
    let mut latency = 0.0f32;
    unsafe {
        instance.connect_port(0, &mut gain).expect("gain");
        instance.connect_port(1, input.as_mut_ptr()).expect("input");
        instance.connect_port(2, output.as_mut_ptr()).expect("output");
        instance.connect_port(3, &mut peak).expect("peak");
        instance.connect_port(4, &mut latency).expect("latency");
    }
    instance.activate().expect("activate");
    instance.run(4).expect("run");
    instance.deactivate().expect("deactivate");

    assert_eq!(output, vec![0.5, -0.25, 0.0, 1.0]);
    assert_eq!(peak, 1.0);

    assert_eq!(host.factory(PluginType::Ladspa).live_instances(), 1);
    drop(instance);
    assert_eq!(host.factory(PluginType::Ladspa).live_instances(), 0);
    assert_eq!(plugins.loader.open_handles(&path), 0);
}

#[tokio::test]
async fn test_unstartable_checker_still_lists_plugins() {
    let plugins = TestPlugins::new();
    plugins.install_standard_set();

    let mut config = plugins.config(false);
    config.helpers = vec![HelperConfig {
        tag: "64".to_string(),
        executable: plugins.vamp_dir.path().join("no-such-checker"),
    }];
    config.helper_timeout_seconds = 1;
    let host = PluginHost::new(&config, plugins.loader.clone(), Arc::new(|_| None));

    let report = host.scan().await;

    assert!(!report.succeeded);
    assert_eq!(host.state(PluginType::Ladspa).await, ScanState::Scanned { count: 2 });
    assert_eq!(host.identifiers(PluginType::Vamp).await.len(), 3);
    let text = host.failure_report().await.expect("failure report");
    assert!(text.starts_with("Failed to scan for plugins"));
}

#[tokio::test]
async fn test_vamp_parameters_follow_descriptor_defaults() {
    let plugins = TestPlugins::new();
    plugins.install(plugins.vamp_dir.path(), "onsets.so", annot_plugin::mock::MockFixture::VampOnsets);
    let host = plugins.host();
    host.scan().await;

    let id = host
        .identifiers(PluginType::Vamp)
        .await
        .into_iter()
        .find(|i| i.label() == "onsetdetector")
        .expect("onset detector");
    let record = host.descriptor(&id).await.expect("record");
    let sensitivity = &record.ports[0];
    assert_eq!(sensitivity.default_value(44100.0), 50.0);

    let mut instance = host.instantiate(&id, 44100.0).expect("instantiate");
    assert_eq!(instance.parameter(0).expect("get"), 50.0);
    instance.set_parameter(0, 80.0).expect("set");
    assert_eq!(instance.parameter(0).expect("get"), 80.0);
    assert!(instance.initialise(1, 512, 1024).expect("initialise"));
    instance.release();
}
