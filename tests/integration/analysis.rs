//! A plugin-configured producer filling a dense cache while a reader
//! follows its notifications.

use std::sync::Arc;

use annot_cache::{CacheEventKind, CompressedDenseCache};
use annot_core::config::cache::CacheConfig;
use annot_plugin::PluginType;
use annot_plugin::mock::MockFixture;
use tokio::sync::broadcast::error::TryRecvError;

use crate::helpers::TestPlugins;

fn bins(column: usize) -> Vec<f32> {
    // Low bins stay put, the top bin moves: every column after the first
    // shares a long leading run with its neighbour.
    let mut values = vec![0.0, 1.0, 2.0, 2.5, 3.0, 3.0, 3.0, 0.0];
    values[7] = (column % 4) as f32;
    values
}

#[tokio::test]
async fn test_bulk_fill_sized_by_plugin_step() {
    let plugins = TestPlugins::new();
    plugins.install(plugins.vamp_dir.path(), "onsets.so", MockFixture::VampOnsets);
    let host = plugins.host();
    host.scan().await;

    let id = host
        .identifiers(PluginType::Vamp)
        .await
        .into_iter()
        .find(|i| i.label() == "onsetdetector")
        .expect("onset detector");
    let instance = host.instantiate(&id, 48000.0).expect("instantiate");
    let step = instance.preferred_step_size().expect("step size");
    instance.release();
    assert_eq!(step, 512);

    let cache = Arc::new(CompressedDenseCache::new(48000.0, step as u32, 8, false));
    let mut events = cache.subscribe();

    let writer = Arc::clone(&cache);
    tokio::task::spawn_blocking(move || {
        writer.set_completion(0, false);
        for column in 0..20 {
            writer.set_column(column, &bins(column));
        }
        writer.set_completion(50, true);
        writer.set_completion(100, false);
    })
    .await
    .expect("producer");

    let mut kinds = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => {
                assert_eq!(event.cache, cache.id());
                kinds.push(event.kind);
            }
            Err(TryRecvError::Empty) => break,
            Err(e) => panic!("unexpected receive error: {e}"),
        }
    }

    assert_eq!(
        kinds,
        vec![
            CacheEventKind::CompletionChanged,
            CacheEventKind::Changed,
            CacheEventKind::ChangedWithin { start: 512, end: 20 * 512 },
            CacheEventKind::Changed,
            CacheEventKind::Ready,
        ]
    );

    assert!(cache.is_ready());
    assert_eq!(cache.width(), 20);
    assert_eq!(cache.true_end_frame(), 512 * 20 + 511);
    for column in 0..20 {
        assert_eq!(cache.column(column), bins(column));
    }
    assert!(cache.stored_value_count() < 20 * 8);
    assert_eq!(cache.minimum_level(), 0.0);
    assert_eq!(cache.maximum_level(), 3.0);
}

#[tokio::test]
async fn test_concurrent_reader_sees_whole_columns() {
    let config = CacheConfig::default();
    let cache = Arc::new(CompressedDenseCache::from_config(&config, 44100.0, 8, true));
    assert_eq!(cache.resolution(), config.default_resolution);

    let writer = Arc::clone(&cache);
    let producer = tokio::task::spawn_blocking(move || {
        for column in 0..500 {
            writer.set_column(column, &bins(column));
        }
    });

    let reader = Arc::clone(&cache);
    let consumer = tokio::task::spawn_blocking(move || {
        for _ in 0..200 {
            let width = reader.width();
            for column in 0..width {
                assert_eq!(reader.column(column), bins(column));
            }
        }
    });

    producer.await.expect("producer");
    consumer.await.expect("consumer");
    assert_eq!(cache.width(), 500);
}

#[tokio::test]
async fn test_filled_cache_exports() {
    let cache = CompressedDenseCache::new(8000.0, 256, 8, true);
    for column in 0..4 {
        cache.set_column(column, &bins(column));
    }
    cache.set_bin_names((1..=8).map(|n| format!("Band {n}")).collect());

    let rows = cache.string_export_rows(256, 512);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].last().map(String::as_str), Some("1"));

    let mut xml = Vec::new();
    cache.to_xml(&mut xml, "", "").expect("xml");
    let xml = String::from_utf8(xml).expect("utf8");
    assert!(xml.contains("windowSize=\"256\" yBinCount=\"8\""));
    assert!(xml.contains("<bin number=\"7\" name=\"Band 8\"/>"));
    assert!(xml.contains("<row n=\"3\">0 1 2 2.5 3 3 3 3</row>"));
}
