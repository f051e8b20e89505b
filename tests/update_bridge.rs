use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use mmv_export::{
    MetricName, MetricValue, MmvVersion, MmvWriter, MmvWriterConfig, Semantics, Unit, UpdateBridge,
};
use tempfile::TempDir;

fn started_writer(dir: &TempDir, queue_depth: usize) -> Arc<MmvWriter> {
    let config = MmvWriterConfig::new(dir.path().join("bridge.mmv"))
        .with_version(MmvVersion::V2)
        .with_update_queue_depth(queue_depth);
    let writer = Arc::new(MmvWriter::new(config));
    writer
        .add_metric(
            &name("events.seen"),
            Semantics::MonotonicallyIncreasing,
            Unit::count(),
            MetricValue::U64(0),
        )
        .expect("add metric");
    writer.start().expect("start");
    writer
}

fn name(raw: &str) -> MetricName {
    MetricName::parse(raw).expect("metric name")
}

fn slot_value(dir: &TempDir) -> u64 {
    let bytes = std::fs::read(dir.path().join("bridge.mmv")).expect("read region");
    let toc_count = BigEndian::read_i32(&bytes[24..28]) as usize;
    for index in 0..toc_count {
        let base = 40 + index * 16;
        if BigEndian::read_u32(&bytes[base..base + 4]) == 4 {
            let offset = BigEndian::read_u64(&bytes[base + 8..base + 16]) as usize;
            return BigEndian::read_u64(&bytes[offset..offset + 8]);
        }
    }
    panic!("value section missing");
}

#[test]
fn published_updates_reach_the_region() {
    let dir = tempfile::tempdir().expect("tempdir");
    let writer = started_writer(&dir, 64);
    let bridge = UpdateBridge::new(Arc::clone(&writer)).expect("bridge");

    // fewer updates than the queue holds: none can be dropped even if the
    // consumer stalls completely
    for step in 1..=50u64 {
        bridge.publish(name("events.seen"), MetricValue::U64(step));
    }
    assert_eq!(bridge.dropped_updates(), 0);
    // dropping joins the consumer, so everything queued has been applied
    drop(bridge);

    assert_eq!(slot_value(&dir), 50);
}

#[test]
fn a_full_queue_drops_the_newest_update_without_blocking() {
    let dir = tempfile::tempdir().expect("tempdir");
    let writer = started_writer(&dir, 1);
    let bridge = UpdateBridge::new(Arc::clone(&writer)).expect("bridge");

    // far more updates than a depth-1 queue can hold; publish must never
    // block even while the consumer lags
    for step in 1..=50_000u64 {
        bridge.publish(name("events.seen"), MetricValue::U64(step));
    }
    let dropped = bridge.dropped_updates();
    drop(bridge);

    let value = slot_value(&dir);
    assert!(value >= 1);
    assert!(value <= 50_000);
    // accounting: everything was either applied or counted as dropped
    assert!(dropped <= 50_000);
}

#[test]
fn failed_updates_never_reach_the_producer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let writer = started_writer(&dir, 16);
    let bridge = UpdateBridge::new(Arc::clone(&writer)).expect("bridge");

    // unknown metric and mismatched type: both are swallowed by the bridge
    bridge.publish(name("no.such.metric"), MetricValue::U64(1));
    bridge.publish(name("events.seen"), MetricValue::I32(1));
    bridge.publish(name("events.seen"), MetricValue::U64(5));
    drop(bridge);

    assert_eq!(slot_value(&dir), 5);
}
