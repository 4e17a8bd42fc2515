//! End-to-end tests for the line pipeline.
//!
//! Tests:
//! - File input is batched into JSON lines in order
//! - A slow handler still receives every unit exactly once
//! - A zero queue limit still reads the whole input
//! - Shutdown stops reading and drains what was read

mod common;

use std::time::Duration;

use clap::Parser;
use common::TestFixture;
use flowsink::config::Config;
use flowsink::pipeline::run_pipeline;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

fn config(args: &[&str]) -> Config {
    let mut argv = vec!["flowsink"];
    argv.extend_from_slice(args);
    Config::try_parse_from(argv).expect("valid arguments")
}

fn units(record: &serde_json::Value) -> Vec<String> {
    record["units"]
        .as_array()
        .expect("units array")
        .iter()
        .map(|u| u.as_str().expect("string unit").to_string())
        .collect()
}

#[tokio::test]
async fn test_pipeline_batches_file_input() {
    let fixture = TestFixture::new();
    let lines: Vec<String> = (0..7).map(|i| format!("event-{i}")).collect();
    fixture.write_input(&lines);

    let config = config(&["--buffer-size", "3", "--queue-limit", "1"]);
    let input = tokio::fs::File::open(&fixture.input_path).await.unwrap();
    let output = tokio::fs::File::create(&fixture.output_path).await.unwrap();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let report = run_pipeline(&config, input, output, shutdown_rx).await.unwrap();
    assert_eq!(report.batches_dispatched, 3);
    assert_eq!(report.units_dispatched, 7);

    let records = fixture.read_output();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["seq"], 0);
    assert_eq!(records[0]["kind"], "full");
    assert_eq!(units(&records[0]), vec!["event-0", "event-1", "event-2"]);
    assert_eq!(records[2]["seq"], 2);
    assert_eq!(records[2]["kind"], "final");
    assert_eq!(units(&records[2]), vec!["event-6"]);
}

#[tokio::test]
async fn test_pipeline_slow_handler_keeps_order() {
    let fixture = TestFixture::new();
    let lines: Vec<String> = (0..40).map(|i| i.to_string()).collect();
    fixture.write_input(&lines);

    let config = config(&[
        "--buffer-size",
        "2",
        "--queue-limit",
        "1",
        "--handler-delay-ms",
        "3",
    ]);
    let input = tokio::fs::File::open(&fixture.input_path).await.unwrap();
    let output = tokio::fs::File::create(&fixture.output_path).await.unwrap();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        run_pipeline(&config, input, output, shutdown_rx),
    )
    .await
    .expect("pipeline stalled")
    .unwrap();
    assert_eq!(report.batches_dispatched, 20);

    let written: Vec<String> = fixture.read_output().iter().flat_map(units).collect();
    assert_eq!(written, lines);
}

#[tokio::test]
async fn test_pipeline_zero_queue_limit_completes() {
    let fixture = TestFixture::new();
    // Well past the 8 KiB read buffer, so the producer must wait on the gate.
    let lines: Vec<String> = (0..5000).map(|i| format!("unit-{i:06}")).collect();
    fixture.write_input(&lines);

    let config = config(&["--buffer-size", "2", "--queue-limit", "0"]);
    let input = tokio::fs::File::open(&fixture.input_path).await.unwrap();
    let output = tokio::fs::File::create(&fixture.output_path).await.unwrap();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let report = tokio::time::timeout(
        Duration::from_secs(20),
        run_pipeline(&config, input, output, shutdown_rx),
    )
    .await
    .expect("pipeline stalled with queue limit 0")
    .unwrap();
    assert_eq!(report.batches_dispatched, 2500);
    assert_eq!(report.units_dispatched, 5000);

    let written: Vec<String> = fixture.read_output().iter().flat_map(units).collect();
    assert_eq!(written, lines);
}

#[tokio::test]
async fn test_pipeline_shutdown_drains_read_units() {
    let fixture = TestFixture::new();
    let (mut writer, reader) = tokio::io::duplex(1024);
    writer.write_all(b"a\nb\nc\nd\n").await.unwrap();

    let config = config(&["--buffer-size", "3", "--queue-limit", "2"]);
    let output = tokio::fs::File::create(&fixture.output_path).await.unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pipeline = tokio::spawn(async move { run_pipeline(&config, reader, output, shutdown_rx).await });

    // The input stays open; only the shutdown signal ends reading.
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(2), pipeline)
        .await
        .expect("pipeline did not stop")
        .unwrap()
        .unwrap();
    assert_eq!(report.units_dispatched, 4);

    let records = fixture.read_output();
    assert_eq!(units(&records[0]), vec!["a", "b", "c"]);
    assert_eq!(units(&records[1]), vec!["d"]);
    assert_eq!(records[1]["kind"], "final");
    drop(writer);
}
