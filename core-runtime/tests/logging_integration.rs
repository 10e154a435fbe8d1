//! Integration tests for logging system

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, strip_path, LogFormat, LoggingConfig};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CollectingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CollectingSink {
    async fn log(&self, entry: LogEntry) -> BridgeResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

#[test]
fn test_global_init_forwards_to_sink_and_rejects_second_init() {
    // The global subscriber can only be installed once per process
    let sink = Arc::new(CollectingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_filter("logging_integration=debug")
        .with_logger_sink(sink.clone());

    init_logging(config).unwrap();

    tracing::info!(job_id = "job-7", remaining = 2u64, "Task finished");
    tracing::debug!("below sink level");

    let entries = sink.entries.lock().unwrap().clone();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "Task finished");
    assert_eq!(entries[0].fields.get("job_id"), Some(&"job-7".to_string()));
    assert_eq!(entries[0].fields.get("remaining"), Some(&"2".to_string()));

    let second = init_logging(LoggingConfig::default());
    assert!(second.is_err());
}

#[test]
fn test_invalid_filter_is_config_error() {
    let config = LoggingConfig::default().with_filter("core_sync=[");
    // Filter parsing fails before the global subscriber is touched
    let err = init_logging(config).unwrap_err();
    assert!(err.to_string().contains("Invalid log filter"));
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/srv/photos/2024/IMG_0001.jpg"), "IMG_0001.jpg");
    assert_eq!(strip_path("2024/summer/clip.mov"), "clip.mov");
    assert_eq!(strip_path("C:\\Photos\\2024\\a.heic"), "a.heic");
    assert_eq!(strip_path("a.png"), "a.png");
    assert_eq!(strip_path("2024/"), "");
    assert_eq!(strip_path(""), "");
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}
