//! Tracing layer producing JSONL on stderr.
//!
//! Correlation keys (`run_id`, `host_id`, `machine_id`, `stage`) are lifted
//! to the top level of each line whether they were recorded on the event or
//! on an enclosing span. Everything else lands under `fields`.

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::events::Level;

const CORRELATION_KEYS: [&str; 4] = ["run_id", "host_id", "machine_id", "stage"];

/// Field values recorded on a span or event.
#[derive(Debug, Default)]
struct FieldVisitor {
    fields: Map<String, Value>,
    message: Option<String>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let s = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(s);
        } else {
            self.insert(field, Value::String(s));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.insert(field, Value::Number(n));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }
}

/// Correlation keys captured from a span's attributes.
#[derive(Debug, Clone, Default)]
struct SpanCorrelation(Map<String, Value>);

/// JSONL tracing layer.
pub struct JsonlLayer<W = io::Stderr> {
    writer: Mutex<W>,
}

impl JsonlLayer<io::Stderr> {
    pub fn stderr() -> Self {
        JsonlLayer::new(io::stderr())
    }
}

impl<W: Write> JsonlLayer<W> {
    pub fn new(writer: W) -> Self {
        JsonlLayer {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonlLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);

        let mut correlation = SpanCorrelation::default();
        for key in CORRELATION_KEYS {
            if let Some(value) = visitor.fields.remove(key) {
                correlation.0.insert(key.to_string(), value);
            }
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(correlation);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let level: Level = (*event.metadata().level()).into();
        let mut obj = Map::new();
        obj.insert("ts".to_string(), Value::String(Utc::now().to_rfc3339()));
        obj.insert("level".to_string(), serde_json::json!(level));
        obj.insert(
            "event".to_string(),
            Value::String(event.metadata().target().to_string()),
        );

        for key in CORRELATION_KEYS {
            if let Some(value) = visitor.fields.remove(key) {
                obj.insert(key.to_string(), value);
            }
        }

        // Innermost span wins for keys the event did not carry.
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(correlation) = span.extensions().get::<SpanCorrelation>() {
                    for (key, value) in &correlation.0 {
                        obj.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                }
            }
        }

        if let Some(msg) = visitor.message {
            obj.insert("message".to_string(), Value::String(msg));
        }
        if !visitor.fields.is_empty() {
            obj.insert("fields".to_string(), Value::Object(visitor.fields));
        }

        let json = serde_json::to_string(&Value::Object(obj)).unwrap_or_default();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> Vec<Value> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = JsonlLayer::new(SharedBuf(buffer.clone()));
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);

        let output = buffer.lock().unwrap();
        String::from_utf8_lossy(&output)
            .lines()
            .map(|line| serde_json::from_str(line).expect("valid json line"))
            .collect()
    }

    #[test]
    fn test_event_shape() {
        let lines = capture(|| {
            tracing::warn!(target: "log.rotation_failed", path = "/logs", message = "open failed");
        });
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["level"], "warn");
        assert_eq!(line["event"], "log.rotation_failed");
        assert_eq!(line["message"], "open failed");
        assert_eq!(line["fields"]["path"], "/logs");
        assert!(line["ts"].is_string());
    }

    #[test]
    fn test_correlation_keys_lifted_from_event() {
        let lines = capture(|| {
            tracing::info!(
                target: "capture.started",
                run_id = "run-1",
                host_id = "host-2",
                stage = "capture",
                tick = 5u64,
                message = "capture session opened"
            );
        });
        let line = &lines[0];
        assert_eq!(line["run_id"], "run-1");
        assert_eq!(line["host_id"], "host-2");
        assert_eq!(line["stage"], "capture");
        assert_eq!(line["fields"]["tick"], 5);
        assert!(line["fields"].get("run_id").is_none());
    }

    #[test]
    fn test_correlation_keys_inherited_from_span() {
        let lines = capture(|| {
            let span = tracing::info_span!("collector", run_id = "run-span", machine_id = "press-1");
            let _guard = span.enter();
            tracing::info!(target: "loop.started", message = "started");
        });
        let line = &lines[0];
        assert_eq!(line["run_id"], "run-span");
        assert_eq!(line["machine_id"], "press-1");
        assert!(line.get("fields").is_none());
    }

    #[test]
    fn test_numeric_and_bool_fields() {
        let lines = capture(|| {
            tracing::info!(target: "t", ratio = 0.5f64, active = true, count = -3i64);
        });
        let fields = &lines[0]["fields"];
        assert_eq!(fields["ratio"], 0.5);
        assert_eq!(fields["active"], true);
        assert_eq!(fields["count"], -3);
    }
}
