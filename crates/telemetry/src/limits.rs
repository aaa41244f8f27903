//! Attribute value length limits for spans and log records.
//!
//! The SDK has no knob for attribute value length, so the limit is applied by
//! wrappers around the batching processors. String values (and string array
//! elements) longer than the limit are cut to `max_len` characters; everything
//! else passes through untouched.

use opentelemetry::logs::{AnyValue, LogResult, Severity};
use opentelemetry::trace::TraceResult;
use opentelemetry::{Array, Context, KeyValue, StringValue, Value};
use opentelemetry_sdk::export::logs::LogData;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::logs::LogProcessor;
use opentelemetry_sdk::trace::{Span, SpanProcessor};
use opentelemetry_sdk::Resource;

/// Wraps a [`SpanProcessor`], truncating span, event, and link attributes on
/// end.
#[derive(Debug)]
pub struct AttributeLimitSpanProcessor<P> {
    inner: P,
    max_len: usize,
}

impl<P> AttributeLimitSpanProcessor<P> {
    pub fn new(inner: P, max_len: usize) -> Self {
        Self { inner, max_len }
    }
}

impl<P: SpanProcessor> SpanProcessor for AttributeLimitSpanProcessor<P> {
    fn on_start(&self, span: &mut Span, cx: &Context) {
        self.inner.on_start(span, cx);
    }

    fn on_end(&self, mut span: SpanData) {
        truncate_key_values(&mut span.attributes, self.max_len);
        for event in span.events.events.iter_mut() {
            truncate_key_values(&mut event.attributes, self.max_len);
        }
        for link in span.links.links.iter_mut() {
            truncate_key_values(&mut link.attributes, self.max_len);
        }
        self.inner.on_end(span);
    }

    fn force_flush(&self) -> TraceResult<()> {
        self.inner.force_flush()
    }

    fn shutdown(&mut self) -> TraceResult<()> {
        self.inner.shutdown()
    }
}

/// Wraps a [`LogProcessor`], truncating record attributes and a string body
/// before forwarding.
#[derive(Debug)]
pub struct AttributeLimitLogProcessor<P> {
    inner: P,
    max_len: usize,
}

impl<P> AttributeLimitLogProcessor<P> {
    pub fn new(inner: P, max_len: usize) -> Self {
        Self { inner, max_len }
    }
}

impl<P: LogProcessor> LogProcessor for AttributeLimitLogProcessor<P> {
    fn emit(&self, mut data: LogData) {
        if let Some(attributes) = data.record.attributes.as_mut() {
            for (_, value) in attributes.iter_mut() {
                truncate_any_value(value, self.max_len);
            }
        }
        if let Some(body) = data.record.body.as_mut() {
            truncate_any_value(body, self.max_len);
        }
        self.inner.emit(data);
    }

    fn force_flush(&self) -> LogResult<()> {
        self.inner.force_flush()
    }

    fn shutdown(&self) -> LogResult<()> {
        self.inner.shutdown()
    }

    fn event_enabled(&self, level: Severity, target: &str, name: &str) -> bool {
        self.inner.event_enabled(level, target, name)
    }

    // The batch processor hands the resource to its exporter here.
    fn set_resource(&self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}

/// Truncate every string value in `attributes` to `max_len` characters.
pub fn truncate_key_values(attributes: &mut [KeyValue], max_len: usize) {
    for kv in attributes.iter_mut() {
        truncate_value(&mut kv.value, max_len);
    }
}

fn truncate_value(value: &mut Value, max_len: usize) {
    match value {
        Value::String(s) => truncate_string(s, max_len),
        Value::Array(Array::String(items)) => {
            for s in items.iter_mut() {
                truncate_string(s, max_len);
            }
        }
        _ => {}
    }
}

fn truncate_any_value(value: &mut AnyValue, max_len: usize) {
    match value {
        AnyValue::String(s) => truncate_string(s, max_len),
        AnyValue::ListAny(items) => {
            for item in items.iter_mut() {
                truncate_any_value(item, max_len);
            }
        }
        AnyValue::Map(map) => {
            for item in map.values_mut() {
                truncate_any_value(item, max_len);
            }
        }
        _ => {}
    }
}

fn truncate_string(s: &mut StringValue, max_len: usize) {
    if let Some(cut) = char_boundary(s.as_str(), max_len) {
        let shortened = s.as_str()[..cut].to_owned();
        *s = StringValue::from(shortened);
    }
}

/// Byte offset of the `max_len`-th char, if the string is longer than that.
fn char_boundary(s: &str, max_len: usize) -> Option<usize> {
    s.char_indices().nth(max_len).map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_ATTRIBUTE_VALUE_LENGTH;
    use crate::testing::{CapturingLogProcessor, CapturingSpanProcessor};
    use opentelemetry::logs::{Logger as _, LoggerProvider as _};
    use opentelemetry::trace::{
        Link, Span as _, SpanBuilder, SpanContext, SpanId, TraceFlags, TraceId, TraceState,
        Tracer as _, TracerProvider as _,
    };
    use opentelemetry::Key;
    use opentelemetry_sdk::logs::LoggerProvider;
    use opentelemetry_sdk::trace::TracerProvider;

    fn value_len(key: &Key, attributes: &[KeyValue]) -> Option<usize> {
        attributes
            .iter()
            .find(|kv| &kv.key == key)
            .map(|kv| kv.value.as_str().chars().count())
    }

    fn text(s: &'static str) -> AnyValue {
        AnyValue::String(s.into())
    }

    fn any_len(value: &AnyValue) -> usize {
        match value {
            AnyValue::String(s) => s.as_str().chars().count(),
            other => panic!("expected a string, got {other:?}"),
        }
    }

    #[test]
    fn long_strings_are_cut_to_limit() {
        let mut attrs = vec![
            KeyValue::new("long", "a".repeat(MAX_ATTRIBUTE_VALUE_LENGTH + 10)),
            KeyValue::new("exact", "b".repeat(MAX_ATTRIBUTE_VALUE_LENGTH)),
            KeyValue::new("short", "c"),
            KeyValue::new("number", 42_i64),
        ];
        truncate_key_values(&mut attrs, MAX_ATTRIBUTE_VALUE_LENGTH);

        assert_eq!(value_len(&Key::new("long"), &attrs), Some(4095));
        assert_eq!(value_len(&Key::new("exact"), &attrs), Some(4095));
        assert_eq!(attrs[2].value, Value::from("c"));
        assert_eq!(attrs[3].value, Value::I64(42));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut attrs = vec![KeyValue::new("utf8", "é".repeat(6))];
        truncate_key_values(&mut attrs, 4);
        assert_eq!(attrs[0].value.as_str(), "éééé");
    }

    #[test]
    fn string_array_elements_are_cut() {
        let mut attrs = vec![KeyValue::new(
            "list",
            Value::Array(Array::String(vec!["xxxxxx".into(), "yy".into()])),
        )];
        truncate_key_values(&mut attrs, 3);
        assert_eq!(
            attrs[0].value,
            Value::Array(Array::String(vec!["xxx".into(), "yy".into()]))
        );
    }

    #[test]
    fn span_attributes_are_truncated_before_export() {
        let captured = CapturingSpanProcessor::default();
        let provider = TracerProvider::builder()
            .with_span_processor(AttributeLimitSpanProcessor::new(
                captured.clone(),
                MAX_ATTRIBUTE_VALUE_LENGTH,
            ))
            .build();

        let mut span = provider.tracer("limits-test").start("op");
        span.set_attribute(KeyValue::new("db.statement", "s".repeat(5000)));
        span.add_event("query", vec![KeyValue::new("sql", "q".repeat(5000))]);
        span.end();

        let spans = captured.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(
            value_len(&Key::new("db.statement"), &spans[0].attributes),
            Some(4095)
        );
        assert_eq!(
            value_len(&Key::new("sql"), &spans[0].events.events[0].attributes),
            Some(4095)
        );
    }

    #[test]
    fn link_attributes_are_truncated_before_export() {
        let captured = CapturingSpanProcessor::default();
        let provider = TracerProvider::builder()
            .with_span_processor(AttributeLimitSpanProcessor::new(
                captured.clone(),
                MAX_ATTRIBUTE_VALUE_LENGTH,
            ))
            .build();

        let linked = SpanContext::new(
            TraceId::from(0x0af7651916cd43dd8448eb211c80319c_u128),
            SpanId::from(0xb7ad6b7169203331_u64),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        let link = Link::new(
            linked,
            vec![KeyValue::new("messaging.payload", "m".repeat(5000))],
            0,
        );
        let tracer = provider.tracer("limits-test");
        let mut span =
            tracer.build(SpanBuilder::from_name("consume").with_links(vec![link]));
        span.end();

        let spans = captured.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].links.links.len(), 1);
        assert_eq!(
            value_len(
                &Key::new("messaging.payload"),
                &spans[0].links.links[0].attributes
            ),
            Some(4095)
        );
    }

    #[test]
    fn exporting_processor_receives_truncated_logs() {
        let captured = CapturingLogProcessor::default();
        let provider = LoggerProvider::builder()
            .with_log_processor(AttributeLimitLogProcessor::new(
                captured.clone(),
                MAX_ATTRIBUTE_VALUE_LENGTH,
            ))
            .build();
        let logger = provider.logger("limits-test");

        let mut record = logger.create_log_record();
        record.body = Some(AnyValue::String("b".repeat(5000).into()));
        record.attributes = Some(vec![
            (Key::new("payload"), AnyValue::String("p".repeat(5000).into())),
            (Key::new("count"), AnyValue::Int(7)),
            (
                Key::new("tags"),
                AnyValue::ListAny(vec![AnyValue::String("t".repeat(5000).into())]),
            ),
            (Key::new("short"), text("ok")),
        ]);
        logger.emit(record);

        let logs = captured.logs();
        assert_eq!(logs.len(), 1);
        let record = &logs[0].record;
        assert_eq!(record.body.as_ref().map(any_len), Some(4095));
        let attrs = record.attributes.as_ref().unwrap();
        assert_eq!(any_len(&attrs[0].1), 4095);
        assert_eq!(attrs[1].1, AnyValue::Int(7));
        match &attrs[2].1 {
            AnyValue::ListAny(items) => assert_eq!(any_len(&items[0]), 4095),
            other => panic!("expected a list, got {other:?}"),
        }
        assert_eq!(attrs[3].1, text("ok"));
    }

    #[test]
    fn nested_map_values_are_cut() {
        let mut value = AnyValue::Map(
            [(Key::new("inner"), text("abcdefghij"))]
                .into_iter()
                .collect(),
        );
        truncate_any_value(&mut value, 5);
        match value {
            AnyValue::Map(map) => assert_eq!(map[&Key::new("inner")], text("abcde")),
            other => panic!("expected a map, got {other:?}"),
        }
    }
}
