//! Benchmarks for stage dispatch.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use polyphon::capabilities::LabelAnnotation;
use polyphon::contracts::{LabelsMessage, MessageContract};
use polyphon::core::{Envelope, Event};
use polyphon::stages::describe_labels;
use polyphon::testing::PipelineFixture;

fn labels_message() -> LabelsMessage {
    LabelsMessage {
        text: "cat, dog, ".to_string(),
        filename: "photo.jpg".to_string(),
        lang: "en".to_string(),
        src_lang: "en".to_string(),
    }
}

fn codec_benchmark(c: &mut Criterion) {
    let message = labels_message().into_message();
    let contract: MessageContract = LabelsMessage::CONTRACT;

    c.bench_function("contract_validate", |b| {
        b.iter(|| black_box(contract.validate(black_box(&message)).is_ok()));
    });

    c.bench_function("envelope_wrap_decode", |b| {
        b.iter(|| {
            let envelope = Envelope::wrap(black_box(&message)).ok();
            black_box(envelope.and_then(|e| e.decode().ok()))
        });
    });

    let annotations: Vec<LabelAnnotation> =
        ["cat", "dog", "whiskers", "mammal"].into_iter().map(LabelAnnotation::new).collect();
    c.bench_function("describe_labels", |b| {
        b.iter(|| black_box(describe_labels(black_box(&annotations), "did not see anything, sorry")));
    });
}

fn dispatch_benchmark(c: &mut Criterion) {
    let Ok(rt) = tokio::runtime::Runtime::new() else {
        return;
    };
    let Ok(fixture) = PipelineFixture::builder().build() else {
        return;
    };
    let event = Event::bus_message("labels-topic", labels_message().into_message());

    c.bench_function("dispatch_translate_passthrough", |b| {
        b.iter(|| rt.block_on(fixture.dispatcher.dispatch(black_box(&event))));
    });
}

criterion_group!(benches, codec_benchmark, dispatch_benchmark);
criterion_main!(benches);
