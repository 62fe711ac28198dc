//! Throughput benchmarks for Firefly API.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use firefly_api::request::{PayloadBuilder, multipart_form};
use firefly_api::{ImageFormat, ImageOptions, ImageStyle, OptionCatalog};

const ENGINE: &str = "clio-playground-web";

fn catalog(size: usize) -> OptionCatalog {
    let styles = (0..size)
        .map(|i| ImageStyle {
            id: format!("style-{i}"),
            title: format!("Style {i}"),
            group: format!("Group {}", i % 8),
            style_prompt: format!("style prompt {i}"),
            anchor_prompt: format!("anchor {i}"),
        })
        .collect();
    OptionCatalog::new(styles, Vec::new(), Vec::new())
}

fn benchmark_catalog_lookup(c: &mut Criterion) {
    let catalog = catalog(300);
    let names = ["Style 10", "style-150", "Style 299"];

    let mut group = c.benchmark_group("catalog");
    group.throughput(Throughput::Elements(names.len() as u64));

    group.bench_function("resolve_styles", |b| {
        b.iter(|| catalog.resolve_styles(black_box(&names)).unwrap());
    });

    group.finish();
}

fn benchmark_payload(c: &mut Criterion) {
    let catalog = catalog(300);
    let styles = catalog.resolve_styles(&["Style 1", "Style 2"]).unwrap();
    let options = ImageOptions::new().with_styles(["Style 1", "Style 2"]);
    let builder = PayloadBuilder::new(ENGINE, "en-US");

    let mut group = c.benchmark_group("payload");
    group.throughput(Throughput::Elements(1));

    group.bench_function("text_to_image_envelope", |b| {
        b.iter(|| builder.text_to_image(black_box("flying pigs over a city"), &styles, &options, 42));
    });

    group.bench_function("multipart_form", |b| {
        let envelope = builder.text_to_image("flying pigs over a city", &styles, &options, 42);
        b.iter(|| multipart_form(black_box(&envelope), None).unwrap());
    });

    group.finish();
}

fn benchmark_format_detection(c: &mut Criterion) {
    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0];
    jpeg.resize(256 * 1024, 0);
    let riff = b"RIFF\x00\x00\x00\x00WEBPVP8 ".to_vec();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("detect_magic", |b| {
        b.iter(|| ImageFormat::detect(black_box(&jpeg), None));
    });

    group.bench_function("detect_content_type", |b| {
        b.iter(|| ImageFormat::detect(black_box(&riff[..4]), Some("image/webp")));
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_catalog_lookup,
    benchmark_payload,
    benchmark_format_detection
);
criterion_main!(benches);
