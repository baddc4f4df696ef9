use criterion::{Criterion, criterion_group, criterion_main};
use readmark_engine::{RenderedDocument, SpanRenderer, SpanStore, TextPositionIndex};

fn generate_markdown_content(size: usize) -> String {
    let base = "# Title\n\n## Section\n\nParagraph with *some* content and `code`.\n\n- Bullet point\n  - Nested item\n- Another item\n\n";
    base.repeat(size)
}

fn bench_index_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");
    group.sample_size(10);

    let doc = RenderedDocument::from_markdown(&generate_markdown_content(100));
    let len = doc.len();

    group.bench_function("build", |b| {
        b.iter(|| TextPositionIndex::build(std::hint::black_box(&doc)));
    });

    let index = TextPositionIndex::build(&doc);
    group.bench_function("locate", |b| {
        b.iter(|| {
            for offset in (0..len).step_by(97) {
                std::hint::black_box(index.locate(offset).ok());
            }
        });
    });

    group.finish();
}

fn bench_redraw(c: &mut Criterion) {
    let mut group = c.benchmark_group("redraw");
    group.sample_size(10);

    let mut doc = RenderedDocument::from_markdown(&generate_markdown_content(50));
    let mut store = SpanStore::new();
    let step = 40;
    for start in (0..doc.len().saturating_sub(step)).step_by(step) {
        let _ = store.add(start, start + step / 2, "");
    }
    let renderer = SpanRenderer::new();

    group.bench_function("redraw", |b| {
        b.iter(|| {
            renderer.redraw(&mut doc, store.list());
            std::hint::black_box(&doc);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_index_operations, bench_redraw);
criterion_main!(benches);
