use asmsplice::compiler::{BinaryPatcher, BlockExtractor};
use asmsplice::{strip_comments, TemplateExpander};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn kernel_source(blocks: usize) -> String {
    (0..blocks)
        .map(|i| {
            format!(
                "// block {i}\n__kernel void k{i}(__global float* a) {{ a[0] = {i}.0f; }}\n\
                 __asm4GCN f{i} (float* a, uint n)\n{{\n  v_mov_b32 v0, {i} /* seed */\n  s_endpgm\n}};\n"
            )
        })
        .collect()
}

fn template_benchmark(c: &mut Criterion) {
    let source = "[[ for (int r = 0; r < 64; r++) { ]]v_mov_b32 v[[=r]], 0\n[[ } ]]";

    c.bench_function("expand 64-line unroll", |b| {
        b.iter(|| TemplateExpander::new().expand(black_box(source)).unwrap())
    });
}

fn strip_benchmark(c: &mut Criterion) {
    let source = kernel_source(100);

    c.bench_function("strip comments 100 blocks", |b| {
        b.iter(|| strip_comments(black_box(&source)))
    });
}

fn extract_benchmark(c: &mut Criterion) {
    let source = strip_comments(&kernel_source(100));
    let extractor = BlockExtractor::default();

    c.bench_function("extract 100 blocks", |b| {
        b.iter(|| extractor.extract(black_box(&source)).unwrap())
    });
}

fn patch_benchmark(c: &mut Criterion) {
    let anchor = [0xFF, 0x02, 0x00, 0x7E, 0x19, 0x2B, 0x3A, 0x4C, 0xFF, 0x02];
    let mut binary = Vec::new();
    for _ in 0..32 {
        binary.extend_from_slice(&[0u8; 240]);
        binary.extend_from_slice(&anchor);
    }
    let source = strip_comments(&kernel_source(32));
    let mut blocks = BlockExtractor::default().extract(&source).unwrap().blocks;
    for block in &mut blocks {
        block.machine_code = vec![0xBF; 64];
    }
    let patcher = BinaryPatcher::default();

    c.bench_function("patch 32 blocks", |b| {
        b.iter(|| patcher.patch(black_box(&binary), black_box(&blocks)))
    });
}

criterion_group!(
    benches,
    template_benchmark,
    strip_benchmark,
    extract_benchmark,
    patch_benchmark
);
criterion_main!(benches);
