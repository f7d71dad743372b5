use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sdkpack::archive::{repack_units, RepackOptions};
use sdkpack::index::{IndexEntry, IndexTable, HEADER_SIZE};
use sdkpack::{parse, rebuild, Charset, BLOCK_SIZE};

fn script_unit(lines: usize) -> Vec<u8> {
    let cs = Charset::shift_jis();
    let line = cs.encode("最初から始めるロードするシーン回想").unwrap();
    let mut u = Vec::new();
    for i in 0..lines {
        u.extend_from_slice(&[0x21, (i % 200) as u8 | 1, 0x00]);
        u.extend_from_slice(&line);
        u.push(0);
    }
    u
}

fn bench_scf(c: &mut Criterion) {
    let cs = Charset::shift_jis();
    let unit = script_unit(5_000);
    let container = parse(&unit, &cs);
    let texts: Vec<String> = (0..container.segments.len())
        .map(|i| format!("Baris terjemahan nomor {i}"))
        .collect();

    c.bench_function("scf_parse_5k_lines", |b| b.iter(|| parse(black_box(&unit), &cs)));
    c.bench_function("scf_rebuild_5k_lines", |b| {
        b.iter(|| rebuild(black_box(&container), Some(texts.as_slice()), &cs))
    });
}

fn bench_repack(c: &mut Criterion) {
    let entries: Vec<IndexEntry> = (0..500u32)
        .map(|i| IndexEntry::new(format!("SCN{i:03}"), i * 4, 3 * BLOCK_SIZE as u32))
        .collect();
    let index = IndexTable { header: [0u8; HEADER_SIZE], entries };
    let payload = vec![0x5Au8; 3 * BLOCK_SIZE];

    c.bench_function("repack_500_units", |b| {
        b.iter(|| repack_units(&index, |_| Ok(Some(payload.clone())), &RepackOptions::default()).unwrap())
    });
}

criterion_group!(benches, bench_scf, bench_repack);
criterion_main!(benches);
