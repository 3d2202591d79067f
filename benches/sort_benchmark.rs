use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use flowsort::record::{FlowRec, RecordWriter, FLOW_REC_SIZE};
use flowsort::sort::{
    compare_nodes, parse_fields, sort_and_output, SortConfig, SortPlan,
};

fn make_record(seed: u64) -> FlowRec {
    let mut x = seed.wrapping_mul(0x9e3779b97f4a7c15).wrapping_add(1);
    x ^= x >> 31;
    FlowRec {
        sport: (x % 60000) as u16,
        dport: ((x >> 16) % 60000) as u16,
        proto: if x % 10 < 7 { 6 } else { 17 },
        pkts: (x % 10_000) as u32,
        bytes: (x % 1_000_000) as u32,
        stime_ms: 1_600_000_000_000 + (x % 86_400_000),
        elapsed_ms: (x % 300_000) as u32,
        ..FlowRec::default()
    }
}

fn write_input(path: &std::path::Path, count: usize) {
    let file = std::fs::File::create(path).unwrap();
    let mut w = RecordWriter::new(std::io::BufWriter::new(file));
    for i in 0..count {
        w.write_record(&make_record(i as u64)).unwrap();
    }
    w.flush().unwrap();
}

fn bench_compare(c: &mut Criterion) {
    let plan = SortPlan::new(&parse_fields("sip,dport,stime").unwrap(), false).unwrap();
    let a = make_record(1).to_bytes();
    let b = make_record(2).to_bytes();
    c.bench_function("compare_nodes_3field", |bench| {
        bench.iter(|| compare_nodes(black_box(&plan), black_box(&a), black_box(&b)).unwrap())
    });
}

fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort_end_to_end");
    group.sample_size(10);
    for count in [10_000usize, 100_000] {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        write_input(&input, count);
        let inputs = vec![input.to_str().unwrap().to_string()];

        group.bench_with_input(BenchmarkId::new("in_memory", count), &count, |bench, _| {
            bench.iter(|| {
                let config = SortConfig {
                    fields: parse_fields("bytes,stime").unwrap(),
                    output_path: Some(dir.path().join("out")),
                    temp_dir: Some(dir.path().to_path_buf()),
                    ..SortConfig::default()
                };
                sort_and_output(&inputs, &config).unwrap()
            })
        });

        // Starve the buffer so the external path (spill + merge) runs.
        group.bench_with_input(BenchmarkId::new("external", count), &count, |bench, _| {
            bench.iter(|| {
                let config = SortConfig {
                    fields: parse_fields("bytes,stime").unwrap(),
                    sort_buffer_size: (count / 8 * FLOW_REC_SIZE) as u64,
                    output_path: Some(dir.path().join("out")),
                    temp_dir: Some(dir.path().to_path_buf()),
                    ..SortConfig::default()
                };
                sort_and_output(&inputs, &config).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compare, bench_sort);
criterion_main!(benches);
