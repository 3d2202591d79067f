use std::cmp::Ordering;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::Arc;

use proptest::prelude::*;

use super::buffer::RunBuffer;
use super::compare::{compare_nodes, NodeComparator};
use super::core::{parse_buffer_size, sort_and_output, SortConfig, SortError};
use super::field::{parse_fields, BuiltinField, FieldSpec, KeyField, KeyFieldError};
use super::merge::{merge_temp_runs, MergeHeap};
use super::plan::SortPlan;
use super::temp::TempFileSet;
use crate::record::{FlowRec, RecView, RecordReader, RecordWriter, FLOW_REC_SIZE};

/// A record fully determined by its key so equal-key groups cannot be
/// told apart and byte-level output comparisons are meaningful.
fn rec_with_bytes(v: u32) -> FlowRec {
    FlowRec {
        bytes: v,
        pkts: v / 2 + 1,
        sport: (v % 60000) as u16,
        stime_ms: 1_000_000 + v as u64,
        ..FlowRec::default()
    }
}

fn write_stream(path: &Path, keys: &[u32]) {
    let file = std::fs::File::create(path).unwrap();
    let mut w = RecordWriter::new(std::io::BufWriter::new(file));
    for &k in keys {
        w.write_record(&rec_with_bytes(k)).unwrap();
    }
    w.write_header().unwrap();
    w.flush().unwrap();
}

fn read_keys(path: &Path) -> Vec<u32> {
    let mut r = RecordReader::open(path.to_str().unwrap()).unwrap();
    let mut keys = Vec::new();
    while let Some(rec) = r.read_record().unwrap() {
        keys.push(rec.bytes);
    }
    keys
}

fn bytes_config() -> SortConfig {
    SortConfig {
        fields: vec![FieldSpec::Builtin(BuiltinField::Bytes)],
        ..SortConfig::default()
    }
}

/// Run one sort over `inputs` and return the output keys.
fn run_sort(dir: &Path, inputs: &[&[u32]], config: SortConfig) -> Vec<u32> {
    let mut paths = Vec::new();
    for (i, keys) in inputs.iter().enumerate() {
        let path = dir.join(format!("in{i}"));
        write_stream(&path, keys);
        paths.push(path.to_str().unwrap().to_string());
    }
    let out_path = dir.join("out");
    let config = SortConfig {
        temp_dir: Some(dir.to_path_buf()),
        output_path: Some(out_path.clone()),
        ..config
    };
    sort_and_output(&paths, &config).unwrap();
    read_keys(&out_path)
}

#[test]
fn test_parse_fields_names_and_aliases() {
    let fields = parse_fields("sip,dport,stime").unwrap();
    assert_eq!(fields.len(), 3);
    assert!(matches!(
        fields[0],
        FieldSpec::Builtin(BuiltinField::Sip)
    ));
    assert!(matches!(
        fields[2],
        FieldSpec::Builtin(BuiltinField::Stime)
    ));

    // numeric aliases follow the original field numbering
    let fields = parse_fields("1,4,9").unwrap();
    assert!(matches!(fields[0], FieldSpec::Builtin(BuiltinField::Sip)));
    assert!(matches!(
        fields[1],
        FieldSpec::Builtin(BuiltinField::Dport)
    ));
    assert!(matches!(
        fields[2],
        FieldSpec::Builtin(BuiltinField::Stime)
    ));

    assert!(parse_fields("sip,bogus").is_err());
    assert!(parse_fields("").is_err());
    assert!(parse_fields("sip,,dip").is_err());
}

#[test]
fn test_plan_node_size_builtin_only() {
    let plan = SortPlan::new(
        &[FieldSpec::Builtin(BuiltinField::Sip)],
        false,
    )
    .unwrap();
    assert_eq!(plan.node_size(), FLOW_REC_SIZE);
}

#[test]
fn test_plan_rejects_empty_fields() {
    assert!(matches!(
        SortPlan::new(&[], false),
        Err(SortError::Config(_))
    ));
}

struct WideKey(usize);

impl KeyField for WideKey {
    fn name(&self) -> &str {
        "wide"
    }
    fn width(&self) -> usize {
        self.0
    }
    fn rec_to_bin(&self, _rec: &[u8], dst: &mut [u8]) -> Result<(), KeyFieldError> {
        dst.fill(0);
        Ok(())
    }
    fn bin_compare(&self, a: &[u8], b: &[u8]) -> Result<Ordering, KeyFieldError> {
        Ok(a.cmp(b))
    }
}

#[test]
fn test_plan_rejects_oversized_node() {
    let specs = vec![
        FieldSpec::Plugin(Arc::new(WideKey(100))),
        FieldSpec::Plugin(Arc::new(WideKey(100))),
    ];
    assert!(matches!(
        SortPlan::new(&specs, false),
        Err(SortError::Config(_))
    ));
}

#[test]
fn test_plan_assigns_plugin_offsets() {
    let specs = vec![
        FieldSpec::Plugin(Arc::new(WideKey(4))),
        FieldSpec::Plugin(Arc::new(WideKey(8))),
    ];
    let plan = SortPlan::new(&specs, false).unwrap();
    assert_eq!(plan.node_size(), FLOW_REC_SIZE + 12);
}

fn node_of(rec: &FlowRec) -> Vec<u8> {
    rec.to_bytes().to_vec()
}

#[test]
fn test_compare_single_field() {
    let plan = SortPlan::new(&[FieldSpec::Builtin(BuiltinField::Bytes)], false).unwrap();
    let a = node_of(&rec_with_bytes(1));
    let b = node_of(&rec_with_bytes(2));
    assert_eq!(compare_nodes(&plan, &a, &b).unwrap(), Ordering::Less);
    assert_eq!(compare_nodes(&plan, &b, &a).unwrap(), Ordering::Greater);
    assert_eq!(compare_nodes(&plan, &a, &a).unwrap(), Ordering::Equal);
}

#[test]
fn test_compare_composite_tiebreak() {
    let plan = SortPlan::new(
        &[
            FieldSpec::Builtin(BuiltinField::Proto),
            FieldSpec::Builtin(BuiltinField::Dport),
        ],
        false,
    )
    .unwrap();
    let mut x = FlowRec::default();
    x.proto = 6;
    x.dport = 80;
    let mut y = FlowRec::default();
    y.proto = 6;
    y.dport = 443;
    // equal first field, second decides
    assert_eq!(
        compare_nodes(&plan, &node_of(&x), &node_of(&y)).unwrap(),
        Ordering::Less
    );
}

#[test]
fn test_compare_reverse() {
    let plan = SortPlan::new(&[FieldSpec::Builtin(BuiltinField::Bytes)], true).unwrap();
    let a = node_of(&rec_with_bytes(1));
    let b = node_of(&rec_with_bytes(2));
    assert_eq!(compare_nodes(&plan, &a, &b).unwrap(), Ordering::Greater);
    assert_eq!(compare_nodes(&plan, &a, &a).unwrap(), Ordering::Equal);
}

#[test]
fn test_compare_msec_variant_matches_base() {
    let base = SortPlan::new(&[FieldSpec::Builtin(BuiltinField::Stime)], false).unwrap();
    let msec = SortPlan::new(&[FieldSpec::Builtin(BuiltinField::StimeMsec)], false).unwrap();
    let mut x = FlowRec::default();
    x.stime_ms = 1000;
    let mut y = FlowRec::default();
    y.stime_ms = 1001;
    let (xn, yn) = (node_of(&x), node_of(&y));
    assert_eq!(
        compare_nodes(&base, &xn, &yn).unwrap(),
        compare_nodes(&msec, &xn, &yn).unwrap()
    );
}

#[test]
fn test_compare_etime_is_derived() {
    let plan = SortPlan::new(&[FieldSpec::Builtin(BuiltinField::Etime)], false).unwrap();
    // earlier start, longer duration: later end time
    let mut x = FlowRec::default();
    x.stime_ms = 1000;
    x.elapsed_ms = 5000;
    let mut y = FlowRec::default();
    y.stime_ms = 2000;
    y.elapsed_ms = 1000;
    assert_eq!(
        compare_nodes(&plan, &node_of(&x), &node_of(&y)).unwrap(),
        Ordering::Greater
    );
}

#[test]
fn test_compare_icmp_zero_for_non_icmp() {
    let plan = SortPlan::new(&[FieldSpec::Builtin(BuiltinField::IcmpType)], false).unwrap();
    let mut tcp = FlowRec::default();
    tcp.proto = 6;
    tcp.dport = 0x0303; // would be type 3 if this were ICMP
    let mut icmp = FlowRec::default();
    icmp.proto = 1;
    icmp.dport = 0x0303;
    let zero = FlowRec::default();
    assert_eq!(
        compare_nodes(&plan, &node_of(&tcp), &node_of(&zero)).unwrap(),
        Ordering::Equal
    );
    assert_eq!(
        compare_nodes(&plan, &node_of(&zero), &node_of(&icmp)).unwrap(),
        Ordering::Less
    );
}

#[test]
fn test_compare_mixed_address_families() {
    let plan = SortPlan::new(&[FieldSpec::Builtin(BuiltinField::Sip)], false).unwrap();
    let mut v4 = FlowRec::default();
    v4.sip = IpAddr::V4(Ipv4Addr::new(255, 255, 255, 255));
    let mut v6 = FlowRec::default();
    v6.sip = IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1));
    // zero-extended IPv4 sorts below any address with upper bits set
    assert_eq!(
        compare_nodes(&plan, &node_of(&v4), &node_of(&v6)).unwrap(),
        Ordering::Less
    );
}

struct BytesKey;

impl KeyField for BytesKey {
    fn name(&self) -> &str {
        "bytes-key"
    }
    fn width(&self) -> usize {
        4
    }
    fn rec_to_bin(&self, rec: &[u8], dst: &mut [u8]) -> Result<(), KeyFieldError> {
        dst.copy_from_slice(&RecView(rec).bytes().to_be_bytes());
        Ok(())
    }
    fn bin_compare(&self, a: &[u8], b: &[u8]) -> Result<Ordering, KeyFieldError> {
        Ok(a.cmp(b))
    }
}

#[test]
fn test_plugin_key_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = SortConfig {
        fields: vec![FieldSpec::Plugin(Arc::new(BytesKey))],
        ..SortConfig::default()
    };
    let out = run_sort(dir.path(), &[&[5, 2, 8, 1, 9]], config);
    assert_eq!(out, vec![1, 2, 5, 8, 9]);
}

struct FailingCompareKey;

impl KeyField for FailingCompareKey {
    fn name(&self) -> &str {
        "broken"
    }
    fn width(&self) -> usize {
        2
    }
    fn rec_to_bin(&self, _rec: &[u8], dst: &mut [u8]) -> Result<(), KeyFieldError> {
        dst.fill(0);
        Ok(())
    }
    fn bin_compare(&self, _a: &[u8], _b: &[u8]) -> Result<Ordering, KeyFieldError> {
        Err(KeyFieldError("bad key material".to_string()))
    }
}

#[test]
fn test_plugin_compare_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("in");
    write_stream(&in_path, &[3, 1, 2]);
    let config = SortConfig {
        fields: vec![FieldSpec::Plugin(Arc::new(FailingCompareKey))],
        output_path: Some(dir.path().join("out")),
        temp_dir: Some(dir.path().to_path_buf()),
        ..SortConfig::default()
    };
    let err = sort_and_output(&[in_path.to_str().unwrap().to_string()], &config).unwrap_err();
    match err {
        SortError::Plugin { field, .. } => assert_eq!(field, "broken"),
        other => panic!("expected plugin error, got {other}"),
    }
}

struct FailingExtractKey;

impl KeyField for FailingExtractKey {
    fn name(&self) -> &str {
        "no-extract"
    }
    fn width(&self) -> usize {
        2
    }
    fn rec_to_bin(&self, _rec: &[u8], _dst: &mut [u8]) -> Result<(), KeyFieldError> {
        Err(KeyFieldError("lookup failed".to_string()))
    }
    fn bin_compare(&self, a: &[u8], b: &[u8]) -> Result<Ordering, KeyFieldError> {
        Ok(a.cmp(b))
    }
}

#[test]
fn test_plugin_extract_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("in");
    write_stream(&in_path, &[1]);
    let config = SortConfig {
        fields: vec![FieldSpec::Plugin(Arc::new(FailingExtractKey))],
        output_path: Some(dir.path().join("out")),
        temp_dir: Some(dir.path().to_path_buf()),
        ..SortConfig::default()
    };
    let err = sort_and_output(&[in_path.to_str().unwrap().to_string()], &config).unwrap_err();
    assert!(matches!(err, SortError::Plugin { .. }));
}

#[test]
fn test_run_buffer_grows_to_budget() {
    // Budget for 8 nodes with a divisor of 4: starts at 2, ends at 8.
    let node_size = FLOW_REC_SIZE;
    let mut buffer = RunBuffer::new((8 * node_size) as u64, node_size).unwrap();
    assert_eq!(buffer.max_nodes(), 8);

    let plan = SortPlan::new(&[FieldSpec::Builtin(BuiltinField::Bytes)], false).unwrap();
    let cmp = NodeComparator::new(&plan);
    for v in [5u32, 2, 8, 1, 9, 3, 7, 4] {
        assert!(!buffer.full());
        rec_with_bytes(v).encode(buffer.slot());
        buffer.commit();
    }
    assert!(buffer.full());
    assert_eq!(buffer.len(), 8);

    buffer.sort(&cmp).unwrap();
    let sorted: Vec<u32> = buffer
        .indices()
        .iter()
        .map(|&i| RecView(buffer.node(i)).bytes())
        .collect();
    assert_eq!(sorted, vec![1, 2, 3, 4, 5, 7, 8, 9]);

    buffer.clear();
    assert!(buffer.is_empty());
    assert!(!buffer.full());
}

#[test]
fn test_run_buffer_rejects_sub_node_budget() {
    assert!(matches!(
        RunBuffer::new(10, FLOW_REC_SIZE),
        Err(SortError::Config(_))
    ));
}

#[test]
fn test_merge_heap_orders_by_comparator() {
    let vals = [5u8, 1, 4, 2, 3];
    let cmp = |x: u16, y: u16| vals[x as usize].cmp(&vals[y as usize]);

    let mut heap = MergeHeap::with_capacity(vals.len());
    for i in 0..vals.len() {
        heap.push(i as u16, cmp);
    }
    assert_eq!(heap.len(), 5);

    let mut order = Vec::new();
    while let Some(slot) = heap.pop(cmp) {
        order.push(vals[slot as usize]);
    }
    assert_eq!(order, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_temp_file_set_roundtrip() {
    let mut tmp = TempFileSet::new(None).unwrap();
    let node = [7u8; 16];

    let (mut w, idx) = tmp.create().unwrap();
    assert_eq!(idx, 0);
    w.write_node(&node).unwrap();
    w.write_node(&node).unwrap();
    w.finish().unwrap();

    let mut r = tmp.open(idx).unwrap();
    let mut buf = [0u8; 16];
    assert!(r.read_node(&mut buf).unwrap());
    assert_eq!(buf, node);
    assert!(r.read_node(&mut buf).unwrap());
    assert!(!r.read_node(&mut buf).unwrap());

    tmp.remove(idx).unwrap();
    assert!(tmp.open(idx).is_err());
    // removing a missing file is not an error: passes remove every
    // scheduled index
    tmp.remove(idx).unwrap();
}

/// Build temp runs by hand and merge them with a tiny fanout, checking
/// the cascade and that every consumed run is deleted.
#[test]
fn test_merge_cascades_and_deletes_runs() {
    let plan = SortPlan::new(&[FieldSpec::Builtin(BuiltinField::Bytes)], false).unwrap();
    let mut tmp = TempFileSet::new(None).unwrap();

    // fanout 3 with 4 runs forces exactly one cascade pass
    let runs: &[&[u32]] = &[&[1, 5], &[2, 6], &[3, 7], &[4, 8]];
    for keys in runs {
        let (mut w, _) = tmp.create().unwrap();
        for &k in *keys {
            w.write_node(&rec_with_bytes(k).to_bytes()).unwrap();
        }
        w.finish().unwrap();
    }

    let mut out = RecordWriter::new(Vec::new());
    merge_temp_runs(&plan, &mut tmp, 3, 3, &mut out).unwrap();
    assert_eq!(out.record_count(), 8);

    // all scheduled runs and the intermediate are gone
    for idx in 0..6 {
        assert!(!tmp.path_of(idx).exists(), "run #{idx} not deleted");
    }
}

#[test]
fn test_merge_single_run_copies_through() {
    let plan = SortPlan::new(&[FieldSpec::Builtin(BuiltinField::Bytes)], false).unwrap();
    let mut tmp = TempFileSet::new(None).unwrap();
    let (mut w, _) = tmp.create().unwrap();
    for k in [1u32, 2, 3] {
        w.write_node(&rec_with_bytes(k).to_bytes()).unwrap();
    }
    w.finish().unwrap();

    let mut out = RecordWriter::new(Vec::new());
    merge_temp_runs(&plan, &mut tmp, 0, 64, &mut out).unwrap();
    assert_eq!(out.record_count(), 3);
}

#[test]
fn test_merge_drops_empty_runs() {
    let plan = SortPlan::new(&[FieldSpec::Builtin(BuiltinField::Bytes)], false).unwrap();
    let mut tmp = TempFileSet::new(None).unwrap();

    let (w, _) = tmp.create().unwrap();
    w.finish().unwrap(); // empty run
    let (mut w, _) = tmp.create().unwrap();
    w.write_node(&rec_with_bytes(9).to_bytes()).unwrap();
    w.finish().unwrap();

    let mut out = RecordWriter::new(Vec::new());
    merge_temp_runs(&plan, &mut tmp, 1, 64, &mut out).unwrap();
    assert_eq!(out.record_count(), 1);
}

#[test]
fn test_sort_in_memory_only() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_sort(dir.path(), &[&[5, 2, 8, 1, 9, 3, 7, 4, 6]], bytes_config());
    assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
}

#[test]
fn test_sort_spills_with_tiny_buffer() {
    let dir = tempfile::tempdir().unwrap();
    // Room for 4 nodes: 9 records force at least two spilled runs.
    let config = SortConfig {
        sort_buffer_size: (4 * FLOW_REC_SIZE) as u64,
        ..bytes_config()
    };
    let out = run_sort(dir.path(), &[&[5, 2, 8, 1, 9, 3, 7, 4, 6]], config);
    assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
}

#[test]
fn test_sort_cascade_via_small_fanout() {
    let dir = tempfile::tempdir().unwrap();
    // Two-node buffer over 8 records: four runs, one more than fanout.
    let config = SortConfig {
        sort_buffer_size: (2 * FLOW_REC_SIZE) as u64,
        merge_fanout: 3,
        ..bytes_config()
    };
    let out = run_sort(dir.path(), &[&[8, 3, 5, 1, 7, 2, 6, 4]], config);
    assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn test_sort_empty_input_writes_header_only() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_sort(dir.path(), &[&[]], bytes_config());
    assert!(out.is_empty());
    // header only: a well-formed empty stream
    let len = std::fs::metadata(dir.path().join("out")).unwrap().len();
    assert_eq!(len, 8);
}

#[test]
fn test_sort_single_record() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_sort(dir.path(), &[&[42]], bytes_config());
    assert_eq!(out, vec![42]);
}

#[test]
fn test_sort_all_equal_keys() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_sort(dir.path(), &[&[3, 3, 3, 3, 3]], bytes_config());
    assert_eq!(out, vec![3, 3, 3, 3, 3]);
}

#[test]
fn test_sort_reverse() {
    let dir = tempfile::tempdir().unwrap();
    let config = SortConfig {
        reverse: true,
        ..bytes_config()
    };
    let out = run_sort(dir.path(), &[&[1, 2, 3, 4, 5]], config);
    assert_eq!(out, vec![5, 4, 3, 2, 1]);
}

#[test]
fn test_sort_reverse_involution_on_distinct_keys() {
    let dir = tempfile::tempdir().unwrap();
    let keys: &[u32] = &[12, 7, 19, 3, 42, 1, 30];
    let forward = run_sort(dir.path(), &[keys], bytes_config());
    let dir2 = tempfile::tempdir().unwrap();
    let config = SortConfig {
        reverse: true,
        ..bytes_config()
    };
    let backward = run_sort(dir2.path(), &[keys], config);
    let mut flipped = forward.clone();
    flipped.reverse();
    assert_eq!(backward, flipped);
}

#[test]
fn test_sort_multiple_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_sort(
        dir.path(),
        &[&[9, 1, 5], &[8, 2], &[7, 3, 6, 4]],
        bytes_config(),
    );
    assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
}

#[test]
fn test_presorted_merge_direct_to_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = SortConfig {
        presorted_input: true,
        ..bytes_config()
    };
    let out = run_sort(dir.path(), &[&[1, 4, 7], &[2, 5, 8], &[3, 6, 9]], config);
    assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
}

#[test]
fn test_presorted_merge_batches_beyond_fanout() {
    let dir = tempfile::tempdir().unwrap();
    let config = SortConfig {
        presorted_input: true,
        merge_fanout: 2,
        ..bytes_config()
    };
    let out = run_sort(dir.path(), &[&[1, 4, 7], &[2, 5, 8], &[3, 6, 9]], config);
    assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
}

#[test]
fn test_sort_idempotent_via_presorted() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first");
    let in_path = dir.path().join("in");
    write_stream(&in_path, &[5, 2, 8, 1, 9, 3, 7, 4, 6]);
    let config = SortConfig {
        output_path: Some(first.clone()),
        temp_dir: Some(dir.path().to_path_buf()),
        ..bytes_config()
    };
    sort_and_output(&[in_path.to_str().unwrap().to_string()], &config).unwrap();

    // feed the output back as presorted input
    let second = dir.path().join("second");
    let config = SortConfig {
        presorted_input: true,
        output_path: Some(second.clone()),
        temp_dir: Some(dir.path().to_path_buf()),
        ..bytes_config()
    };
    sort_and_output(&[first.to_str().unwrap().to_string()], &config).unwrap();

    assert_eq!(
        std::fs::read(&first).unwrap(),
        std::fs::read(&second).unwrap()
    );
}

#[test]
fn test_sort_many_runs() {
    // 100x the buffer: 1000 records through a 10-node buffer produces
    // 100 runs and multiple cascade passes at fanout 8.
    let mut keys: Vec<u32> = Vec::with_capacity(1000);
    let mut x = 123_456_789u64;
    for _ in 0..1000 {
        // xorshift
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        keys.push((x % 10_000) as u32);
    }

    let dir = tempfile::tempdir().unwrap();
    let config = SortConfig {
        sort_buffer_size: (10 * FLOW_REC_SIZE) as u64,
        merge_fanout: 8,
        ..bytes_config()
    };
    let out = run_sort(dir.path(), &[&keys[..]], config);

    let mut expected = keys.clone();
    expected.sort_unstable();
    assert_eq!(out, expected);
}

#[test]
fn test_missing_input_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = SortConfig {
        output_path: Some(dir.path().join("out")),
        temp_dir: Some(dir.path().to_path_buf()),
        ..bytes_config()
    };
    let err = sort_and_output(&["/nonexistent/stream".to_string()], &config).unwrap_err();
    assert!(matches!(err, SortError::Input { .. }));
}

#[test]
fn test_buffer_size_parsing() {
    assert_eq!(parse_buffer_size("1024").unwrap(), 1024);
    assert_eq!(parse_buffer_size("1K").unwrap(), 1024);
    assert_eq!(parse_buffer_size("1M").unwrap(), 1024 * 1024);
    assert_eq!(parse_buffer_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
    assert!(parse_buffer_size("").is_err());
    assert!(parse_buffer_size("12Q").is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Output is the sorted permutation of the input, no matter how the
    /// keys fall across runs.
    #[test]
    fn prop_output_is_sorted_permutation(
        keys in proptest::collection::vec(0u32..1000, 0..200)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let config = SortConfig {
            sort_buffer_size: (16 * FLOW_REC_SIZE) as u64,
            merge_fanout: 4,
            ..bytes_config()
        };
        let out = run_sort(dir.path(), &[&keys[..]], config);
        let mut expected = keys.clone();
        expected.sort_unstable();
        prop_assert_eq!(out, expected);
    }
}
