//! Graph engine conformance: demand dedup, teardown, elision, config.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use weft_cache::NoRemote;
use weft_common::{Buffer, CellType, Checksum};
use weft_graph::{
    elision_checksum, load_config_from_str, ElisionRecord, EngineConfig, FnExecutor, Manager,
    StatusReason, TransformationRecord,
};

fn manager() -> Manager {
    Manager::new(
        EngineConfig::default(),
        Box::new(NoRemote),
        Arc::new(FnExecutor(
            |_: &TransformationRecord, _: &BTreeMap<String, Buffer>| {
                Ok(Buffer::from_text("unused"))
            },
        )),
    )
}

#[test]
fn n_equal_demands_evaluate_once() {
    let mut m = manager();
    let source = m.register_cell(CellType::Plain);
    let targets: Vec<_> = (0..8)
        .map(|_| {
            let t = m.register_cell(CellType::Binary);
            m.connect_cell_cell(source, t).unwrap();
            t
        })
        .collect();
    m.set_cell(source, Buffer::from_text("[1, 2, 3]")).unwrap();
    m.compute(Duration::from_secs(5));

    let first = m.cell_checksum(targets[0]).unwrap();
    for t in &targets {
        assert_eq!(m.cell_checksum(*t), Some(first));
    }
    // all eight demands shared one expression and one conversion
    assert_eq!(m.conversion_counters().conversions_executed, 1);
}

#[test]
fn accessor_teardown_voids_only_the_target() {
    let mut m = manager();
    let source = m.register_cell(CellType::Plain);
    let kept = m.register_cell(CellType::Plain);
    let dropped = m.register_cell(CellType::Plain);
    m.connect_cell_cell(source, kept).unwrap();
    let acc = m.connect_cell_cell(source, dropped).unwrap();
    m.set_cell(source, Buffer::from_text("[true]")).unwrap();
    m.compute(Duration::from_secs(5));
    assert!(m.cell_checksum(dropped).is_some());

    m.destroy_accessor(acc);
    let node = m.graph().cell(dropped).unwrap();
    assert_eq!(node.checksum, None);
    assert_eq!(node.void_reason, Some(StatusReason::Unconnected));
    assert!(m.graph().has_independence(dropped).unwrap());
    // the sibling edge is untouched
    assert_eq!(m.cell_checksum(kept), m.cell_checksum(source));
    // the shared expression now has exactly one holder left
    let expr = weft_graph::Expression::conversion(
        m.cell_checksum(source).unwrap(),
        CellType::Plain,
        CellType::Plain,
    );
    assert_eq!(m.graph().expression_refcount(&expr), 1);
}

#[test]
fn elision_replays_and_invalidates() {
    let mut m = manager();
    let cell = m.register_cell(CellType::Plain);
    let params = Checksum::from_bytes(b"macro params");
    let mut inputs = BTreeMap::new();
    inputs.insert("graph".to_string(), Checksum::from_bytes(b"input graph"));
    let mut outputs = BTreeMap::new();
    outputs.insert("result".to_string(), Checksum::from_bytes(b"expanded"));

    m.elision().record(ElisionRecord {
        params,
        inputs: inputs.clone(),
        outputs: outputs.clone(),
        cells: vec![cell],
    });
    assert_eq!(m.elision().lookup(params, &inputs).unwrap().outputs, outputs);

    // destroying a depended-on cell drops the record
    m.destroy_cell(cell);
    assert!(m.elision().lookup(params, &inputs).is_none());
}

#[test]
fn elision_key_is_order_insensitive_but_content_sensitive() {
    let params = Checksum::from_bytes(b"p");
    let mut a = BTreeMap::new();
    a.insert("x".to_string(), Checksum::from_bytes(b"1"));
    a.insert("y".to_string(), Checksum::from_bytes(b"2"));
    let mut b = BTreeMap::new();
    b.insert("y".to_string(), Checksum::from_bytes(b"2"));
    b.insert("x".to_string(), Checksum::from_bytes(b"1"));
    assert_eq!(elision_checksum(params, &a), elision_checksum(params, &b));
    let mut c = a.clone();
    c.insert("x".to_string(), Checksum::from_bytes(b"3"));
    assert_ne!(elision_checksum(params, &a), elision_checksum(params, &c));
}

#[test]
fn config_defaults_cover_an_empty_file() {
    let config = load_config_from_str("").unwrap();
    assert_eq!(config.scheduler.job_pool_size, 4);
    assert_eq!(config.cache.small_buffer_limit, 100_000);
    assert!(config.remote.endpoint.is_none());

    let config = load_config_from_str("[cache]\nlifetime_temp_secs = 5\n").unwrap();
    assert_eq!(config.cache.lifetime_temp_secs, 5);
    assert_eq!(config.cache.lifetime_temp_small_secs, 600);
}

#[test]
fn config_rejects_a_zero_job_pool() {
    assert!(load_config_from_str("[scheduler]\njob_pool_size = 0\n").is_err());
}
