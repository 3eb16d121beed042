//! Structured cell conformance: overlap, join overlay, outchannels.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use weft_cache::NoRemote;
use weft_common::{Buffer, CellType};
use weft_graph::{EngineConfig, FnExecutor, Manager, TransformationRecord};
use weft_structured::{StructuredCell, StructuredError};

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

fn p(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[test]
fn overlapping_inchannels_are_a_consistency_violation() {
    let mut m = manager();
    for channels in [
        vec![p(&["a"]), p(&["a"])],
        vec![p(&["a", "b"]), p(&["a"])],
        vec![p(&[]), p(&["x"])],
    ] {
        let err = StructuredCell::new(&mut m, channels, Vec::new()).unwrap_err();
        assert!(matches!(err, StructuredError::Overlap { .. }));
    }
}

#[test]
fn join_overlays_channels_on_the_authoritative_value() {
    let mut m = manager();
    let mut sc = StructuredCell::new(
        &mut m,
        vec![p(&["left"]), p(&["right"])],
        Vec::new(),
    )
    .unwrap();
    sc.set_auth(&mut m, &[], json!({"base": true, "left": "default"}))
        .unwrap();

    let left = m.register_cell(CellType::Plain);
    m.connect_cell_scell(left, sc.scell(), p(&["left"])).unwrap();
    m.set_cell(left, Buffer::from_text("10")).unwrap();
    m.compute(Duration::from_secs(5));
    sc.sync(&mut m).unwrap();

    let joined = m.fingertip(sc.data_checksum(&m).unwrap()).unwrap();
    // channel beats auth at its path, auth wins elsewhere
    assert_eq!(joined.as_bytes(), b"{\"base\":true,\"left\":10}");
}

#[test]
fn full_loop_inchannel_to_outchannel() {
    let mut m = manager();
    let mut sc = StructuredCell::new(
        &mut m,
        vec![p(&["in"])],
        vec![p(&["in"]), p(&["fixed"])],
    )
    .unwrap();
    sc.set_auth(&mut m, &p(&["fixed"]), json!("constant")).unwrap();

    let source = m.register_cell(CellType::Plain);
    m.connect_cell_scell(source, sc.scell(), p(&["in"])).unwrap();
    let target = m.register_cell(CellType::Int);
    m.connect_scell_cell(sc.scell(), p(&["in"]), target).unwrap();

    m.set_cell(source, Buffer::from_text("5")).unwrap();
    m.compute(Duration::from_secs(5));
    sc.sync(&mut m).unwrap();
    m.compute(Duration::from_secs(5));

    let out = m.cell_buffer(target).unwrap().unwrap();
    assert_eq!(out.as_bytes(), b"5");
}

#[test]
fn teardown_leaves_empty_adjacency() {
    let mut m = manager();
    let sc = StructuredCell::new(&mut m, vec![p(&["a"])], vec![p(&["b"])]).unwrap();
    let source = m.register_cell(CellType::Plain);
    m.connect_cell_scell(source, sc.scell(), p(&["a"])).unwrap();
    let target = m.register_cell(CellType::Mixed);
    m.connect_scell_cell(sc.scell(), p(&["b"]), target).unwrap();
    sc.destroy(&mut m);
    let (_, accessors, _) = m.graph().node_counts();
    assert_eq!(accessors, 0);
    // the ordinary cells survive their channel connections
    assert!(m.graph().cell(source).is_some());
    assert!(m.graph().cell(target).is_some());
}
