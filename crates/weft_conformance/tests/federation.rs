//! Federation conformance: codec, handshake and shared result caches.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use weft_common::{Buffer, CellType};
use weft_graph::{EngineConfig, FnExecutor, Manager, TransformationRecord, Worker};
use weft_remote::{decode, encode, Handshake, MemoryStore, Message, Payload, ServiceKind};

fn doubling_manager(store: MemoryStore) -> Manager {
    Manager::new(
        EngineConfig::default(),
        Box::new(store),
        Arc::new(FnExecutor(
            |_: &TransformationRecord, inputs: &BTreeMap<String, Buffer>| {
                let text = std::str::from_utf8(inputs["n"].as_bytes()).unwrap();
                let n: i64 = text.trim().parse().unwrap();
                Ok(Buffer::from_text(&(n * 2).to_string()))
            },
        )),
    )
}

fn double_worker() -> Worker {
    Worker {
        name: "double".to_string(),
        params: weft_common::Checksum::from_bytes(b"double params"),
        runtime: "test".to_string(),
        output_celltype: CellType::Int,
    }
}

fn run_double(m: &mut Manager, input: &str) -> Buffer {
    let n = m.register_cell(CellType::Int);
    let out = m.register_cell(CellType::Int);
    let w = m.register_worker(double_worker(), &[("n".to_string(), CellType::Int)]);
    m.connect_cell_pin(n, w, "n").unwrap();
    m.connect_pin_cell(w, out).unwrap();
    m.set_cell(n, Buffer::from_text(input)).unwrap();
    m.compute(Duration::from_secs(10));
    m.cell_buffer(out).unwrap().unwrap()
}

#[test]
fn codec_round_trips_every_payload_kind() {
    let messages = vec![
        Message::request(0, json!({"op": "handshake"}), Payload::Absent),
        Message::response(0, json!({"ok": true}), Payload::Bool(true)),
        Message::request(1, json!({"op": "set_buffer"}), Payload::Bytes(b"\x00raw".to_vec())),
        Message::response(2, json!({}), Payload::Text("text body".to_string())),
        Message::response(3, json!({}), Payload::Json(json!({"nested": [1, null]}))),
    ];
    for message in messages {
        let wire = encode(&message);
        let (back, used) = decode(&wire).unwrap();
        assert_eq!(back, message);
        assert_eq!(used, wire.len());
    }
}

#[test]
fn handshake_limits_what_is_requested() {
    let ours = Handshake::full();
    let theirs = Handshake {
        offered: vec![ServiceKind::Buffer, ServiceKind::Transformation],
        consumed: vec![ServiceKind::Buffer],
    };
    let usable = weft_remote::negotiate(&ours, &theirs);
    assert!(usable.contains(&ServiceKind::Buffer));
    assert!(usable.contains(&ServiceKind::Transformation));
    assert!(!usable.contains(&ServiceKind::Elision));
    assert!(!usable.contains(&ServiceKind::BufferInfo));
}

#[test]
fn peers_share_transformation_results_through_the_store() {
    let store = MemoryStore::new();
    let mut first = doubling_manager(store.clone());
    let out = run_double(&mut first, "21");
    assert_eq!(out.as_bytes(), b"42");

    // a fresh manager sees the memoized result; its own executor would
    // also produce it, but the point is the remote hit resolves first
    let mut second = doubling_manager(store.clone());
    let out = run_double(&mut second, "21");
    assert_eq!(out.as_bytes(), b"42");
}

#[test]
fn buffers_written_by_one_peer_are_fetchable_by_another() {
    let store = MemoryStore::new();
    let buffer = Buffer::from_text("published");
    let checksum = buffer.checksum();
    {
        use weft_cache::RemoteStore;
        store.set_buffer(checksum, &buffer).unwrap();
    }
    let mut m = doubling_manager(store);
    let fetched = m.fingertip(checksum).unwrap();
    assert_eq!(fetched.as_bytes(), b"published");
}
