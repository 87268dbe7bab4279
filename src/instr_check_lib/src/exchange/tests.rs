use super::*;
use crate::comparison::states_equal;

fn sample_state() -> AbstractState {
    let mut state = AbstractState::new(NodeId::ENTRY, 0x1000);
    state
        .set_cell(
            Location::Register(Register::Eax),
            AbstractCell::new(BitWidth::new(32), 0x5).with_taint(0x3),
        )
        .unwrap();
    state
        .set_cell(
            Location::Flag(Flag::Zf),
            AbstractCell::new(BitWidth::new(1), 0),
        )
        .unwrap();
    state
        .set_cells(
            Location::Stack(0xaffc),
            vec![
                AbstractCell::fully_unknown(BitWidth::new(32)),
                AbstractCell::new(BitWidth::new(32), 0x42),
            ],
        )
        .unwrap();
    state
}

#[test]
fn state_round_trip_preserves_every_field() {
    let state = sample_state();
    let text = serialize_state(&state).unwrap();
    let parsed = parse_state(&text).unwrap();
    assert!(states_equal(&state, &parsed));
    assert_eq!(parsed.node_id(), state.node_id());
    assert_eq!(parsed.address(), state.address());
}

#[test]
fn parse_accepts_sparse_cell_descriptions() {
    let text = r#"{
        "node_id": 0,
        "address": 4096,
        "locations": [
            {
                "location": { "Register": "Ebp" },
                "cells": [ { "width": 32, "value": 49168 } ]
            },
            {
                "location": { "Global": 256 },
                "cells": [ { "width": 32, "value": 0, "value_bottom": true } ]
            }
        ]
    }"#;
    let state = parse_state(text).unwrap();
    assert_eq!(
        state.get_single(&Location::Register(Register::Ebp)).unwrap(),
        &AbstractCell::new(BitWidth::new(32), 0xc010)
    );
    assert!(state
        .get_single(&Location::Global(0x100))
        .unwrap()
        .is_bottom());
}

#[test]
fn malformed_text_aborts_the_scenario_with_a_cause() {
    assert!(matches!(
        parse_state("not a state"),
        Err(StateError::MalformedInput(_))
    ));
    assert!(matches!(
        parse_cfa(r#"{"nodes": [{"address": 0}]}"#),
        Err(StateError::MalformedInput(_))
    ));
}

#[test]
fn width_mismatch_is_rejected_at_parse_time() {
    let text = r#"{
        "node_id": 0,
        "address": 0,
        "locations": [
            {
                "location": { "Flag": "Cf" },
                "cells": [ { "width": 32, "value": 1 } ]
            }
        ]
    }"#;
    assert!(matches!(
        parse_state(text),
        Err(StateError::WidthMismatch { .. })
    ));
}

#[test]
fn cfa_round_trip_preserves_nodes_and_edges() {
    let mut cfa = Cfa::new();
    cfa.add_node(sample_state()).unwrap();
    let mut successor = sample_state();
    successor.advance(1);
    cfa.add_node(successor).unwrap();
    cfa.add_edge(NodeId::ENTRY, NodeId::new(1)).unwrap();

    let text = serialize_cfa(&cfa).unwrap();
    let parsed = parse_cfa(&text).unwrap();
    assert_eq!(parsed.node_count(), 2);
    assert_eq!(parsed.successors(NodeId::ENTRY), vec![NodeId::new(1)]);
    assert_eq!(parsed.get_node(NodeId::new(1)).unwrap().address(), 0x1001);
}
