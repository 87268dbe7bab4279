use super::*;
use crate::abstract_domain::BitWidth;
use crate::comparison::states_equal;
use crate::state::NodeId;

fn dword(value: u64) -> AbstractCell {
    AbstractCell::new(BitWidth::new(32), value)
}

fn flag_bit(bit: u64) -> AbstractCell {
    AbstractCell::new(BitWidth::new(1), bit)
}

/// A pre-state resembling the template configuration of the regression
/// scenarios: concrete untainted registers, cleared flags and two seeded
/// global memory cells.
fn seed_state() -> AbstractState {
    let mut state = AbstractState::new(NodeId::ENTRY, 0x1000);
    let register_values = [
        (Register::Eax, 0x100),
        (Register::Ecx, 0x11),
        (Register::Edx, 0x5678),
        (Register::Ebx, 0x33),
        (Register::Esp, 0xb000),
        (Register::Ebp, 0xc010),
        (Register::Esi, 0x55),
        (Register::Edi, 0x66),
    ];
    for (register, value) in register_values {
        state
            .set_cell(Location::Register(register), dword(value))
            .unwrap();
    }
    for flag in Flag::ALL {
        state.set_cell(Location::Flag(flag), flag_bit(0)).unwrap();
    }
    state
        .set_cell(
            Location::Global(0x100),
            dword(0xdead_beef).with_taint(0xf0),
        )
        .unwrap();
    state
        .set_cell(Location::Global(0xc00a), dword(0xcafe_f00d))
        .unwrap();
    state
}

fn expect_successor(prediction: Prediction) -> ExpectedState {
    match prediction {
        Prediction::Successor(expected) => expected,
        Prediction::Unreachable => panic!("expected exactly one successor state"),
    }
}

fn assert_flag(state: &AbstractState, flag: Flag, bit: u64) {
    assert_eq!(
        state.get_single(&Location::Flag(flag)).unwrap(),
        &flag_bit(bit),
        "unexpected value of flag {flag}",
    );
}

#[test]
fn xor_reg_self_clears_register_and_flags() {
    for register in Register::ALL {
        let pre_state = seed_state();
        let instruction = Instruction::XorRegSelf(register);
        let expected = expect_successor(instruction.predict(&pre_state).unwrap());

        assert_eq!(
            expected.state.get_single(&Location::Register(register)).unwrap(),
            &dword(0)
        );
        assert_flag(&expected.state, Flag::Zf, 1);
        assert_flag(&expected.state, Flag::Pf, 1);
        assert_flag(&expected.state, Flag::Sf, 0);
        assert_flag(&expected.state, Flag::Cf, 0);
        assert_flag(&expected.state, Flag::Of, 0);
        assert_eq!(
            expected.state.get_single(&Location::Flag(Flag::Af)).unwrap(),
            &AbstractCell::fully_unknown(BitWidth::new(1))
        );
        assert!(expected.unconstrained.is_empty());
        assert_eq!(expected.state.node_id(), NodeId::new(1));
        assert_eq!(expected.state.address(), 0x1002);
    }
}

#[test]
fn inc_then_dec_restores_the_register_value() {
    for register in Register::ALL {
        let pre_state = seed_state();
        let location = Location::Register(register);
        let original = *pre_state.get_single(&location).unwrap();

        let after_inc =
            expect_successor(Instruction::Inc(register).predict(&pre_state).unwrap());
        assert_eq!(
            after_inc.state.get_single(&location).unwrap().value(),
            (original.value() + 1) & 0xffff_ffff
        );

        let after_dec =
            expect_successor(Instruction::Dec(register).predict(&after_inc.state).unwrap());
        assert_eq!(
            after_dec.state.get_single(&location).unwrap().value(),
            original.value()
        );
        assert_eq!(after_dec.state.node_id(), NodeId::new(2));
    }
}

#[test]
fn inc_eax_concrete_scenario() {
    let mut pre_state = seed_state();
    pre_state
        .set_cell(Location::Register(Register::Eax), dword(0x5))
        .unwrap();

    let expected = expect_successor(Instruction::Inc(Register::Eax).predict(&pre_state).unwrap());
    assert_eq!(
        expected.state.get_single(&Location::Register(Register::Eax)).unwrap(),
        &dword(0x6)
    );
    assert_flag(&expected.state, Flag::Zf, 0);
    assert_flag(&expected.state, Flag::Sf, 0);
    // 0x06 has two set bits.
    assert_flag(&expected.state, Flag::Pf, 1);
    assert_eq!(
        expected.state.get_single(&Location::Flag(Flag::Af)).unwrap(),
        &AbstractCell::fully_unknown(BitWidth::new(1))
    );
    assert_eq!(expected.unconstrained, BTreeSet::from([Flag::Of]));
    assert_eq!(expected.state.address(), 0x1001);
}

#[test]
fn dec_flags_are_a_function_of_the_step_result() {
    let mut pre_state = seed_state();
    pre_state
        .set_cell(Location::Register(Register::Ebx), dword(1))
        .unwrap();
    // Leave a stale sign flag to show it gets recomputed, not accumulated.
    pre_state.set_cell(Location::Flag(Flag::Sf), flag_bit(1)).unwrap();

    let expected = expect_successor(Instruction::Dec(Register::Ebx).predict(&pre_state).unwrap());
    assert_eq!(
        expected.state.get_single(&Location::Register(Register::Ebx)).unwrap(),
        &dword(0)
    );
    assert_flag(&expected.state, Flag::Zf, 1);
    assert_flag(&expected.state, Flag::Sf, 0);
    assert_flag(&expected.state, Flag::Pf, 1);
}

#[test]
fn push_then_pop_restores_register_and_stack_pointer() {
    for register in Register::ALL {
        let pre_state = seed_state();
        let location = Location::Register(register);
        let original = pre_state.get(&location).unwrap().to_vec();

        let after_push =
            expect_successor(Instruction::Push(register).predict(&pre_state).unwrap());
        assert_eq!(
            after_push.state.get_single(&Location::Register(Register::Esp)).unwrap(),
            &dword(0xaffc)
        );
        assert_eq!(
            after_push.state.get(&Location::Stack(0xaffc)).unwrap(),
            original.as_slice()
        );

        let after_pop =
            expect_successor(Instruction::Pop(register).predict(&after_push.state).unwrap());
        assert_eq!(after_pop.state.get(&location).unwrap(), original.as_slice());
        assert_eq!(
            after_pop.state.get_single(&Location::Register(Register::Esp)).unwrap(),
            &dword(0xb000)
        );
    }
}

#[test]
fn push_with_non_concrete_stack_pointer_is_a_setup_error() {
    let mut pre_state = seed_state();
    pre_state
        .set_cell(
            Location::Register(Register::Esp),
            AbstractCell::fully_unknown(BitWidth::new(32)),
        )
        .unwrap();

    assert!(matches!(
        Instruction::Push(Register::Eax).predict(&pre_state),
        Err(StateError::UnresolvedPointer {
            location: Location::Register(Register::Esp)
        })
    ));
}

#[test]
fn dereference_of_bottom_pointer_is_unreachable() {
    let mut pre_state = seed_state();
    pre_state
        .set_cell(
            Location::Register(Register::Eax),
            AbstractCell::bottom(BitWidth::new(32)),
        )
        .unwrap();

    let instruction = Instruction::MovLoad {
        dst: Register::Ebp,
        address: MemOperand::base(Register::Eax),
    };
    assert!(matches!(
        instruction.predict(&pre_state).unwrap(),
        Prediction::Unreachable
    ));
}

#[test]
fn dereference_of_unknown_address_yields_fully_unknown_cell() {
    let mut pre_state = seed_state();
    pre_state
        .set_cell(
            Location::Register(Register::Eax),
            AbstractCell::fully_unknown(BitWidth::new(32)),
        )
        .unwrap();

    let instruction = Instruction::MovLoad {
        dst: Register::Ebp,
        address: MemOperand::base(Register::Eax),
    };
    let expected = expect_successor(instruction.predict(&pre_state).unwrap());
    assert_eq!(
        expected.state.get_single(&Location::Register(Register::Ebp)).unwrap(),
        &AbstractCell::fully_unknown(BitWidth::new(32))
    );
}

#[test]
fn dereference_of_concrete_pointer_returns_the_looked_up_cells() {
    let pre_state = seed_state();
    let instruction = Instruction::MovLoad {
        dst: Register::Ebp,
        address: MemOperand::base(Register::Eax),
    };
    let expected = expect_successor(instruction.predict(&pre_state).unwrap());
    // The cell's own taint survives an untainted pointer.
    assert_eq!(
        expected.state.get_single(&Location::Register(Register::Ebp)).unwrap(),
        &dword(0xdead_beef).with_taint(0xf0)
    );
}

#[test]
fn tainted_pointer_forces_taint_on_the_loaded_cells() {
    let mut pre_state = seed_state();
    pre_state
        .set_cell(
            Location::Register(Register::Eax),
            dword(0x100).with_taint(0x1),
        )
        .unwrap();

    let instruction = Instruction::MovLoad {
        dst: Register::Ebp,
        address: MemOperand::base(Register::Eax),
    };
    let expected = expect_successor(instruction.predict(&pre_state).unwrap());
    assert_eq!(
        expected.state.get_single(&Location::Register(Register::Ebp)).unwrap(),
        &dword(0xdead_beef).with_taint(0xffff_ffff)
    );
}

#[test]
fn mov_load_with_displacement_reads_global_memory() {
    let pre_state = seed_state();
    let instruction = Instruction::MovLoad {
        dst: Register::Esi,
        address: MemOperand::base_disp(Register::Ebp, -6),
    };
    let expected = expect_successor(instruction.predict(&pre_state).unwrap());
    assert_eq!(
        expected.state.get_single(&Location::Register(Register::Esi)).unwrap(),
        &dword(0xcafe_f00d)
    );
    assert_eq!(expected.state.address(), 0x1003);
}

#[test]
fn missing_memory_location_is_a_setup_error() {
    let mut pre_state = seed_state();
    pre_state
        .set_cell(Location::Register(Register::Eax), dword(0x4444))
        .unwrap();
    let instruction = Instruction::MovLoad {
        dst: Register::Ebp,
        address: MemOperand::base(Register::Eax),
    };
    assert!(matches!(
        instruction.predict(&pre_state),
        Err(StateError::MissingLocation(Location::Global(0x4444)))
    ));
}

#[test]
fn movzx_register_zero_extends_the_low_byte() {
    let mut pre_state = seed_state();
    pre_state
        .set_cell(
            Location::Register(Register::Edx),
            dword(0x5678)
                .with_value_top(0xff00)
                .with_taint(0x0f00)
                .with_taint_top(0xf000),
        )
        .unwrap();

    let instruction = Instruction::MovzxReg {
        dst: Register::Edx,
        src: Register::Edx,
    };
    let expected = expect_successor(instruction.predict(&pre_state).unwrap());
    assert_eq!(
        expected.state.get_single(&Location::Register(Register::Edx)).unwrap(),
        &dword(0x78)
    );
}

#[test]
fn movzx_high_byte_register_reads_the_named_byte() {
    let mut pre_state = seed_state();
    pre_state
        .set_cell(
            Location::Register(Register::Edx),
            dword(0xaabb_ccdd).with_taint(0x0000_ff00),
        )
        .unwrap();

    // The esi slot of `0F B6 /r` names dh, bits 8..16 of edx.
    let instruction = Instruction::MovzxReg {
        dst: Register::Ebx,
        src: Register::Esi,
    };
    assert_eq!(instruction.encode(), vec![0x0f, 0xb6, 0xde]);
    assert_eq!(instruction.to_string(), "movzx ebx, dh");

    let expected = expect_successor(instruction.predict(&pre_state).unwrap());
    assert_eq!(
        expected.state.get_single(&Location::Register(Register::Ebx)).unwrap(),
        &dword(0xcc).with_taint(0xff)
    );
}

#[test]
fn mov_byte_load_splices_into_the_low_byte() {
    let mut pre_state = seed_state();
    pre_state
        .set_cell(Location::Register(Register::Ecx), dword(0xaabb_cc11))
        .unwrap();

    let instruction = Instruction::MovByteLoad {
        dst: Register::Ecx,
        address: MemOperand::base(Register::Eax),
    };
    assert_eq!(instruction.encode(), vec![0x8a, 0x08]);
    assert_eq!(instruction.to_string(), "mov cl, byte ptr [eax]");

    let expected = expect_successor(instruction.predict(&pre_state).unwrap());
    // The upper 24 bits of ecx survive; the loaded byte brings its taint.
    assert_eq!(
        expected.state.get_single(&Location::Register(Register::Ecx)).unwrap(),
        &dword(0xaabb_ccef).with_taint(0xf0)
    );
}

#[test]
fn mov_byte_load_into_high_byte_through_tainted_pointer() {
    let mut pre_state = seed_state();
    pre_state
        .set_cell(
            Location::Register(Register::Eax),
            dword(0x100).with_taint(0x1),
        )
        .unwrap();

    // The esp slot of `0x8A /r` names ah, bits 8..16 of eax.
    let instruction = Instruction::MovByteLoad {
        dst: Register::Esp,
        address: MemOperand::base(Register::Eax),
    };
    assert_eq!(instruction.to_string(), "mov ah, byte ptr [eax]");

    let expected = expect_successor(instruction.predict(&pre_state).unwrap());
    // The loaded byte is fully tainted by the pointer; the taint of the
    // untouched eax bits is kept.
    assert_eq!(
        expected.state.get_single(&Location::Register(Register::Eax)).unwrap(),
        &dword(0xef00).with_taint(0xff01)
    );
}

#[test]
fn movzx_byte_load_through_tainted_pointer() {
    let mut pre_state = seed_state();
    pre_state
        .set_cell(
            Location::Register(Register::Eax),
            dword(0x100).with_taint_top(0x2),
        )
        .unwrap();

    let instruction = Instruction::MovzxLoad {
        dst: Register::Eax,
        address: MemOperand::base(Register::Eax),
    };
    let expected = expect_successor(instruction.predict(&pre_state).unwrap());
    // Low byte of the global cell, zero extended, with taint forced to all
    // ones of the loaded byte.
    assert_eq!(
        expected.state.get_single(&Location::Register(Register::Eax)).unwrap(),
        &dword(0xef).with_taint(0xff)
    );
}

#[test]
fn and_with_immediate_clears_the_masked_bits() {
    let mut pre_state = seed_state();
    pre_state
        .set_cell(Location::Register(Register::Esp), dword(0xb005))
        .unwrap();

    let expected = expect_successor(
        Instruction::AndImm(Register::Esp, 0xffff_fff0)
            .predict(&pre_state)
            .unwrap(),
    );
    assert_eq!(
        expected.state.get_single(&Location::Register(Register::Esp)).unwrap(),
        &dword(0xb000)
    );
    assert_flag(&expected.state, Flag::Zf, 0);
    assert_flag(&expected.state, Flag::Sf, 0);
    assert_flag(&expected.state, Flag::Pf, 1);
    assert_flag(&expected.state, Flag::Cf, 0);
    assert_flag(&expected.state, Flag::Of, 0);
    assert_eq!(expected.state.address(), 0x1003);
}

#[test]
fn or_with_all_ones_immediate_saturates_the_register() {
    let pre_state = seed_state();
    let expected = expect_successor(
        Instruction::OrImm(Register::Ecx, 0xffff_ffff)
            .predict(&pre_state)
            .unwrap(),
    );
    assert_eq!(
        expected.state.get_single(&Location::Register(Register::Ecx)).unwrap(),
        &dword(0xffff_ffff)
    );
    assert_flag(&expected.state, Flag::Zf, 0);
    assert_flag(&expected.state, Flag::Sf, 1);
    assert_flag(&expected.state, Flag::Pf, 1);
    assert_flag(&expected.state, Flag::Cf, 0);
    assert_flag(&expected.state, Flag::Of, 0);
}

#[test]
fn nop_only_advances_the_program_point() {
    let pre_state = seed_state();
    let expected = expect_successor(Instruction::Nop.predict(&pre_state).unwrap());
    assert!(states_equal(&pre_state, &expected.state));
    assert_eq!(expected.state.node_id(), NodeId::new(1));
    assert_eq!(expected.state.address(), 0x1001);
}

#[test]
fn encodings_match_the_opcode_tables() {
    assert_eq!(Instruction::XorRegSelf(Register::Eax).encode(), vec![0x33, 0xc0]);
    assert_eq!(Instruction::XorRegSelf(Register::Edi).encode(), vec![0x33, 0xff]);
    assert_eq!(Instruction::Inc(Register::Ecx).encode(), vec![0x41]);
    assert_eq!(Instruction::Dec(Register::Edi).encode(), vec![0x4f]);
    assert_eq!(Instruction::Push(Register::Ebp).encode(), vec![0x55]);
    assert_eq!(Instruction::Pop(Register::Ebx).encode(), vec![0x5b]);
    assert_eq!(
        Instruction::AndImm(Register::Esp, 0xffff_fff0).encode(),
        vec![0x83, 0xe4, 0xf0]
    );
    assert_eq!(
        Instruction::OrImm(Register::Eax, 0xffff_ffff).encode(),
        vec![0x83, 0xc8, 0xff]
    );
    assert_eq!(
        Instruction::AndImm(Register::Eax, 0x1234).encode(),
        vec![0x81, 0xe0, 0x34, 0x12, 0x00, 0x00]
    );
    assert_eq!(
        Instruction::MovzxReg {
            dst: Register::Edx,
            src: Register::Edx
        }
        .encode(),
        vec![0x0f, 0xb6, 0xd2]
    );
    assert_eq!(
        Instruction::MovzxLoad {
            dst: Register::Eax,
            address: MemOperand::base(Register::Eax)
        }
        .encode(),
        vec![0x0f, 0xb6, 0x00]
    );
    assert_eq!(
        Instruction::MovLoad {
            dst: Register::Ebp,
            address: MemOperand::base(Register::Eax)
        }
        .encode(),
        vec![0x8b, 0x28]
    );
    assert_eq!(
        Instruction::MovLoad {
            dst: Register::Eax,
            address: MemOperand::base_disp(Register::Ebp, -6)
        }
        .encode(),
        vec![0x8b, 0x45, 0xfa]
    );
    assert_eq!(
        Instruction::MovByteLoad {
            dst: Register::Ecx,
            address: MemOperand::base(Register::Eax)
        }
        .encode(),
        vec![0x8a, 0x08]
    );
    assert_eq!(
        Instruction::MovByteLoad {
            dst: Register::Esp,
            address: MemOperand::base_disp(Register::Ebp, -6)
        }
        .encode(),
        vec![0x8a, 0x65, 0xfa]
    );
    assert_eq!(Instruction::Nop.encode(), vec![0x90]);
}

#[test]
fn unconstrained_flags_are_skipped_by_the_comparison() {
    let pre_state = seed_state();
    let expected = expect_successor(Instruction::Inc(Register::Esi).predict(&pre_state).unwrap());

    // An observed state that disagrees on the overflow flag still matches.
    let mut observed = expected.state.clone();
    observed.set_cell(Location::Flag(Flag::Of), flag_bit(1)).unwrap();
    assert!(expected.matches(&observed));

    // Disagreement on a constrained location is still reported.
    observed
        .set_cell(Location::Register(Register::Esi), dword(0))
        .unwrap();
    assert!(!expected.matches(&observed));
    assert!(expected
        .diff_against(&observed, "observed", "expected")
        .contains("reg[esi]"));
}
