// Segment loading, execute scopes and memory checkpoints.

mod support;

use levelscript::bytecode::assembler::Field;
use levelscript::bytecode::{CommandLayout, Opcode, ScriptBuilder, SegmentedAddress};
use levelscript::memory::MemoryError;
use levelscript::services::TokenTable;
use levelscript::{Diagnostic, ScriptStatus, VmConfig};

use support::{image, load, mio0_literals, narrow, record, vm_with};

const SEGMENT_E: SegmentedAddress = SegmentedAddress::from_raw(0x0E00_0000);

fn segment_script(segment: u8, build: impl FnOnce(&mut ScriptBuilder)) -> Vec<u8> {
    let mut builder = ScriptBuilder::new(CommandLayout::default(), segment);
    build(&mut builder);
    builder.finish().unwrap()
}

#[test]
fn execute_runs_a_scoped_segment_and_rolls_it_back() {
    let sub = segment_script(0x0E, |b| {
        b.sleep(1).set_register(5).exit();
    });
    let (image, ranges) = image(&[sub.as_slice()]);
    let mut vm = vm_with(VmConfig::default(), image, TokenTable::new());
    let before = vm.memory().available();

    let mut main = narrow();
    main.execute(0x0E, ranges[0].0, ranges[0].1, SEGMENT_E).exit();
    let start = load(&mut vm, main.finish().unwrap());

    let resume = vm.execute(start).unwrap();
    assert_eq!(vm.stack().depth(), 1);
    assert_eq!(vm.memory().available(), before - sub.len());
    assert!(vm.memory().resolve(SEGMENT_E).is_some());

    vm.execute(resume).unwrap();
    assert_eq!(vm.status(), ScriptStatus::Exited);
    assert_eq!(vm.register(), 5);
    assert!(vm.stack().is_empty());
    assert_eq!(vm.memory().available(), before);
    assert_eq!(vm.memory().resolve(SEGMENT_E), None);
}

#[test]
fn failed_execute_load_continues_without_a_scope() {
    let mut vm = vm_with(VmConfig::default(), vec![0; 0x20], TokenTable::new());
    let seen = record(&vm);
    let before = vm.memory().available();

    let mut main = narrow();
    main.execute(0x0E, 0x10, 0x400, SEGMENT_E)
        .set_register(2)
        .exit();
    let start = load(&mut vm, main.finish().unwrap());

    vm.execute(start).unwrap();
    assert_eq!(vm.status(), ScriptStatus::Exited);
    assert_eq!(vm.register(), 2);
    assert!(vm.stack().is_empty());
    assert_eq!(vm.memory().available(), before);
    assert!(seen.lock().iter().any(|d| matches!(
        d,
        Diagnostic::ContentLoadFailed {
            opcode: Opcode::Execute,
            ..
        }
    )));
}

#[test]
fn exit_and_execute_replaces_the_current_scope() {
    let second = segment_script(0x0E, |b| {
        b.set_register(8).exit();
    });
    let (mut image, mut ranges) = image(&[second.as_slice()]);
    let first = segment_script(0x0E, |b| {
        b.exit_and_execute(0x0E, ranges[0].0, ranges[0].1, SEGMENT_E);
    });
    let first_start = image.len() as u32;
    image.extend_from_slice(&first);
    ranges.push((first_start, image.len() as u32));

    let mut vm = vm_with(VmConfig::default(), image, TokenTable::new());
    let before = vm.memory().available();
    let mut main = narrow();
    main.execute(0x0E, ranges[1].0, ranges[1].1, SEGMENT_E).exit();
    let start = load(&mut vm, main.finish().unwrap());

    vm.execute(start).unwrap();
    assert_eq!(vm.status(), ScriptStatus::Exited);
    assert_eq!(vm.register(), 8);
    assert!(vm.stack().is_empty());
    assert_eq!(vm.memory().available(), before);
}

#[test]
fn exit_and_execute_discards_frames_of_the_replaced_scope() {
    let second = segment_script(0x0E, |b| {
        b.set_register(4).exit();
    });
    let (mut image, mut ranges) = image(&[second.as_slice()]);
    let first = segment_script(0x0E, |b| {
        b.loop_begin()
            .loop_begin_count(3)
            .exit_and_execute(0x0E, ranges[0].0, ranges[0].1, SEGMENT_E);
    });
    let first_start = image.len() as u32;
    image.extend_from_slice(&first);
    ranges.push((first_start, image.len() as u32));

    let mut vm = vm_with(VmConfig::default(), image, TokenTable::new());
    let mut main = narrow();
    main.execute(0x0E, ranges[1].0, ranges[1].1, SEGMENT_E)
        .set_register(9)
        .exit();
    let start = load(&mut vm, main.finish().unwrap());

    vm.execute(start).unwrap();
    assert_eq!(vm.status(), ScriptStatus::Exited);
    assert_eq!(vm.register(), 9);
    assert!(vm.stack().is_empty());
}

#[test]
fn compressed_segments_are_decoded_before_running() {
    let sub = segment_script(0x07, |b| {
        b.set_register(12).ret();
    });
    let compressed = mio0_literals(&sub);
    let (image, ranges) = image(&[compressed.as_slice()]);
    let mut vm = vm_with(VmConfig::default(), image, TokenTable::new());
    let before = vm.memory().available();

    let mut main = narrow();
    main.load_compressed(0x07, ranges[0].0, ranges[0].1)
        .jump_link(SegmentedAddress::from_raw(0x0700_0000))
        .exit();
    let start = load(&mut vm, main.finish().unwrap());

    vm.execute(start).unwrap();
    assert_eq!(vm.register(), 12);
    assert_eq!(vm.memory().available(), before - sub.len());
}

#[test]
fn pool_checkpoints_release_raw_segments() {
    let data = [0xAAu8; 0x30];
    let (image, ranges) = image(&[&data[..]]);
    let mut vm = vm_with(VmConfig::default(), image, TokenTable::new());
    let before = vm.memory().available();
    let address = SegmentedAddress::from_raw(0x0800_0000);

    let mut main = narrow();
    main.push_pool()
        .load_raw(0x08, ranges[0].0, ranges[0].1)
        .sleep(1)
        .pop_pool()
        .exit();
    let start = load(&mut vm, main.finish().unwrap());

    let resume = vm.execute(start).unwrap();
    assert!(vm.memory().resolve(address).is_some());
    assert_eq!(vm.memory().available(), before - data.len());

    vm.execute(resume).unwrap();
    assert_eq!(vm.memory().resolve(address), None);
    assert_eq!(vm.memory().available(), before);
}

#[test]
fn popping_without_a_checkpoint_is_reported() {
    let mut vm = vm_with(VmConfig::default(), Vec::new(), TokenTable::new());
    let seen = record(&vm);
    let mut main = narrow();
    main.pop_pool().exit();
    let start = load(&mut vm, main.finish().unwrap());

    vm.execute(start).unwrap();
    assert_eq!(vm.status(), ScriptStatus::Exited);
    assert!(seen.lock().contains(&Diagnostic::PoolUnderflow {
        opcode: Opcode::PopPool
    }));
}

#[test]
fn fixed_loads_outlive_checkpoints() {
    let sub = segment_script(0x09, |b| {
        b.set_register(3).ret();
    });
    let (image, ranges) = image(&[sub.as_slice()]);
    let mut vm = vm_with(VmConfig::default(), image, TokenTable::new());
    let fixed = SegmentedAddress::from_raw(0x0900_0000);

    let mut main = narrow();
    main.push_pool()
        .load_fixed(fixed, ranges[0].0, ranges[0].1)
        .pop_pool()
        .jump_link(fixed)
        .exit();
    let start = load(&mut vm, main.finish().unwrap());

    vm.execute(start).unwrap();
    assert_eq!(vm.status(), ScriptStatus::Exited);
    assert_eq!(vm.register(), 3);
}

#[test]
fn out_of_range_segment_numbers_are_reported_unchanged() {
    let (image, ranges) = image(&[&[0u8; 0x10][..]]);
    let mut vm = vm_with(VmConfig::default(), image, TokenTable::new());
    let seen = record(&vm);
    let (start, end) = ranges[0];

    let mut main = narrow();
    main.emit(
        Opcode::LoadRaw,
        &[
            Field::I16(2, -2),
            Field::Ptr(4, u64::from(start)),
            Field::Ptr(8, u64::from(end)),
        ],
    )
    .exit();
    let start = load(&mut vm, main.finish().unwrap());

    vm.execute(start).unwrap();
    assert_eq!(vm.status(), ScriptStatus::Exited);
    assert!(seen.lock().contains(&Diagnostic::ContentLoadFailed {
        opcode: Opcode::LoadRaw,
        reason: MemoryError::InvalidSegment(-2).to_string(),
    }));
}
