// Interpreter control flow: exit, calls, loops, conditionals, sleeping and faults.

mod support;

use levelscript::bytecode::{ComparisonOp, ScriptPtr};
use levelscript::vm::{StackFault, STACK_SLOTS};
use levelscript::{Diagnostic, ScriptStatus, VmConfig, VmFault};

use support::{counting_host, load, narrow, record, vm};

#[test]
fn exit_only_script_is_idempotent() {
    let mut vm = vm();
    let mut builder = narrow();
    builder.exit();
    let start = load(&mut vm, builder.finish().unwrap());
    vm.set_register(7);

    for _ in 0..3 {
        let resume = vm.execute(start).unwrap();
        assert_eq!(resume, start);
        assert_eq!(vm.status(), ScriptStatus::Exited);
        assert_eq!(vm.register(), 7);
        assert!(vm.stack().is_empty());
    }
}

/// Builds `JUMP_LINK` chains `depth` deep with a one-frame sleep at the bottom.
fn nested_calls(depth: usize) -> Vec<u8> {
    let mut builder = narrow();
    let levels: Vec<_> = (0..depth).map(|_| builder.new_label()).collect();
    builder.jump_link(levels[0]).exit();
    for (index, label) in levels.iter().enumerate() {
        builder.bind(*label).unwrap();
        match levels.get(index + 1) {
            Some(next) => builder.jump_link(*next).ret(),
            None => builder.sleep(1).ret(),
        };
    }
    builder.finish().unwrap()
}

#[test]
fn call_depth_is_restored_after_nested_returns() {
    for depth in [1, 2, 8, STACK_SLOTS] {
        let mut vm = vm();
        let start = load(&mut vm, nested_calls(depth));

        let resume = vm.execute(start).unwrap();
        assert_eq!(vm.status(), ScriptStatus::Paused);
        assert_eq!(vm.stack().depth(), depth, "depth {depth} while sleeping");

        vm.execute(resume).unwrap();
        assert_eq!(vm.status(), ScriptStatus::Exited);
        assert!(vm.stack().is_empty(), "depth {depth} after returning");
    }
}

#[test]
fn overflowing_call_faults_with_stack_unchanged() {
    let mut vm = vm();
    let start = load(&mut vm, nested_calls(STACK_SLOTS + 1));

    let fault = vm.execute(start).unwrap_err();
    assert_eq!(
        fault,
        VmFault::Stack(StackFault::Overflow {
            capacity: STACK_SLOTS,
            requested: STACK_SLOTS + 1
        })
    );
    assert_eq!(vm.stack().depth(), STACK_SLOTS);
    assert_eq!(vm.status(), ScriptStatus::Paused);
    assert!(vm.cursor().is_some());
}

#[test]
fn return_without_call_is_a_stack_fault() {
    let mut vm = vm();
    let mut builder = narrow();
    builder.ret();
    let start = load(&mut vm, builder.finish().unwrap());

    let fault = vm.execute(start).unwrap_err();
    assert_eq!(fault, VmFault::Stack(StackFault::Underflow));
    assert_eq!(vm.cursor(), Some(start));
    assert!(vm.stack().is_empty());
}

fn counted_loop(count: i16) -> u32 {
    let mut vm = vm();
    let calls = counting_host(&mut vm, 1);
    let mut builder = narrow();
    builder.loop_begin_count(count).call(0, 1).loop_repeat().exit();
    let start = load(&mut vm, builder.finish().unwrap());
    vm.execute(start).unwrap();
    assert_eq!(vm.status(), ScriptStatus::Exited);
    assert!(vm.stack().is_empty());
    let total = *calls.lock();
    total
}

#[test]
fn counted_loops_run_their_body_count_times() {
    assert_eq!(counted_loop(3), 3);
    assert_eq!(counted_loop(1), 1);
    assert_eq!(counted_loop(0), 1);
    assert_eq!(counted_loop(-4), 1);
}

#[test]
fn loop_until_repeats_until_condition_holds() {
    let mut vm = vm();
    let calls = counting_host(&mut vm, 1);
    let mut builder = narrow();
    builder
        .set_register(0)
        .loop_begin()
        .call(0, 1)
        .loop_until(ComparisonOp::GreaterEqual, 5)
        .exit();
    let start = load(&mut vm, builder.finish().unwrap());

    vm.execute(start).unwrap();
    assert_eq!(vm.register(), 5);
    assert_eq!(*calls.lock(), 5);
    assert!(vm.stack().is_empty());
}

#[test]
fn loop_terminator_does_not_consume_return_frame() {
    let mut vm = vm();
    let mut builder = narrow();
    let body = builder.new_label();
    builder.jump_link(body).exit();
    builder.bind(body).unwrap();
    builder.loop_repeat();
    let start = load(&mut vm, builder.finish().unwrap());

    let fault = vm.execute(start).unwrap_err();
    assert!(matches!(
        fault,
        VmFault::Stack(StackFault::FrameMismatch { .. })
    ));
    assert_eq!(vm.stack().depth(), 1);
}

fn jump_taken(register: i32, op: ComparisonOp, literal: i32) -> bool {
    let mut vm = vm();
    vm.set_register(register);
    let mut builder = narrow();
    let taken = builder.new_label();
    builder.jump_if(op, literal, taken).set_register(0).exit();
    builder.bind(taken).unwrap();
    builder.set_register(1).exit();
    let start = load(&mut vm, builder.finish().unwrap());
    vm.execute(start).unwrap();
    vm.register() == 1
}

#[test]
fn conditional_jumps_follow_comparison_semantics() {
    let values = [-3, 0, 1, 6, 7];
    for op in ComparisonOp::ALL {
        for register in values {
            for literal in values {
                assert_eq!(
                    jump_taken(register, op, literal),
                    op.evaluate(register, literal),
                    "{register} {} {literal}",
                    op.symbol()
                );
            }
        }
    }
}

#[test]
fn skip_if_steps_over_skip_runs_when_false() {
    let mut vm = vm();
    vm.set_register(2);
    let mut builder = narrow();
    builder
        .skip_if(ComparisonOp::Equal, 9)
        .skip_nop()
        .skip_nop()
        .set_register(40)
        .exit();
    let start = load(&mut vm, builder.finish().unwrap());
    vm.execute(start).unwrap();
    assert_eq!(vm.register(), 2);
    assert_eq!(vm.status(), ScriptStatus::Exited);
}

#[test]
fn skip_if_true_runs_following_command() {
    let mut vm = vm();
    vm.set_register(9);
    let mut builder = narrow();
    builder
        .skip_if(ComparisonOp::Equal, 9)
        .set_register(40)
        .exit();
    let start = load(&mut vm, builder.finish().unwrap());
    vm.execute(start).unwrap();
    assert_eq!(vm.register(), 40);
}

#[test]
fn skip_jumps_past_the_next_command() {
    let mut vm = vm();
    let mut builder = narrow();
    builder.set_register(1).skip().set_register(2).exit();
    let start = load(&mut vm, builder.finish().unwrap());
    vm.execute(start).unwrap();
    assert_eq!(vm.register(), 1);
}

#[test]
fn sleep_resumes_across_execute_calls() {
    let mut vm = vm();
    let mut builder = narrow();
    builder.sleep(3).set_register(5).exit();
    let start = load(&mut vm, builder.finish().unwrap());

    let mut cursor = start;
    for _ in 0..3 {
        cursor = vm.execute(cursor).unwrap();
        assert_eq!(cursor, start);
        assert_eq!(vm.status(), ScriptStatus::Paused);
        assert_eq!(vm.register(), 0);
    }
    vm.execute(cursor).unwrap();
    assert_eq!(vm.status(), ScriptStatus::Exited);
    assert_eq!(vm.register(), 5);
}

#[test]
fn sleep_before_exit_uses_secondary_pause() {
    let mut vm = vm();
    let mut builder = narrow();
    builder.sleep_before_exit(1).exit();
    let start = load(&mut vm, builder.finish().unwrap());

    let resume = vm.execute(start).unwrap();
    assert_eq!(vm.status(), ScriptStatus::PausedSecondary);
    assert_eq!(vm.context().delay_secondary, 1);
    vm.execute(resume).unwrap();
    assert_eq!(vm.status(), ScriptStatus::Exited);
}

#[test]
fn non_positive_sleep_continues_immediately() {
    let mut vm = vm();
    let mut builder = narrow();
    builder.sleep(0).sleep(-2).set_register(3).exit();
    let start = load(&mut vm, builder.finish().unwrap());
    vm.execute(start).unwrap();
    assert_eq!(vm.status(), ScriptStatus::Exited);
    assert_eq!(vm.register(), 3);
}

#[test]
fn call_loop_holds_until_function_returns_nonzero() {
    let mut vm = vm();
    let calls = counting_host(&mut vm, 2);
    let mut builder = narrow();
    builder.set_register(-1).call_loop(0, 2).exit();
    let start = load(&mut vm, builder.finish().unwrap());

    let held = vm.execute(start).unwrap();
    assert_eq!(held, ScriptPtr::new(start.buffer, 4));
    assert_eq!(vm.status(), ScriptStatus::Paused);
    assert_eq!(vm.register(), 0);

    vm.execute(held).unwrap();
    assert_eq!(vm.status(), ScriptStatus::Exited);
    assert_eq!(vm.register(), 1);
    assert_eq!(*calls.lock(), 2);
}

#[test]
fn unknown_host_function_is_reported_and_skipped() {
    let mut vm = vm();
    let seen = record(&vm);
    let mut builder = narrow();
    builder.set_register(4).call(0, 77).exit();
    let start = load(&mut vm, builder.finish().unwrap());

    vm.execute(start).unwrap();
    assert_eq!(vm.register(), 4);
    assert_eq!(vm.status(), ScriptStatus::Exited);
    assert!(seen
        .lock()
        .contains(&Diagnostic::UnknownHostFunction { id: 77 }));
}

#[test]
fn opcode_beyond_the_table_pauses_in_place() {
    let mut vm = vm();
    let mut builder = narrow();
    builder.set_register(1).emit_sized(0x50, 4, &[]).set_register(2);
    let start = load(&mut vm, builder.finish().unwrap());

    let resume = vm.execute(start).unwrap();
    assert_eq!(resume, ScriptPtr::new(start.buffer, 4));
    assert_eq!(vm.status(), ScriptStatus::Paused);
    assert_eq!(vm.register(), 1);
}

#[test]
fn malformed_commands_fault_without_side_effects() {
    let mut vm = vm();
    vm.set_register(11);
    let start = load(&mut vm, vec![0x0A, 0x00, 0x00, 0x00]);
    let fault = vm.execute(start).unwrap_err();
    assert_eq!(
        fault,
        VmFault::ZeroSizedCommand {
            ptr: start,
            opcode: 0x0A
        }
    );
    assert_eq!(vm.register(), 11);

    let truncated = load(&mut vm, vec![0x05, 0x08, 0x00, 0x00]);
    assert!(matches!(
        vm.execute(truncated),
        Err(VmFault::CommandOverrun { .. })
    ));
    assert!(vm.stack().is_empty());
}

#[test]
fn running_off_the_buffer_faults() {
    let mut vm = vm();
    let mut builder = narrow();
    builder.set_register(1);
    let start = load(&mut vm, builder.finish().unwrap());
    let fault = vm.execute(start).unwrap_err();
    assert_eq!(
        fault,
        VmFault::CursorOutOfBounds {
            ptr: ScriptPtr::new(start.buffer, 4)
        }
    );
}

#[test]
fn step_limit_stops_endless_scripts() {
    let config = VmConfig::default().with_step_limit(100);
    let mut vm = support::vm_with(config, Vec::new(), Default::default());
    let mut builder = narrow();
    let top = builder.new_label();
    builder.bind(top).unwrap();
    builder.jump(top);
    let start = load(&mut vm, builder.finish().unwrap());

    assert_eq!(
        vm.execute(start),
        Err(VmFault::StepLimitExceeded { limit: 100 })
    );
    assert_eq!(vm.status(), ScriptStatus::Paused);
}
