use crate::compiler::CompiledProgram;
use crate::compiler::code::{Instruction, Op};
use crate::error::Fault;
use crate::interpreter::handlers::*;
use crate::rt::MethodInfo;
use crate::thread::{LocalVariable, StackFrame};
use crate::vm::simulator::SimulatorConfig;
use crate::vm::{Value, VmState};
use smallvec::SmallVec;

mod handlers;

/// Outcome of executing one instruction.
pub(crate) struct ExecOutcome {
    pub instruction: Option<Instruction>,
    pub description: String,
}

pub struct Interpreter;

impl Interpreter {
    /// Executes exactly one instruction of the active thread's top frame.
    /// Branch-like opcodes manage the pc themselves; everything else
    /// advances it by one afterwards.
    pub(crate) fn execute(
        state: &mut VmState,
        program: &CompiledProgram,
        config: &SimulatorConfig,
    ) -> Result<ExecOutcome, Fault> {
        let Some(frame) = state.cur_frame() else {
            return Ok(ExecOutcome {
                instruction: None,
                description: "no frame to execute".to_string(),
            });
        };
        let pc = frame.pc;

        // a past-the-end pc behaves like an implicit RETURN
        let Some(instruction) = program.instructions.get(pc).cloned() else {
            if let Some(thread) = state.active_mut() {
                thread.stack.pop();
            }
            return Ok(ExecOutcome {
                instruction: None,
                description: "method fell off its end".to_string(),
            });
        };

        let is_branch = instruction.op.is_branch();
        let description = match &instruction.op {
            Op::Nop => "no-op".to_string(),
            Op::Line(n) => handle_line(state, *n)?,
            Op::LoadConst(value) => handle_load_const(state, value)?,
            Op::PushNull => handle_push_null(state)?,
            Op::LoadLocal { slot, name } => handle_load_local(state, *slot, name)?,
            Op::StoreLocal { slot, name } => handle_store_local(state, *slot, name)?,
            Op::New { class } => handle_new(state, class)?,
            Op::NewArray { elem, dims } => handle_newarray(state, elem, *dims)?,
            Op::ArrayLength => handle_arraylength(state)?,
            Op::ArrayLoad => handle_arrayload(state)?,
            Op::ArrayStore => handle_arraystore(state)?,
            Op::GetField { name } => handle_getfield(state, name)?,
            Op::PutField { name } => handle_putfield(state, name)?,
            Op::GetStatic { class, name } => handle_getstatic(state, class, name)?,
            Op::PutStatic { class, name } => handle_putstatic(state, class, name)?,
            Op::Dup => handle_dup(state)?,
            Op::DupX1 => handle_dup_x1(state)?,
            Op::Pop => handle_pop(state)?,
            Op::Swap => handle_swap(state)?,
            Op::Add => handle_add(state)?,
            Op::Sub | Op::Mul | Op::Div | Op::Mod => handle_arith(state, &instruction.op)?,
            Op::Neg => handle_neg(state)?,
            Op::CmpEq | Op::CmpNe | Op::CmpLt | Op::CmpLe | Op::CmpGt | Op::CmpGe => {
                handle_compare(state, &instruction.op)?
            }
            Op::And | Op::Or => handle_logic(state, &instruction.op)?,
            Op::Not => handle_not(state)?,
            Op::Goto(target) => handle_goto(state, *target)?,
            Op::IfTrue(target) => handle_if(state, *target, true)?,
            Op::IfFalse(target) => handle_if(state, *target, false)?,
            Op::InvokeVirtual { method, argc } => {
                handle_invoke(state, config, InvokeKind::Virtual, method, *argc, None)?
            }
            Op::InvokeInterface { method, argc } => {
                handle_invoke(state, config, InvokeKind::Interface, method, *argc, None)?
            }
            Op::InvokeSpecial { method, argc } => {
                handle_invoke(state, config, InvokeKind::Special, method, *argc, None)?
            }
            Op::InvokeStatic {
                class,
                method,
                argc,
            } => handle_invoke(state, config, InvokeKind::Static, method, *argc, Some(class))?,
            Op::Return => handle_return(state)?,
            Op::ReturnValue => handle_return_value(state)?,
            Op::CheckCast { ty } => handle_checkcast(state, ty)?,
            Op::InstanceOf { ty } => handle_instanceof(state, ty)?,
            Op::LambdaCreate { info } => handle_lambda_create(state, info)?,
            Op::LambdaInvoke => "lambda invocation placeholder".to_string(),
            Op::Print { newline } => handle_print(state, *newline)?,
            Op::Throw => handle_throw(state)?,
            Op::MonitorEnter => handle_monitorenter(state)?,
            Op::MonitorExit => handle_monitorexit(state)?,
        };

        if !is_branch {
            if let Some(frame) = state.cur_frame_mut() {
                frame.pc = pc + 1;
            }
        }

        Ok(ExecOutcome {
            instruction: Some(instruction),
            description,
        })
    }
}

/// Builds an activation record for `method`: every declared local gets
/// its type default, then `this` lands in slot 0 and the arguments in
/// the following slots.
pub(crate) fn build_frame(
    state: &mut VmState,
    owner: &str,
    method: &MethodInfo,
    this: Option<Value>,
    args: Vec<Value>,
) -> StackFrame {
    let mut locals: Vec<LocalVariable> = method
        .locals
        .iter()
        .map(|slot| LocalVariable {
            name: slot.name.clone(),
            ty: slot.ty.clone(),
            value: Value::default_for_type(&slot.ty),
            slot: slot.slot,
        })
        .collect();

    let mut cursor = 0usize;
    if let Some(this) = this {
        if let Some(local) = locals.get_mut(0) {
            local.value = this;
        }
        cursor = 1;
    }
    for arg in args {
        if let Some(local) = locals.get_mut(cursor) {
            local.value = arg;
        }
        cursor += 1;
    }

    StackFrame {
        id: state.alloc_frame_id(),
        class_name: owner.to_string(),
        method_name: method.name.clone(),
        signature: method.signature.clone(),
        locals,
        operand_stack: SmallVec::new(),
        pc: method.offset.unwrap_or(usize::MAX),
        line: method.line,
        is_native: false,
        captured: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::code::Op;
    use crate::thread::{ThreadId, ThreadState, ThreadStatus};
    use std::collections::HashMap;

    fn raw_program(ops: Vec<Op>) -> CompiledProgram {
        CompiledProgram {
            classes: Vec::new(),
            main_class: String::new(),
            main_method: "main".to_string(),
            instructions: ops
                .into_iter()
                .map(|op| Instruction::new(op, 1))
                .collect(),
            method_offsets: HashMap::new(),
        }
    }

    fn bare_frame(state: &mut VmState, pc: usize) -> StackFrame {
        StackFrame {
            id: state.alloc_frame_id(),
            class_name: "T".to_string(),
            method_name: "t".to_string(),
            signature: "t()".to_string(),
            locals: Vec::new(),
            operand_stack: SmallVec::new(),
            pc,
            line: 1,
            is_native: false,
            captured: Vec::new(),
        }
    }

    /// Contended MONITORENTER parks the loser without consuming the
    /// instruction; the release retries it successfully.
    #[test]
    fn monitor_contention_blocks_then_retries() {
        let program = raw_program(vec![Op::MonitorEnter, Op::MonitorExit, Op::Return]);
        let config = crate::vm::simulator::SimulatorConfig::default();
        let mut state = VmState::new();
        let lock = state.heap.alloc_object("Object", Vec::new(), 0);

        for id in 0..2usize {
            let mut thread = ThreadState::new(ThreadId(id), format!("t{}", id));
            let mut frame = bare_frame(&mut state, 0);
            frame.push(Value::Ref(lock));
            frame.push(Value::Ref(lock));
            thread.stack.push(frame);
            state.threads.push(thread);
        }

        // t0 takes the monitor
        state.active_thread = 0;
        Interpreter::execute(&mut state, &program, &config).unwrap();
        assert_eq!(state.monitors[&lock], Some(ThreadId(0)));
        assert_eq!(state.threads[0].stack[0].pc, 1);

        // t1 blocks; same pc will be retried
        state.active_thread = 1;
        Interpreter::execute(&mut state, &program, &config).unwrap();
        assert_eq!(state.threads[1].status, ThreadStatus::Blocked);
        assert_eq!(state.threads[1].stack[0].pc, 0);
        // the operand was pushed back for the retry
        assert_eq!(state.threads[1].stack[0].operand_stack.len(), 2);

        // t0 releases, waking t1
        state.active_thread = 0;
        Interpreter::execute(&mut state, &program, &config).unwrap();
        assert_eq!(state.monitors[&lock], None);
        assert_eq!(state.threads[1].status, ThreadStatus::Runnable);

        // t1 retries and wins the monitor
        state.active_thread = 1;
        Interpreter::execute(&mut state, &program, &config).unwrap();
        assert_eq!(state.monitors[&lock], Some(ThreadId(1)));
        assert_eq!(state.threads[1].stack[0].pc, 1);
    }

    /// A pc one past the end of the vector behaves like RETURN.
    #[test]
    fn past_the_end_pc_pops_the_frame() {
        let program = raw_program(vec![Op::Nop]);
        let config = crate::vm::simulator::SimulatorConfig::default();
        let mut state = VmState::new();
        let mut thread = ThreadState::new(ThreadId(0), "main");
        let frame = bare_frame(&mut state, 1);
        thread.stack.push(frame);
        state.threads.push(thread);

        Interpreter::execute(&mut state, &program, &config).unwrap();
        assert!(state.threads[0].stack.is_empty());
    }
}
