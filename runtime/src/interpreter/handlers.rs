use crate::compiler::code::Op;
use crate::error::Fault;
use crate::interpreter::build_frame;
use crate::stdlib::{self, NativeCall, NativeCtx};
use crate::thread::{ThreadStatus, WaitTarget};
use crate::vm::simulator::SimulatorConfig;
use crate::vm::{Value, VmState};
use std::cmp::Ordering;
use tracing_log::log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InvokeKind {
    Virtual,
    Interface,
    Special,
    Static,
}

#[inline]
pub(super) fn handle_line(state: &mut VmState, line: u32) -> Result<String, Fault> {
    if let Some(frame) = state.cur_frame_mut() {
        frame.line = line;
    }
    Ok(format!("line {}", line))
}

#[inline]
pub(super) fn handle_load_const(state: &mut VmState, value: &Value) -> Result<String, Fault> {
    state.push_operand(value.clone());
    Ok(format!("push constant {}", value.literal_text()))
}

#[inline]
pub(super) fn handle_push_null(state: &mut VmState) -> Result<String, Fault> {
    state.push_operand(Value::Null);
    Ok("push null".to_string())
}

#[inline]
pub(super) fn handle_load_local(
    state: &mut VmState,
    slot: usize,
    name: &str,
) -> Result<String, Fault> {
    let value = state.cur_frame().map(|f| f.local(slot)).unwrap_or(Value::Null);
    state.push_operand(value);
    Ok(format!("load {}", name))
}

#[inline]
pub(super) fn handle_store_local(
    state: &mut VmState,
    slot: usize,
    name: &str,
) -> Result<String, Fault> {
    let value = state.pop_operand();
    let text = state.value_to_string(&value);
    if let Some(frame) = state.cur_frame_mut() {
        frame.set_local(slot, value);
    }
    Ok(format!("store {} = {}", name, text))
}

pub(super) fn handle_new(state: &mut VmState, class: &str) -> Result<String, Fault> {
    let fields = state.method_area.instance_fields_of(class);
    let step = state.step_number;
    let id = state.heap.alloc_object(class, fields, step);
    state.push_operand(Value::Ref(id));
    Ok(format!("new {}", class))
}

pub(super) fn handle_newarray(
    state: &mut VmState,
    elem: &str,
    dims: usize,
) -> Result<String, Fault> {
    let mut sizes = Vec::with_capacity(dims);
    for _ in 0..dims {
        let n = state.pop_operand().as_i64().unwrap_or(0).max(0);
        sizes.push(n as usize);
    }
    sizes.reverse();
    let id = alloc_nested_array(state, elem, &sizes);
    let elem_ty = format!("{}{}", elem, "[]".repeat(dims.saturating_sub(1)));
    state.push_operand(Value::ArrayRef { id, elem: elem_ty });
    Ok(format!("new array {}{}", elem, "[]".repeat(dims)))
}

fn alloc_nested_array(
    state: &mut VmState,
    elem: &str,
    sizes: &[usize],
) -> crate::heap::ObjectId {
    let step = state.step_number;
    match sizes {
        [] => state.heap.alloc_array(elem, 0, Value::Null, step),
        [length] => {
            let fill = Value::default_for_type(elem);
            state.heap.alloc_array(elem, *length, fill, step)
        }
        [length, rest @ ..] => {
            let child_elem = format!("{}{}", elem, "[]".repeat(rest.len() - 1));
            let children: Vec<Value> = (0..*length)
                .map(|_| {
                    let id = alloc_nested_array(state, elem, rest);
                    Value::ArrayRef {
                        id,
                        elem: child_elem.clone(),
                    }
                })
                .collect();
            let this_elem = format!("{}[]", child_elem);
            state.heap.alloc_array_from(this_elem, children, step)
        }
    }
}

#[inline]
pub(super) fn handle_arraylength(state: &mut VmState) -> Result<String, Fault> {
    let value = state.pop_operand();
    let length = value
        .object_id()
        .and_then(|id| state.heap.get(id))
        .map(|o| o.array_length())
        .unwrap_or(0);
    state.push_operand(Value::Int(length as i64));
    Ok(format!("array length {}", length))
}

#[inline]
pub(super) fn handle_arrayload(state: &mut VmState) -> Result<String, Fault> {
    let index = state.pop_operand().as_i64().unwrap_or(0);
    let array = state.pop_operand();
    let value = match array.object_id() {
        Some(id) => state.heap.array_get(id, index),
        None => Value::Null,
    };
    state.push_operand(value);
    Ok(format!("load element [{}]", index))
}

#[inline]
pub(super) fn handle_arraystore(state: &mut VmState) -> Result<String, Fault> {
    let value = state.pop_operand();
    let index = state.pop_operand().as_i64().unwrap_or(0);
    let array = state.pop_operand();
    if let Some(id) = array.object_id() {
        state.heap.array_set(id, index, value);
    }
    Ok(format!("store element [{}]", index))
}

pub(super) fn handle_getfield(state: &mut VmState, name: &str) -> Result<String, Fault> {
    let object = state.pop_operand();
    let value = match &object {
        Value::ArrayRef { id, .. } if name == "length" => {
            Value::Int(state.heap.get(*id).map(|o| o.array_length()).unwrap_or(0) as i64)
        }
        Value::Ref(id) => match state.heap.get(*id) {
            Some(o) if o.kind == crate::heap::HeapKind::Array && name == "length" => {
                Value::Int(o.array_length() as i64)
            }
            Some(o) => o.field(name).cloned().unwrap_or(Value::Null),
            None => Value::Null,
        },
        _ => Value::Null,
    };
    state.push_operand(value);
    Ok(format!("get field {}", name))
}

pub(super) fn handle_putfield(state: &mut VmState, name: &str) -> Result<String, Fault> {
    let value = state.pop_operand();
    let object = state.pop_operand();
    if let Some(target) = object.object_id().and_then(|id| state.heap.get_mut(id)) {
        target.set_field(name, value);
    }
    Ok(format!("put field {}", name))
}

pub(super) fn handle_getstatic(
    state: &mut VmState,
    class: &str,
    name: &str,
) -> Result<String, Fault> {
    let value = stdlib::static_constant(class, name)
        .or_else(|| state.method_area.get_static(class, name))
        .unwrap_or(Value::Null);
    state.push_operand(value);
    Ok(format!("get static {}.{}", class, name))
}

pub(super) fn handle_putstatic(
    state: &mut VmState,
    class: &str,
    name: &str,
) -> Result<String, Fault> {
    let value = state.pop_operand();
    state.method_area.set_static(class, name, value);
    Ok(format!("put static {}.{}", class, name))
}

#[inline]
pub(super) fn handle_dup(state: &mut VmState) -> Result<String, Fault> {
    if let Some(frame) = state.cur_frame_mut() {
        if let Some(top) = frame.operand_stack.last().cloned() {
            frame.push(top);
        }
    }
    Ok("dup".to_string())
}

#[inline]
pub(super) fn handle_dup_x1(state: &mut VmState) -> Result<String, Fault> {
    let a = state.pop_operand();
    let b = state.pop_operand();
    state.push_operand(a.clone());
    state.push_operand(b);
    state.push_operand(a);
    Ok("dup_x1".to_string())
}

#[inline]
pub(super) fn handle_pop(state: &mut VmState) -> Result<String, Fault> {
    // popping an empty stack is a no-op at statement boundaries
    if let Some(frame) = state.cur_frame_mut() {
        frame.operand_stack.pop();
    }
    Ok("pop".to_string())
}

#[inline]
pub(super) fn handle_swap(state: &mut VmState) -> Result<String, Fault> {
    let a = state.pop_operand();
    let b = state.pop_operand();
    state.push_operand(a);
    state.push_operand(b);
    Ok("swap".to_string())
}

pub(super) fn handle_add(state: &mut VmState) -> Result<String, Fault> {
    let b = state.pop_operand();
    let a = state.pop_operand();
    // string operands turn ADD into concatenation
    if matches!(a, Value::Str(_)) || matches!(b, Value::Str(_)) {
        let text = format!(
            "{}{}",
            state.value_to_string(&a),
            state.value_to_string(&b)
        );
        state.push_operand(Value::Str(text));
        return Ok("concat".to_string());
    }
    let result = if a.is_floating() || b.is_floating() {
        Value::Double(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0))
    } else {
        Value::Int(
            a.as_i64()
                .unwrap_or(0)
                .wrapping_add(b.as_i64().unwrap_or(0)),
        )
    };
    let text = state.value_to_string(&result);
    state.push_operand(result);
    Ok(format!("add -> {}", text))
}

pub(super) fn handle_arith(state: &mut VmState, op: &Op) -> Result<String, Fault> {
    let b = state.pop_operand();
    let a = state.pop_operand();
    let result = if a.is_floating() || b.is_floating() {
        let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
        let value = match op {
            Op::Sub => x - y,
            Op::Mul => x * y,
            // division by zero soft-fails to zero
            Op::Div => {
                if y == 0.0 {
                    0.0
                } else {
                    x / y
                }
            }
            Op::Mod => {
                if y == 0.0 {
                    0.0
                } else {
                    x % y
                }
            }
            _ => 0.0,
        };
        Value::Double(value)
    } else {
        let (x, y) = (a.as_i64().unwrap_or(0), b.as_i64().unwrap_or(0));
        let value = match op {
            Op::Sub => x.wrapping_sub(y),
            Op::Mul => x.wrapping_mul(y),
            // integer division truncates toward zero; zero divisors yield 0
            Op::Div => {
                if y == 0 {
                    0
                } else {
                    x.wrapping_div(y)
                }
            }
            Op::Mod => {
                if y == 0 {
                    0
                } else {
                    x.wrapping_rem(y)
                }
            }
            _ => 0,
        };
        Value::Int(value)
    };
    let text = state.value_to_string(&result);
    state.push_operand(result);
    Ok(format!("{} -> {}", op, text))
}

#[inline]
pub(super) fn handle_neg(state: &mut VmState) -> Result<String, Fault> {
    let value = state.pop_operand();
    let result = match value {
        Value::Int(n) | Value::Long(n) => Value::Int(n.wrapping_neg()),
        Value::Float(x) | Value::Double(x) => Value::Double(-x),
        other => Value::Int(-other.as_i64().unwrap_or(0)),
    };
    state.push_operand(result);
    Ok("negate".to_string())
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        _ => {
            let (x, y) = (a.as_f64()?, b.as_f64()?);
            x.partial_cmp(&y)
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Str(x), Value::Str(y)) => x == y,
        // reference equality is identity on object ids
        _ if a.object_id().is_some() || b.object_id().is_some() => {
            a.object_id() == b.object_id() && a.object_id().is_some()
        }
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

pub(super) fn handle_compare(state: &mut VmState, op: &Op) -> Result<String, Fault> {
    let b = state.pop_operand();
    let a = state.pop_operand();
    let result = match op {
        Op::CmpEq => values_equal(&a, &b),
        Op::CmpNe => !values_equal(&a, &b),
        // non-numeric, non-string comparisons yield false
        Op::CmpLt => compare_values(&a, &b) == Some(Ordering::Less),
        Op::CmpLe => matches!(
            compare_values(&a, &b),
            Some(Ordering::Less) | Some(Ordering::Equal)
        ),
        Op::CmpGt => compare_values(&a, &b) == Some(Ordering::Greater),
        Op::CmpGe => matches!(
            compare_values(&a, &b),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ),
        _ => false,
    };
    state.push_operand(Value::Bool(result));
    Ok(format!("{} -> {}", op, result))
}

pub(super) fn handle_logic(state: &mut VmState, op: &Op) -> Result<String, Fault> {
    let b = state.pop_operand();
    let a = state.pop_operand();
    let result = match (&a, &b) {
        (Value::Bool(x), Value::Bool(y)) => match op {
            Op::And => Value::Bool(*x && *y),
            _ => Value::Bool(*x || *y),
        },
        _ => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) if !a.is_floating() && !b.is_floating() => match op {
                Op::And => Value::Int(x & y),
                _ => Value::Int(x | y),
            },
            _ => Value::Bool(false),
        },
    };
    state.push_operand(result);
    Ok(format!("{}", op))
}

#[inline]
pub(super) fn handle_not(state: &mut VmState) -> Result<String, Fault> {
    let value = state.pop_operand();
    state.push_operand(Value::Bool(!value.is_truthy()));
    Ok("not".to_string())
}

#[inline]
pub(super) fn handle_goto(state: &mut VmState, target: usize) -> Result<String, Fault> {
    if let Some(frame) = state.cur_frame_mut() {
        frame.pc = target;
    }
    Ok(format!("goto {}", target))
}

#[inline]
pub(super) fn handle_if(
    state: &mut VmState,
    target: usize,
    jump_when: bool,
) -> Result<String, Fault> {
    let condition = state.pop_operand().is_truthy();
    let taken = condition == jump_when;
    if let Some(frame) = state.cur_frame_mut() {
        frame.pc = if taken { target } else { frame.pc + 1 };
    }
    Ok(format!(
        "branch {} ({})",
        if taken { "taken" } else { "not taken" },
        condition
    ))
}

pub(super) fn handle_return(state: &mut VmState) -> Result<String, Fault> {
    if let Some(thread) = state.active_mut() {
        thread.stack.pop();
    }
    Ok("return".to_string())
}

pub(super) fn handle_return_value(state: &mut VmState) -> Result<String, Fault> {
    let value = state.pop_operand();
    if let Some(thread) = state.active_mut() {
        thread.stack.pop();
    }
    let text = state.value_to_string(&value);
    if state.cur_frame().is_some() {
        state.push_operand(value);
    }
    Ok(format!("return {}", text))
}

pub(super) fn handle_checkcast(state: &mut VmState, ty: &str) -> Result<String, Fault> {
    let value = state.pop_operand();
    let converted = match ty {
        "int" | "long" | "byte" | "short" => Value::Int(value.as_i64().unwrap_or(0)),
        "float" | "double" => Value::Double(value.as_f64().unwrap_or(0.0)),
        "char" => Value::Char(
            u32::try_from(value.as_i64().unwrap_or(0))
                .ok()
                .and_then(char::from_u32)
                .unwrap_or('\0'),
        ),
        "boolean" => Value::Bool(value.is_truthy()),
        // reference casts pass through unchecked
        _ => value,
    };
    state.push_operand(converted);
    Ok(format!("cast to {}", ty))
}

pub(super) fn handle_instanceof(state: &mut VmState, ty: &str) -> Result<String, Fault> {
    let value = state.pop_operand();
    let result = match &value {
        Value::Str(_) => ty == "String" || ty == "Object" || ty == "CharSequence",
        Value::Ref(id) => match state.heap.class_name_of(*id) {
            Some(class) => {
                ty == "Object" || class == ty || state.method_area.is_subclass_of(class, ty)
            }
            None => false,
        },
        Value::ArrayRef { .. } => ty == "Object" || ty.ends_with("[]"),
        Value::LambdaRef(_) => ty == "Object",
        Value::Null => false,
        _ => false,
    };
    state.push_operand(Value::Bool(result));
    Ok(format!("instanceof {} -> {}", ty, result))
}

pub(super) fn handle_lambda_create(state: &mut VmState, info: &str) -> Result<String, Fault> {
    let step = state.step_number;
    let id = state.heap.alloc_lambda(info, step);
    state.push_operand(Value::LambdaRef(id));
    Ok(format!("create lambda {}", info))
}

pub(super) fn handle_print(state: &mut VmState, newline: bool) -> Result<String, Fault> {
    let value = state.pop_operand();
    let text = state.value_to_string(&value);
    state.append_output(&text);
    if newline {
        state.new_output_line();
    }
    Ok(format!("print \"{}\"", text))
}

pub(super) fn handle_throw(state: &mut VmState) -> Result<String, Fault> {
    let value = state.pop_operand();
    let message = match &value {
        Value::Ref(id) => {
            let class = state
                .heap
                .class_name_of(*id)
                .unwrap_or("Exception")
                .to_string();
            match state.heap.get(*id).and_then(|o| o.field("message").cloned()) {
                Some(Value::Null) | None => class,
                Some(message) => format!("{}: {}", class, state.value_to_string(&message)),
            }
        }
        other => state.value_to_string(other),
    };
    Err(Fault::new(message))
}

pub(super) fn handle_monitorenter(state: &mut VmState) -> Result<String, Fault> {
    let value = state.pop_operand();
    let Some(thread) = state.active() else {
        return Ok("no thread for monitor".to_string());
    };
    let thread_id = thread.id;
    let Some(object) = value.object_id() else {
        if let Some(frame) = state.cur_frame_mut() {
            frame.pc += 1;
        }
        return Ok("monitorenter on non-reference (skipped)".to_string());
    };

    if state.try_enter_monitor(object, thread_id) {
        if let Some(frame) = state.cur_frame_mut() {
            frame.pc += 1;
        }
        Ok(format!("monitor {} acquired", object))
    } else {
        // acquisition failed: restore the operand and retry this same
        // instruction the next time the thread is scheduled
        state.push_operand(value);
        if let Some(thread) = state.active_mut() {
            thread.status = ThreadStatus::Blocked;
            thread.wait_target = Some(WaitTarget::Monitor(object));
        }
        Ok(format!("blocked on monitor {}", object))
    }
}

pub(super) fn handle_monitorexit(state: &mut VmState) -> Result<String, Fault> {
    let value = state.pop_operand();
    let Some(thread) = state.active() else {
        return Ok("no thread for monitor".to_string());
    };
    let thread_id = thread.id;
    if let Some(object) = value.object_id() {
        state.exit_monitor(object, thread_id);
        Ok(format!("monitor {} released", object))
    } else {
        Ok("monitorexit on non-reference (skipped)".to_string())
    }
}

fn receiver_class_name(state: &VmState, receiver: &Value) -> Option<String> {
    match receiver {
        Value::Str(_) => Some("String".to_string()),
        Value::Ref(id) => state.heap.class_name_of(*id).map(str::to_string),
        Value::ArrayRef { .. } => Some("Array".to_string()),
        Value::LambdaRef(_) => Some("Lambda".to_string()),
        _ => None,
    }
}

pub(super) fn handle_invoke(
    state: &mut VmState,
    config: &SimulatorConfig,
    kind: InvokeKind,
    method: &str,
    argc: usize,
    static_class: Option<&str>,
) -> Result<String, Fault> {
    let mut args = Vec::with_capacity(argc);
    for _ in 0..argc {
        args.push(state.pop_operand());
    }
    args.reverse();
    let receiver = if kind == InvokeKind::Static {
        None
    } else {
        Some(state.pop_operand())
    };

    // advance past the call site first so the return lands after it
    if let Some(frame) = state.cur_frame_mut() {
        frame.pc += 1;
    }

    // owner-qualified names (super calls) pin where lookup starts
    let (lookup_start, bare_name) = match method.split_once('.') {
        Some((owner, name)) => (Some(owner.to_string()), name.to_string()),
        None => (None, method.to_string()),
    };

    let receiver_class = receiver
        .as_ref()
        .and_then(|r| receiver_class_name(state, r));
    let dispatch_class = static_class
        .map(str::to_string)
        .or_else(|| lookup_start.clone())
        .or_else(|| receiver_class.clone())
        .unwrap_or_default();

    let call = NativeCall {
        class: dispatch_class.clone(),
        method: bare_name.clone(),
        receiver: receiver.clone(),
        args: args.clone(),
    };
    {
        let mut ctx = NativeCtx {
            state: &mut *state,
            config,
        };
        if let Some(result) = stdlib::invoke(&mut ctx, &call) {
            let description = result?;
            return Ok(description);
        }
    }

    let start = lookup_start.or_else(|| {
        if kind == InvokeKind::Static {
            static_class.map(str::to_string)
        } else {
            receiver_class
        }
    });
    let Some(start) = start else {
        debug!("invoke {} on missing receiver, skipped", bare_name);
        return Ok(format!("call {} skipped (no receiver)", bare_name));
    };

    match state.method_area.lookup_method(&start, &bare_name, argc) {
        Some((owner, method_info)) if method_info.offset.is_some() => {
            let this = receiver;
            let frame = build_frame(state, &owner, &method_info, this, args);
            if let Some(thread) = state.active_mut() {
                thread.stack.push(frame);
            }
            Ok(format!("invoke {}.{}", owner, method_info.signature))
        }
        _ => {
            // default Object behaviour for methods the class never defined
            if let Some(value) = stdlib::object_default(state, &call) {
                state.push_operand(value);
                return Ok(format!("default Object.{}", bare_name));
            }
            debug!("method {}.{}/{} not found, skipped", start, bare_name, argc);
            Ok(format!("method {} not found (skipped)", bare_name))
        }
    }
}
