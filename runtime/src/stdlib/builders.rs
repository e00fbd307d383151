//! StringBuilder/StringBuffer (backed by a single `$sb` field), Scanner
//! stubs, the exception constructor whitelist, Objects and System.

use crate::stdlib::{
    ClassFamily, NativeCall, NativeCtx, NativeRegistry, NativeResult, arg_i64, arg_value,
    strings::java_string_hash,
};
use crate::thread::ThreadStatus;
use crate::vm::Value;

pub(super) fn do_register_builder_natives(registry: &mut NativeRegistry) {
    let sb = ClassFamily::StringBuilder;
    registry.register(sb, "<init>", sb_init);
    registry.register(sb, "append", sb_append);
    registry.register(sb, "toString", sb_to_string);
    registry.register(sb, "length", sb_length);
    registry.register(sb, "reverse", sb_reverse);
    registry.register(sb, "delete", sb_delete);
    registry.register(sb, "insert", sb_insert);
    registry.register(sb, "charAt", sb_char_at);

    let sc = ClassFamily::Scanner;
    registry.register(sc, "<init>", noop);
    registry.register_all(
        sc,
        &["nextInt", "nextLong", "nextShort", "nextByte"],
        scanner_zero,
    );
    registry.register_all(sc, &["nextDouble", "nextFloat"], scanner_zero_double);
    registry.register_all(sc, &["next", "nextLine"], scanner_empty);
    registry.register(sc, "nextBoolean", scanner_false);
    registry.register_all(
        sc,
        &[
            "hasNext",
            "hasNextInt",
            "hasNextLong",
            "hasNextDouble",
            "hasNextLine",
            "hasNextBoolean",
        ],
        scanner_false,
    );
    registry.register(sc, "close", noop);

    let e = ClassFamily::Exception;
    registry.register(e, "<init>", exception_init);
    registry.register(e, "getMessage", exception_get_message);
    registry.register(e, "getLocalizedMessage", exception_get_message);
    registry.register(e, "toString", exception_to_string);
    registry.register(e, "printStackTrace", noop);

    let o = ClassFamily::Objects;
    registry.register(o, "equals", objects_equals);
    registry.register_all(o, &["hash", "hashCode"], objects_hash);
    registry.register(o, "isNull", objects_is_null);
    registry.register(o, "nonNull", objects_non_null);
    registry.register(o, "requireNonNull", objects_require_non_null);
    registry.register(o, "toString", objects_to_string);

    let s = ClassFamily::System;
    registry.register(s, "arraycopy", system_arraycopy);
    registry.register(s, "currentTimeMillis", system_current_time_millis);
    registry.register(s, "nanoTime", system_nano_time);
    registry.register(s, "lineSeparator", system_line_separator);
    registry.register(s, "identityHashCode", objects_hash);
    registry.register(s, "getProperty", scanner_empty);
    registry.register(s, "exit", system_exit);
}

fn noop(_ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    Ok(None)
}

// ---- StringBuilder / StringBuffer ----

fn sb_text(ctx: &NativeCtx<'_>, call: &NativeCall) -> String {
    ctx.receiver_id(call)
        .and_then(|id| ctx.state.heap.get(id))
        .and_then(|o| o.field("$sb").cloned())
        .and_then(|v| ctx.string_of(&v))
        .unwrap_or_default()
}

fn sb_store(ctx: &mut NativeCtx<'_>, call: &NativeCall, text: String) {
    if let Some(object) = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get_mut(id))
    {
        object.set_field("$sb", Value::Str(text));
    }
}

fn sb_init(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let initial = call
        .args
        .first()
        .and_then(|v| ctx.string_of(v))
        .unwrap_or_default();
    sb_store(ctx, call, initial);
    Ok(None)
}

/// Returns the receiver so appends chain.
fn sb_append(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let mut text = sb_text(ctx, call);
    let value = arg_value(call, 0);
    text.push_str(&ctx.display(&value));
    sb_store(ctx, call, text);
    Ok(Some(call.receiver.clone().unwrap_or(Value::Null)))
}

fn sb_to_string(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Str(sb_text(ctx, call))))
}

fn sb_length(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Int(sb_text(ctx, call).chars().count() as i64)))
}

fn sb_reverse(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let text: String = sb_text(ctx, call).chars().rev().collect();
    sb_store(ctx, call, text);
    Ok(Some(call.receiver.clone().unwrap_or(Value::Null)))
}

fn sb_delete(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let chars: Vec<char> = sb_text(ctx, call).chars().collect();
    let start = arg_i64(call, 0).clamp(0, chars.len() as i64) as usize;
    let end = arg_i64(call, 1).clamp(start as i64, chars.len() as i64) as usize;
    let mut text: String = chars[..start].iter().collect();
    text.extend(&chars[end..]);
    sb_store(ctx, call, text);
    Ok(Some(call.receiver.clone().unwrap_or(Value::Null)))
}

fn sb_insert(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let chars: Vec<char> = sb_text(ctx, call).chars().collect();
    let offset = arg_i64(call, 0).clamp(0, chars.len() as i64) as usize;
    let inserted = {
        let value = arg_value(call, 1);
        ctx.display(&value)
    };
    let mut text: String = chars[..offset].iter().collect();
    text.push_str(&inserted);
    text.extend(&chars[offset..]);
    sb_store(ctx, call, text);
    Ok(Some(call.receiver.clone().unwrap_or(Value::Null)))
}

fn sb_char_at(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let index = arg_i64(call, 0);
    let c = usize::try_from(index)
        .ok()
        .and_then(|i| sb_text(ctx, call).chars().nth(i))
        .unwrap_or('\0');
    Ok(Some(Value::Char(c)))
}

// ---- Scanner (no stdin is attached) ----

fn scanner_zero(_ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Int(0)))
}

fn scanner_zero_double(_ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Double(0.0)))
}

fn scanner_empty(_ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Str(String::new())))
}

fn scanner_false(_ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Bool(false)))
}

// ---- exceptions ----

fn exception_init(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let message = call.args.first().cloned().unwrap_or(Value::Null);
    if let Some(object) = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get_mut(id))
    {
        object.set_field("message", message);
    }
    Ok(None)
}

fn exception_get_message(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let message = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get(id))
        .and_then(|o| o.field("message").cloned())
        .unwrap_or(Value::Null);
    Ok(Some(message))
}

fn exception_to_string(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let class = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.class_name_of(id))
        .unwrap_or("Exception")
        .to_string();
    let message = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get(id))
        .and_then(|o| o.field("message").cloned());
    let text = match message {
        Some(Value::Null) | None => class,
        Some(message) => format!("{}: {}", class, ctx.display(&message)),
    };
    Ok(Some(Value::Str(text)))
}

// ---- Objects ----

fn objects_equals(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let (a, b) = (arg_value(call, 0), arg_value(call, 1));
    let equal = match (a.object_id(), b.object_id()) {
        (Some(x), Some(y)) => x == y,
        _ => ctx.display(&a) == ctx.display(&b) && a.type_name() == b.type_name(),
    };
    Ok(Some(Value::Bool(equal)))
}

fn objects_hash(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let value = arg_value(call, 0);
    let hash = match value.object_id() {
        Some(id) => id.0 as i64,
        None => i64::from(java_string_hash(&ctx.display(&value))),
    };
    Ok(Some(Value::Int(hash)))
}

fn objects_is_null(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Bool(matches!(arg_value(call, 0), Value::Null))))
}

fn objects_non_null(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Bool(!matches!(arg_value(call, 0), Value::Null))))
}

fn objects_require_non_null(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(arg_value(call, 0)))
}

fn objects_to_string(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let value = arg_value(call, 0);
    match value {
        Value::Null if call.args.len() > 1 => Ok(Some(arg_value(call, 1))),
        other => Ok(Some(Value::Str(ctx.display(&other)))),
    }
}

// ---- System ----

fn system_arraycopy(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let src = arg_value(call, 0);
    let src_pos = arg_i64(call, 1).max(0) as usize;
    let dest = arg_value(call, 2);
    let dest_pos = arg_i64(call, 3).max(0) as usize;
    let length = arg_i64(call, 4).max(0) as usize;

    let source: Vec<Value> = src
        .object_id()
        .and_then(|id| ctx.state.heap.get(id))
        .and_then(|o| o.array_elements.clone())
        .unwrap_or_default();
    if let Some(elements) = dest
        .object_id()
        .and_then(|id| ctx.state.heap.get_mut(id))
        .and_then(|o| o.array_elements.as_mut())
    {
        for offset in 0..length {
            let (from, to) = (src_pos + offset, dest_pos + offset);
            if from < source.len() && to < elements.len() {
                elements[to] = source[from].clone();
            }
        }
    }
    Ok(None)
}

/// Wall time is simulated from the step counter.
fn system_current_time_millis(ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    let millis = ctx.state.step_number * ctx.config.sleep_step_divisor_ms;
    Ok(Some(Value::Int(millis as i64)))
}

fn system_nano_time(ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    let millis = ctx.state.step_number * ctx.config.sleep_step_divisor_ms;
    Ok(Some(Value::Int((millis as i64).saturating_mul(1_000_000))))
}

fn system_line_separator(_ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Str("\n".to_string())))
}

/// Terminates every thread; the next schedule completes the program.
fn system_exit(ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    for thread in &mut ctx.state.threads {
        thread.status = ThreadStatus::Terminated;
        thread.stack.clear();
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::VmState;
    use crate::vm::simulator::SimulatorConfig;

    fn with_ctx<R>(f: impl FnOnce(&mut NativeCtx<'_>) -> R) -> R {
        let mut state = VmState::new();
        let config = SimulatorConfig::default();
        let mut ctx = NativeCtx {
            state: &mut state,
            config: &config,
        };
        f(&mut ctx)
    }

    fn sb_call(receiver: Value, method: &str, args: Vec<Value>) -> NativeCall {
        NativeCall {
            class: "StringBuilder".to_string(),
            method: method.to_string(),
            receiver: Some(receiver),
            args,
        }
    }

    #[test]
    fn string_builder_appends_and_reverses() {
        with_ctx(|ctx| {
            let id = ctx.state.heap.alloc_object("StringBuilder", Vec::new(), 0);
            let sb = Value::Ref(id);
            sb_init(ctx, &sb_call(sb.clone(), "<init>", vec![])).unwrap();
            // append returns the receiver for chaining
            let ret = sb_append(ctx, &sb_call(sb.clone(), "append", vec![Value::Str("ab".into())]))
                .unwrap();
            assert_eq!(ret, Some(sb.clone()));
            sb_append(ctx, &sb_call(sb.clone(), "append", vec![Value::Int(3)])).unwrap();
            assert_eq!(
                sb_to_string(ctx, &sb_call(sb.clone(), "toString", vec![])).unwrap(),
                Some(Value::Str("ab3".into()))
            );
            sb_reverse(ctx, &sb_call(sb.clone(), "reverse", vec![])).unwrap();
            assert_eq!(
                sb_to_string(ctx, &sb_call(sb, "toString", vec![])).unwrap(),
                Some(Value::Str("3ba".into()))
            );
        });
    }

    #[test]
    fn exception_records_its_message() {
        with_ctx(|ctx| {
            let id = ctx
                .state
                .heap
                .alloc_object("IllegalStateException", Vec::new(), 0);
            let ex = Value::Ref(id);
            let init = NativeCall {
                class: "IllegalStateException".into(),
                method: "<init>".into(),
                receiver: Some(ex.clone()),
                args: vec![Value::Str("boom".into())],
            };
            exception_init(ctx, &init).unwrap();
            let to_string = NativeCall {
                method: "toString".into(),
                args: vec![],
                ..init
            };
            assert_eq!(
                exception_to_string(ctx, &to_string).unwrap(),
                Some(Value::Str("IllegalStateException: boom".into()))
            );
        });
    }

    #[test]
    fn arraycopy_is_bounds_tolerant() {
        with_ctx(|ctx| {
            let src = ctx.state.heap.alloc_array_from(
                "int",
                vec![Value::Int(1), Value::Int(2), Value::Int(3)],
                0,
            );
            let dest = ctx.state.heap.alloc_array("int", 3, Value::Int(0), 0);
            let call = NativeCall {
                class: "System".into(),
                method: "arraycopy".into(),
                receiver: None,
                args: vec![
                    Value::ArrayRef {
                        id: src,
                        elem: "int".into(),
                    },
                    Value::Int(1),
                    Value::ArrayRef {
                        id: dest,
                        elem: "int".into(),
                    },
                    Value::Int(0),
                    Value::Int(5),
                ],
            };
            system_arraycopy(ctx, &call).unwrap();
            let copied = ctx.state.heap.get(dest).unwrap().array_elements.clone().unwrap();
            assert_eq!(copied, vec![Value::Int(2), Value::Int(3), Value::Int(0)]);
        });
    }
}
