//! Thread family: construction, start/sleep/join, wait/notify and the
//! interrupt flags. Simulated threads interleave round-robin at
//! instruction granularity; sleep converts milliseconds to steps.

use crate::heap::ObjectId;
use crate::interpreter::build_frame;
use crate::stdlib::{
    ClassFamily, NativeCall, NativeCtx, NativeRegistry, NativeResult, arg_f64, arg_i64, arg_value,
};
use crate::thread::{ThreadState, ThreadStatus, WaitTarget};
use crate::vm::Value;
use tracing_log::log::debug;

pub(super) fn do_register_thread_natives(registry: &mut NativeRegistry) {
    let t = ClassFamily::Thread;
    registry.register(t, "<init>", thread_init);
    registry.register(t, "start", thread_start);
    registry.register(t, "sleep", thread_sleep);
    registry.register(t, "join", thread_join);
    registry.register(t, "getName", thread_get_name);
    registry.register(t, "setName", thread_set_name);
    registry.register(t, "getId", thread_get_id);
    registry.register(t, "getState", thread_get_state);
    registry.register(t, "isAlive", thread_is_alive);
    registry.register(t, "setPriority", thread_set_priority);
    registry.register(t, "getPriority", thread_get_priority);
    registry.register(t, "setDaemon", thread_set_daemon);
    registry.register(t, "isDaemon", thread_is_daemon);
    registry.register(t, "currentThread", thread_current_thread);
    registry.register(t, "interrupt", thread_interrupt);
    registry.register(t, "isInterrupted", thread_is_interrupted);
    registry.register(t, "interrupted", thread_interrupted_static);
    registry.register(t, "yield", thread_yield);

    // any object answers the monitor vocabulary
    let o = ClassFamily::Object;
    registry.register(o, "wait", object_wait);
    registry.register(o, "notify", object_notify);
    registry.register(o, "notifyAll", object_notify_all);
}

fn target_thread_id(ctx: &NativeCtx<'_>, object: ObjectId) -> Option<crate::thread::ThreadId> {
    ctx.state.find_thread_by_object(object).map(|t| t.id)
}

/// Records name, priority, daemon flag and status on the heap object.
fn thread_init(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let Some(id) = ctx.receiver_id(call) else {
        return Ok(None);
    };
    let mut name: Option<String> = None;
    let mut target: Option<Value> = None;
    for arg in &call.args {
        match arg {
            value @ (Value::Ref(_) | Value::LambdaRef(_)) => {
                if let Some(text) = ctx.string_of(value) {
                    name = Some(text);
                } else {
                    target = Some(value.clone());
                }
            }
            Value::Str(s) => name = Some(s.clone()),
            _ => {}
        }
    }
    let name = name.unwrap_or_else(|| format!("Thread-{}", id.0));
    if let Some(object) = ctx.state.heap.get_mut(id) {
        object.set_field("name", Value::Str(name));
        object.set_field("priority", Value::Int(5));
        object.set_field("daemon", Value::Bool(false));
        object.set_field("status", Value::Str("NEW".to_string()));
        if let Some(target) = target {
            object.set_field("$target", target);
        }
    }
    Ok(None)
}

/// Locates `run()` by walking the super chain and spawns a fresh
/// ThreadState whose stack enters it.
fn thread_start(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let Some(id) = ctx.receiver_id(call) else {
        return Ok(None);
    };
    let class = ctx
        .state
        .heap
        .class_name_of(id)
        .unwrap_or("Thread")
        .to_string();
    let name = ctx
        .state
        .heap
        .get(id)
        .and_then(|o| o.field("name").cloned())
        .and_then(|v| ctx.string_of(&v))
        .unwrap_or_else(|| format!("Thread-{}", id.0));

    let thread_id = ctx.state.next_thread_id();
    let mut thread = ThreadState::new(thread_id, name);
    thread.object_id = Some(id);
    thread.priority = ctx
        .state
        .heap
        .get(id)
        .and_then(|o| o.field("priority").and_then(|v| v.as_i64()))
        .unwrap_or(5);

    match ctx.state.method_area.lookup_method(&class, "run", 0) {
        Some((owner, method)) if method.offset.is_some() => {
            let frame = build_frame(ctx.state, &owner, &method, Some(Value::Ref(id)), Vec::new());
            thread.stack.push(frame);
        }
        _ => {
            debug!("{}.run() not found; thread will terminate immediately", class);
        }
    }

    if let Some(object) = ctx.state.heap.get_mut(id) {
        object.set_field("status", Value::Str("RUNNABLE".to_string()));
    }
    ctx.state.threads.push(thread);
    Ok(None)
}

/// Milliseconds convert to steps for visual pacing, minimum one step.
fn thread_sleep(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let millis = arg_f64(call, 0).max(0.0);
    let divisor = ctx.config.sleep_step_divisor_ms.max(1) as f64;
    let steps = ((millis / divisor).round() as u64).max(1);
    let until = ctx.state.step_number + steps;
    if let Some(thread) = ctx.state.active_mut() {
        thread.status = ThreadStatus::TimedWaiting;
        thread.sleep_until_step = Some(until);
    }
    Ok(None)
}

/// The caller waits until the target thread terminates; the scheduler
/// tick performs the release.
fn thread_join(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let Some(object) = ctx.receiver_id(call) else {
        return Ok(None);
    };
    let Some(target) = target_thread_id(ctx, object) else {
        return Ok(None);
    };
    if let Some(thread) = ctx.state.active_mut() {
        thread.status = ThreadStatus::Waiting;
        thread.wait_target = Some(WaitTarget::ThreadExit(target));
    }
    Ok(None)
}

fn thread_get_name(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let name = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get(id))
        .and_then(|o| o.field("name").cloned())
        .unwrap_or(Value::Str("main".to_string()));
    Ok(Some(name))
}

fn thread_set_name(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let name = arg_value(call, 0);
    if let Some(id) = ctx.receiver_id(call) {
        if let Some(object) = ctx.state.heap.get_mut(id) {
            object.set_field("name", name.clone());
        }
        if let Some(text) = ctx.string_of(&name) {
            if let Some(tid) = target_thread_id(ctx, id) {
                if let Some(thread) = ctx.state.thread_mut(tid) {
                    thread.name = text;
                }
            }
        }
    }
    Ok(None)
}

fn thread_get_id(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let id = ctx
        .receiver_id(call)
        .and_then(|object| target_thread_id(ctx, object))
        .map(|tid| tid.0 as i64)
        .unwrap_or(0);
    Ok(Some(Value::Int(id)))
}

fn thread_get_state(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let state = ctx
        .receiver_id(call)
        .and_then(|object| ctx.state.find_thread_by_object(object))
        .map(|t| format!("{:?}", t.status).to_uppercase())
        .or_else(|| {
            ctx.receiver_id(call)
                .and_then(|id| ctx.state.heap.get(id))
                .and_then(|o| o.field("status").cloned())
                .and_then(|v| ctx.string_of(&v))
        })
        .unwrap_or_else(|| "NEW".to_string());
    let state = match state.as_str() {
        "TIMEDWAITING" => "TIMED_WAITING".to_string(),
        other => other.to_string(),
    };
    Ok(Some(Value::Str(state)))
}

fn thread_is_alive(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let alive = ctx
        .receiver_id(call)
        .and_then(|object| ctx.state.find_thread_by_object(object))
        .map(|t| t.status != ThreadStatus::Terminated)
        .unwrap_or(false);
    Ok(Some(Value::Bool(alive)))
}

fn thread_set_priority(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let priority = arg_i64(call, 0).clamp(1, 10);
    if let Some(id) = ctx.receiver_id(call) {
        if let Some(object) = ctx.state.heap.get_mut(id) {
            object.set_field("priority", Value::Int(priority));
        }
        if let Some(tid) = target_thread_id(ctx, id) {
            if let Some(thread) = ctx.state.thread_mut(tid) {
                // stored but never used for dispatch
                thread.priority = priority;
            }
        }
    }
    Ok(None)
}

fn thread_get_priority(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let priority = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get(id))
        .and_then(|o| o.field("priority").and_then(|v| v.as_i64()))
        .unwrap_or(5);
    Ok(Some(Value::Int(priority)))
}

fn thread_set_daemon(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let daemon = arg_value(call, 0).is_truthy();
    if let Some(id) = ctx.receiver_id(call) {
        if let Some(object) = ctx.state.heap.get_mut(id) {
            object.set_field("daemon", Value::Bool(daemon));
        }
        if let Some(tid) = target_thread_id(ctx, id) {
            if let Some(thread) = ctx.state.thread_mut(tid) {
                thread.is_daemon = daemon;
            }
        }
    }
    Ok(None)
}

fn thread_is_daemon(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let daemon = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get(id))
        .and_then(|o| o.field("daemon").cloned())
        .map(|v| v.is_truthy())
        .unwrap_or(false);
    Ok(Some(Value::Bool(daemon)))
}

fn thread_current_thread(ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    let object = ctx.state.active().and_then(|t| t.object_id);
    Ok(Some(match object {
        Some(id) => Value::Ref(id),
        None => Value::Null,
    }))
}

/// Sets the flag only; sleepers keep sleeping until their timer fires.
fn thread_interrupt(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    if let Some(tid) = ctx
        .receiver_id(call)
        .and_then(|object| target_thread_id(ctx, object))
    {
        if let Some(thread) = ctx.state.thread_mut(tid) {
            thread.interrupted = true;
        }
    }
    Ok(None)
}

fn thread_is_interrupted(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let interrupted = ctx
        .receiver_id(call)
        .and_then(|object| ctx.state.find_thread_by_object(object))
        .map(|t| t.interrupted)
        .unwrap_or(false);
    Ok(Some(Value::Bool(interrupted)))
}

/// The static form reads and clears the current thread's flag.
fn thread_interrupted_static(ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    let mut interrupted = false;
    if let Some(thread) = ctx.state.active_mut() {
        interrupted = thread.interrupted;
        thread.interrupted = false;
    }
    Ok(Some(Value::Bool(interrupted)))
}

/// Rotation happens after every step anyway.
fn thread_yield(_ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    Ok(None)
}

// ---- Object monitor vocabulary ----

/// wait() parks the caller and releases the receiver's monitor if held.
fn object_wait(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let Some(object) = ctx.receiver_id(call) else {
        return Ok(None);
    };
    let holder = ctx.state.active().map(|t| (t.id, t.holds_monitor(object)));
    if let Some(thread) = ctx.state.active_mut() {
        thread.status = ThreadStatus::Waiting;
        thread.wait_target = Some(WaitTarget::Monitor(object));
    }
    if let Some((tid, true)) = holder {
        ctx.state.exit_monitor(object, tid);
    }
    Ok(None)
}

fn wake_waiters(ctx: &mut NativeCtx<'_>, object: ObjectId, all: bool) {
    for thread in &mut ctx.state.threads {
        if thread.status == ThreadStatus::Waiting
            && thread.wait_target == Some(WaitTarget::Monitor(object))
        {
            thread.status = ThreadStatus::Runnable;
            thread.wait_target = None;
            if !all {
                return;
            }
        }
    }
}

fn object_notify(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    if let Some(object) = ctx.receiver_id(call) {
        wake_waiters(ctx, object, false);
    }
    Ok(None)
}

fn object_notify_all(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    if let Some(object) = ctx.receiver_id(call) {
        wake_waiters(ctx, object, true);
    }
    Ok(None)
}
