//! Collection emulation. Lists, sets and deques keep their elements in
//! the heap object's `array_elements`; maps repurpose the field list as
//! entry storage (field name = stringified key). Iterators are synthetic
//! `$Iterator` objects holding a target and a cursor.

use crate::heap::{Field, ObjectId};
use crate::stdlib::{
    ClassFamily, NativeCall, NativeCtx, NativeRegistry, NativeResult, arg_i64, arg_value,
    ensure_elements, strings::java_string_hash,
};
use crate::vm::Value;
use rand::seq::SliceRandom;

pub(super) fn do_register_collection_natives(registry: &mut NativeRegistry) {
    let m = ClassFamily::Map;
    registry.register(m, "<init>", map_init);
    registry.register(m, "put", map_put);
    registry.register(m, "get", map_get);
    registry.register(m, "containsKey", map_contains_key);
    registry.register(m, "containsValue", map_contains_value);
    registry.register(m, "size", map_size);
    registry.register(m, "isEmpty", map_is_empty);
    registry.register(m, "remove", map_remove);
    registry.register(m, "clear", map_clear);
    registry.register(m, "getOrDefault", map_get_or_default);
    registry.register(m, "putIfAbsent", map_put_if_absent);
    registry.register(m, "entrySet", map_entry_set);
    registry.register(m, "keySet", map_key_set);
    registry.register(m, "values", map_values);
    registry.register(m, "forEach", noop);
    registry.register(m, "toString", map_to_string);

    let e = ClassFamily::MapEntry;
    registry.register(e, "getKey", entry_get_key);
    registry.register(e, "getValue", entry_get_value);
    registry.register(e, "setValue", entry_set_value);
    registry.register(e, "toString", entry_to_string);

    let s = ClassFamily::Set;
    registry.register(s, "<init>", seq_init);
    registry.register(s, "add", set_add);
    registry.register(s, "contains", seq_contains);
    registry.register(s, "remove", seq_remove_value);
    registry.register(s, "size", seq_size);
    registry.register(s, "isEmpty", seq_is_empty);
    registry.register(s, "clear", seq_clear);
    registry.register(s, "iterator", set_iterator);
    registry.register(s, "toArray", seq_to_array);
    registry.register(s, "forEach", noop);
    registry.register(s, "toString", seq_to_string);

    let l = ClassFamily::List;
    registry.register(l, "<init>", seq_init);
    registry.register(l, "add", list_add);
    registry.register(l, "addAll", list_add_all);
    registry.register(l, "get", list_get);
    registry.register(l, "set", list_set);
    registry.register(l, "remove", list_remove);
    registry.register(l, "removeAll", list_remove_all);
    registry.register(l, "retainAll", list_retain_all);
    registry.register(l, "size", seq_size);
    registry.register(l, "isEmpty", seq_is_empty);
    registry.register(l, "contains", seq_contains);
    registry.register(l, "containsAll", list_contains_all);
    registry.register(l, "indexOf", list_index_of);
    registry.register(l, "lastIndexOf", list_last_index_of);
    registry.register(l, "clear", seq_clear);
    registry.register(l, "subList", list_sub_list);
    registry.register_all(
        l,
        &["iterator", "listIterator", "descendingIterator"],
        list_iterator,
    );
    registry.register(l, "toArray", seq_to_array);
    registry.register(l, "sort", list_sort);
    registry.register(l, "reverse", list_reverse);
    registry.register(l, "stream", list_stream);
    registry.register(l, "toString", seq_to_string);
    registry.register(l, "hashCode", seq_hash_code);
    registry.register(l, "equals", seq_equals);
    registry.register(l, "forEach", noop);
    // deque, queue and stack vocabulary
    registry.register_all(l, &["addFirst", "offerFirst", "push"], deque_add_first);
    registry.register_all(
        l,
        &["addLast", "offerLast", "offer", "enqueue"],
        deque_add_last,
    );
    registry.register_all(
        l,
        &["removeFirst", "poll", "pop", "dequeue", "pollFirst"],
        deque_remove_first,
    );
    registry.register_all(l, &["removeLast", "pollLast"], deque_remove_last);
    registry.register_all(
        l,
        &["peekFirst", "peek", "element", "getFirst"],
        deque_peek_first,
    );
    registry.register_all(l, &["peekLast", "getLast"], deque_peek_last);

    let i = ClassFamily::Iterator;
    registry.register(i, "hasNext", iterator_has_next);
    registry.register(i, "next", iterator_next);
    registry.register(i, "remove", noop);

    let c = ClassFamily::Collections;
    registry.register(c, "sort", collections_sort);
    registry.register(c, "reverse", collections_reverse);
    registry.register(c, "shuffle", collections_shuffle);
    registry.register(c, "min", collections_min);
    registry.register(c, "max", collections_max);
    registry.register(c, "frequency", collections_frequency);
    registry.register(c, "fill", collections_fill);
    registry.register(c, "copy", collections_copy);
    registry.register(c, "swap", collections_swap);
    registry.register(c, "nCopies", collections_n_copies);
    registry.register_all(c, &["singleton", "singletonList"], collections_singleton);
    registry.register(c, "emptyList", collections_empty_list);
    registry.register(c, "emptySet", collections_empty_set);
    registry.register(c, "emptyMap", collections_empty_map);
    registry.register_all(
        c,
        &[
            "unmodifiableList",
            "unmodifiableSet",
            "unmodifiableMap",
            "unmodifiableCollection",
        ],
        identity,
    );
    registry.register(c, "binarySearch", collections_binary_search);
    registry.register(c, "disjoint", collections_disjoint);

    let a = ClassFamily::Arrays;
    registry.register(a, "sort", arrays_sort);
    registry.register(a, "fill", arrays_fill);
    registry.register(a, "copyOf", arrays_copy_of);
    registry.register(a, "copyOfRange", arrays_copy_of_range);
    registry.register(a, "equals", arrays_equals);
    registry.register(a, "deepEquals", arrays_deep_equals);
    registry.register_all(a, &["toString", "deepToString"], arrays_to_string);
    registry.register(a, "asList", arrays_as_list);
    registry.register(a, "binarySearch", arrays_binary_search);
    registry.register(a, "stream", identity);
}

// ---- shared helpers ----

fn noop(_ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    Ok(None)
}

fn identity(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(arg_value(call, 0)))
}

/// Stringified identity used for duplicate detection and lookups.
fn key_of(ctx: &NativeCtx<'_>, value: &Value) -> String {
    ctx.display(value)
}

fn elements_of(ctx: &NativeCtx<'_>, id: ObjectId) -> Vec<Value> {
    ctx.state
        .heap
        .get(id)
        .and_then(|o| o.array_elements.clone())
        .unwrap_or_default()
}

fn set_elements(ctx: &mut NativeCtx<'_>, id: ObjectId, elements: Vec<Value>) {
    if let Some(object) = ctx.state.heap.get_mut(id) {
        object.array_elements = Some(elements);
    }
}

/// Elements of any collection-like argument: heap sequence or array.
fn elements_of_value(ctx: &NativeCtx<'_>, value: &Value) -> Vec<Value> {
    value
        .object_id()
        .map(|id| elements_of(ctx, id))
        .unwrap_or_default()
}

fn receiver_elements(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> Option<(ObjectId, Vec<Value>)> {
    let id = ctx.receiver_id(call)?;
    ensure_elements(ctx.state, id);
    Some((id, elements_of(ctx, id)))
}

/// Numeric when every element is; otherwise lexicographic on the
/// stringified values.
fn sort_values(ctx: &NativeCtx<'_>, elements: &mut [Value]) {
    let numeric = !elements.is_empty()
        && elements
            .iter()
            .all(|e| e.as_f64().is_some() && !matches!(e, Value::Str(_)));
    if numeric {
        elements.sort_by(|a, b| {
            a.as_f64()
                .unwrap_or(0.0)
                .partial_cmp(&b.as_f64().unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    } else {
        elements.sort_by_key(|e| key_of(ctx, e));
    }
}

fn joined(ctx: &NativeCtx<'_>, elements: &[Value]) -> String {
    let parts: Vec<String> = elements.iter().map(|e| ctx.display(e)).collect();
    format!("[{}]", parts.join(", "))
}

fn make_iterator(ctx: &mut NativeCtx<'_>, class: &str, target: Value) -> Value {
    let step = ctx.step();
    let id = ctx.state.heap.alloc_object(
        class,
        vec![
            Field::new("$target", target),
            Field::new("$index", Value::Int(0)),
        ],
        step,
    );
    Value::Ref(id)
}

fn alloc_sequence(ctx: &mut NativeCtx<'_>, class: &str, elements: Vec<Value>) -> Value {
    let step = ctx.step();
    let id = ctx.state.heap.alloc_object(class, Vec::new(), step);
    if let Some(object) = ctx.state.heap.get_mut(id) {
        object.array_elements = Some(elements);
    }
    Value::Ref(id)
}

// ---- map family ----

fn map_init(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    if let Some(id) = ctx.receiver_id(call) {
        if let Some(object) = ctx.state.heap.get_mut(id) {
            object.fields.clear();
        }
    }
    Ok(None)
}

fn map_put(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let Some(id) = ctx.receiver_id(call) else {
        return Ok(Some(Value::Null));
    };
    let key = key_of(ctx, &arg_value(call, 0));
    let value = arg_value(call, 1);
    let previous = ctx
        .state
        .heap
        .get(id)
        .and_then(|o| o.field(&key).cloned())
        .unwrap_or(Value::Null);
    if let Some(object) = ctx.state.heap.get_mut(id) {
        object.set_field(&key, value);
    }
    Ok(Some(previous))
}

fn map_get(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let key = key_of(ctx, &arg_value(call, 0));
    let value = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get(id))
        .and_then(|o| o.field(&key).cloned())
        .unwrap_or(Value::Null);
    Ok(Some(value))
}

fn map_contains_key(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let key = key_of(ctx, &arg_value(call, 0));
    let present = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get(id))
        .map(|o| o.field(&key).is_some())
        .unwrap_or(false);
    Ok(Some(Value::Bool(present)))
}

fn map_contains_value(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let wanted = key_of(ctx, &arg_value(call, 0));
    let present = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get(id))
        .map(|o| o.fields.iter().any(|f| key_of(ctx, &f.value) == wanted))
        .unwrap_or(false);
    Ok(Some(Value::Bool(present)))
}

fn map_size(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let size = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get(id))
        .map(|o| o.fields.iter().filter(|f| !f.name.starts_with('$')).count())
        .unwrap_or(0);
    Ok(Some(Value::Int(size as i64)))
}

fn map_is_empty(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let Some(Value::Int(size)) = map_size(ctx, call)? else {
        return Ok(Some(Value::Bool(true)));
    };
    Ok(Some(Value::Bool(size == 0)))
}

fn map_remove(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let key = key_of(ctx, &arg_value(call, 0));
    let removed = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get_mut(id))
        .and_then(|o| o.remove_field(&key))
        .unwrap_or(Value::Null);
    Ok(Some(removed))
}

fn map_clear(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    if let Some(object) = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get_mut(id))
    {
        object.fields.clear();
    }
    Ok(None)
}

fn map_get_or_default(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let found = map_get(ctx, call)?;
    match found {
        Some(Value::Null) => Ok(Some(arg_value(call, 1))),
        other => Ok(other),
    }
}

fn map_put_if_absent(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let key = key_of(ctx, &arg_value(call, 0));
    let Some(id) = ctx.receiver_id(call) else {
        return Ok(Some(Value::Null));
    };
    let existing = ctx.state.heap.get(id).and_then(|o| o.field(&key).cloned());
    match existing {
        Some(value) => Ok(Some(value)),
        None => {
            let value = arg_value(call, 1);
            if let Some(object) = ctx.state.heap.get_mut(id) {
                object.set_field(&key, value);
            }
            Ok(Some(Value::Null))
        }
    }
}

/// Materialises synthetic `$MapEntry` objects, one per entry.
fn map_entry_set(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let Some(id) = ctx.receiver_id(call) else {
        return Ok(Some(Value::Null));
    };
    let entries: Vec<(String, Value)> = ctx
        .state
        .heap
        .get(id)
        .map(|o| {
            o.fields
                .iter()
                .filter(|f| !f.name.starts_with('$'))
                .map(|f| (f.name.clone(), f.value.clone()))
                .collect()
        })
        .unwrap_or_default();
    let step = ctx.step();
    let mut refs = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let entry = ctx.state.heap.alloc_object(
            "$MapEntry",
            vec![
                Field::new("key", Value::Str(key)),
                Field::new("value", value),
            ],
            step,
        );
        refs.push(Value::Ref(entry));
    }
    Ok(Some(alloc_sequence(ctx, "LinkedHashSet", refs)))
}

fn map_key_set(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let keys: Vec<Value> = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get(id))
        .map(|o| {
            o.fields
                .iter()
                .filter(|f| !f.name.starts_with('$'))
                .map(|f| Value::Str(f.name.clone()))
                .collect()
        })
        .unwrap_or_default();
    Ok(Some(alloc_sequence(ctx, "LinkedHashSet", keys)))
}

fn map_values(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let values: Vec<Value> = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get(id))
        .map(|o| {
            o.fields
                .iter()
                .filter(|f| !f.name.starts_with('$'))
                .map(|f| f.value.clone())
                .collect()
        })
        .unwrap_or_default();
    Ok(Some(alloc_sequence(ctx, "ArrayList", values)))
}

fn map_to_string(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let parts: Vec<String> = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get(id))
        .map(|o| {
            o.fields
                .iter()
                .filter(|f| !f.name.starts_with('$'))
                .map(|f| format!("{}={}", f.name, ctx.display(&f.value)))
                .collect()
        })
        .unwrap_or_default();
    Ok(Some(Value::Str(format!("{{{}}}", parts.join(", ")))))
}

// ---- map entries ----

fn entry_field(ctx: &NativeCtx<'_>, call: &NativeCall, name: &str) -> Value {
    call.receiver
        .as_ref()
        .and_then(|r| r.object_id())
        .and_then(|id| ctx.state.heap.get(id))
        .and_then(|o| o.field(name).cloned())
        .unwrap_or(Value::Null)
}

fn entry_get_key(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(entry_field(ctx, call, "key")))
}

fn entry_get_value(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(entry_field(ctx, call, "value")))
}

fn entry_set_value(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let previous = entry_field(ctx, call, "value");
    let value = arg_value(call, 0);
    if let Some(object) = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get_mut(id))
    {
        object.set_field("value", value);
    }
    Ok(Some(previous))
}

fn entry_to_string(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let key = entry_field(ctx, call, "key");
    let value = entry_field(ctx, call, "value");
    Ok(Some(Value::Str(format!(
        "{}={}",
        ctx.display(&key),
        ctx.display(&value)
    ))))
}

// ---- shared sequence (list/set) ----

fn seq_init(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let Some(id) = ctx.receiver_id(call) else {
        return Ok(None);
    };
    // copy constructor when another collection is handed in
    let initial = call
        .args
        .first()
        .map(|source| elements_of_value(ctx, source))
        .unwrap_or_default();
    set_elements(ctx, id, initial);
    Ok(None)
}

fn seq_size(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let size = ctx
        .receiver_id(call)
        .map(|id| elements_of(ctx, id).len())
        .unwrap_or(0);
    Ok(Some(Value::Int(size as i64)))
}

fn seq_is_empty(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let size = ctx
        .receiver_id(call)
        .map(|id| elements_of(ctx, id).len())
        .unwrap_or(0);
    Ok(Some(Value::Bool(size == 0)))
}

fn seq_contains(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let wanted = key_of(ctx, &arg_value(call, 0));
    let present = ctx
        .receiver_id(call)
        .map(|id| {
            elements_of(ctx, id)
                .iter()
                .any(|e| key_of(ctx, e) == wanted)
        })
        .unwrap_or(false);
    Ok(Some(Value::Bool(present)))
}

fn seq_remove_value(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let wanted = key_of(ctx, &arg_value(call, 0));
    let Some((id, mut elements)) = receiver_elements(ctx, call) else {
        return Ok(Some(Value::Bool(false)));
    };
    let before = elements.len();
    if let Some(at) = elements.iter().position(|e| key_of(ctx, e) == wanted) {
        elements.remove(at);
    }
    let removed = elements.len() != before;
    set_elements(ctx, id, elements);
    Ok(Some(Value::Bool(removed)))
}

fn seq_clear(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    if let Some(id) = ctx.receiver_id(call) {
        set_elements(ctx, id, Vec::new());
    }
    Ok(None)
}

fn seq_to_array(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let elements = ctx
        .receiver_id(call)
        .map(|id| elements_of(ctx, id))
        .unwrap_or_default();
    let step = ctx.step();
    let id = ctx.state.heap.alloc_array_from("Object", elements, step);
    Ok(Some(Value::ArrayRef {
        id,
        elem: "Object".to_string(),
    }))
}

fn seq_to_string(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let elements = ctx
        .receiver_id(call)
        .map(|id| elements_of(ctx, id))
        .unwrap_or_default();
    Ok(Some(Value::Str(joined(ctx, &elements))))
}

fn seq_hash_code(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let elements = ctx
        .receiver_id(call)
        .map(|id| elements_of(ctx, id))
        .unwrap_or_default();
    let mut hash: i32 = 1;
    for element in &elements {
        hash = hash
            .wrapping_mul(31)
            .wrapping_add(java_string_hash(&key_of(ctx, element)));
    }
    Ok(Some(Value::Int(i64::from(hash))))
}

fn seq_equals(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let ours = ctx
        .receiver_id(call)
        .map(|id| elements_of(ctx, id))
        .unwrap_or_default();
    let theirs = elements_of_value(ctx, &arg_value(call, 0));
    let equal = ours.len() == theirs.len()
        && ours
            .iter()
            .zip(theirs.iter())
            .all(|(a, b)| key_of(ctx, a) == key_of(ctx, b));
    Ok(Some(Value::Bool(equal)))
}

// ---- set specifics ----

fn set_add(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let value = arg_value(call, 0);
    let key = key_of(ctx, &value);
    let Some((id, mut elements)) = receiver_elements(ctx, call) else {
        return Ok(Some(Value::Bool(false)));
    };
    // duplicates are rejected by stringified identity
    if elements.iter().any(|e| key_of(ctx, e) == key) {
        return Ok(Some(Value::Bool(false)));
    }
    elements.push(value);
    set_elements(ctx, id, elements);
    Ok(Some(Value::Bool(true)))
}

fn set_iterator(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let target = call.receiver.clone().unwrap_or(Value::Null);
    Ok(Some(make_iterator(ctx, "$SetIterator", target)))
}

// ---- list specifics ----

fn list_add(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let Some((id, mut elements)) = receiver_elements(ctx, call) else {
        return Ok(Some(Value::Bool(false)));
    };
    if call.args.len() >= 2 {
        // positional insert
        let index = (arg_i64(call, 0).max(0) as usize).min(elements.len());
        elements.insert(index, arg_value(call, 1));
        set_elements(ctx, id, elements);
        return Ok(None);
    }
    elements.push(arg_value(call, 0));
    set_elements(ctx, id, elements);
    Ok(Some(Value::Bool(true)))
}

fn list_add_all(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let incoming = elements_of_value(ctx, &arg_value(call, 0));
    let Some((id, mut elements)) = receiver_elements(ctx, call) else {
        return Ok(Some(Value::Bool(false)));
    };
    let changed = !incoming.is_empty();
    elements.extend(incoming);
    set_elements(ctx, id, elements);
    Ok(Some(Value::Bool(changed)))
}

fn list_get(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let index = arg_i64(call, 0);
    let value = ctx
        .receiver_id(call)
        .map(|id| elements_of(ctx, id))
        .and_then(|e| usize::try_from(index).ok().and_then(|i| e.get(i).cloned()))
        .unwrap_or(Value::Null);
    Ok(Some(value))
}

fn list_set(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let index = arg_i64(call, 0);
    let value = arg_value(call, 1);
    let Some((id, mut elements)) = receiver_elements(ctx, call) else {
        return Ok(Some(Value::Null));
    };
    let previous = match usize::try_from(index).ok().filter(|i| *i < elements.len()) {
        Some(i) => std::mem::replace(&mut elements[i], value),
        None => Value::Null,
    };
    set_elements(ctx, id, elements);
    Ok(Some(previous))
}

/// `remove(int)` removes positionally; `remove(value)` by equality.
fn list_remove(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    match call.args.first() {
        Some(Value::Int(index)) => {
            let Some((id, mut elements)) = receiver_elements(ctx, call) else {
                return Ok(Some(Value::Null));
            };
            let removed = match usize::try_from(*index).ok().filter(|i| *i < elements.len()) {
                Some(i) => elements.remove(i),
                None => Value::Null,
            };
            set_elements(ctx, id, elements);
            Ok(Some(removed))
        }
        _ => seq_remove_value(ctx, call),
    }
}

fn list_remove_all(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let gone: Vec<String> = elements_of_value(ctx, &arg_value(call, 0))
        .iter()
        .map(|e| key_of(ctx, e))
        .collect();
    let Some((id, mut elements)) = receiver_elements(ctx, call) else {
        return Ok(Some(Value::Bool(false)));
    };
    let before = elements.len();
    elements.retain(|e| !gone.contains(&key_of(ctx, e)));
    let changed = elements.len() != before;
    set_elements(ctx, id, elements);
    Ok(Some(Value::Bool(changed)))
}

fn list_retain_all(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let kept: Vec<String> = elements_of_value(ctx, &arg_value(call, 0))
        .iter()
        .map(|e| key_of(ctx, e))
        .collect();
    let Some((id, mut elements)) = receiver_elements(ctx, call) else {
        return Ok(Some(Value::Bool(false)));
    };
    let before = elements.len();
    elements.retain(|e| kept.contains(&key_of(ctx, e)));
    let changed = elements.len() != before;
    set_elements(ctx, id, elements);
    Ok(Some(Value::Bool(changed)))
}

fn list_contains_all(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let ours: Vec<String> = ctx
        .receiver_id(call)
        .map(|id| elements_of(ctx, id))
        .unwrap_or_default()
        .iter()
        .map(|e| key_of(ctx, e))
        .collect();
    let all = elements_of_value(ctx, &arg_value(call, 0))
        .iter()
        .all(|e| ours.contains(&key_of(ctx, e)));
    Ok(Some(Value::Bool(all)))
}

fn list_index_of(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let wanted = key_of(ctx, &arg_value(call, 0));
    let index = ctx
        .receiver_id(call)
        .map(|id| elements_of(ctx, id))
        .and_then(|e| e.iter().position(|v| key_of(ctx, v) == wanted))
        .map(|i| i as i64)
        .unwrap_or(-1);
    Ok(Some(Value::Int(index)))
}

fn list_last_index_of(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let wanted = key_of(ctx, &arg_value(call, 0));
    let index = ctx
        .receiver_id(call)
        .map(|id| elements_of(ctx, id))
        .and_then(|e| e.iter().rposition(|v| key_of(ctx, v) == wanted))
        .map(|i| i as i64)
        .unwrap_or(-1);
    Ok(Some(Value::Int(index)))
}

fn list_sub_list(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let elements = ctx
        .receiver_id(call)
        .map(|id| elements_of(ctx, id))
        .unwrap_or_default();
    let from = arg_i64(call, 0).clamp(0, elements.len() as i64) as usize;
    let to = arg_i64(call, 1).clamp(from as i64, elements.len() as i64) as usize;
    let slice = elements[from..to].to_vec();
    Ok(Some(alloc_sequence(ctx, "ArrayList", slice)))
}

fn list_iterator(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let target = call.receiver.clone().unwrap_or(Value::Null);
    Ok(Some(make_iterator(ctx, "$Iterator", target)))
}

fn list_sort(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let Some((id, mut elements)) = receiver_elements(ctx, call) else {
        return Ok(None);
    };
    sort_values(ctx, &mut elements);
    set_elements(ctx, id, elements);
    Ok(None)
}

fn list_reverse(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let Some((id, mut elements)) = receiver_elements(ctx, call) else {
        return Ok(None);
    };
    elements.reverse();
    set_elements(ctx, id, elements);
    Ok(None)
}

/// stream() degenerates to an alias of the backing elements.
fn list_stream(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(call.receiver.clone().unwrap_or(Value::Null)))
}

// ---- deque/queue/stack vocabulary ----

fn deque_add_first(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let Some((id, mut elements)) = receiver_elements(ctx, call) else {
        return Ok(None);
    };
    elements.insert(0, arg_value(call, 0));
    set_elements(ctx, id, elements);
    Ok(None)
}

fn deque_add_last(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let Some((id, mut elements)) = receiver_elements(ctx, call) else {
        return Ok(Some(Value::Bool(false)));
    };
    elements.push(arg_value(call, 0));
    set_elements(ctx, id, elements);
    Ok(Some(Value::Bool(true)))
}

fn deque_remove_first(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let Some((id, mut elements)) = receiver_elements(ctx, call) else {
        return Ok(Some(Value::Null));
    };
    let removed = if elements.is_empty() {
        Value::Null
    } else {
        elements.remove(0)
    };
    set_elements(ctx, id, elements);
    Ok(Some(removed))
}

fn deque_remove_last(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let Some((id, mut elements)) = receiver_elements(ctx, call) else {
        return Ok(Some(Value::Null));
    };
    let removed = elements.pop().unwrap_or(Value::Null);
    set_elements(ctx, id, elements);
    Ok(Some(removed))
}

fn deque_peek_first(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let first = ctx
        .receiver_id(call)
        .map(|id| elements_of(ctx, id))
        .and_then(|e| e.first().cloned())
        .unwrap_or(Value::Null);
    Ok(Some(first))
}

fn deque_peek_last(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let last = ctx
        .receiver_id(call)
        .map(|id| elements_of(ctx, id))
        .and_then(|e| e.last().cloned())
        .unwrap_or(Value::Null);
    Ok(Some(last))
}

// ---- iterators ----

fn iterator_parts(ctx: &NativeCtx<'_>, call: &NativeCall) -> Option<(ObjectId, Value, i64)> {
    let id = call.receiver.as_ref()?.object_id()?;
    let object = ctx.state.heap.get(id)?;
    let target = object.field("$target")?.clone();
    let index = object.field("$index").and_then(|v| v.as_i64()).unwrap_or(0);
    Some((id, target, index))
}

fn iterator_has_next(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let has = iterator_parts(ctx, call)
        .map(|(_, target, index)| {
            let elements = elements_of_value(ctx, &target);
            (index as usize) < elements.len()
        })
        .unwrap_or(false);
    Ok(Some(Value::Bool(has)))
}

fn iterator_next(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let Some((id, target, index)) = iterator_parts(ctx, call) else {
        return Ok(Some(Value::Null));
    };
    let elements = elements_of_value(ctx, &target);
    let value = usize::try_from(index)
        .ok()
        .and_then(|i| elements.get(i).cloned())
        .unwrap_or(Value::Null);
    if let Some(object) = ctx.state.heap.get_mut(id) {
        object.set_field("$index", Value::Int(index + 1));
    }
    Ok(Some(value))
}

// ---- Collections ----

fn first_arg_elements(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> Option<(ObjectId, Vec<Value>)> {
    let id = arg_value(call, 0).object_id()?;
    ensure_elements(ctx.state, id);
    Some((id, elements_of(ctx, id)))
}

fn collections_sort(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    if let Some((id, mut elements)) = first_arg_elements(ctx, call) {
        sort_values(ctx, &mut elements);
        set_elements(ctx, id, elements);
    }
    Ok(None)
}

fn collections_reverse(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    if let Some((id, mut elements)) = first_arg_elements(ctx, call) {
        elements.reverse();
        set_elements(ctx, id, elements);
    }
    Ok(None)
}

fn collections_shuffle(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    if let Some((id, mut elements)) = first_arg_elements(ctx, call) {
        elements.shuffle(&mut rand::thread_rng());
        set_elements(ctx, id, elements);
    }
    Ok(None)
}

fn extreme(ctx: &mut NativeCtx<'_>, call: &NativeCall, want_max: bool) -> NativeResult {
    let elements = elements_of_value(ctx, &arg_value(call, 0));
    let mut sorted = elements;
    sort_values(ctx, &mut sorted);
    let value = if want_max {
        sorted.last().cloned()
    } else {
        sorted.first().cloned()
    };
    Ok(Some(value.unwrap_or(Value::Null)))
}

fn collections_min(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    extreme(ctx, call, false)
}

fn collections_max(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    extreme(ctx, call, true)
}

fn collections_frequency(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let wanted = key_of(ctx, &arg_value(call, 1));
    let count = elements_of_value(ctx, &arg_value(call, 0))
        .iter()
        .filter(|e| key_of(ctx, e) == wanted)
        .count();
    Ok(Some(Value::Int(count as i64)))
}

fn collections_fill(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let fill = arg_value(call, 1);
    if let Some((id, elements)) = first_arg_elements(ctx, call) {
        set_elements(ctx, id, vec![fill; elements.len()]);
    }
    Ok(None)
}

fn collections_copy(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let source = elements_of_value(ctx, &arg_value(call, 1));
    if let Some((id, mut dest)) = first_arg_elements(ctx, call) {
        for (i, value) in source.into_iter().enumerate() {
            if i < dest.len() {
                dest[i] = value;
            }
        }
        set_elements(ctx, id, dest);
    }
    Ok(None)
}

fn collections_swap(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let (i, j) = (arg_i64(call, 1), arg_i64(call, 2));
    if let Some((id, mut elements)) = first_arg_elements(ctx, call) {
        if let (Ok(i), Ok(j)) = (usize::try_from(i), usize::try_from(j)) {
            if i < elements.len() && j < elements.len() {
                elements.swap(i, j);
            }
        }
        set_elements(ctx, id, elements);
    }
    Ok(None)
}

fn collections_n_copies(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let count = arg_i64(call, 0).max(0) as usize;
    let value = arg_value(call, 1);
    Ok(Some(alloc_sequence(ctx, "ArrayList", vec![value; count])))
}

fn collections_singleton(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let value = arg_value(call, 0);
    let class = if call.method == "singleton" {
        "HashSet"
    } else {
        "ArrayList"
    };
    Ok(Some(alloc_sequence(ctx, class, vec![value])))
}

fn collections_empty_list(ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    Ok(Some(alloc_sequence(ctx, "ArrayList", Vec::new())))
}

fn collections_empty_set(ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    Ok(Some(alloc_sequence(ctx, "HashSet", Vec::new())))
}

fn collections_empty_map(ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    let step = ctx.step();
    let id = ctx.state.heap.alloc_object("HashMap", Vec::new(), step);
    Ok(Some(Value::Ref(id)))
}

fn binary_search_in(ctx: &NativeCtx<'_>, elements: &[Value], wanted: &Value) -> i64 {
    let target = wanted.as_f64();
    let key = key_of(ctx, wanted);
    let mut low = 0i64;
    let mut high = elements.len() as i64 - 1;
    while low <= high {
        let mid = (low + high) / 2;
        let candidate = &elements[mid as usize];
        let ordering = match (candidate.as_f64(), target) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
            _ => key_of(ctx, candidate).cmp(&key),
        };
        match ordering {
            std::cmp::Ordering::Less => low = mid + 1,
            std::cmp::Ordering::Greater => high = mid - 1,
            std::cmp::Ordering::Equal => return mid,
        }
    }
    -(low + 1)
}

fn collections_binary_search(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let elements = elements_of_value(ctx, &arg_value(call, 0));
    let wanted = arg_value(call, 1);
    Ok(Some(Value::Int(binary_search_in(ctx, &elements, &wanted))))
}

fn collections_disjoint(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let a: Vec<String> = elements_of_value(ctx, &arg_value(call, 0))
        .iter()
        .map(|e| key_of(ctx, e))
        .collect();
    let disjoint = elements_of_value(ctx, &arg_value(call, 1))
        .iter()
        .all(|e| !a.contains(&key_of(ctx, e)));
    Ok(Some(Value::Bool(disjoint)))
}

// ---- Arrays ----

fn arrays_sort(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    if let Some((id, mut elements)) = first_arg_elements(ctx, call) {
        sort_values(ctx, &mut elements);
        set_elements(ctx, id, elements);
    }
    Ok(None)
}

fn arrays_fill(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let fill = arg_value(call, 1);
    if let Some((id, elements)) = first_arg_elements(ctx, call) {
        set_elements(ctx, id, vec![fill; elements.len()]);
    }
    Ok(None)
}

fn array_elem_type(ctx: &NativeCtx<'_>, value: &Value) -> String {
    match value {
        Value::ArrayRef { elem, .. } => elem.clone(),
        other => other
            .object_id()
            .and_then(|id| ctx.state.heap.get(id))
            .and_then(|o| o.element_type.clone())
            .unwrap_or_else(|| "Object".to_string()),
    }
}

fn arrays_copy_of(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let source = arg_value(call, 0);
    let elem = array_elem_type(ctx, &source);
    let length = arg_i64(call, 1).max(0) as usize;
    let mut elements = elements_of_value(ctx, &source);
    elements.resize(length, Value::default_for_type(&elem));
    let step = ctx.step();
    let id = ctx.state.heap.alloc_array_from(elem.clone(), elements, step);
    Ok(Some(Value::ArrayRef { id, elem }))
}

fn arrays_copy_of_range(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let source = arg_value(call, 0);
    let elem = array_elem_type(ctx, &source);
    let elements = elements_of_value(ctx, &source);
    let from = arg_i64(call, 1).clamp(0, elements.len() as i64) as usize;
    let to = arg_i64(call, 2).max(from as i64) as usize;
    let mut slice: Vec<Value> = elements.get(from..to.min(elements.len()))
        .map(|s| s.to_vec())
        .unwrap_or_default();
    slice.resize(to - from, Value::default_for_type(&elem));
    let step = ctx.step();
    let id = ctx.state.heap.alloc_array_from(elem.clone(), slice, step);
    Ok(Some(Value::ArrayRef { id, elem }))
}

fn arrays_equals(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let a = elements_of_value(ctx, &arg_value(call, 0));
    let b = elements_of_value(ctx, &arg_value(call, 1));
    let equal = a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| key_of(ctx, x) == key_of(ctx, y));
    Ok(Some(Value::Bool(equal)))
}

/// Simplified to false, as in the source.
fn arrays_deep_equals(_ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Bool(false)))
}

fn arrays_to_string(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let elements = elements_of_value(ctx, &arg_value(call, 0));
    Ok(Some(Value::Str(joined(ctx, &elements))))
}

fn arrays_as_list(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    // asList(array) aliases the array contents; asList(a, b, c) wraps
    let elements = if call.args.len() == 1 && call.args[0].object_id().is_some() {
        elements_of_value(ctx, &call.args[0])
    } else {
        call.args.clone()
    };
    Ok(Some(alloc_sequence(ctx, "ArrayList", elements)))
}

fn arrays_binary_search(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let elements = elements_of_value(ctx, &arg_value(call, 0));
    let wanted = arg_value(call, 1);
    Ok(Some(Value::Int(binary_search_in(ctx, &elements, &wanted))))
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

    fn call_on(receiver: Value, method: &str, args: Vec<Value>) -> NativeCall {
        NativeCall {
            class: "ArrayList".to_string(),
            method: method.to_string(),
            receiver: Some(receiver),
            args,
        }
    }

    #[test]
    fn map_put_get_size_roundtrip() {
        with_ctx(|ctx| {
            let id = ctx.state.heap.alloc_object("HashMap", Vec::new(), 0);
            let map = Value::Ref(id);
            let mut put = call_on(map.clone(), "put", vec![Value::Str("k".into()), Value::Int(1)]);
            put.class = "HashMap".to_string();
            assert_eq!(map_put(ctx, &put).unwrap(), Some(Value::Null));
            // overwrite returns the previous value
            let put2 = NativeCall {
                args: vec![Value::Str("k".into()), Value::Int(2)],
                ..put.clone()
            };
            assert_eq!(map_put(ctx, &put2).unwrap(), Some(Value::Int(1)));

            let get = NativeCall {
                method: "get".into(),
                args: vec![Value::Str("k".into())],
                ..put.clone()
            };
            assert_eq!(map_get(ctx, &get).unwrap(), Some(Value::Int(2)));
            let size = NativeCall {
                method: "size".into(),
                args: vec![],
                ..put
            };
            assert_eq!(map_size(ctx, &size).unwrap(), Some(Value::Int(1)));
        });
    }

    #[test]
    fn integer_keys_are_stringified() {
        with_ctx(|ctx| {
            let id = ctx.state.heap.alloc_object("HashMap", Vec::new(), 0);
            let map = Value::Ref(id);
            let put = NativeCall {
                class: "HashMap".into(),
                method: "put".into(),
                receiver: Some(map),
                args: vec![Value::Int(42), Value::Str("v".into())],
            };
            map_put(ctx, &put).unwrap();
            assert_eq!(ctx.state.heap.get(id).unwrap().fields[0].name, "42");
        });
    }

    #[test]
    fn set_rejects_duplicates_by_stringified_value() {
        with_ctx(|ctx| {
            let id = ctx.state.heap.alloc_object("HashSet", Vec::new(), 0);
            let set = Value::Ref(id);
            let add = |v: Value| NativeCall {
                class: "HashSet".into(),
                method: "add".into(),
                receiver: Some(set.clone()),
                args: vec![v],
            };
            assert_eq!(set_add(ctx, &add(Value::Int(1))).unwrap(), Some(Value::Bool(true)));
            assert_eq!(
                set_add(ctx, &add(Value::Int(1))).unwrap(),
                Some(Value::Bool(false))
            );
            // "1" collides with 1 under stringified identity
            assert_eq!(
                set_add(ctx, &add(Value::Str("1".into()))).unwrap(),
                Some(Value::Bool(false))
            );
        });
    }

    #[test]
    fn list_iterator_walks_in_order() {
        with_ctx(|ctx| {
            let list = alloc_sequence(ctx, "ArrayList", vec![Value::Int(7), Value::Int(8)]);
            let it = list_iterator(ctx, &call_on(list, "iterator", vec![]))
                .unwrap()
                .unwrap();
            let call = |method: &str| NativeCall {
                class: "$Iterator".into(),
                method: method.into(),
                receiver: Some(it.clone()),
                args: vec![],
            };
            assert_eq!(
                iterator_has_next(ctx, &call("hasNext")).unwrap(),
                Some(Value::Bool(true))
            );
            assert_eq!(iterator_next(ctx, &call("next")).unwrap(), Some(Value::Int(7)));
            assert_eq!(iterator_next(ctx, &call("next")).unwrap(), Some(Value::Int(8)));
            assert_eq!(
                iterator_has_next(ctx, &call("hasNext")).unwrap(),
                Some(Value::Bool(false))
            );
        });
    }

    #[test]
    fn sort_is_idempotent_and_non_decreasing() {
        with_ctx(|ctx| {
            let mut elements = vec![
                Value::Int(4),
                Value::Int(1),
                Value::Int(3),
                Value::Int(1),
            ];
            sort_values(ctx, &mut elements);
            let once = elements.clone();
            sort_values(ctx, &mut elements);
            assert_eq!(elements, once);
            let ints: Vec<i64> = elements.iter().map(|v| v.as_i64().unwrap()).collect();
            assert!(ints.windows(2).all(|w| w[0] <= w[1]));
        });
    }

    #[test]
    fn mixed_sort_falls_back_to_lexicographic() {
        with_ctx(|ctx| {
            let mut elements = vec![
                Value::Str("pear".into()),
                Value::Str("apple".into()),
                Value::Int(10),
            ];
            sort_values(ctx, &mut elements);
            let keys: Vec<String> = elements.iter().map(|e| key_of(ctx, e)).collect();
            assert_eq!(keys, vec!["10", "apple", "pear"]);
        });
    }

    #[test]
    fn stack_vocabulary_is_front_oriented() {
        with_ctx(|ctx| {
            let stack = alloc_sequence(ctx, "Stack", vec![]);
            let push = |v: Value| NativeCall {
                class: "Stack".into(),
                method: "push".into(),
                receiver: Some(stack.clone()),
                args: vec![v],
            };
            deque_add_first(ctx, &push(Value::Int(1))).unwrap();
            deque_add_first(ctx, &push(Value::Int(2))).unwrap();
            let pop = NativeCall {
                class: "Stack".into(),
                method: "pop".into(),
                receiver: Some(stack.clone()),
                args: vec![],
            };
            assert_eq!(deque_remove_first(ctx, &pop).unwrap(), Some(Value::Int(2)));
            assert_eq!(deque_remove_first(ctx, &pop).unwrap(), Some(Value::Int(1)));
            assert_eq!(deque_remove_first(ctx, &pop).unwrap(), Some(Value::Null));
        });
    }

    #[test]
    fn binary_search_finds_and_reports_insertion_point() {
        with_ctx(|ctx| {
            let elements = vec![Value::Int(2), Value::Int(4), Value::Int(9)];
            assert_eq!(binary_search_in(ctx, &elements, &Value::Int(4)), 1);
            assert_eq!(binary_search_in(ctx, &elements, &Value::Int(5)), -3);
        });
    }

    #[test]
    fn entry_set_materialises_map_entries() {
        with_ctx(|ctx| {
            let id = ctx.state.heap.alloc_object("HashMap", Vec::new(), 0);
            let map = Value::Ref(id);
            for (k, v) in [("a", 1), ("b", 2)] {
                let put = NativeCall {
                    class: "HashMap".into(),
                    method: "put".into(),
                    receiver: Some(map.clone()),
                    args: vec![Value::Str(k.into()), Value::Int(v)],
                };
                map_put(ctx, &put).unwrap();
            }
            let call = NativeCall {
                class: "HashMap".into(),
                method: "entrySet".into(),
                receiver: Some(map),
                args: vec![],
            };
            let set = map_entry_set(ctx, &call).unwrap().unwrap();
            let entries = elements_of_value(ctx, &set);
            assert_eq!(entries.len(), 2);
            let first = entries[0].object_id().unwrap();
            let entry = ctx.state.heap.get(first).unwrap();
            assert_eq!(entry.class_name, "$MapEntry");
            assert_eq!(entry.field("key"), Some(&Value::Str("a".into())));
            assert_eq!(entry.field("value"), Some(&Value::Int(1)));
        });
    }
}
