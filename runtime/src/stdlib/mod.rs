//! Standard-library emulation: a dispatch table keyed by
//! `(class family, method name)` that intercepts INVOKE_* before
//! user-defined lookup. A hit consumes receiver and arguments and may
//! push a return value.

use crate::error::Fault;
use crate::heap::ObjectId;
use crate::vm::simulator::SimulatorConfig;
use crate::vm::{Value, VmState};
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub mod builders;
pub mod collections;
pub mod fmt;
pub mod strings;
pub mod threads;
pub mod wrappers;

/// One intercepted call: the dispatch class (receiver class or the
/// static class operand), the bare method name, and the popped values.
#[derive(Debug, Clone)]
pub struct NativeCall {
    pub class: String,
    pub method: String,
    pub receiver: Option<Value>,
    pub args: Vec<Value>,
}

pub type NativeResult = Result<Option<Value>, Fault>;
pub type NativeFn = fn(&mut NativeCtx<'_>, &NativeCall) -> NativeResult;

pub struct NativeCtx<'a> {
    pub state: &'a mut VmState,
    pub config: &'a SimulatorConfig,
}

impl NativeCtx<'_> {
    pub fn step(&self) -> u64 {
        self.state.step_number
    }

    /// String payload of a primitive string or a heap string object.
    pub fn string_of(&self, value: &Value) -> Option<String> {
        match value {
            Value::Str(s) => Some(s.clone()),
            Value::Ref(id) => self.state.heap.string_value(*id).map(str::to_string),
            _ => None,
        }
    }

    pub fn display(&self, value: &Value) -> String {
        self.state.value_to_string(value)
    }

    pub fn receiver_string(&self, call: &NativeCall) -> String {
        call.receiver
            .as_ref()
            .and_then(|r| self.string_of(r))
            .unwrap_or_default()
    }

    pub fn receiver_id(&self, call: &NativeCall) -> Option<ObjectId> {
        call.receiver.as_ref().and_then(|r| r.object_id())
    }

    pub fn alloc_string_array(&mut self, parts: Vec<String>) -> Value {
        let step = self.state.step_number;
        let values: Vec<Value> = parts.into_iter().map(Value::Str).collect();
        let id = self.state.heap.alloc_array_from("String", values, step);
        Value::ArrayRef {
            id,
            elem: "String".to_string(),
        }
    }
}

pub fn arg_i64(call: &NativeCall, index: usize) -> i64 {
    call.args.get(index).and_then(|v| v.as_i64()).unwrap_or(0)
}

pub fn arg_f64(call: &NativeCall, index: usize) -> f64 {
    call.args.get(index).and_then(|v| v.as_f64()).unwrap_or(0.0)
}

pub fn arg_value(call: &NativeCall, index: usize) -> Value {
    call.args.get(index).cloned().unwrap_or(Value::Null)
}

pub fn arg_string(ctx: &NativeCtx<'_>, call: &NativeCall, index: usize) -> String {
    call.args
        .get(index)
        .map(|v| {
            ctx.string_of(v)
                .unwrap_or_else(|| ctx.display(v))
        })
        .unwrap_or_default()
}

/// Families are the enumerated class lists of the shim. The map family
/// additionally keeps the name-contains-"Map" fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassFamily {
    Str,
    Character,
    Integer,
    Long,
    Double,
    Float,
    Boolean,
    Byte,
    Short,
    Number,
    Math,
    System,
    Objects,
    Map,
    MapEntry,
    Set,
    List,
    Iterator,
    Collections,
    Arrays,
    Thread,
    Exception,
    StringBuilder,
    Scanner,
    Object,
}

const EXCEPTION_CLASSES: &[&str] = &[
    "Exception",
    "RuntimeException",
    "Error",
    "Throwable",
    "IllegalArgumentException",
    "IllegalStateException",
    "NullPointerException",
    "ArithmeticException",
    "ArrayIndexOutOfBoundsException",
    "IndexOutOfBoundsException",
    "StringIndexOutOfBoundsException",
    "ClassCastException",
    "ClassNotFoundException",
    "UnsupportedOperationException",
    "NumberFormatException",
    "InterruptedException",
    "ConcurrentModificationException",
    "NoSuchElementException",
];

fn classify_name(name: &str) -> Option<ClassFamily> {
    let family = match name {
        "String" => ClassFamily::Str,
        "Character" => ClassFamily::Character,
        "Integer" => ClassFamily::Integer,
        "Long" => ClassFamily::Long,
        "Double" => ClassFamily::Double,
        "Float" => ClassFamily::Float,
        "Boolean" => ClassFamily::Boolean,
        "Byte" => ClassFamily::Byte,
        "Short" => ClassFamily::Short,
        "Number" => ClassFamily::Number,
        "Math" => ClassFamily::Math,
        "System" => ClassFamily::System,
        "Objects" => ClassFamily::Objects,
        "$MapEntry" => ClassFamily::MapEntry,
        "HashMap" | "LinkedHashMap" | "TreeMap" | "Hashtable" | "Map" => ClassFamily::Map,
        "HashSet" | "LinkedHashSet" | "TreeSet" | "Set" => ClassFamily::Set,
        "ArrayList" | "LinkedList" | "Stack" | "Vector" | "List" | "ArrayDeque" | "Deque"
        | "Queue" | "PriorityQueue" => ClassFamily::List,
        "$Iterator" | "$SetIterator" => ClassFamily::Iterator,
        "Collections" => ClassFamily::Collections,
        "Arrays" => ClassFamily::Arrays,
        "Thread" => ClassFamily::Thread,
        "StringBuilder" | "StringBuffer" => ClassFamily::StringBuilder,
        "Scanner" => ClassFamily::Scanner,
        _ if EXCEPTION_CLASSES.contains(&name) => ClassFamily::Exception,
        _ => return None,
    };
    Some(family)
}

/// Classifies a class name, consulting the loaded hierarchy for Thread
/// subclasses and falling back to the substring rule for maps.
pub fn classify(name: &str, state: &VmState) -> Option<ClassFamily> {
    classify_name(name).or_else(|| {
        if state.method_area.is_subclass_of(name, "Thread") {
            Some(ClassFamily::Thread)
        } else if name.contains("Map") {
            Some(ClassFamily::Map)
        } else {
            None
        }
    })
}

pub struct NativeRegistry {
    entries: HashMap<(ClassFamily, &'static str), NativeFn>,
}

impl NativeRegistry {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, family: ClassFamily, method: &'static str, handler: NativeFn) {
        self.entries.insert((family, method), handler);
    }

    /// Several spellings of the same operation share one handler
    /// (deque/queue/stack vocabulary, wrapper aliases).
    pub fn register_all(
        &mut self,
        family: ClassFamily,
        methods: &[&'static str],
        handler: NativeFn,
    ) {
        for method in methods {
            self.register(family, method, handler);
        }
    }

    pub fn lookup(&self, family: ClassFamily, method: &str) -> Option<NativeFn> {
        self.entries.get(&(family, method)).copied()
    }
}

static REGISTRY: Lazy<NativeRegistry> = Lazy::new(|| {
    let mut registry = NativeRegistry::new();
    strings::do_register_string_natives(&mut registry);
    wrappers::do_register_wrapper_natives(&mut registry);
    collections::do_register_collection_natives(&mut registry);
    threads::do_register_thread_natives(&mut registry);
    builders::do_register_builder_natives(&mut registry);
    registry
});

fn family_of(call: &NativeCall, state: &VmState) -> Option<ClassFamily> {
    match &call.receiver {
        Some(Value::Str(_)) => Some(ClassFamily::Str),
        Some(Value::Ref(id)) => {
            let object = state.heap.get(*id)?;
            if object.kind == crate::heap::HeapKind::Str {
                Some(ClassFamily::Str)
            } else {
                // unclassified objects still answer the Object vocabulary
                // (wait/notify); everything else falls through to user code
                classify(&object.class_name, state).or(Some(ClassFamily::Object))
            }
        }
        // arrays answer the sequence vocabulary (iterator, length, ...)
        Some(Value::ArrayRef { .. }) => Some(ClassFamily::List),
        Some(_) => None,
        None => classify(&call.class, state),
    }
}

/// Shim entry point. `None` means "not ours": continue to user-defined
/// lookup. `Some` means the call was consumed; any return value has
/// already been pushed.
pub fn invoke(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> Option<Result<String, Fault>> {
    let family = family_of(call, ctx.state)?;
    let handler = REGISTRY
        .lookup(family, &call.method)
        .or_else(|| REGISTRY.lookup(ClassFamily::Object, &call.method))?;
    match handler(ctx, call) {
        Ok(ret) => {
            if let Some(value) = ret {
                ctx.state.push_operand(value);
            }
            let shown = if call.class.is_empty() {
                format!("{:?}", family)
            } else {
                call.class.clone()
            };
            Some(Ok(format!("native {}.{}", shown, call.method)))
        }
        Err(fault) => Some(Err(fault)),
    }
}

/// Default Object behaviour for user classes that did not override it,
/// applied after user lookup misses.
pub fn object_default(state: &VmState, call: &NativeCall) -> Option<Value> {
    let receiver = call.receiver.as_ref()?;
    match call.method.as_str() {
        "equals" if call.args.len() == 1 => Some(Value::Bool(
            receiver.object_id().is_some()
                && receiver.object_id() == call.args[0].object_id(),
        )),
        "hashCode" if call.args.is_empty() => {
            Some(Value::Int(receiver.object_id().map(|id| id.0 as i64)?))
        }
        "toString" if call.args.is_empty() => {
            Some(Value::Str(crate::vm::value_to_string(&state.heap, receiver)))
        }
        "getClass" if call.args.is_empty() => {
            let id = receiver.object_id()?;
            Some(Value::Str(state.heap.class_name_of(id)?.to_string()))
        }
        _ => None,
    }
}

/// Well-known static constants surfaced through GETSTATIC.
pub fn static_constant(class: &str, name: &str) -> Option<Value> {
    let value = match (class, name) {
        ("Math", "PI") => Value::Double(std::f64::consts::PI),
        ("Math", "E") => Value::Double(std::f64::consts::E),
        ("Integer", "MAX_VALUE") => Value::Int(i64::from(i32::MAX)),
        ("Integer", "MIN_VALUE") => Value::Int(i64::from(i32::MIN)),
        ("Long", "MAX_VALUE") => Value::Int(i64::MAX),
        ("Long", "MIN_VALUE") => Value::Int(i64::MIN),
        ("Double", "MAX_VALUE") => Value::Double(f64::MAX),
        ("Double", "MIN_VALUE") => Value::Double(f64::MIN_POSITIVE),
        ("Double", "POSITIVE_INFINITY") => Value::Double(f64::INFINITY),
        ("Double", "NEGATIVE_INFINITY") => Value::Double(f64::NEG_INFINITY),
        ("Double", "NaN") => Value::Double(f64::NAN),
        ("Thread", "MIN_PRIORITY") => Value::Int(1),
        ("Thread", "NORM_PRIORITY") => Value::Int(5),
        ("Thread", "MAX_PRIORITY") => Value::Int(10),
        _ => return None,
    };
    Some(value)
}

/// Lazily materialises element storage on a collection object.
pub(crate) fn ensure_elements(state: &mut VmState, id: ObjectId) -> bool {
    match state.heap.get_mut(id) {
        Some(object) => {
            if object.array_elements.is_none() {
                object.array_elements = Some(Vec::new());
            }
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_lists_win_over_substring_rule() {
        let state = VmState::new();
        assert_eq!(classify("HashMap", &state), Some(ClassFamily::Map));
        assert_eq!(classify("TreeMap", &state), Some(ClassFamily::Map));
        // substring fallback catches unknown map-like names
        assert_eq!(classify("WeakHashMap", &state), Some(ClassFamily::Map));
        assert_eq!(classify("$MapEntry", &state), Some(ClassFamily::MapEntry));
        assert_eq!(classify("ArrayList", &state), Some(ClassFamily::List));
        assert_eq!(classify("Widget", &state), None);
    }

    #[test]
    fn math_pi_is_a_constant() {
        assert_eq!(
            static_constant("Math", "PI"),
            Some(Value::Double(std::f64::consts::PI))
        );
        assert_eq!(static_constant("Math", "TAU"), None);
    }
}
