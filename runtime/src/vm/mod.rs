use crate::compiler::code::Instruction;
use crate::heap::method_area::MethodArea;
use crate::heap::{Heap, HeapKind, ObjectId};
use crate::thread::{StackFrame, ThreadId, ThreadState, ThreadStatus, WaitTarget};
use std::collections::HashMap;
use std::fmt::{self, Display};

pub mod simulator;

/// Stack operand, local variable, argument or static field value.
/// Copy-by-value: cloning never clones the referenced heap object.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Long(i64),
    Float(f64),
    Double(f64),
    Bool(bool),
    Char(char),
    Str(String),
    Null,
    Ref(ObjectId),
    ArrayRef { id: ObjectId, elem: String },
    LambdaRef(ObjectId),
}

impl Value {
    pub fn default_for_type(ty: &str) -> Value {
        match ty {
            "int" | "long" | "byte" | "short" => Value::Int(0),
            "float" | "double" => Value::Double(0.0),
            "boolean" => Value::Bool(false),
            "char" => Value::Char('\0'),
            _ => Value::Null,
        }
    }

    /// Branch conditions: booleans decide, numbers fall back to != 0.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) | Value::Long(n) => *n != 0,
            Value::Float(x) | Value::Double(x) => *x != 0.0,
            Value::Null => false,
            _ => true,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) | Value::Long(n) => Some(*n),
            Value::Char(c) => Some(*c as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Float(x) | Value::Double(x) => Some(*x as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) | Value::Long(n) => Some(*n as f64),
            Value::Float(x) | Value::Double(x) => Some(*x),
            Value::Char(c) => Some(*c as u32 as f64),
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            _ => None,
        }
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, Value::Float(_) | Value::Double(_))
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Value::Ref(id) | Value::LambdaRef(id) => Some(*id),
            Value::ArrayRef { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Bool(_) => "boolean",
            Value::Char(_) => "char",
            Value::Str(_) => "string",
            Value::Null => "null",
            Value::Ref(_) => "reference",
            Value::ArrayRef { .. } => "array",
            Value::LambdaRef(_) => "lambda",
        }
    }

    /// Heap-free rendering for disassembly operands.
    pub fn literal_text(&self) -> String {
        match self {
            Value::Str(s) => format!("{:?}", s),
            Value::Char(c) => format!("'{}'", c),
            other => heapless_text(other),
        }
    }
}

/// Java-flavoured double rendering: integral values keep one decimal.
pub(crate) fn format_double(x: f64) -> String {
    if x.is_nan() {
        "NaN".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if x == x.trunc() && x.abs() < 1e15 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

fn heapless_text(value: &Value) -> String {
    match value {
        Value::Int(n) | Value::Long(n) => n.to_string(),
        Value::Float(x) | Value::Double(x) => format_double(*x),
        Value::Bool(b) => b.to_string(),
        Value::Char(c) => c.to_string(),
        Value::Str(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Ref(id) => format!("ref{}", id),
        Value::ArrayRef { id, elem } => format!("{}[]{}", elem, id),
        Value::LambdaRef(id) => format!("lambda{}", id),
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", heapless_text(self))
    }
}

/// Total string conversion used by PRINT, string concatenation and the
/// stdlib `toString` family. Never fails.
pub fn value_to_string(heap: &Heap, value: &Value) -> String {
    match value {
        Value::Ref(id) => match heap.get(*id) {
            Some(object) => match object.kind {
                HeapKind::Str => object.string_value.clone().unwrap_or_default(),
                HeapKind::Lambda => format!("<lambda{}>", id),
                _ => format!("{}{}", object.class_name, id),
            },
            None => format!("ref{}", id),
        },
        Value::ArrayRef { id, elem } => format!("{}[]{}", elem, id),
        Value::LambdaRef(id) => format!("<lambda{}>", id),
        other => heapless_text(other),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Paused,
    Running,
    Completed,
    Error,
}

/// The whole machine state. Deep-cloned for history snapshots and for
/// every state handed to a consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct VmState {
    pub heap: Heap,
    pub method_area: MethodArea,
    pub pc: usize,
    pub status: ExecStatus,
    pub step_number: u64,
    pub output: Vec<String>,
    pub threads: Vec<ThreadState>,
    pub active_thread: usize,
    pub monitors: HashMap<ObjectId, Option<ThreadId>>,
    pub error: Option<String>,
    pub next_frame_id: u64,
}

impl VmState {
    pub fn new() -> Self {
        Self {
            heap: Heap::new(),
            method_area: MethodArea::new(),
            pc: 0,
            status: ExecStatus::Paused,
            step_number: 0,
            // PRINT appends to the last line; println opens a new one
            output: vec![String::new()],
            threads: Vec::new(),
            active_thread: 0,
            monitors: HashMap::new(),
            error: None,
            next_frame_id: 0,
        }
    }

    pub fn active(&self) -> Option<&ThreadState> {
        self.threads.get(self.active_thread)
    }

    pub fn active_mut(&mut self) -> Option<&mut ThreadState> {
        self.threads.get_mut(self.active_thread)
    }

    /// The call stack alias consumers see is exactly the active thread's.
    pub fn stack(&self) -> &[StackFrame] {
        self.active().map(|t| t.stack.as_slice()).unwrap_or(&[])
    }

    pub fn cur_frame(&self) -> Option<&StackFrame> {
        self.active().and_then(|t| t.top_frame())
    }

    pub fn cur_frame_mut(&mut self) -> Option<&mut StackFrame> {
        self.active_mut().and_then(|t| t.top_frame_mut())
    }

    pub fn push_operand(&mut self, value: Value) {
        if let Some(frame) = self.cur_frame_mut() {
            frame.push(value);
        }
    }

    pub fn pop_operand(&mut self) -> Value {
        self.cur_frame_mut().map(|f| f.pop()).unwrap_or(Value::Null)
    }

    pub fn value_to_string(&self, value: &Value) -> String {
        value_to_string(&self.heap, value)
    }

    pub fn append_output(&mut self, text: &str) {
        if let Some(last) = self.output.last_mut() {
            last.push_str(text);
        } else {
            self.output.push(text.to_string());
        }
    }

    pub fn new_output_line(&mut self) {
        self.output.push(String::new());
    }

    pub fn thread_mut(&mut self, id: ThreadId) -> Option<&mut ThreadState> {
        self.threads.iter_mut().find(|t| t.id == id)
    }

    pub fn thread(&self, id: ThreadId) -> Option<&ThreadState> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn find_thread_by_object(&self, object: ObjectId) -> Option<&ThreadState> {
        self.threads.iter().find(|t| t.object_id == Some(object))
    }

    pub fn next_thread_id(&self) -> ThreadId {
        ThreadId(self.threads.iter().map(|t| t.id.0 + 1).max().unwrap_or(0))
    }

    pub fn alloc_frame_id(&mut self) -> u64 {
        let id = self.next_frame_id;
        self.next_frame_id += 1;
        id
    }

    /// Monitor acquisition: free or reentrant succeeds, held blocks.
    /// Reentrant ownership is list membership, not a count.
    pub fn try_enter_monitor(&mut self, object: ObjectId, thread: ThreadId) -> bool {
        match self.monitors.get(&object) {
            Some(Some(owner)) if *owner != thread => false,
            _ => {
                self.monitors.insert(object, Some(thread));
                if let Some(state) = self.thread_mut(thread) {
                    if !state.holds_monitor(object) {
                        state.holding_monitors.push(object);
                    }
                }
                true
            }
        }
    }

    /// Releases unconditionally and wakes exactly one blocked waiter.
    pub fn exit_monitor(&mut self, object: ObjectId, thread: ThreadId) {
        if self.monitors.get(&object) != Some(&Some(thread)) {
            return;
        }
        self.monitors.insert(object, None);
        if let Some(state) = self.thread_mut(thread) {
            state.holding_monitors.retain(|m| *m != object);
        }
        self.wake_one_blocked_on(object);
    }

    pub fn wake_one_blocked_on(&mut self, object: ObjectId) {
        if let Some(waiter) = self.threads.iter_mut().find(|t| {
            t.status == ThreadStatus::Blocked
                && t.wait_target == Some(WaitTarget::Monitor(object))
        }) {
            waiter.status = ThreadStatus::Runnable;
            waiter.wait_target = None;
        }
    }
}

impl Default for VmState {
    fn default() -> Self {
        Self::new()
    }
}

/// What one `step()` hands back to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub state: VmState,
    pub instruction: Option<Instruction>,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_to_string_is_total() {
        let mut heap = Heap::new();
        let string = heap.alloc_string("abc", 0);
        let object = heap.alloc_object("Node", Vec::new(), 0);
        let samples = [
            (Value::Int(5), "5"),
            (Value::Double(2.0), "2.0"),
            (Value::Double(0.5), "0.5"),
            (Value::Bool(true), "true"),
            (Value::Char('x'), "x"),
            (Value::Str("hi".into()), "hi"),
            (Value::Null, "null"),
            (Value::Ref(string), "abc"),
            (Value::Ref(object), "Node@1"),
            // dangling references still render
            (Value::Ref(ObjectId(99)), "ref@99"),
        ];
        for (value, expected) in samples {
            assert_eq!(value_to_string(&heap, &value), expected);
        }
    }

    #[test]
    fn monitor_enter_is_reentrant_by_membership() {
        let mut state = VmState::new();
        state.threads.push(ThreadState::new(ThreadId(0), "main"));
        let lock = state.heap.alloc_object("Object", Vec::new(), 0);
        assert!(state.try_enter_monitor(lock, ThreadId(0)));
        assert!(state.try_enter_monitor(lock, ThreadId(0)));
        assert_eq!(state.threads[0].holding_monitors, vec![lock]);
        // a second thread cannot take the held monitor
        state.threads.push(ThreadState::new(ThreadId(1), "worker"));
        assert!(!state.try_enter_monitor(lock, ThreadId(1)));
        // one release frees it outright (no recursion count)
        state.exit_monitor(lock, ThreadId(0));
        assert_eq!(state.monitors[&lock], None);
        assert!(state.try_enter_monitor(lock, ThreadId(1)));
    }

    #[test]
    fn release_wakes_exactly_one_waiter() {
        let mut state = VmState::new();
        state.threads.push(ThreadState::new(ThreadId(0), "main"));
        state.threads.push(ThreadState::new(ThreadId(1), "a"));
        state.threads.push(ThreadState::new(ThreadId(2), "b"));
        let lock = state.heap.alloc_object("Object", Vec::new(), 0);
        assert!(state.try_enter_monitor(lock, ThreadId(0)));
        for idx in [1, 2] {
            state.threads[idx].status = ThreadStatus::Blocked;
            state.threads[idx].wait_target = Some(WaitTarget::Monitor(lock));
        }
        state.exit_monitor(lock, ThreadId(0));
        let runnable: Vec<bool> = state
            .threads
            .iter()
            .skip(1)
            .map(|t| t.status == ThreadStatus::Runnable)
            .collect();
        assert_eq!(runnable, vec![true, false]);
    }

    #[test]
    fn output_append_and_newline() {
        let mut state = VmState::new();
        state.append_output("Hello");
        state.append_output(", World!");
        state.new_output_line();
        assert_eq!(state.output, vec!["Hello, World!".to_string(), String::new()]);
    }
}
