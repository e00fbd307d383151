use crate::heap::ObjectId;
use crate::vm::Value;
use smallvec::SmallVec;
use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub usize);

impl Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    New,
    Runnable,
    Running,
    Blocked,
    Waiting,
    TimedWaiting,
    Terminated,
}

/// What a non-runnable thread is waiting on. The source stores a thread
/// id in the same slot as monitor ids; here the two flavours are typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    Monitor(ObjectId),
    ThreadExit(ThreadId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
    pub name: String,
    pub ty: String,
    pub value: Value,
    pub slot: usize,
}

/// One activation record. `pc` indexes the global instruction vector;
/// `line` mirrors the last LINE marker executed.
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    pub id: u64,
    pub class_name: String,
    pub method_name: String,
    pub signature: String,
    pub locals: Vec<LocalVariable>,
    pub operand_stack: SmallVec<[Value; 8]>,
    pub pc: usize,
    pub line: u32,
    pub is_native: bool,
    pub captured: Vec<Value>,
}

impl StackFrame {
    pub fn push(&mut self, value: Value) {
        self.operand_stack.push(value);
    }

    /// Operand pops are total; an empty stack yields null.
    pub fn pop(&mut self) -> Value {
        self.operand_stack.pop().unwrap_or(Value::Null)
    }

    pub fn local(&self, slot: usize) -> Value {
        self.locals
            .get(slot)
            .map(|l| l.value.clone())
            .unwrap_or(Value::Null)
    }

    pub fn set_local(&mut self, slot: usize, value: Value) {
        if let Some(local) = self.locals.get_mut(slot) {
            local.value = value;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadState {
    pub id: ThreadId,
    pub name: String,
    pub stack: Vec<StackFrame>,
    pub status: ThreadStatus,
    pub sleep_until_step: Option<u64>,
    pub wait_target: Option<WaitTarget>,
    pub holding_monitors: Vec<ObjectId>,
    pub object_id: Option<ObjectId>,
    pub priority: i64,
    pub is_daemon: bool,
    pub step_count: u64,
    pub interrupted: bool,
}

impl ThreadState {
    pub fn new(id: ThreadId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            stack: Vec::new(),
            status: ThreadStatus::Runnable,
            sleep_until_step: None,
            wait_target: None,
            holding_monitors: Vec::new(),
            object_id: None,
            priority: 5,
            is_daemon: false,
            step_count: 0,
            interrupted: false,
        }
    }

    pub fn is_schedulable(&self) -> bool {
        matches!(self.status, ThreadStatus::Runnable | ThreadStatus::Running)
    }

    pub fn top_frame(&self) -> Option<&StackFrame> {
        self.stack.last()
    }

    pub fn top_frame_mut(&mut self) -> Option<&mut StackFrame> {
        self.stack.last_mut()
    }

    pub fn holds_monitor(&self, id: ObjectId) -> bool {
        self.holding_monitors.contains(&id)
    }
}
