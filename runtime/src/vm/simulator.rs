use crate::compiler::CompiledProgram;
use crate::heap::Field;
use crate::history::History;
use crate::interpreter::{Interpreter, build_frame};
use crate::scheduler::{self, Selection};
use crate::thread::{ThreadId, ThreadState, ThreadStatus};
use crate::vm::{ExecStatus, ExecutionResult, Value, VmState};
use tracing_log::log::debug;

/// Engine tunables. The step divisor is what turns `Thread.sleep`
/// milliseconds into scheduler steps.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub history_limit: usize,
    pub max_run_steps: u64,
    pub sleep_step_divisor_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            history_limit: 500,
            max_run_steps: 50_000,
            sleep_step_divisor_ms: 50,
        }
    }
}

/// The engine facade: owns the machine state, steps it one instruction
/// at a time, and keeps the snapshot ring that makes step-back work.
pub struct Simulator {
    program: CompiledProgram,
    state: VmState,
    history: History,
    config: SimulatorConfig,
    is_running: bool,
}

impl Simulator {
    pub fn new(program: CompiledProgram) -> Self {
        Self::with_config(program, SimulatorConfig::default())
    }

    pub fn with_config(program: CompiledProgram, config: SimulatorConfig) -> Self {
        let state = Self::boot(&program);
        let history = History::new(config.history_limit);
        Self {
            program,
            state,
            history,
            config,
            is_running: false,
        }
    }

    /// Loads classes, seeds statics, and parks the main thread on the
    /// first instruction of `main(String[])` with an empty args array.
    fn boot(program: &CompiledProgram) -> VmState {
        let mut state = VmState::new();
        state.method_area.load_program(program, 0);

        let mut main_thread = ThreadState::new(ThreadId(0), "main");
        let thread_object = state.heap.alloc_object(
            "Thread",
            vec![
                Field::new("name", Value::Str("main".to_string())),
                Field::new("priority", Value::Int(5)),
                Field::new("daemon", Value::Bool(false)),
                Field::new("status", Value::Str("RUNNABLE".to_string())),
            ],
            0,
        );
        main_thread.object_id = Some(thread_object);

        let args_id = state.heap.alloc_array("String", 0, Value::Null, 0);
        let args = Value::ArrayRef {
            id: args_id,
            elem: "String".to_string(),
        };

        match state
            .method_area
            .lookup_method(&program.main_class, &program.main_method, 1)
        {
            Some((owner, method)) if method.offset.is_some() => {
                let frame = build_frame(&mut state, &owner, &method, None, vec![args]);
                state.pc = frame.pc;
                main_thread.stack.push(frame);
            }
            _ => {
                debug!(
                    "no {}.{}(String[]) entry point",
                    program.main_class, program.main_method
                );
            }
        }

        state.threads.push(main_thread);
        state.status = ExecStatus::Paused;
        state
    }

    fn result(&self, instruction: Option<crate::Instruction>, description: String) -> ExecutionResult {
        ExecutionResult {
            state: self.state.clone(),
            instruction,
            description,
        }
    }

    /// Advances exactly one instruction of one thread. Never fails:
    /// uncaught JVM exceptions flip the status to `Error` instead.
    pub fn step(&mut self) -> ExecutionResult {
        if matches!(self.state.status, ExecStatus::Completed | ExecStatus::Error) {
            return self.result(None, "execution already finished".to_string());
        }

        // the pre-step snapshot is what step_back restores
        self.history.push(self.state.clone());

        scheduler::tick_threads(&mut self.state);

        let selected = match scheduler::select_executable(&mut self.state) {
            Selection::AllTerminated => {
                self.state.step_number += 1;
                self.state.status = ExecStatus::Completed;
                return self.result(None, "program completed".to_string());
            }
            Selection::Waiting => {
                // let sleep timers make progress
                self.state.step_number += 1;
                return self.result(None, "all threads waiting".to_string());
            }
            Selection::Thread(idx) => idx,
        };

        self.state.threads[selected].status = ThreadStatus::Running;

        if self.state.threads[selected].stack.is_empty() {
            self.state.step_number += 1;
            self.state.threads[selected].status = ThreadStatus::Terminated;
            scheduler::release_all_monitors(&mut self.state, selected);
            let name = self.state.threads[selected].name.clone();
            scheduler::rotate(&mut self.state);
            return self.result(None, format!("thread {} terminated", name));
        }

        let outcome = Interpreter::execute(&mut self.state, &self.program, &self.config);
        self.state.step_number += 1;
        self.state.threads[selected].step_count += 1;

        let (instruction, description) = match outcome {
            Ok(outcome) => (outcome.instruction, outcome.description),
            Err(fault) => {
                self.state.error = Some(fault.message.clone());
                self.state.status = ExecStatus::Error;
                return self.result(None, format!("uncaught exception: {}", fault.message));
            }
        };

        if self.state.threads[selected].stack.is_empty() {
            self.state.threads[selected].status = ThreadStatus::Terminated;
            scheduler::release_all_monitors(&mut self.state, selected);
        } else if self.state.threads[selected].status == ThreadStatus::Running {
            self.state.threads[selected].status = ThreadStatus::Runnable;
        }

        scheduler::rotate(&mut self.state);
        self.state.pc = self.state.cur_frame().map(|f| f.pc).unwrap_or(self.state.pc);

        self.result(instruction, description)
    }

    /// Restores the most recent pre-step snapshot.
    pub fn step_back(&mut self) -> ExecutionResult {
        match self.history.pop() {
            Some(snapshot) => {
                self.state = snapshot;
                let step = self.state.step_number;
                self.result(None, format!("stepped back to step {}", step))
            }
            None => self.result(None, "no history to step back to".to_string()),
        }
    }

    /// Reinitialises the machine and clears history.
    pub fn reset(&mut self) {
        self.state = Self::boot(&self.program);
        self.history.clear();
        self.is_running = false;
    }

    /// Driver loop: steps until completion, error, or the safety cap.
    pub fn run(&mut self) -> ExecutionResult {
        self.is_running = true;
        self.state.status = ExecStatus::Running;
        let mut last = self.result(None, "running".to_string());
        let mut steps = 0u64;
        while self.is_running && self.can_step_forward() {
            if steps >= self.config.max_run_steps {
                debug!("run() stopped at the {}-step safety cap", steps);
                break;
            }
            last = self.step();
            steps += 1;
        }
        self.is_running = false;
        if self.state.status == ExecStatus::Running {
            self.state.status = ExecStatus::Paused;
        }
        last
    }

    pub fn pause(&mut self) {
        self.is_running = false;
        if self.state.status == ExecStatus::Running {
            self.state.status = ExecStatus::Paused;
        }
    }

    pub fn can_step_forward(&self) -> bool {
        !matches!(self.state.status, ExecStatus::Completed | ExecStatus::Error)
    }

    pub fn can_step_back(&self) -> bool {
        !self.history.is_empty()
    }

    /// Deep clone of the machine state.
    pub fn state(&self) -> VmState {
        self.state.clone()
    }

    pub fn program(&self) -> &CompiledProgram {
        &self.program
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;

    fn simulator(source: &str) -> Simulator {
        Simulator::new(compile(source).unwrap())
    }

    const HELLO: &str = r#"
        public class HelloWorld {
            public static void main(String[] args) {
                System.out.println("Hello, World!");
            }
        }
    "#;

    #[test]
    fn boot_parks_main_paused() {
        let sim = simulator(HELLO);
        let state = sim.state();
        assert_eq!(state.status, ExecStatus::Paused);
        assert_eq!(state.threads.len(), 1);
        assert_eq!(state.threads[0].name, "main");
        assert_eq!(state.threads[0].stack.len(), 1);
        assert_eq!(state.output, vec![String::new()]);
    }

    #[test]
    fn step_numbers_strictly_increase_and_history_grows() {
        let mut sim = simulator(HELLO);
        let mut previous = sim.state().step_number;
        for expected_history in 1..=5usize {
            let result = sim.step();
            assert_eq!(result.state.step_number, previous + 1);
            previous = result.state.step_number;
            assert_eq!(sim.history_len(), expected_history);
        }
    }

    #[test]
    fn step_back_restores_the_pre_step_snapshot() {
        let mut sim = simulator(HELLO);
        for _ in 0..3 {
            sim.step();
        }
        let before = sim.state();
        sim.step();
        let restored = sim.step_back();
        assert_eq!(restored.state, before);
        assert_eq!(sim.state(), before);
    }

    #[test]
    fn finished_steps_are_no_ops() {
        let mut sim = simulator(HELLO);
        sim.run();
        let state = sim.state();
        assert_eq!(state.status, ExecStatus::Completed);
        let after = sim.step();
        assert_eq!(after.state.step_number, state.step_number);
        assert!(after.description.contains("finished"));
    }

    #[test]
    fn reset_reboots_and_clears_history() {
        let mut sim = simulator(HELLO);
        sim.run();
        assert!(sim.can_step_back());
        sim.reset();
        assert!(!sim.can_step_back());
        assert_eq!(sim.state().status, ExecStatus::Paused);
        assert_eq!(sim.state().output, vec![String::new()]);
    }

    #[test]
    fn history_is_bounded_by_the_configured_limit() {
        let source = r#"
            class Loop {
                public static void main(String[] args) {
                    int i = 0;
                    while (i < 100) {
                        i = i + 1;
                    }
                }
            }
        "#;
        let mut sim = Simulator::with_config(
            compile(source).unwrap(),
            SimulatorConfig {
                history_limit: 8,
                ..SimulatorConfig::default()
            },
        );
        for _ in 0..50 {
            sim.step();
        }
        assert_eq!(sim.history_len(), 8);
    }

    #[test]
    fn at_most_one_thread_runs_at_any_observation_point() {
        let mut sim = simulator(HELLO);
        while sim.can_step_forward() {
            let state = sim.step().state;
            let running = state
                .threads
                .iter()
                .filter(|t| t.status == ThreadStatus::Running)
                .count();
            assert!(running <= 1);
        }
    }
}
