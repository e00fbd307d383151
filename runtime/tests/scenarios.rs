//! End-to-end scenarios: literal Java source in, expected output lines
//! and state invariants out.

use astrid_runtime::{ExecStatus, Simulator, ThreadStatus, VmState, compile};

/// Steps to completion (bounded), collecting every post-step snapshot.
fn run_collecting(sim: &mut Simulator, cap: usize) -> Vec<VmState> {
    let mut snapshots = Vec::new();
    for _ in 0..cap {
        if !sim.can_step_forward() {
            break;
        }
        snapshots.push(sim.step().state);
    }
    snapshots
}

fn run_source(source: &str) -> (VmState, Vec<VmState>) {
    let mut sim = Simulator::new(compile(source).unwrap());
    let snapshots = run_collecting(&mut sim, 50_000);
    (sim.state(), snapshots)
}

fn printed_lines(state: &VmState) -> Vec<&str> {
    state.output.iter().map(String::as_str).collect()
}

fn assert_core_invariants(snapshots: &[VmState], instruction_count: usize) {
    for state in snapshots {
        // at most one RUNNING thread at any observation point
        let running = state
            .threads
            .iter()
            .filter(|t| t.status == ThreadStatus::Running)
            .count();
        assert!(running <= 1, "more than one running thread");

        // monitors and holding_monitors agree in both directions
        for (object, owner) in &state.monitors {
            if let Some(owner) = owner {
                let holder = state.threads.iter().find(|t| t.id == *owner).unwrap();
                assert!(holder.holding_monitors.contains(object));
            }
        }
        for thread in &state.threads {
            for held in &thread.holding_monitors {
                assert_eq!(state.monitors.get(held), Some(&Some(thread.id)));
            }
        }

        // every pc is a valid index or one past the end
        for thread in &state.threads {
            for frame in &thread.stack {
                assert!(frame.pc <= instruction_count, "pc escaped the program");
            }
        }
    }
}

#[test]
fn hello_world() {
    let source = r#"
        public class HelloWorld {
            public static void main(String[] args) {
                System.out.println("Hello, World!");
            }
        }
    "#;
    let program = compile(source).unwrap();
    let instruction_count = program.instructions.len();
    let mut sim = Simulator::new(program);
    let snapshots = run_collecting(&mut sim, 1_000);
    let state = sim.state();

    assert_eq!(state.output, vec!["Hello, World!".to_string(), String::new()]);
    assert_eq!(state.status, ExecStatus::Completed);
    assert_eq!(state.threads.len(), 1);
    assert_eq!(state.threads[0].status, ThreadStatus::Terminated);
    assert_core_invariants(&snapshots, instruction_count);
    insta::assert_snapshot!(state.output[0].as_str(), @"Hello, World!");
}

#[test]
fn arithmetic() {
    let source = r#"
        class Arithmetic {
            public static void main(String[] args) {
                int a = 10;
                int b = 5;
                System.out.println(a + b);
                System.out.println(a - b);
                System.out.println(a * b);
                System.out.println(a / b);
            }
        }
    "#;
    let (state, _) = run_source(source);
    assert_eq!(
        printed_lines(&state),
        vec!["15", "5", "50", "2", ""],
    );
    insta::assert_snapshot!(state.output.join("|"), @"15|5|50|2|");
}

#[test]
fn recursive_factorial_grows_and_unwinds_the_stack() {
    let source = r#"
        class Factorial {
            public static void main(String[] args) {
                System.out.println(factorial(5));
            }
            static int factorial(int n) {
                if (n <= 1) {
                    return 1;
                }
                return n * factorial(n - 1);
            }
        }
    "#;
    let mut sim = Simulator::new(compile(source).unwrap());
    let mut max_depth = 0usize;
    let mut final_depths = Vec::new();
    while sim.can_step_forward() {
        let state = sim.step().state;
        let depth = state.threads[0].stack.len();
        max_depth = max_depth.max(depth);
        final_depths.push(depth);
    }
    let state = sim.state();
    assert_eq!(state.output[0], "120");
    assert!(max_depth >= 6, "expected main + 5 recursive frames, saw {}", max_depth);
    // the stack unwinds back down before the program finishes
    assert!(final_depths.iter().rev().any(|d| *d == 1));
    assert_eq!(*final_depths.last().unwrap(), 0);
}

#[test]
fn for_loop_prints_each_iteration_then_total() {
    let source = r#"
        class Sum {
            public static void main(String[] args) {
                int total = 0;
                for (int i = 1; i <= 5; i++) {
                    System.out.println(i);
                    total += i;
                }
                System.out.println(total);
            }
        }
    "#;
    let (state, _) = run_source(source);
    assert_eq!(
        printed_lines(&state),
        vec!["1", "2", "3", "4", "5", "15", ""],
    );
}

#[test]
fn binary_tree_preorder_dfs() {
    let source = r#"
        class Node {
            int value;
            Node left;
            Node right;
            Node(int value) {
                this.value = value;
            }
        }
        class BinaryTree {
            public static void main(String[] args) {
                Node root = new Node(1);
                root.left = new Node(2);
                root.right = new Node(3);
                root.left.left = new Node(4);
                root.left.right = new Node(5);
                root.right.right = new Node(6);
                System.out.println("DFS Preorder:");
                preorder(root);
            }
            static void preorder(Node node) {
                if (node == null) {
                    return;
                }
                System.out.println(node.value);
                preorder(node.left);
                preorder(node.right);
            }
        }
    "#;
    let (state, _) = run_source(source);
    assert_eq!(
        printed_lines(&state),
        vec!["DFS Preorder:", "1", "2", "4", "5", "3", "6", ""],
    );
    assert_eq!(state.status, ExecStatus::Completed);
}

#[test]
fn monitor_coordination_between_two_threads() {
    let source = r#"
        import java.util.ArrayList;
        class Worker extends Thread {
            static ArrayList list;
            static Object lock;
            public void run() {
                for (int i = 0; i < 3; i++) {
                    synchronized (lock) {
                        list.add(i);
                    }
                }
            }
            public static void main(String[] args) {
                list = new ArrayList();
                lock = new Object();
                Worker a = new Worker();
                Worker b = new Worker();
                a.start();
                b.start();
                a.join();
                b.join();
                System.out.println(list.size());
            }
        }
    "#;
    let program = compile(source).unwrap();
    let instruction_count = program.instructions.len();
    let mut sim = Simulator::new(program);
    let snapshots = run_collecting(&mut sim, 50_000);
    let state = sim.state();

    assert_eq!(state.status, ExecStatus::Completed);
    assert_eq!(*printed_lines(&state).first().unwrap(), "6");
    assert_eq!(state.threads.len(), 3);
    assert!(state.threads.iter().all(|t| t.status == ThreadStatus::Terminated));

    // no monitor is ever owned by two different threads across snapshots
    assert_core_invariants(&snapshots, instruction_count);
}

#[test]
fn sleep_parks_then_wakes() {
    let source = r#"
        class Sleeper {
            public static void main(String[] args) {
                Thread.sleep(100);
                System.out.println("awake");
            }
        }
    "#;
    let mut sim = Simulator::new(compile(source).unwrap());
    let mut saw_timed_waiting = false;
    while sim.can_step_forward() {
        let state = sim.step().state;
        if state
            .threads
            .iter()
            .any(|t| t.status == ThreadStatus::TimedWaiting)
        {
            saw_timed_waiting = true;
        }
    }
    assert!(saw_timed_waiting);
    assert_eq!(sim.state().output[0], "awake");
}

#[test]
fn hashmap_put_get_size() {
    let source = r#"
        import java.util.HashMap;
        class Maps {
            public static void main(String[] args) {
                HashMap map = new HashMap();
                map.put("one", 1);
                map.put("two", 2);
                map.put("one", 11);
                System.out.println(map.get("one"));
                System.out.println(map.size());
                System.out.println(map.containsKey("three"));
            }
        }
    "#;
    let (state, _) = run_source(source);
    assert_eq!(printed_lines(&state), vec!["11", "2", "false", ""]);
}

#[test]
fn string_library_calls() {
    let source = r#"
        class Strings {
            public static void main(String[] args) {
                String s = "Hello";
                System.out.println(s.length());
                System.out.println(s.toUpperCase());
                System.out.println(s.substring(1, 3));
                System.out.println(s + ", " + "World" + "!");
                System.out.println("a,b,c".split(",").length);
            }
        }
    "#;
    let (state, _) = run_source(source);
    assert_eq!(
        printed_lines(&state),
        vec!["5", "HELLO", "el", "Hello, World!", "3", ""],
    );
}

#[test]
fn enhanced_for_over_array() {
    let source = r#"
        class Each {
            public static void main(String[] args) {
                int[] xs = {2, 3, 4};
                int sum = 0;
                for (int x : xs) {
                    sum += x;
                }
                System.out.println(sum);
            }
        }
    "#;
    let (state, _) = run_source(source);
    assert_eq!(state.output[0], "9");
}

#[test]
fn do_while_runs_the_body_before_the_check() {
    let source = r#"
        class DoWhile {
            public static void main(String[] args) {
                int i = 10;
                do {
                    System.out.println(i);
                } while (i < 5);
            }
        }
    "#;
    let (state, _) = run_source(source);
    assert_eq!(printed_lines(&state), vec!["10", ""]);
}

#[test]
fn break_escapes_a_do_while_on_the_first_pass() {
    let source = r#"
        class Breaker {
            public static void main(String[] args) {
                int i = 0;
                do {
                    i++;
                    if (i == 1) {
                        break;
                    }
                    System.out.println(i);
                } while (i < 5);
                System.out.println("done");
            }
        }
    "#;
    let (state, _) = run_source(source);
    assert_eq!(printed_lines(&state), vec!["done", ""]);
}

#[test]
fn continue_in_a_do_while_lands_on_the_condition() {
    let source = r#"
        class Skipper {
            public static void main(String[] args) {
                int i = 0;
                do {
                    i++;
                    if (i < 3) {
                        continue;
                    }
                    System.out.println(i);
                } while (i < 5);
            }
        }
    "#;
    let (state, _) = run_source(source);
    assert_eq!(printed_lines(&state), vec!["3", "4", "5", ""]);
}

#[test]
fn array_assignment_yields_the_stored_value() {
    let source = r#"
        class Store {
            public static void main(String[] args) {
                int[] a = new int[3];
                int x = (a[0] = 7);
                a[2] = a[1] = x + 1;
                System.out.println(x);
                System.out.println(a[0]);
                System.out.println(a[1]);
                System.out.println(a[2]);
            }
        }
    "#;
    let (state, _) = run_source(source);
    assert_eq!(printed_lines(&state), vec!["7", "7", "8", "8", ""]);
}

#[test]
fn uncaught_throw_is_terminal() {
    let source = r#"
        class Boom {
            public static void main(String[] args) {
                System.out.println("before");
                throw new RuntimeException("bad state");
            }
        }
    "#;
    let mut sim = Simulator::new(compile(source).unwrap());
    while sim.can_step_forward() {
        sim.step();
    }
    let state = sim.state();
    assert_eq!(state.status, ExecStatus::Error);
    assert_eq!(
        state.error.as_deref(),
        Some("RuntimeException: bad state")
    );
    assert_eq!(state.output[0], "before");

    // further stepping is a no-op
    let frozen = sim.step();
    assert_eq!(frozen.state.step_number, state.step_number);
}

#[test]
fn try_runs_catch_is_skipped_finally_runs() {
    let source = r#"
        class TryIt {
            public static void main(String[] args) {
                try {
                    System.out.println("try");
                } catch (Exception e) {
                    System.out.println("catch");
                } finally {
                    System.out.println("finally");
                }
                System.out.println("after");
            }
        }
    "#;
    let (state, _) = run_source(source);
    assert_eq!(printed_lines(&state), vec!["try", "finally", "after", ""]);
}

#[test]
fn interfaces_default_methods_and_dispatch() {
    let source = r#"
        interface Shape {
            double area();
            default String describe() {
                return "a shape";
            }
        }
        class Square implements Shape {
            double side;
            Square(double side) {
                this.side = side;
            }
            public double area() {
                return side * side;
            }
        }
        class Poly {
            public static void main(String[] args) {
                Square s = new Square(3.0);
                System.out.println(s.area());
                System.out.println(s.describe());
                System.out.println(s instanceof Shape);
            }
        }
    "#;
    let (state, _) = run_source(source);
    assert_eq!(printed_lines(&state), vec!["9.0", "a shape", "true", ""]);
}

#[test]
fn inheritance_with_super_constructor_and_override() {
    let source = r#"
        class Animal {
            String name;
            Animal(String name) {
                this.name = name;
            }
            String speak() {
                return "...";
            }
        }
        class Dog extends Animal {
            Dog(String name) {
                super(name);
            }
            String speak() {
                return name + " says Woof";
            }
        }
        class Kennel {
            public static void main(String[] args) {
                Dog d = new Dog("Rex");
                System.out.println(d.speak());
            }
        }
    "#;
    let (state, _) = run_source(source);
    assert_eq!(state.output[0], "Rex says Woof");
}

#[test]
fn string_builder_chains() {
    let source = r#"
        class Builder {
            public static void main(String[] args) {
                StringBuilder sb = new StringBuilder();
                sb.append("ab").append(12).append('!');
                System.out.println(sb.toString());
                System.out.println(sb.length());
            }
        }
    "#;
    let (state, _) = run_source(source);
    assert_eq!(printed_lines(&state), vec!["ab12!", "5", ""]);
}

#[test]
fn collections_sort_and_iteration() {
    let source = r#"
        import java.util.ArrayList;
        import java.util.Collections;
        class Sorter {
            public static void main(String[] args) {
                ArrayList list = new ArrayList();
                list.add(30);
                list.add(10);
                list.add(20);
                Collections.sort(list);
                for (int i = 0; i < list.size(); i++) {
                    System.out.println(list.get(i));
                }
            }
        }
    "#;
    let (state, _) = run_source(source);
    assert_eq!(printed_lines(&state), vec!["10", "20", "30", ""]);
}

#[test]
fn step_back_round_trip_equality_across_a_whole_program() {
    let source = r#"
        class Counter {
            public static void main(String[] args) {
                int n = 0;
                for (int i = 0; i < 3; i++) {
                    n += i;
                }
                System.out.println(n);
            }
        }
    "#;
    let mut sim = Simulator::new(compile(source).unwrap());
    for _ in 0..20 {
        if !sim.can_step_forward() {
            break;
        }
        let before = sim.state();
        sim.step();
        sim.step_back();
        assert_eq!(sim.state(), before);
        sim.step();
    }
}
