use assert_cmd::Command;
use std::path::PathBuf;

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("astrid-{}-{}", tag, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

const HELLO: &str = r#"
public class HelloWorld {
    public static void main(String[] args) {
        System.out.println("Hello, World!");
    }
}
"#;

#[test]
fn runs_a_source_file_to_completion() {
    let dir = scratch_dir("hello");
    let file = dir.join("HelloWorld.java");
    std::fs::write(&file, HELLO).unwrap();

    Command::cargo_bin("astrid")
        .unwrap()
        .arg(&file)
        .assert()
        .success()
        .stdout("Hello, World!\n");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn scans_directories_for_java_sources() {
    let dir = scratch_dir("dir");
    std::fs::write(dir.join("HelloWorld.java"), HELLO).unwrap();
    std::fs::write(dir.join("notes.txt"), "not java").unwrap();

    Command::cargo_bin("astrid")
        .unwrap()
        .arg(&dir)
        .assert()
        .success()
        .stdout("Hello, World!\n");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn compile_errors_exit_nonzero_with_position() {
    let dir = scratch_dir("bad");
    let file = dir.join("Bad.java");
    std::fs::write(&file, "class Bad { void f() { int = 5; } }").unwrap();

    let output = Command::cargo_bin("astrid")
        .unwrap()
        .arg(&file)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error"), "stderr was: {}", stderr);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn disassemble_dumps_offsets_and_mnemonics() {
    let dir = scratch_dir("dis");
    let file = dir.join("HelloWorld.java");
    std::fs::write(&file, HELLO).unwrap();

    let output = Command::cargo_bin("astrid")
        .unwrap()
        .arg("--disassemble")
        .arg(&file)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("main class: HelloWorld"), "stdout was: {}", stdout);
    assert!(stdout.contains("<HelloWorld.main(String[])>"));
    assert!(stdout.contains("PRINTLN"));
    assert!(stdout.contains("RETURN"));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn uncaught_exceptions_exit_nonzero() {
    let dir = scratch_dir("boom");
    let file = dir.join("Boom.java");
    std::fs::write(
        &file,
        r#"
class Boom {
    public static void main(String[] args) {
        throw new IllegalStateException("broken");
    }
}
"#,
    )
    .unwrap();

    let output = Command::cargo_bin("astrid")
        .unwrap()
        .arg(&file)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("IllegalStateException: broken"),
        "stderr was: {}",
        stderr
    );

    std::fs::remove_dir_all(&dir).ok();
}
