use astrid_runtime::compiler::code::disassemble;
use astrid_runtime::{ExecStatus, Simulator, SimulatorConfig};
use clap::Parser;
use tracing_log::log::debug;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(version, about = "Educational Java VM: compile .java sources and run them step by step")]
pub struct Args {
    #[arg(
        required = true,
        help = ".java files or directories to scan for sources"
    )]
    pub sources: Vec<String>,
    #[arg(
        short = 'm',
        long = "main-class",
        help = "Entry class; defaults to the first class declaring main(String[])"
    )]
    pub main_class: Option<String>,
    #[arg(
        long = "max-steps",
        default_value_t = 50_000,
        help = "Safety cap on executed steps to stop runaway loops"
    )]
    pub max_steps: u64,
    #[arg(long, help = "Print one line per executed step to stderr")]
    pub trace: bool,
    #[arg(long, help = "Dump the compiled instruction vector and exit")]
    pub disassemble: bool,
}

fn collect_sources(paths: &[String]) -> Result<String, String> {
    let mut combined = String::new();
    for path in paths {
        let meta =
            std::fs::metadata(path).map_err(|e| format!("cannot read '{}': {}", path, e))?;
        if meta.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.map_err(|e| format!("walking '{}': {}", path, e))?;
                if entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|ext| ext == "java")
                {
                    let text = std::fs::read_to_string(entry.path())
                        .map_err(|e| format!("cannot read '{}': {}", entry.path().display(), e))?;
                    combined.push_str(&text);
                    combined.push('\n');
                }
            }
        } else {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read '{}': {}", path, e))?;
            combined.push_str(&text);
            combined.push('\n');
        }
    }
    if combined.trim().is_empty() {
        return Err("no Java sources found".to_string());
    }
    Ok(combined)
}

fn print_program_output(output: &[String]) {
    // the trailing empty line is the cursor after the last println
    let lines = match output.last() {
        Some(last) if last.is_empty() => &output[..output.len() - 1],
        _ => output,
    };
    for line in lines {
        println!("{}", line);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    debug!("Provided command line arguments: {:?}", args);

    let source = match collect_sources(&args.sources) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    let mut program = match astrid_runtime::compile(&source) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(main_class) = args.main_class {
        program.main_class = main_class;
    }

    if args.disassemble {
        println!("main class: {}", program.main_class);
        let mut offsets: Vec<_> = program.method_offsets.iter().collect();
        offsets.sort_by_key(|(_, offset)| **offset);
        for (key, offset) in offsets {
            println!("{:5}  <{}>", offset, key);
        }
        println!("{}", disassemble(&program.instructions));
        return;
    }

    let config = SimulatorConfig {
        max_run_steps: args.max_steps,
        ..SimulatorConfig::default()
    };
    let mut simulator = Simulator::with_config(program, config);

    if args.trace {
        let mut steps = 0u64;
        while simulator.can_step_forward() && steps < args.max_steps {
            let result = simulator.step();
            eprintln!("{:6}  {}", result.state.step_number, result.description);
            steps += 1;
        }
    } else {
        simulator.run();
    }

    let state = simulator.state();
    print_program_output(&state.output);

    if let Some(error) = &state.error {
        eprintln!("Exception in thread \"main\" {}", error);
        std::process::exit(1);
    }
    if state.status != ExecStatus::Completed {
        eprintln!("warning: stopped after {} steps without completing", state.step_number);
    }
}
