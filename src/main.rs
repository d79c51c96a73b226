use std::path::Path;
use std::process::ExitCode;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tarn::Tarn;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.len() {
        0 => run_repl(),
        1 => run_file(Path::new(&args[0])),
        _ => {
            eprintln!("Usage: tarn [script]");
            ExitCode::from(64)
        }
    }
}

fn run_file(path: &Path) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Could not read {}: {}", path.display(), error);
            return ExitCode::from(65);
        }
    };

    let mut tarn = Tarn::new();
    let errors = tarn.run(&source, std::io::stdout());
    if errors.is_empty() {
        return ExitCode::SUCCESS;
    }

    let mut runtime = false;
    for error in &errors {
        eprintln!("{error}");
        runtime |= error.is_runtime();
    }
    // 70 for errors raised during execution, 65 for the earlier stages.
    if runtime {
        ExitCode::from(70)
    } else {
        ExitCode::from(65)
    }
}

fn run_repl() -> ExitCode {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(error) => {
            eprintln!("Could not start the REPL: {error}");
            return ExitCode::from(65);
        }
    };

    let mut tarn = Tarn::new();

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(&line);
                for error in tarn.run(&line, std::io::stdout()) {
                    eprintln!("{error}");
                }
            }
            // Ctrl+C drops the current line and keeps the session.
            Err(ReadlineError::Interrupted) => continue,
            // Ctrl+D ends the session.
            Err(ReadlineError::Eof) => break,
            Err(error) => {
                eprintln!("REPL error: {error:?}");
                break;
            }
        }
    }

    ExitCode::SUCCESS
}
