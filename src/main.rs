mod chunk;
mod compiler;
mod debug;
mod reporter;
mod scanner;
mod table;
mod token;
mod value;
mod vm;

use reporter::CliReporter;
use rustyline::error::ReadlineError;
use rustyline::Editor;
use std::{env, fs, process};
use vm::{interpret, InterpretResult, Vm};

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    match args.len() {
        0 => run_repl(),
        1 => run_file(&args[0]),
        _ => {
            eprintln!("Usage: rlox [path]");
            process::exit(exitcode::USAGE);
        }
    }
}

fn run_file(path: &str) {
    let source = fs::read_to_string(path).unwrap_or_else(|err| {
        eprintln!("Could not read file \"{}\": {}", path, err);
        process::exit(exitcode::IOERR);
    });

    let mut vm = Vm::new();
    let mut reporter = CliReporter::new();
    match interpret(&mut vm, &source, &mut reporter) {
        InterpretResult::Ok => process::exit(exitcode::OK),
        InterpretResult::CompileError => process::exit(exitcode::DATAERR),
        InterpretResult::RuntimeError => process::exit(exitcode::SOFTWARE),
    }
}

fn run_repl() {
    let mut vm = Vm::new();
    let mut editor = Editor::<()>::new();

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    break;
                }
                editor.add_history_entry(line.as_str());
                let mut reporter = CliReporter::new();
                let _ = interpret(&mut vm, &line, &mut reporter);
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Readline error: {}", err);
                break;
            }
        }
    }
}
