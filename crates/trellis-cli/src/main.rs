use std::{env, fs, process::ExitCode, time::Instant};

use trellis::{Op, Optimizer, Program, Reconstruction, StderrTracer, assemble, disassemble, reconstruct_program};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let file_path = if args.len() > 1 { &args[1] } else { "program.asm" };
    let snapshot_path = args.get(2);

    let mut program = match read_program(file_path) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let table = Op::table();

    println!("Disassembly:");
    println!("{}", disassemble(&program, &table));

    let start = Instant::now();
    match reconstruct_program(&program, &table) {
        Ok(result) => {
            let elapsed = start.elapsed();
            println!("\nStructure ({elapsed:?}):");
            println!("{}", result.body().render(&table));
            if let Reconstruction::Partial { resumed_at, .. } = result {
                println!("(scan stopped at position {resumed_at})");
            }
        }
        Err(err) => {
            eprintln!("reconstruction failed:\n{err}");
            return ExitCode::FAILURE;
        }
    }

    let start = Instant::now();
    let summary = match Optimizer::new(&mut program, &table, StderrTracer).run() {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("optimization failed:\n{err}");
            return ExitCode::FAILURE;
        }
    };
    let elapsed = start.elapsed();
    println!(
        "\nOptimized ({elapsed:?}, {} cycle(s), {} rewrite(s)):",
        summary.cycles, summary.rewrites
    );
    println!("{}", disassemble(&program, &table));

    if let Some(path) = snapshot_path {
        let bytes = match program.snapshot() {
            Ok(bytes) => bytes,
            Err(err) => {
                eprintln!("could not serialize snapshot: {err}");
                return ExitCode::FAILURE;
            }
        };
        if let Err(err) = fs::write(path, bytes) {
            eprintln!("could not write {path}: {err}");
            return ExitCode::FAILURE;
        }
        println!("\nsnapshot written to {path}");
    }

    ExitCode::SUCCESS
}

/// Reads a program from an assembly file, a JSON interchange file, or a
/// binary snapshot, judging by extension.
fn read_program(file_path: &str) -> Result<Program, String> {
    eprintln!("Reading file: {file_path}");
    match fs::metadata(file_path) {
        Ok(metadata) => {
            if !metadata.is_file() {
                return Err(format!("{file_path} is not a file"));
            }
        }
        Err(err) => {
            return Err(format!("cannot read {file_path}: {err}"));
        }
    }

    if file_path.ends_with(".json") {
        let text = fs::read_to_string(file_path).map_err(|err| format!("cannot read {file_path}: {err}"))?;
        return Program::from_json(&text).map_err(|err| format!("invalid program JSON: {err}"));
    }
    if file_path.ends_with(".bin") {
        let bytes = fs::read(file_path).map_err(|err| format!("cannot read {file_path}: {err}"))?;
        return Program::from_snapshot(&bytes).map_err(|err| format!("invalid snapshot: {err}"));
    }

    let text = fs::read_to_string(file_path).map_err(|err| format!("cannot read {file_path}: {err}"))?;
    let table = Op::table();
    assemble(&text, &table)
        .map(|assembled| assembled.program)
        .map_err(|err| err.to_string())
}
