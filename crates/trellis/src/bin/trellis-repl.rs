use std::{
    fs,
    io::{self, Write},
    process::ExitCode,
};

use trellis::{BuilderSession, Op};

const HELP: &str = "\
Type assembly lines at the prompt; lines starting with `:` are commands.
  :help                 this list
  :list                 show the current lines
  :addl <n>             insert a blank line before line n and move there
  :rml <n>              remove line n
  :mvc <n|start|end>    move the cursor (alias :mvl)
  :qc                   assemble and report any errors
  :structured           assemble and show the control-flow tree
  :optimized            assemble, optimize, show the final listing
  :save <file>          save an annotated listing
  :load <file>          load a saved listing (annotations stripped)
  :clear                remove all lines
  :exit                 leave the builder";

fn main() -> ExitCode {
    let table = Op::table();
    let mut session = BuilderSession::new();

    println!("trellis builder — :help for commands");
    loop {
        let Some(line) = read_line(&format!("{:>3}| ", session.cursor())) else {
            println!();
            return ExitCode::SUCCESS;
        };
        let trimmed = line.trim();
        if let Some(command) = trimmed.strip_prefix(':') {
            if !run_command(command, &mut session, &table) {
                return ExitCode::SUCCESS;
            }
        } else if !trimmed.is_empty() {
            session.type_line(trimmed);
        }
    }
}

/// Executes one `:command`; returns `false` when the builder should exit.
fn run_command(command: &str, session: &mut BuilderSession, table: &trellis::EffectTable) -> bool {
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();

    match name {
        "help" => println!("{HELP}"),
        "list" => {
            for (index, line) in session.lines().iter().enumerate() {
                println!("{:>3}| {line}", index + 1);
            }
        }
        "addl" => match arg.and_then(|a| a.parse().ok()) {
            Some(number) if session.insert_line(number) => {}
            _ => eprintln!("addl needs a line number greater than 0"),
        },
        "rml" => match arg.and_then(|a| a.parse().ok()) {
            Some(number) if session.remove_line(number) => {}
            _ => eprintln!("rml needs an existing line number"),
        },
        "mvc" | "mvl" => {
            let target = match arg {
                Some("start") => Some(1),
                Some("end") => Some(session.end_line()),
                Some(other) => other.parse().ok(),
                None => None,
            };
            match target {
                Some(number) if session.move_cursor(number) => {}
                _ => eprintln!("mvc needs a line number, `start`, or `end`"),
            }
        }
        "qc" => match session.check(table) {
            Ok(()) => println!("no errors raised"),
            Err(err) => eprintln!("{err}"),
        },
        "structured" => match session.structured(table) {
            Ok(tree) => println!("{tree}"),
            Err(err) => eprintln!("{err}"),
        },
        "optimized" => match session.optimized(table) {
            Ok(listing) => println!("{listing}"),
            Err(err) => eprintln!("{err}"),
        },
        "save" => match arg {
            Some(path) => match session.save_listing(table) {
                Ok(listing) => {
                    if fs::metadata(path).is_ok() {
                        eprintln!("{path} already exists; remove it first");
                    } else if let Err(err) = fs::write(path, listing) {
                        eprintln!("could not save {path}: {err}");
                    } else {
                        println!("saved to {path}");
                    }
                }
                Err(err) => eprintln!("{err}"),
            },
            None => eprintln!("save needs a file name"),
        },
        "load" => match arg {
            Some(path) => match fs::read_to_string(path) {
                Ok(text) => {
                    session.load_listing(&text);
                    println!("loaded {} line(s)", session.lines().len());
                }
                Err(err) => eprintln!("could not load {path}: {err}"),
            },
            None => eprintln!("load needs a file name"),
        },
        "clear" => session.clear(),
        "exit" => return false,
        other => eprintln!("unknown command `{other}`; :help lists commands"),
    }
    true
}

fn read_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    io::stdout().flush().ok()?;
    let mut line = String::new();
    match io::stdin().read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_owned()),
        Err(_) => None,
    }
}
