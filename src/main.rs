use std::io::IsTerminal;
use std::path::Path;
use std::process;

use clap::{Parser, ValueEnum};

use quiver::diagnostic::{Diagnostic, Renderer};
use quiver::value::Value;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// Parsed phrase tree as JSON
    Ast,
    /// Assembled instruction listing
    Ops,
}

#[derive(Parser, Debug)]
#[command(name = "quiver")]
#[command(version, about = "Assemble and run quiver programs")]
struct Cli {
    /// Source file to run, or inline source text when no such file exists
    source: String,

    /// Vector to start in
    #[arg(default_value = "main")]
    entry: String,

    /// Seed values for the operand stack, bottom first
    #[arg(allow_negative_numbers = true)]
    args: Vec<String>,

    /// Print an intermediate form instead of running
    #[arg(long, value_enum)]
    emit: Option<Emit>,

    /// Leave out the control-flow prelude (if / ifelse / while)
    #[arg(long)]
    no_prelude: bool,
}

fn main() {
    let cli = Cli::parse();

    let source = match read_source(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read {}: {e}", cli.source);
            process::exit(1);
        }
    };

    let renderer = Renderer { use_color: std::io::stderr().is_terminal() };
    let report = |d: &Diagnostic| eprint!("{}", renderer.render(d, &source));

    // The tree of the user's own source, prelude elided.
    if cli.emit == Some(Emit::Ast) {
        let unit = match quiver::parse(&source) {
            Ok(unit) => unit,
            Err(e) => {
                report(&Diagnostic::from(&e));
                process::exit(1);
            }
        };
        match serde_json::to_string_pretty(&unit) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: {e}");
                process::exit(1);
            }
        }
        return;
    }

    let assembled = if cli.no_prelude {
        quiver::assemble(&source)
    } else {
        quiver::assemble_with_prelude(&source)
    };
    let program = match assembled {
        Ok(p) => p,
        Err(e) => {
            report(&Diagnostic::from(&e));
            process::exit(1);
        }
    };

    if cli.emit == Some(Emit::Ops) {
        print!("{}", program.listing());
        return;
    }

    let args: Vec<Value> = cli.args.iter().map(|raw| seed_value(raw)).collect();
    match quiver::run(&program, &cli.entry, args) {
        Ok(stack) => {
            let cells: Vec<String> = stack.iter().map(|v| v.to_string()).collect();
            println!("{}", cells.join(" "));
        }
        Err(fault) => {
            report(&Diagnostic::from(&fault));
            process::exit(1);
        }
    }
}

fn read_source(arg: &str) -> std::io::Result<String> {
    if Path::new(arg).is_file() {
        std::fs::read_to_string(arg)
    } else {
        Ok(arg.to_string())
    }
}

/// Command-line seed values: integer if it reads as one, then float,
/// otherwise the raw text as a string.
fn seed_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::int(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::float(f);
    }
    Value::str(raw)
}
