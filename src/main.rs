//! subc CLI
//!
//! Command-line front end: reads C source from a file or stdin, runs it
//! through the compiler pipeline, and writes the generated assembly to
//! stdout or a file.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;
use std::rc::Rc;

use clap::Parser as ClapParser;

use subc::diagnostics::Diagnostic;

#[derive(ClapParser)]
#[command(name = "subc")]
#[command(about = "A C11-subset compiler emitting x86-64 System V assembly", long_about = None)]
struct Cli {
    /// Source path, or `-` for stdin
    input: String,

    /// Write assembly here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Treat every warning as a fatal error
    #[arg(short = 'W', long)]
    warnings_as_errors: bool,

    /// Dump the parsed AST to stderr before code generation
    #[arg(long)]
    emit_ast: bool,
}

fn read_input(path: &str) -> io::Result<String> {
    if path == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        fs::read_to_string(path)
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let source = read_input(&cli.input).map_err(|e| format!("{}: {e}", cli.input))?;
    let filename: Rc<str> = if cli.input == "-" {
        Rc::from("<stdin>")
    } else {
        Rc::from(cli.input.as_str())
    };

    let (translation_unit, warnings) = subc::parse(source, filename).map_err(|d| d.to_string())?;

    if cli.emit_ast {
        eprintln!("{translation_unit:#?}");
    }

    let asm = subc::codegen::generate(&translation_unit).map_err(|d| d.to_string())?;

    for w in &warnings {
        eprintln!("{w}");
    }
    if cli.warnings_as_errors {
        if let Some(first) = warnings.first() {
            return Err(Diagnostic::internal(format!("warnings treated as errors: {first}")).to_string());
        }
    }

    match cli.output {
        Some(path) => fs::write(&path, asm).map_err(|e| format!("{}: {e}", path.display()))?,
        None => io::stdout().write_all(asm.as_bytes()).map_err(|e| e.to_string())?,
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(msg) = run(cli) {
        eprintln!("{msg}");
        process::exit(1);
    }
}
