//! The CLI front door: parse a program file, run it, report failures with a
//! non-zero exit code.
//!
//! run with `--help` for more info.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use triad_jit::front::parse;
use triad_jit::interp::sink::StdoutSink;
use triad_jit::interp::Interpreter;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the input program file
    file: String,
    /// disable hot-block compilation; interpret every block
    #[arg(long, default_value_t = false)]
    no_jit: bool,
    /// raise the log level (repeatable: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "triad_jit=warn",
        1 => "triad_jit=info",
        2 => "triad_jit=debug",
        _ => "triad_jit=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> std::process::ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let input = match std::fs::read_to_string(&args.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed: could not read `{}`: {e}", args.file);
            return std::process::ExitCode::FAILURE;
        }
    };

    let result = parse(&input).and_then(|program| {
        Interpreter::new(program, StdoutSink)
            .map(|i| i.with_jit_enabled(!args.no_jit))
            .and_then(|mut interp| interp.run())
    });

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Failed: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}
