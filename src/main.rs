//! nterm - single-instance terminal activation
//!
//! Parses the command line into a window/tab tree, then either forwards it
//! to the running server instance or becomes that server.

use std::process;

use log::LevelFilter;

use nterm_app::{ProfileStore, TerminalOptions};

fn main() {
    let argv: Vec<String> = std::env::args().collect();
    init_logging(&argv);

    let profiles = match ProfileStore::load() {
        Ok(store) => store,
        Err(err) => {
            eprintln!("nterm: cannot load profiles: {err}");
            process::exit(1);
        }
    };

    let mut options = match TerminalOptions::parse(&argv, &profiles) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("nterm: {err}");
            process::exit(1);
        }
    };
    options.load_environment();

    if options.show_version {
        println!("nterm {}", env!("CARGO_PKG_VERSION"));
        process::exit(0);
    }
    if options.show_preferences {
        println!("nterm: profiles live in profiles.toml under the nterm config directory");
        process::exit(0);
    }

    match nterm_server::run(options, profiles) {
        Ok(exit_code) => process::exit(exit_code),
        Err(err) => {
            eprintln!("nterm: {err:#}");
            process::exit(1);
        }
    }
}

/// The logger must exist before parsing, which can warn; so the verbosity
/// flags get a cheap pre-scan of their own.
fn init_logging(argv: &[String]) {
    let mut verbosity: i8 = 0;
    for arg in argv.iter().skip(1) {
        match arg.as_str() {
            "-v" | "--verbose" => verbosity += 1,
            "-q" | "--quiet" => verbosity -= 1,
            // Nothing after the command terminator is an option.
            "--" | "-x" | "--execute" => break,
            _ => {}
        }
    }

    let level = level_for(verbosity);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.to_string()))
        .format_timestamp_millis()
        .init();
}

fn level_for(verbosity: i8) -> LevelFilter {
    match verbosity {
        i8::MIN..=-1 => LevelFilter::Error,
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
