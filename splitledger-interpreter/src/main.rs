#![warn(clippy::uninlined_format_args)]

mod bootstrap;
mod session;

use std::{borrow::Cow, env, fs, process};

use bootstrap::{AppConfig, init_logging};
use session::ScriptSession;
use splitledger_application::LedgerService;
use splitledger_infrastructure::{InMemoryLedgerStore, InMemoryMemberRegistry, SystemClock};
use splitledger_parser::parse_script;

type CliResult<T> = Result<T, Cow<'static, str>>;

fn main() {
    init_logging();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn run() -> CliResult<()> {
    let Some(path) = env::args().nth(1) else {
        return Err("Usage: splitledger-interpreter <file.ledger>".into());
    };

    let config = AppConfig::from_env().map_err(|err| format!("Invalid configuration: {err}"))?;

    let source =
        fs::read_to_string(&path).map_err(|err| format!("Failed to read '{path}': {err}"))?;
    let script = parse_script(&source).map_err(|err| err.to_string())?;

    let store = InMemoryLedgerStore::new();
    let registry = InMemoryMemberRegistry::new();
    let clock = SystemClock;
    let service = LedgerService::new(&store, &registry, &clock, config.service_config());
    let mut session = ScriptSession::new(&store, &registry, service, config.confirmed_by);

    let mut printed = false;
    for statement in &script.statements {
        if let Some(output) = session.execute(statement).map_err(|err| err.to_string())? {
            println!("{output}");
            printed = true;
        }
    }

    if !printed {
        if let Some(summary) = session.summary().map_err(|err| err.to_string())? {
            println!("{summary}");
        }
    }

    tracing::debug!(statements = script.statements.len(), "Script finished");
    Ok(())
}
