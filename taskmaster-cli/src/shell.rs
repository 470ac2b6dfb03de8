//! Line-oriented REPL over stdin. Each line is a verb optionally followed
//! by a program name; verbs dispatch straight to `SupervisionEngine`
//! operations. Missing required arguments print a usage message and
//! never touch engine state.

use std::io::{self, BufRead, Write};
use std::path::Path;

use taskmaster_runtime::{StatusRecord, SupervisionEngine};

const PROMPT: &str = "taskmaster> ";

/// Runs the REPL to completion: until the operator types `exit`/`quit`,
/// or stdin reaches EOF (treated the same as `exit`).
pub fn run(engine: &SupervisionEngine, config_path: &Path) {
    let stdin = io::stdin();
    print_prompt();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if !line.is_empty() {
            dispatch(engine, config_path, line);
        }
        if matches!(line, "exit" | "quit") {
            return;
        }
        print_prompt();
    }
    // EOF: behave as if `exit` had been typed.
}

fn print_prompt() {
    print!("{PROMPT}");
    let _ = io::stdout().flush();
}

fn dispatch(engine: &SupervisionEngine, config_path: &Path, line: &str) {
    let mut parts = line.split_whitespace();
    let verb = parts.next().unwrap_or_default();
    let arg = parts.next();

    match verb {
        "status" => cmd_status(engine, arg),
        "start" => cmd_mutating(arg, "start", || engine.start(arg.unwrap())),
        "stop" => cmd_mutating(arg, "stop", || engine.stop(arg.unwrap())),
        "restart" => cmd_mutating(arg, "restart", || engine.restart(arg.unwrap())),
        "reload" => cmd_reload(engine),
        "validate" => cmd_validate(config_path),
        "summary" => cmd_summary(engine),
        "exit" | "quit" => {}
        other => println!("unknown command '{other}'; try status, start, stop, restart, reload, validate, summary, exit"),
    }
}

fn cmd_mutating(arg: Option<&str>, verb: &str, op: impl FnOnce() -> Result<(), taskmaster_runtime::EngineError>) {
    let Some(name) = arg else {
        println!("usage: {verb} <name>");
        return;
    };
    match op() {
        Ok(()) => println!("{verb}: ok ({name})"),
        Err(e) => println!("{verb}: {e}"),
    }
}

fn cmd_status(engine: &SupervisionEngine, arg: Option<&str>) {
    match engine.status(arg) {
        Ok(rows) => print_status_table(&rows),
        Err(e) => println!("status: {e}"),
    }
}

fn print_status_table(rows: &[StatusRecord]) {
    for row in rows {
        let pid = row
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<10} pid={:<8} uptime={:<6}s retries={}",
            row.name, row.state, pid, row.uptime_secs, row.retry_count
        );
    }
}

fn cmd_reload(engine: &SupervisionEngine) {
    match engine.reload() {
        Ok(()) => println!("reload: ok"),
        Err(e) => println!("reload: {e}"),
    }
}

/// Re-parses the configuration file without touching engine state and
/// reports load errors plus any non-blocking validation warnings.
fn cmd_validate(config_path: &Path) {
    match taskmaster_config::load(config_path) {
        Ok(specs) => {
            let mut warning_count = 0;
            for spec in specs.values() {
                for warning in taskmaster_config::warnings(spec) {
                    println!("warning: {warning}");
                    warning_count += 1;
                }
            }
            println!(
                "validate: ok ({} program(s), {warning_count} warning(s))",
                specs.len()
            );
        }
        Err(e) => println!("validate: {e}"),
    }
}

/// One line per program: name, live/target instance count, and a recap
/// of any FATAL instances.
fn cmd_summary(engine: &SupervisionEngine) {
    for name in engine.program_names() {
        let Ok(rows) = engine.status(Some(&name)) else {
            continue;
        };
        let live = rows.iter().filter(|r| r.state != "STOPPED").count();
        let fatal = rows.iter().filter(|r| r.state == "FATAL").count();
        let target = rows.len();
        if fatal > 0 {
            println!("{name}: {live}/{target} live, {fatal} FATAL");
        } else {
            println!("{name}: {live}/{target} live");
        }
    }
}
