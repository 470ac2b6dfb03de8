//! Process entrypoint: loads configuration, constructs the supervision
//! engine (which starts its own monitor thread), starts the HTTP
//! dashboard in a background thread, and runs the interactive shell on
//! the main thread.

mod dashboard;
mod shell;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use taskmaster_runtime::{EmailConfig, LoggerHandle, SupervisionEngine};

/// Default path for the rotating supervisor log.
const DEFAULT_LOG_PATH: &str = "taskmaster.log";

/// Fixed port the HTTP dashboard listens on.
const DASHBOARD_PORT: u16 = 8080;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("--version") | Some("-V") => {
            println!("taskmaster {}", env!("CARGO_PKG_VERSION"));
            process::exit(0);
        }
        None => {
            eprintln!("usage: taskmaster <config_file>");
            process::exit(1);
        }
        Some(_) => {}
    }

    let config_path = PathBuf::from(&args[1]);
    let specs = match taskmaster_config::load(&config_path) {
        Ok(specs) => specs,
        Err(e) => {
            eprintln!("taskmaster: {e}");
            process::exit(1);
        }
    };

    let logger = match LoggerHandle::init(&PathBuf::from(DEFAULT_LOG_PATH), EmailConfig::from_env())
    {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("taskmaster: failed to open log file: {e}");
            process::exit(1);
        }
    };

    let engine = Arc::new(SupervisionEngine::new(config_path.clone(), specs, logger));

    let dashboard_engine = Arc::clone(&engine);
    std::thread::spawn(move || dashboard::serve(dashboard_engine, DASHBOARD_PORT));

    install_shutdown_signal_handler(Arc::clone(&engine));

    shell::run(&engine, &config_path);

    engine.shutdown();
}

/// Installs a `SIGINT`/`SIGTERM` handler that flips an async-signal-safe
/// flag; a background thread polls the flag and invokes `shutdown()`
/// exactly once. Signal handlers themselves only set an atomic so nothing
/// unsafe to call from a handler (locking, allocation) runs in one.
#[cfg(unix)]
fn install_shutdown_signal_handler(engine: Arc<SupervisionEngine>) {
    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
    use std::sync::atomic::{AtomicBool, Ordering};

    static SIGNALLED: AtomicBool = AtomicBool::new(false);

    extern "C" fn on_signal(_: libc::c_int) {
        SIGNALLED.store(true, Ordering::SeqCst);
    }

    unsafe {
        let action = SigAction::new(
            SigHandler::Handler(on_signal),
            SaFlags::empty(),
            SigSet::empty(),
        );
        let _ = signal::sigaction(Signal::SIGINT, &action);
        let _ = signal::sigaction(Signal::SIGTERM, &action);
    }

    std::thread::spawn(move || {
        while !SIGNALLED.load(Ordering::SeqCst) {
            std::thread::sleep(std::time::Duration::from_millis(200));
        }
        engine.shutdown();
        process::exit(0);
    });
}

#[cfg(not(unix))]
fn install_shutdown_signal_handler(_engine: Arc<SupervisionEngine>) {}
