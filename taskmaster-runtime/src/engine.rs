//! The supervision engine: owns every program's spec and instance table,
//! drives the monitor tick, and executes the operator-facing operations
//! (start/stop/restart/status/reload/shutdown).

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use taskmaster_core::{AutoRestart, Instance, InstanceStatus, ProgramSpec, Signal};

use crate::error::EngineError;
use crate::logging::{AlertLevel, LoggerHandle};
use crate::spawner;
use crate::status::StatusRecord;

/// One instance's core state plus the live OS handle needed to poll or
/// signal it. The handle is `None` for an instance that never spawned
/// (its most recent spawn attempt failed) or that has already exited.
struct InstanceRuntime {
    instance: Instance,
    child: Option<Child>,
}

/// Everything the engine lock protects.
struct EngineState {
    specs: BTreeMap<String, ProgramSpec>,
    programs: BTreeMap<String, Vec<InstanceRuntime>>,
}

/// Owns the supervised program table behind a single coarse lock. Every
/// public operation here, and the monitor tick, takes that lock for its
/// entire duration so a reader never observes a half-applied transition.
pub struct SupervisionEngine {
    state: Arc<Mutex<EngineState>>,
    logger: LoggerHandle,
    config_path: PathBuf,
    shutting_down: Arc<AtomicBool>,
}

impl SupervisionEngine {
    /// Builds the engine from an already-loaded spec table, starts every
    /// program with `autostart: true`, and spawns the monitor thread that
    /// ticks the state machine roughly once a second for the lifetime of
    /// the engine. Callers never drive ticking themselves.
    pub fn new(
        config_path: PathBuf,
        specs: BTreeMap<String, ProgramSpec>,
        logger: LoggerHandle,
    ) -> Self {
        let autostart: Vec<String> = specs
            .iter()
            .filter(|(_, spec)| spec.autostart)
            .map(|(name, _)| name.clone())
            .collect();

        let state = Arc::new(Mutex::new(EngineState {
            specs,
            programs: BTreeMap::new(),
        }));
        let shutting_down = Arc::new(AtomicBool::new(false));

        {
            let mut guard = state.lock().unwrap();
            for name in &autostart {
                let _ = start_locked(&mut guard, &logger, name);
            }
        }

        spawn_monitor_thread(Arc::clone(&state), logger.clone(), Arc::clone(&shutting_down));

        SupervisionEngine {
            state,
            logger,
            config_path,
            shutting_down,
        }
    }

    pub fn start(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        start_locked(&mut state, &self.logger, name)
    }

    pub fn stop(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        stop_locked(&mut state, &self.logger, name)
    }

    /// Equivalent to `stop` followed by `start`, with a short settle in
    /// between so the old instances' file descriptors are fully released.
    pub fn restart(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        stop_locked(&mut state, &self.logger, name)?;
        std::thread::sleep(Duration::from_millis(200));
        start_locked(&mut state, &self.logger, name)
    }

    /// Snapshot for one program, or every program if `name` is `None`.
    pub fn status(&self, name: Option<&str>) -> Result<Vec<StatusRecord>, EngineError> {
        let state = self.state.lock().unwrap();
        let names: Vec<String> = match name {
            Some(n) => {
                if !state.specs.contains_key(n) {
                    return Err(EngineError::UnknownProgram(n.to_string()));
                }
                vec![n.to_string()]
            }
            None => state.specs.keys().cloned().collect(),
        };

        let mut records = Vec::new();
        for program in names {
            let numprocs = state.specs[&program].numprocs;
            match state.programs.get(&program) {
                Some(runtimes) if !runtimes.is_empty() => {
                    for rt in runtimes {
                        let display = Instance::display_name(&program, rt.instance.index, numprocs);
                        records.push(StatusRecord::from_instance(display, &rt.instance));
                    }
                }
                _ => records.push(StatusRecord::stopped_row(&program)),
            }
        }
        Ok(records)
    }

    /// Reconciles the live spec table with a freshly loaded configuration.
    /// All-or-nothing at the parse boundary: a load failure leaves the
    /// current state untouched.
    pub fn reload(&self) -> Result<(), EngineError> {
        let new_specs = taskmaster_config::load(&self.config_path)?;
        let mut state = self.state.lock().unwrap();

        let old_names: BTreeSet<String> = state.specs.keys().cloned().collect();
        let new_names: BTreeSet<String> = new_specs.keys().cloned().collect();

        for name in old_names.difference(&new_names) {
            let _ = stop_locked(&mut state, &self.logger, name);
            state.programs.remove(name);
            state.specs.remove(name);
        }

        for name in new_names.difference(&old_names) {
            let spec = new_specs[name].clone();
            let autostart = spec.autostart;
            state.specs.insert(name.clone(), spec);
            if autostart {
                let _ = start_locked(&mut state, &self.logger, name);
            }
        }

        for name in old_names.intersection(&new_names) {
            let old_spec = state.specs[name].clone();
            let new_spec = new_specs[name].clone();
            if old_spec.structurally_equal(&new_spec) {
                state.specs.insert(name.clone(), new_spec);
            } else {
                let _ = stop_locked(&mut state, &self.logger, name);
                state.specs.insert(name.clone(), new_spec);
                let _ = start_locked(&mut state, &self.logger, name);
            }
        }

        Ok(())
    }

    /// Stops every program and blocks until all instances are terminal.
    /// Idempotent: a second call finds nothing left to stop.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let names: Vec<String> = state.specs.keys().cloned().collect();
        for name in names {
            let _ = stop_locked(&mut state, &self.logger, &name);
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Names of every configured program, sorted, regardless of whether
    /// it currently has any live instances.
    pub fn program_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.specs.keys().cloned().collect()
    }
}

/// Spawns the background monitor thread: ticks every program roughly once
/// a second until `shutting_down` is flipped. Detached rather than joined
/// by the engine; it observes the flag on its own schedule and exits, at
/// most one second after `shutdown()` sets it.
fn spawn_monitor_thread(
    state: Arc<Mutex<EngineState>>,
    logger: LoggerHandle,
    shutting_down: Arc<AtomicBool>,
) {
    std::thread::spawn(move || {
        while !shutting_down.load(Ordering::SeqCst) {
            {
                let mut guard = state.lock().unwrap();
                tick_locked(&mut guard, &logger);
            }
            std::thread::sleep(Duration::from_secs(1));
        }
    });
}

fn start_locked(
    state: &mut EngineState,
    logger: &LoggerHandle,
    name: &str,
) -> Result<(), EngineError> {
    let spec = state
        .specs
        .get(name)
        .cloned()
        .ok_or_else(|| EngineError::UnknownProgram(name.to_string()))?;

    let fully_live = state
        .programs
        .get(name)
        .map(|runtimes| {
            runtimes.len() as u32 == spec.numprocs
                && runtimes.iter().all(|rt| rt.instance.status.is_live())
        })
        .unwrap_or(false);
    if fully_live {
        return Ok(());
    }

    let fresh: Vec<InstanceRuntime> = (0..spec.numprocs)
        .map(|index| spawn_instance(&spec, index, logger, name))
        .collect();
    state.programs.insert(name.to_string(), fresh);
    Ok(())
}

fn stop_locked(
    state: &mut EngineState,
    logger: &LoggerHandle,
    name: &str,
) -> Result<(), EngineError> {
    if !state.specs.contains_key(name) {
        return Err(EngineError::UnknownProgram(name.to_string()));
    }
    let spec = state.specs[name].clone();
    let Some(mut runtimes) = state.programs.remove(name) else {
        return Ok(());
    };

    for rt in runtimes.iter_mut() {
        if rt.instance.status.is_live() {
            stop_one(rt, &spec, logger, name);
        }
    }
    Ok(())
}

fn tick_locked(state: &mut EngineState, logger: &LoggerHandle) {
    let specs = state.specs.clone();
    for (name, runtimes) in state.programs.iter_mut() {
        let Some(spec) = specs.get(name) else {
            continue;
        };
        for rt in runtimes.iter_mut() {
            tick_instance(rt, spec, logger, name);
        }
    }
}

fn spawn_instance(
    spec: &ProgramSpec,
    index: u32,
    logger: &LoggerHandle,
    program: &str,
) -> InstanceRuntime {
    let mut instance = Instance::new(index);
    match spawner::spawn(spec) {
        Ok(child) => {
            instance.pid = Some(child.id());
            instance.spawn_time = Some(Instant::now());
            instance.status = InstanceStatus::Starting;
            logger.log_process_event(
                program,
                AlertLevel::Info,
                &format!("instance {index} spawned (pid {})", child.id()),
            );
            InstanceRuntime {
                instance,
                child: Some(child),
            }
        }
        Err(e) => {
            instance.status = InstanceStatus::Backoff;
            logger.log_process_event(
                program,
                AlertLevel::Warn,
                &format!("instance {index} failed to spawn: {e}"),
            );
            InstanceRuntime {
                instance,
                child: None,
            }
        }
    }
}

/// Delivers `stopsignal`, polls for death up to `stoptime`, and escalates
/// to KILL if the child is still alive. The engine lock is held across
/// this wait by design: it guarantees no other operation on this program
/// races with the KILL escalation.
fn stop_one(rt: &mut InstanceRuntime, spec: &ProgramSpec, logger: &LoggerHandle, program: &str) {
    rt.instance.status = InstanceStatus::Stopping;
    rt.instance.stop_time = Some(Instant::now());
    let Some(child) = rt.child.as_mut() else {
        rt.instance.status = InstanceStatus::Stopped;
        rt.instance.pid = None;
        return;
    };
    let pid = child.id();
    send_signal(pid, spec.stopsignal);

    let deadline = Instant::now() + Duration::from_secs(spec.stoptime_secs);
    loop {
        match child.try_wait() {
            Ok(Some(_)) | Err(_) => {
                let elapsed = rt
                    .instance
                    .stop_time
                    .map(|t| t.elapsed().as_secs_f64())
                    .unwrap_or(0.0);
                logger.log_process_event(
                    program,
                    AlertLevel::Info,
                    &format!(
                        "instance {} stopped gracefully after {elapsed:.1}s",
                        rt.instance.index
                    ),
                );
                rt.instance.status = InstanceStatus::Stopped;
                rt.instance.pid = None;
                rt.child = None;
                return;
            }
            Ok(None) => {}
        }
        if Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    logger.log_process_event(
        program,
        AlertLevel::Warn,
        &format!(
            "instance {} ignored stopsignal, escalating to KILL",
            rt.instance.index
        ),
    );
    send_kill(pid);
    let _ = child.wait();
    rt.instance.status = InstanceStatus::Stopped;
    rt.instance.pid = None;
    rt.child = None;
}

fn tick_instance(rt: &mut InstanceRuntime, spec: &ProgramSpec, logger: &LoggerHandle, program: &str) {
    if !rt.instance.status.is_live() || rt.instance.status == InstanceStatus::Stopping {
        return;
    }

    let exited = rt
        .child
        .as_mut()
        .and_then(|child| match child.try_wait() {
            Ok(Some(status)) => Some(exit_code_from_status(status)),
            _ => None,
        });

    if let Some(code) = exited {
        rt.instance.last_exit = Some(code);
        rt.instance.pid = None;
        rt.child = None;
        rt.instance.status = match rt.instance.status {
            InstanceStatus::Starting => InstanceStatus::Backoff,
            InstanceStatus::Running => InstanceStatus::Exited,
            other => other,
        };
        logger.log_process_event(
            program,
            AlertLevel::Info,
            &format!("instance {} exited with code {code}", rt.instance.index),
        );
    } else if rt.instance.status == InstanceStatus::Starting {
        if let Some(spawn_time) = rt.instance.spawn_time {
            if spawn_time.elapsed().as_secs() >= spec.starttime_secs {
                rt.instance.status = InstanceStatus::Running;
                rt.instance.successfully_started = true;
            }
        }
    }

    if matches!(rt.instance.status, InstanceStatus::Backoff | InstanceStatus::Exited) {
        apply_restart_policy(rt, spec, logger, program);
    }
}

fn apply_restart_policy(
    rt: &mut InstanceRuntime,
    spec: &ProgramSpec,
    logger: &LoggerHandle,
    program: &str,
) {
    let should_restart = match spec.autorestart {
        AutoRestart::Always => true,
        AutoRestart::Never => false,
        AutoRestart::Unexpected => !spec.exitcodes.contains(&rt.instance.last_exit.unwrap_or(-1)),
    };

    if !should_restart {
        rt.instance.status = InstanceStatus::Stopped;
        return;
    }

    if rt.instance.retry_count >= spec.startretries {
        rt.instance.status = InstanceStatus::Fatal;
        logger.log_process_event(
            program,
            AlertLevel::Critical,
            &format!(
                "instance {} exhausted {} retries, marked fatal",
                rt.instance.index, spec.startretries
            ),
        );
        return;
    }

    rt.instance.retry_count += 1;
    std::thread::sleep(Duration::from_secs(1));
    match spawner::spawn(spec) {
        Ok(child) => {
            rt.instance.pid = Some(child.id());
            rt.instance.spawn_time = Some(Instant::now());
            rt.instance.status = InstanceStatus::Starting;
            rt.instance.successfully_started = false;
            rt.child = Some(child);
            logger.log_process_event(
                program,
                AlertLevel::Info,
                &format!(
                    "instance {} restarted (attempt {})",
                    rt.instance.index, rt.instance.retry_count
                ),
            );
        }
        Err(e) => {
            logger.log_process_event(
                program,
                AlertLevel::Warn,
                &format!("instance {} restart failed: {e}", rt.instance.index),
            );
        }
    }
}

#[cfg(unix)]
fn to_nix_signal(sig: Signal) -> nix::sys::signal::Signal {
    use nix::sys::signal::Signal as NixSignal;
    match sig {
        Signal::Term => NixSignal::SIGTERM,
        Signal::Int => NixSignal::SIGINT,
        Signal::Quit => NixSignal::SIGQUIT,
        Signal::Kill => NixSignal::SIGKILL,
        Signal::Hup => NixSignal::SIGHUP,
        Signal::Usr1 => NixSignal::SIGUSR1,
        Signal::Usr2 => NixSignal::SIGUSR2,
        Signal::Abrt => NixSignal::SIGABRT,
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, sig: Signal) {
    let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), to_nix_signal(sig));
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _sig: Signal) {}

#[cfg(unix)]
fn send_kill(pid: u32) {
    let _ = nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGKILL,
    );
}

#[cfg(not(unix))]
fn send_kill(_pid: u32) {}

#[cfg(unix)]
fn exit_code_from_status(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .unwrap_or_else(|| -status.signal().unwrap_or(0))
}

#[cfg(not(unix))]
fn exit_code_from_status(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
