//! End-to-end scenarios driving real child processes through the
//! supervision engine's public API.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use taskmaster_core::{AutoRestart, ProgramSpec, Signal};
use taskmaster_runtime::{LoggerHandle, SupervisionEngine};

fn logger() -> LoggerHandle {
    let dir = tempfile::tempdir().unwrap();
    LoggerHandle::init(&dir.path().join("taskmaster.log"), None).unwrap()
}

fn base_spec(name: &str, cmd: &str) -> ProgramSpec {
    ProgramSpec {
        name: name.to_string(),
        cmd: cmd.to_string(),
        numprocs: 1,
        umask: 0o022,
        workingdir: None,
        autostart: true,
        autorestart: AutoRestart::Never,
        exitcodes: [0].into_iter().collect::<BTreeSet<_>>(),
        startretries: 3,
        starttime_secs: 1,
        stopsignal: Signal::Term,
        stoptime_secs: 10,
        stdout: None,
        stderr: None,
        env: BTreeMap::new(),
    }
}

#[test]
fn autostart_with_expected_exit_under_unexpected_policy_retries_to_fatal() {
    let mut spec = base_spec("p", "/bin/true");
    spec.autorestart = AutoRestart::Unexpected;
    spec.exitcodes = [0].into_iter().collect();
    spec.startretries = 3;
    spec.starttime_secs = 1;

    let mut specs = BTreeMap::new();
    specs.insert("p".to_string(), spec);
    let engine = SupervisionEngine::new(PathBuf::new(), specs, logger());

    // /bin/true exits instantly, before the 1s starttime grace period, so
    // every attempt lands in BACKOFF, which always retries regardless of
    // autorestart policy until startretries is exhausted.
    std::thread::sleep(Duration::from_millis(500));
    for _ in 0..4 {
        std::thread::sleep(Duration::from_millis(1100));
        let rows = engine.status(Some("p")).unwrap();
        if rows[0].state == "FATAL" {
            break;
        }
    }
    let rows = engine.status(Some("p")).unwrap();
    assert_eq!(rows[0].state, "FATAL");
    assert_eq!(rows[0].retry_count, 3);
}

#[test]
fn always_restart_service_respawns_after_external_kill() {
    let mut spec = base_spec("p", "/bin/sleep 60");
    spec.autorestart = AutoRestart::Always;
    spec.starttime_secs = 1;

    let mut specs = BTreeMap::new();
    specs.insert("p".to_string(), spec);
    let engine = SupervisionEngine::new(PathBuf::new(), specs, logger());

    std::thread::sleep(Duration::from_millis(1300));
    let before = engine.status(Some("p")).unwrap();
    assert_eq!(before[0].state, "RUNNING");
    let first_pid = before[0].pid.unwrap();

    unsafe {
        libc::kill(first_pid as i32, libc::SIGTERM);
    }

    std::thread::sleep(Duration::from_millis(2500));
    let after = engine.status(Some("p")).unwrap();
    assert_eq!(after[0].retry_count, 1);
    assert_ne!(after[0].pid, Some(first_pid));

    engine.shutdown();
}

#[test]
fn graceful_then_forced_stop_escalates_to_kill() {
    let mut spec = base_spec("p", "trap '' TERM; sleep 30");
    spec.stopsignal = Signal::Term;
    spec.stoptime_secs = 2;

    let mut specs = BTreeMap::new();
    specs.insert("p".to_string(), spec);
    let engine = SupervisionEngine::new(PathBuf::new(), specs, logger());

    std::thread::sleep(Duration::from_millis(1500));
    let start = std::time::Instant::now();
    engine.stop("p").unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(4));
    let rows = engine.status(Some("p")).unwrap();
    assert_eq!(rows[0].state, "STOPPED");
}

#[test]
fn reload_with_numprocs_change_restarts_with_new_instance_count() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("taskmaster.yaml");
    std::fs::write(
        &config_path,
        "programs:\n  p:\n    cmd: \"/bin/sleep 100\"\n    numprocs: 1\n    autostart: true\n    starttime: 1\n",
    )
    .unwrap();

    let specs = taskmaster_config::load(&config_path).unwrap();
    let engine = SupervisionEngine::new(config_path.clone(), specs, logger());
    std::thread::sleep(Duration::from_millis(1300));
    assert_eq!(engine.status(Some("p")).unwrap().len(), 1);

    std::fs::write(
        &config_path,
        "programs:\n  p:\n    cmd: \"/bin/sleep 100\"\n    numprocs: 3\n    autostart: true\n    starttime: 1\n",
    )
    .unwrap();
    engine.reload().unwrap();
    std::thread::sleep(Duration::from_millis(1300));

    let rows = engine.status(Some("p")).unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.state == "RUNNING"));

    engine.shutdown();
}

#[test]
fn reload_with_policy_only_change_does_not_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("taskmaster.yaml");
    std::fs::write(
        &config_path,
        "programs:\n  p:\n    cmd: \"/bin/sleep 100\"\n    autostart: true\n    autorestart: never\n    starttime: 1\n",
    )
    .unwrap();

    let specs = taskmaster_config::load(&config_path).unwrap();
    let engine = SupervisionEngine::new(config_path.clone(), specs, logger());
    std::thread::sleep(Duration::from_millis(1300));
    let before = engine.status(Some("p")).unwrap();
    let pid_before = before[0].pid.unwrap();

    std::fs::write(
        &config_path,
        "programs:\n  p:\n    cmd: \"/bin/sleep 100\"\n    autostart: true\n    autorestart: always\n    starttime: 1\n",
    )
    .unwrap();
    engine.reload().unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let after = engine.status(Some("p")).unwrap();
    assert_eq!(after[0].pid, Some(pid_before));

    engine.shutdown();
}

#[test]
fn retry_exhaustion_marks_instance_fatal_without_further_spawns() {
    let mut spec = base_spec("p", "/bin/false");
    spec.autorestart = AutoRestart::Always;
    spec.startretries = 2;
    spec.starttime_secs = 1;

    let mut specs = BTreeMap::new();
    specs.insert("p".to_string(), spec);
    let engine = SupervisionEngine::new(PathBuf::new(), specs, logger());

    std::thread::sleep(Duration::from_millis(4500));
    let rows = engine.status(Some("p")).unwrap();
    assert_eq!(rows[0].state, "FATAL");
    assert_eq!(rows[0].retry_count, 2);

    std::thread::sleep(Duration::from_millis(1200));
    let still = engine.status(Some("p")).unwrap();
    assert_eq!(still[0].state, "FATAL");
    assert_eq!(still[0].retry_count, 2);
}
