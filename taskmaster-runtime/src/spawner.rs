//! Pure spawn function: given a program spec, launch one child with the
//! required environment, working directory, umask, and stdio redirections.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use taskmaster_core::ProgramSpec;

use crate::error::SpawnError;

/// Environment variable set on every child to hint line-buffered output
/// for line-oriented children.
const UNBUFFERED_HINT: &str = "PYTHONUNBUFFERED";

/// Spawns one instance of `spec`. Any failure before a successful
/// fork/exec is reported uniformly as [`SpawnError`].
pub fn spawn(spec: &ProgramSpec) -> Result<Child, SpawnError> {
    let mut command = build_command(spec).map_err(|reason| SpawnError {
        program: spec.name.clone(),
        reason,
    })?;

    command.spawn().map_err(|e| SpawnError {
        program: spec.name.clone(),
        reason: e.to_string(),
    })
}

fn build_command(spec: &ProgramSpec) -> Result<Command, String> {
    let mut command = command_for(&spec.cmd);

    if let Some(dir) = &spec.workingdir {
        command.current_dir(dir);
    }

    for (key, value) in &spec.env {
        command.env(key, value);
    }
    if !spec.env.contains_key(UNBUFFERED_HINT) {
        command.env(UNBUFFERED_HINT, "1");
    }

    command.stdin(Stdio::null());
    command.stdout(stdio_for(spec.stdout.as_deref())?);
    command.stderr(stdio_for(spec.stderr.as_deref())?);

    install_child_preamble(&mut command, spec.umask);

    Ok(command)
}

/// Tokenizes `cmd` directly when it names a path (`/...` or `./...`),
/// otherwise runs it through the host shell so pipes, redirections, and
/// variable expansion work.
fn command_for(cmd: &str) -> Command {
    let trimmed = cmd.trim();
    if trimmed.starts_with('/') || trimmed.starts_with("./") {
        let mut parts = shell_words::split(trimmed)
            .unwrap_or_else(|_| trimmed.split_whitespace().map(str::to_string).collect());
        if parts.is_empty() {
            parts.push(trimmed.to_string());
        }
        let mut command = Command::new(&parts[0]);
        command.args(&parts[1..]);
        command
    } else {
        let mut command = Command::new("sh");
        command.arg("-c").arg(trimmed);
        command
    }
}

fn stdio_for(path: Option<&Path>) -> Result<Stdio, String> {
    match path {
        None => Ok(Stdio::null()),
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| format!("failed to create directory for {path:?}: {e}"))?;
                }
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("failed to open {path:?} for append: {e}"))?;
            Ok(Stdio::from(file))
        }
    }
}

/// Installs the umask, process-group, and parent-death-signal preamble
/// that runs in the child before exec. A no-op on non-Unix targets: the
/// supervisor assumes POSIX signal and process-group semantics throughout.
#[cfg(unix)]
fn install_child_preamble(command: &mut Command, umask: u32) {
    use std::os::unix::process::CommandExt;

    unsafe {
        command.pre_exec(move || {
            libc::umask(umask as libc::mode_t);
            nix::unistd::setsid().map_err(std::io::Error::from)?;
            set_parent_death_signal();
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn install_child_preamble(_command: &mut Command, _umask: u32) {}

/// Arranges for the child to receive `SIGTERM` if the supervisor dies
/// first, so orphaning it still terminates it. Linux-only; other Unixes
/// have no `PR_SET_PDEATHSIG` equivalent and are left as a best-effort
/// no-op.
#[cfg(target_os = "linux")]
fn set_parent_death_signal() {
    unsafe {
        libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn set_parent_death_signal() {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use taskmaster_core::{AutoRestart, Signal};

    fn base_spec(cmd: &str) -> ProgramSpec {
        ProgramSpec {
            name: "p".to_string(),
            cmd: cmd.to_string(),
            numprocs: 1,
            umask: 0o022,
            workingdir: None,
            autostart: false,
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
    fn spawns_direct_path_command() {
        let mut child = spawn(&base_spec("/bin/true")).unwrap();
        let status = child.wait().unwrap();
        assert!(status.success());
    }

    #[test]
    fn spawns_shell_command_for_non_path_cmd() {
        let mut child = spawn(&base_spec("true && exit 0")).unwrap();
        let status = child.wait().unwrap();
        assert!(status.success());
    }

    #[test]
    fn spawn_failure_of_missing_binary_is_reported() {
        let err = spawn(&base_spec("/nonexistent/binary/path")).unwrap_err();
        assert_eq!(err.program, "p");
    }

    #[test]
    fn redirects_stdout_to_configured_file() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("logs/out.log");
        let mut spec = base_spec("/bin/echo hello");
        spec.stdout = Some(out_path.clone());
        let mut child = spawn(&spec).unwrap();
        child.wait().unwrap();
        let content = std::fs::read_to_string(&out_path).unwrap();
        assert!(content.contains("hello"));
    }
}
