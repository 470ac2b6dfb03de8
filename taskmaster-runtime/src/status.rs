//! Snapshot records shared by the shell `status` command and the HTTP
//! dashboard's JSON route.

use serde::Serialize;

use taskmaster_core::{Instance, InstanceStatus};

/// One row of a status snapshot: either a live instance or, for a program
/// with no live instances, a single synthetic `STOPPED` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRecord {
    pub name: String,
    pub state: String,
    pub pid: Option<u32>,
    pub uptime_secs: u64,
    pub retry_count: u32,
}

impl StatusRecord {
    pub fn from_instance(display_name: String, instance: &Instance) -> Self {
        StatusRecord {
            name: display_name,
            state: instance.status.label().to_string(),
            pid: instance.pid,
            uptime_secs: instance.uptime_secs(),
            retry_count: instance.retry_count,
        }
    }

    pub fn stopped_row(program: &str) -> Self {
        StatusRecord {
            name: program.to_string(),
            state: InstanceStatus::Stopped.label().to_string(),
            pid: None,
            uptime_secs: 0,
            retry_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_row_has_no_pid_and_zero_uptime() {
        let row = StatusRecord::stopped_row("nginx");
        assert_eq!(row.name, "nginx");
        assert_eq!(row.state, "STOPPED");
        assert!(row.pid.is_none());
        assert_eq!(row.uptime_secs, 0);
    }

    #[test]
    fn from_instance_carries_pid_and_retry_count() {
        let mut instance = Instance::new(1);
        instance.status = InstanceStatus::Running;
        instance.pid = Some(4242);
        instance.retry_count = 2;
        let row = StatusRecord::from_instance("worker:1".to_string(), &instance);
        assert_eq!(row.pid, Some(4242));
        assert_eq!(row.retry_count, 2);
        assert_eq!(row.state, "RUNNING");
    }
}
