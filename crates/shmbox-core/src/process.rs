//! Role processes and their exit-status contract
//!
//! A role reports its count (messages sent or received) as its exit code.
//! Code [`ROLE_FAILURE_EXIT`] means the role hit an error; termination by
//! a signal is abnormal. Waiters treat both as hard failures.

use crate::protocol::MAX_REPORTABLE_COUNT;
use crate::{Error, Result};
use std::process::ExitStatus;

/// Exit code of a role that failed with an error
pub const ROLE_FAILURE_EXIT: i32 = 255;

/// Exit code a role should terminate with after finishing with `result`
pub fn role_exit_code(result: &Result<usize>) -> i32 {
    match result {
        Ok(count) if *count <= MAX_REPORTABLE_COUNT => *count as i32,
        Ok(count) => {
            log::error!("count {} cannot be reported through an exit status", count);
            ROLE_FAILURE_EXIT
        }
        Err(e) => {
            log::error!("role failed: {}", e);
            ROLE_FAILURE_EXIT
        }
    }
}

/// Count reported by a role that exited with `status`
pub fn exit_count(status: ExitStatus) -> Result<usize> {
    match status.code() {
        Some(ROLE_FAILURE_EXIT) => Err(Error::RoleFailed),
        Some(code) if code >= 0 => Ok(code as usize),
        Some(code) => Err(Error::RoleAbnormalExit(format!("exit code {}", code))),
        None => Err(Error::RoleAbnormalExit(status.to_string())),
    }
}

#[cfg(unix)]
pub use fork::run_forked_round;

#[cfg(unix)]
mod fork {
    use super::*;
    use crate::mailbox::MailboxArray;
    use crate::protocol::{consume, produce, ProtocolConfig, RoundReport};
    use crate::segment::SegmentHandle;
    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::{fork, ForkResult};

    /// Run one round with a forked consumer sharing `segment`
    ///
    /// The child inherits the mapping, sweeps the mailbox and exits with its
    /// count; this process produces and then waits for it. The segment is
    /// left for the caller to destroy.
    pub fn run_forked_round(segment: &SegmentHandle, config: &ProtocolConfig) -> Result<RoundReport> {
        config.validate()?;
        let mailbox = MailboxArray::new(segment, config.boxes)?;

        match unsafe { fork() }? {
            ForkResult::Child => {
                let result = consume(&mailbox, config);
                std::process::exit(role_exit_code(&result));
            }
            ForkResult::Parent { child } => {
                log::debug!("forked consumer {}", child);
                let sent = produce(&mailbox, config);
                // Always reap the child, even when producing failed.
                let status = waitpid(child, None)?;
                let received = wait_status_count(status)?;
                Ok(RoundReport {
                    sent: sent?,
                    received,
                })
            }
        }
    }

    fn wait_status_count(status: WaitStatus) -> Result<usize> {
        match status {
            WaitStatus::Exited(_, ROLE_FAILURE_EXIT) => Err(Error::RoleFailed),
            WaitStatus::Exited(_, code) => Ok(code as usize),
            WaitStatus::Signaled(pid, signal, _) => Err(Error::RoleAbnormalExit(format!(
                "process {} killed by {:?}",
                pid, signal
            ))),
            other => Err(Error::RoleAbnormalExit(format!("{:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_exit_code() {
        assert_eq!(role_exit_code(&Ok(12)), 12);
        assert_eq!(role_exit_code(&Ok(0)), 0);
        assert_eq!(role_exit_code(&Ok(MAX_REPORTABLE_COUNT + 1)), ROLE_FAILURE_EXIT);
        assert_eq!(role_exit_code(&Err(Error::NotOwner)), ROLE_FAILURE_EXIT);
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_count() {
        use std::os::unix::process::ExitStatusExt;

        // Raw wait statuses: exit code in the high byte, signal in the low bits.
        assert_eq!(exit_count(ExitStatus::from_raw(12 << 8)).unwrap(), 12);
        assert!(matches!(
            exit_count(ExitStatus::from_raw(ROLE_FAILURE_EXIT << 8)),
            Err(Error::RoleFailed)
        ));
        assert!(matches!(
            exit_count(ExitStatus::from_raw(9)),
            Err(Error::RoleAbnormalExit(_))
        ));
    }
}
