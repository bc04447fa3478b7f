//! SIGCHLD handling.
//!
//! The signal handler only writes a byte to a socket. The control loop
//! drains that socket and does the actual reaping and job-table updates
//! synchronously, so nothing but a `write(2)` ever runs in signal context.

use std::io::{self, Read};
use std::os::unix::net::UnixStream;

use log::{debug, error, trace};
use signal_hook::consts::SIGCHLD;
use signal_hook::low_level::{self, pipe};
use signal_hook::SigId;

use crate::errors::{Result, ResultExt};
use crate::shell::job_control::{JobEvent, JobManager};

pub struct Reaper {
    wakeup: UnixStream,
    sig_id: SigId,
    /// Children may have changed state before the handler was installed.
    pending: bool,
}

impl Reaper {
    /// Installs the SIGCHLD handler.
    pub fn install() -> Result<Reaper> {
        let (read_end, write_end) =
            UnixStream::pair().chain_err(|| "failed to create SIGCHLD wake-up channel")?;
        read_end.set_nonblocking(true)?;
        let sig_id = pipe::register(SIGCHLD, write_end)
            .chain_err(|| "failed to install SIGCHLD handler")?;
        debug!("SIGCHLD handler installed");
        Ok(Reaper {
            wakeup: read_end,
            sig_id,
            pending: true,
        })
    }

    /// Returns `true` if at least one SIGCHLD arrived since the last call.
    /// Coalesced signals are indistinguishable from a single one.
    pub fn take_notification(&mut self) -> bool {
        let mut buf = [0u8; 64];
        let mut notified = self.pending;
        self.pending = false;
        loop {
            match self.wakeup.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => notified = true,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("failed to read SIGCHLD wake-up channel: {}", e);
                    // Reap anyway rather than risk missing a child.
                    notified = true;
                    break;
                }
            }
        }
        notified
    }

    /// Reconciles the job table with children that changed state since the
    /// last call. Does nothing if no SIGCHLD arrived.
    pub fn drain(&mut self, job_manager: &mut JobManager) -> Vec<JobEvent> {
        if !self.take_notification() {
            return Vec::new();
        }

        trace!("draining SIGCHLD notifications");
        match job_manager.reap_children() {
            Ok(events) => events,
            Err(e) => {
                error!("failed to reap children: {}", e);
                Vec::new()
            }
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        low_level::unregister(self.sig_id);
    }
}
