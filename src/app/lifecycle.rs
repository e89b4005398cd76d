use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::display::Rgb;
use crate::hardware::{DeviceControl, RestartReason};
use crate::{Error, Result};

use super::context::AppContext;
use super::Logger;

/// Exit code asking the supervisor to start the daemon again.
pub const RESTART_EXIT_CODE: i32 = 3;
/// Exit code for a device that has to go back through setup.
pub const SETUP_EXIT_CODE: i32 = 2;

/// Install a ctrl-c handler that flips the shared running flag instead of exiting immediately.
pub(super) fn create_shutdown_flag() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let running_handle = running.clone();

    ctrlc::set_handler(move || {
        running_handle.store(false, Ordering::SeqCst);
    })
    .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;

    Ok(running)
}

/// On a host the process is the device: restarting means exiting for the supervisor.
pub struct ProcessRestart {
    logger: Logger,
}

impl ProcessRestart {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl DeviceControl for ProcessRestart {
    fn restart(&self, reason: RestartReason) -> Result<()> {
        let code = match reason {
            RestartReason::InvalidConfig | RestartReason::Reconfigure => SETUP_EXIT_CODE,
            RestartReason::Watchdog => RESTART_EXIT_CODE,
        };
        self.logger
            .error(format!("exiting with code {code}: {reason}"));
        std::process::exit(code);
    }
}

/// Leave the outputs dark and still before the daemon exits.
pub(super) fn quiesce_outputs(ctx: &AppContext) {
    if let Err(err) = ctx.peripherals.set_zones([Rgb::BLACK; 3]) {
        ctx.logger.warn(format!("failed to clear indicator: {err}"));
    }
    if let Err(err) = ctx.peripherals.vibrate(0) {
        ctx.logger.warn(format!("failed to stop vibration: {err}"));
    }
}
