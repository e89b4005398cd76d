use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError, Sender};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Arm(Duration),
    Disarm,
    Stop,
}

/// One-shot deadline timer on its own thread. When an armed deadline passes
/// without a `disarm`, `on_expire` runs once and the thread exits.
pub struct Watchdog {
    tx: Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn spawn(on_expire: impl FnOnce() + Send + 'static) -> Result<Self> {
        let (tx, rx) = channel::unbounded::<Command>();
        let thread = thread::Builder::new()
            .name("glucoframe-watchdog".into())
            .spawn(move || {
                let mut deadline: Option<Instant> = None;
                loop {
                    let next = match deadline {
                        Some(at) => rx.recv_timeout(at.saturating_duration_since(Instant::now())),
                        None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };
                    match next {
                        Ok(Command::Arm(after)) => deadline = Some(Instant::now() + after),
                        Ok(Command::Disarm) => deadline = None,
                        Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => return,
                        Err(RecvTimeoutError::Timeout) => {
                            on_expire();
                            return;
                        }
                    }
                }
            })
            .map_err(Error::Io)?;
        Ok(Self {
            tx,
            thread: Some(thread),
        })
    }

    /// Start (or restart) the countdown.
    pub fn arm(&self, after: Duration) {
        let _ = self.tx.send(Command::Arm(after));
    }

    pub fn disarm(&self) {
        let _ = self.tx.send(Command::Disarm);
    }

    /// True once the timer thread has exited, either stopped or expired.
    pub fn is_finished(&self) -> bool {
        self.thread
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(true)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Stop);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}
