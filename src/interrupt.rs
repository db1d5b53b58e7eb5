//! Termination signals (Ctrl-C, `kill`) during a run.
//!
//! While the handlers are installed a first signal only raises a flag: the
//! editor or script in the foreground still receives it from the terminal
//! and exits, the pipeline notices the flag at its next step and returns an
//! error, and the temporary files are dropped normally. A second signal
//! while the first is pending exits at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;

use crate::error::{PipethisError, Result};

/// Exit status for a second signal, before cleanup has run.
const FORCED_EXIT: i32 = 1;

/// Set once a termination signal arrives. The default value is never set.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    /// Catch SIGINT, SIGTERM and SIGQUIT for the rest of the process.
    pub fn install() -> Result<Self> {
        let flag = Arc::new(AtomicBool::new(false));
        for &signal in TERM_SIGNALS {
            // Registered first so it only fires once `flag` is already set.
            flag::register_conditional_shutdown(signal, FORCED_EXIT, Arc::clone(&flag))?;
            flag::register(signal, Arc::clone(&flag))?;
        }
        Ok(Self { flag })
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Interrupted)` once a signal has arrived.
    pub fn check(&self) -> Result<()> {
        if self.is_set() {
            tracing::warn!("interrupted, cleaning up");
            return Err(PipethisError::Interrupted);
        }
        Ok(())
    }
}
