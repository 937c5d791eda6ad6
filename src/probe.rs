//! Periodic connectivity probe
//!
//! Sends a `HEAD` to the sheet service on a fixed interval from its own
//! thread. The probe is independent of the render pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use flume::{RecvTimeoutError, Sender};
use log::{debug, info, warn};
use reqwest::blocking::Client;

use crate::error::{Result, WorkspaceError};

struct Running {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct ConnectivityProbe {
    online: Arc<AtomicBool>,
    checks: Arc<AtomicU64>,
    running: Option<Running>,
}

impl ConnectivityProbe {
    /// Start probing `url` every `interval`
    pub fn start(url: impl Into<String>, interval: Duration, timeout: Duration) -> Result<Self> {
        let url = url.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WorkspaceError::fetch("http client", e))?;

        let online = Arc::new(AtomicBool::new(false));
        let checks = Arc::new(AtomicU64::new(0));
        let (stop, stop_rx) = flume::bounded::<()>(1);

        let thread_online = Arc::clone(&online);
        let thread_checks = Arc::clone(&checks);
        let handle = std::thread::Builder::new()
            .name("inkgrade-probe".to_string())
            .spawn(move || {
                loop {
                    let reachable = match client.head(&url).send() {
                        Ok(response) => !response.status().is_server_error(),
                        Err(e) => {
                            debug!("Probe to {url} failed: {e}");
                            false
                        }
                    };
                    if thread_online.swap(reachable, Ordering::Relaxed) != reachable {
                        if reachable {
                            info!("Sheet service reachable");
                        } else {
                            warn!("Sheet service unreachable");
                        }
                    }
                    thread_checks.fetch_add(1, Ordering::Relaxed);

                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| WorkspaceError::fetch("probe thread", e))?;

        Ok(Self {
            online,
            checks,
            running: Some(Running { stop, handle }),
        })
    }

    /// Result of the most recent probe
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    /// Number of completed probes
    #[must_use]
    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Stop the timer and join its thread. Returns false if already disposed.
    pub fn dispose(&mut self) -> bool {
        let Some(running) = self.running.take() else {
            return false;
        };
        let _ = running.stop.send(());
        if running.handle.join().is_err() {
            warn!("Probe thread panicked");
        }
        debug!("Connectivity probe disposed");
        true
    }
}

impl Drop for ConnectivityProbe {
    fn drop(&mut self) {
        self.dispose();
    }
}
