//! Cooperative stop flag shared by the capture loop and its listeners.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Trigger on the first Ctrl-C. A second Ctrl-C exits immediately,
    /// for when the loop is stuck waiting on the camera.
    pub fn listen_ctrl_c(&self) {
        let stop = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("cannot install Ctrl-C handler");
                return;
            }
            tracing::info!("Ctrl-C received, stopping");
            stop.trigger();

            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("second Ctrl-C, exiting now");
                std::process::exit(130);
            }
        });
    }

    /// Trigger when a line reading `q` arrives on stdin.
    ///
    /// Runs on its own thread since stdin reads block; the thread ends at EOF.
    pub fn listen_stdin(&self) {
        let stop = self.clone();
        let spawned = std::thread::Builder::new()
            .name("alterego-stdin".into())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    if is_quit(&line) {
                        tracing::info!("quit requested");
                        stop.trigger();
                        break;
                    }
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "cannot watch stdin for quit key");
        }
    }
}

fn is_quit(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("q")
}
