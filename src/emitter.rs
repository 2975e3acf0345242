use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use log::{debug, info, warn};
use crate::plugin::{Plugins, Reader, Result, Writer};

/// Drives one copy loop per input, and one per output that replays
/// responses, until shut down.
pub struct Emitter {
    plugins: Arc<Plugins>,
    tasks:   Vec<JoinHandle<()>>,
}

impl Emitter {
    pub fn new(plugins: Plugins) -> Self {
        Self {
            plugins: Arc::new(plugins),
            tasks:   Vec::new(),
        }
    }

    pub fn start(&mut self) {
        let inputs    = self.plugins.inputs.iter();
        let responses = self.plugins.responses.iter();

        for (n, src) in inputs.chain(responses).enumerate() {
            let src     = src.clone();
            let outputs = self.plugins.outputs.clone();
            self.tasks.push(thread::spawn(move || {
                match copy_multi(&*src, &outputs) {
                    Ok(())                    => debug!("copy {} finished", n),
                    Err(e) if e.is_terminal() => debug!("copy {} stopped: {}", n, e),
                    Err(e)                    => warn!("copy {} failed: {}", n, e),
                }
            }));
        }
    }

    /// Start copying and block until `shutdown` is raised.
    pub fn run(mut self, shutdown: Arc<AtomicBool>) {
        self.start();

        let interval = Duration::from_millis(100);
        while !shutdown.load(Ordering::Acquire) {
            thread::sleep(interval);
        }

        self.close();
    }

    pub fn close(self) {
        info!("closing plugins");
        self.plugins.close();
        for task in self.tasks {
            if task.join().is_err() {
                warn!("copy task panicked");
            }
        }
    }
}

/// Copy every message read from `src` to each writer in turn. All
/// writers must accept a message before the next one is read.
pub fn copy_multi(src: &dyn Reader, writers: &[Arc<dyn Writer>]) -> Result<()> {
    loop {
        let msg = match src.read() {
            Ok(msg)                   => msg,
            Err(e) if e.is_terminal() => return Ok(()),
            Err(e)                    => return Err(e),
        };

        if let Some((last, rest)) = writers.split_last() {
            for dst in rest {
                dst.write(msg.clone())?;
            }
            last.write(msg)?;
        }
    }
}
