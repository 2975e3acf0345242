use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use log::info;
use parking_lot::Mutex;

/// Tracks queue depth and logs a summary every interval until dropped.
pub struct Stats {
    state: Arc<Mutex<State>>,
}

struct State {
    name:   String,
    latest: usize,
    mean:   usize,
    max:    usize,
    count:  usize,
}

impl Stats {
    pub fn new(name: &str, interval: Duration) -> Self {
        let state = Arc::new(Mutex::new(State {
            name:   name.to_owned(),
            latest: 0,
            mean:   0,
            max:    0,
            count:  0,
        }));

        let weak = Arc::downgrade(&state);
        thread::spawn(move || report(weak, interval));

        Self { state }
    }

    pub fn write(&self, latest: usize) {
        let mut s = self.state.lock();
        if latest > s.max {
            s.max = latest;
        }
        if latest != 0 {
            s.mean = (s.mean * s.count + latest) / (s.count + 1);
        }
        s.latest = latest;
        s.count += 1;
    }

    /// `name:latest,mean,max,count,count/sec`
    pub fn summary(&self, interval: Duration) -> String {
        self.state.lock().summary(interval)
    }
}

impl State {
    fn summary(&self, interval: Duration) -> String {
        let secs = interval.as_secs().max(1) as usize;
        format!("{}:{},{},{},{},{}", self.name, self.latest, self.mean, self.max, self.count, self.count / secs)
    }

    fn reset(&mut self) {
        self.mean  = 0;
        self.max   = 0;
        self.count = 0;
    }
}

fn report(state: Weak<Mutex<State>>, interval: Duration) {
    loop {
        thread::sleep(interval);

        let state = match state.upgrade() {
            Some(state) => state,
            None        => return,
        };

        let mut s = state.lock();
        info!("{}", s.summary(interval));
        s.reset();
    }
}
