use std::time::Duration;

/// Everything the plugins are built from, assembled once at startup.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    pub exit_after:               Option<Duration>,
    pub output_stdout:            bool,
    pub output_null:              bool,
    pub input_udp:                Vec<String>,
    pub input_udp_track_response: bool,
    pub input_http:               Vec<String>,
    pub output_udp:               Vec<String>,
    pub output_udp_config:        UdpConfig,
    pub output_http:              Vec<String>,
    pub output_http_config:       HttpConfig,
}

#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub track_responses: bool,
    pub stats:           bool,
    pub stats_ms:        u64,
    pub original_host:   bool,
    pub redirect_limit:  usize,
    pub workers_min:     usize,
    pub workers_max:     usize,
    pub queue_len:       usize,
    pub timeout:         Duration,
    pub worker_timeout:  Duration,
    pub skip_verify:     bool,
}

#[derive(Clone, Debug)]
pub struct UdpConfig {
    pub workers:         usize,
    pub timeout:         Duration,
    pub stats:           bool,
    pub ignore_response: bool,
}

impl HttpConfig {
    pub const MAX_WORKERS_MIN: usize = 1000;

    /// Replace unset or out of range values with their defaults.
    pub fn normalize(mut self) -> Self {
        if self.timeout < Duration::from_millis(100) {
            self.timeout = Duration::from_secs(1);
        }

        self.workers_min = self.workers_min.max(1).min(Self::MAX_WORKERS_MIN);

        if self.workers_max == 0 {
            self.workers_max = usize::MAX;
        }
        self.workers_max = self.workers_max.max(self.workers_min);

        if self.queue_len == 0 {
            self.queue_len = 1000;
        }

        if self.worker_timeout == Duration::from_secs(0) {
            self.worker_timeout = Duration::from_secs(2);
        }

        if self.stats_ms == 0 {
            self.stats_ms = 5000;
        }

        self
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            track_responses: false,
            stats:           false,
            stats_ms:        5000,
            original_host:   false,
            redirect_limit:  0,
            workers_min:     0,
            workers_max:     0,
            queue_len:       1000,
            timeout:         Duration::from_secs(5),
            worker_timeout:  Duration::from_secs(2),
            skip_verify:     false,
        }
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            workers:         0,
            timeout:         Duration::from_secs(5),
            stats:           false,
            ignore_response: false,
        }
    }
}
