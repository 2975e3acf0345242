use std::time::{Duration, SystemTime, UNIX_EPOCH};
use super::{header, Kind};

/// Unit of traffic handed from stage to stage.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Message {
    pub meta: Vec<u8>,
    pub data: Vec<u8>,
}

impl Message {
    pub fn new(meta: Vec<u8>, data: Vec<u8>) -> Self {
        Self { meta, data }
    }

    pub fn len(&self) -> usize {
        self.meta.len() + self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of replaying a request.
#[derive(Clone, Debug)]
pub struct Response {
    pub payload:    Vec<u8>,
    pub id:         Vec<u8>,
    pub started_at: SystemTime,
    pub elapsed:    Duration,
}

impl Response {
    /// HTTP replies carry the time the request was sent.
    pub fn started(self) -> Message {
        let meta = header(Kind::ReplayedResponse, &self.id, nanos(self.started_at), None);
        Message::new(meta, self.payload)
    }

    /// UDP replies carry the round trip time.
    pub fn round_trip(self) -> Message {
        let rtt  = self.elapsed.as_nanos() as i64;
        let meta = header(Kind::ReplayedResponse, &self.id, rtt, None);
        Message::new(meta, self.payload)
    }
}

pub fn nanos(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as i64).unwrap_or(0)
}
