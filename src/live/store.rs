use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

use crate::sample::{seconds_between, PositionSample};

#[derive(Debug, Clone)]
pub struct Channel {
    pub id: String,
    pub last_sample: Option<PositionSample>,
    pub last_received_at: Option<DateTime<Utc>>,
}

impl Channel {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            last_sample: None,
            last_received_at: None,
        }
    }

    /// The instant staleness is measured from: the later of the sample's own
    /// timestamp and its local receipt time.
    pub fn reference_instant(&self) -> Option<DateTime<Utc>> {
        let sampled = self.last_sample.as_ref()?.timestamp;
        Some(match self.last_received_at {
            Some(received) => sampled.max(received),
            None => sampled,
        })
    }

    pub fn is_stale(&self, now: DateTime<Utc>, stale_timeout: Duration) -> bool {
        let Some(reference) = self.reference_instant() else {
            return true;
        };
        match seconds_between(now, reference) {
            Some(age) => age > stale_timeout.as_secs_f64(),
            None => true,
        }
    }
}

/// Latest known sample per channel, kept in first-seen order.
#[derive(Debug, Default)]
pub struct ChannelStore {
    channels: Vec<Channel>,
    index: HashMap<String, usize>,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the channel's last sample. Arrival order wins: an older
    /// timestamp still replaces a newer one.
    pub fn record_sample(
        &mut self,
        channel_id: &str,
        sample: PositionSample,
        received_at: DateTime<Utc>,
    ) {
        let channel = self.entry(channel_id);
        channel.last_sample = Some(sample);
        channel.last_received_at = Some(received_at);
    }

    /// Registers a channel without a sample. Returns true if it was new.
    pub fn ensure_channel(&mut self, channel_id: &str) -> bool {
        if self.index.contains_key(channel_id) {
            return false;
        }
        self.entry(channel_id);
        true
    }

    pub fn is_stale(
        &self,
        channel_id: &str,
        now: DateTime<Utc>,
        stale_timeout: Duration,
    ) -> bool {
        self.get(channel_id)
            .map(|channel| channel.is_stale(now, stale_timeout))
            .unwrap_or(true)
    }

    pub fn for_each_channel<F>(&self, mut f: F)
    where
        F: FnMut(&Channel),
    {
        for channel in &self.channels {
            f(channel);
        }
    }

    pub fn get(&self, channel_id: &str) -> Option<&Channel> {
        self.index.get(channel_id).map(|&i| &self.channels[i])
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.index.contains_key(channel_id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    fn entry(&mut self, channel_id: &str) -> &mut Channel {
        let i = match self.index.get(channel_id) {
            Some(&i) => i,
            None => {
                self.channels.push(Channel::new(channel_id));
                let i = self.channels.len() - 1;
                self.index.insert(channel_id.to_string(), i);
                i
            }
        };
        &mut self.channels[i]
    }
}
