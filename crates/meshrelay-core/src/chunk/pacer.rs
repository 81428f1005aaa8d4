//! Paced chunk transmission.
//!
//! Before the first chunk the pacer waits a uniform draw from
//! `[delay_min, delay_max]`; between chunks it waits a fixed interval. A send
//! failure abandons the remaining chunks. There is no retry.

use std::time::Duration;

use rand::RngExt;
use serde::Serialize;

use meshrelay_types::config::{ResponseConfig, seconds};
use meshrelay_types::error::TransportError;
use meshrelay_types::message::Destination;

use crate::transport::Transport;

/// How a paced delivery ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Partial,
    Failed,
}

/// Result of sending one reply's chunks.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub sent: usize,
    pub total: usize,
    pub failure: Option<TransportError>,
}

impl DeliveryReport {
    pub fn outcome(&self) -> DeliveryOutcome {
        match (&self.failure, self.sent) {
            (None, _) => DeliveryOutcome::Delivered,
            (Some(_), 0) => DeliveryOutcome::Failed,
            (Some(_), _) => DeliveryOutcome::Partial,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pacer {
    delay_min: Duration,
    delay_max: Duration,
    inter_chunk: Duration,
}

impl Pacer {
    pub fn new(delay_min: Duration, delay_max: Duration, inter_chunk: Duration) -> Self {
        Self {
            delay_min,
            delay_max: delay_max.max(delay_min),
            inter_chunk,
        }
    }

    pub fn from_config(config: &ResponseConfig) -> Self {
        Self::new(
            seconds(config.delay_min),
            seconds(config.delay_max),
            seconds(config.inter_chunk_delay),
        )
    }

    /// A pacer that never sleeps.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }

    fn lead_in(&self) -> Duration {
        if self.delay_max <= self.delay_min {
            return self.delay_min;
        }
        let secs = rand::rng()
            .random_range(self.delay_min.as_secs_f64()..=self.delay_max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Send `chunks` in order to `destination`, stopping at the first failure.
    pub async fn deliver<T: Transport>(
        &self,
        transport: &T,
        destination: &Destination,
        chunks: &[String],
    ) -> DeliveryReport {
        let total = chunks.len();
        let mut report = DeliveryReport {
            sent: 0,
            total,
            failure: None,
        };
        if total == 0 {
            return report;
        }

        tokio::time::sleep(self.lead_in()).await;

        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && !self.inter_chunk.is_zero() {
                tokio::time::sleep(self.inter_chunk).await;
            }
            if let Err(err) = transport.send(destination, chunk).await {
                tracing::error!(
                    %destination,
                    chunk = i + 1,
                    total,
                    error = %err,
                    "Failed to send chunk, abandoning the rest"
                );
                report.failure = Some(err);
                return report;
            }
            report.sent += 1;
            tracing::debug!(%destination, chunk = i + 1, total, "Sent chunk");
        }

        report
    }
}
