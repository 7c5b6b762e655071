use serde::Serialize;
use std::time::Instant;
use webrtc::stats::{StatsReport, StatsReportType};

/// Link quality snapshot. Fields the transport does not report stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub round_trip_time_ms: Option<f64>,
    pub bitrate_kbps: Option<f64>,
    /// Fraction of packets lost as seen by the remote receiver, in `[0, 1]`.
    pub packet_loss: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl ConnectionStats {
    pub fn from_report(report: &StatsReport, sampler: &mut BitrateSampler, now: Instant) -> Self {
        let mut stats = Self::default();
        let mut lost: i64 = 0;
        let mut received: u64 = 0;
        let mut has_remote_inbound = false;

        for entry in report.reports.values() {
            match entry {
                StatsReportType::CandidatePair(pair) if pair.nominated => {
                    if pair.current_round_trip_time > 0.0 {
                        stats.round_trip_time_ms = Some(pair.current_round_trip_time * 1000.0);
                    }
                    stats.bytes_sent += pair.bytes_sent;
                    stats.bytes_received += pair.bytes_received;
                }
                StatsReportType::RemoteInboundRTP(remote) => {
                    has_remote_inbound = true;
                    lost += remote.packets_lost;
                    received += remote.packets_received;
                }
                _ => {}
            }
        }

        if has_remote_inbound {
            stats.packet_loss = loss_ratio(lost, received);
        }
        stats.bitrate_kbps = sampler.sample(now, stats.bytes_sent + stats.bytes_received);
        stats
    }
}

fn loss_ratio(lost: i64, received: u64) -> Option<f64> {
    let lost = lost.max(0) as f64;
    let total = lost + received as f64;
    (total > 0.0).then(|| lost / total)
}

/// Turns cumulative byte counters into a rate between two successive samples.
#[derive(Debug, Default)]
pub struct BitrateSampler {
    last: Option<(Instant, u64)>,
}

impl BitrateSampler {
    pub fn sample(&mut self, now: Instant, total_bytes: u64) -> Option<f64> {
        let previous = self.last.replace((now, total_bytes));
        let (at, bytes) = previous?;
        let elapsed = now.checked_duration_since(at)?.as_secs_f64();
        if elapsed <= 0.0 || total_bytes < bytes {
            return None;
        }
        Some((total_bytes - bytes) as f64 * 8.0 / 1000.0 / elapsed)
    }
}
