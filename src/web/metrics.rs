use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use once_cell::sync::Lazy;

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

static FORUM_EVENTS_RECEIVED: AtomicU64 = AtomicU64::new(0);
static TELEGRAM_UPDATES_RECEIVED: AtomicU64 = AtomicU64::new(0);
static OUTBOUND_FAILED: AtomicU64 = AtomicU64::new(0);
static ECHOES_SUPPRESSED: AtomicU64 = AtomicU64::new(0);

pub struct Metrics;

impl Metrics {
    /// Pins the uptime origin; called once at startup.
    pub fn start() {
        Lazy::force(&STARTED_AT);
    }

    pub fn forum_event_received() {
        FORUM_EVENTS_RECEIVED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn telegram_update_received() {
        TELEGRAM_UPDATES_RECEIVED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn outbound_failed() {
        OUTBOUND_FAILED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn echo_suppressed() {
        ECHOES_SUPPRESSED.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn format_prometheus() -> String {
    let uptime = STARTED_AT.elapsed().as_secs();
    let forum_events = FORUM_EVENTS_RECEIVED.load(Ordering::Relaxed);
    let telegram_updates = TELEGRAM_UPDATES_RECEIVED.load(Ordering::Relaxed);
    let outbound_failed = OUTBOUND_FAILED.load(Ordering::Relaxed);
    let echoes = ECHOES_SUPPRESSED.load(Ordering::Relaxed);

    format!(
        r#"# HELP bridge_uptime_seconds Number of seconds the bridge has been running
# TYPE bridge_uptime_seconds gauge
bridge_uptime_seconds {}

# HELP forum_events_received_total Forum webhook deliveries accepted
# TYPE forum_events_received_total counter
forum_events_received_total {}

# HELP telegram_updates_received_total Telegram updates pulled by both bots
# TYPE telegram_updates_received_total counter
telegram_updates_received_total {}

# HELP outbound_failed_total Failures relayed back to the originating chat
# TYPE outbound_failed_total counter
outbound_failed_total {}

# HELP chat_echoes_suppressed_total Forum chat events dropped as the bridge's own writes
# TYPE chat_echoes_suppressed_total counter
chat_echoes_suppressed_total {}
"#,
        uptime, forum_events, telegram_updates, outbound_failed, echoes,
    )
}
