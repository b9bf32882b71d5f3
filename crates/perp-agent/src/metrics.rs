use std::time::Instant;

/// Per-cycle and aggregate telemetry for the control loop.
pub struct AgentMetrics {
    pub cycles_run: u64,
    pub coins_scanned: u64,
    pub coins_skipped: u64,
    pub signals_generated: u64,
    pub entries_opened: u64,
    pub exits_closed: u64,
    pub orders_failed: u64,
    pub near_misses_recorded: u64,

    pub last_scan_duration_ms: u64,
    pub last_total_duration_ms: u64,

    log_interval_cycles: u64,
}

impl AgentMetrics {
    pub fn new(log_interval_cycles: u64) -> Self {
        Self {
            cycles_run: 0,
            coins_scanned: 0,
            coins_skipped: 0,
            signals_generated: 0,
            entries_opened: 0,
            exits_closed: 0,
            orders_failed: 0,
            near_misses_recorded: 0,
            last_scan_duration_ms: 0,
            last_total_duration_ms: 0,
            log_interval_cycles,
        }
    }

    pub fn start_timer() -> Instant {
        Instant::now()
    }

    pub fn record_scan_duration(&mut self, start: Instant) {
        self.last_scan_duration_ms = start.elapsed().as_millis() as u64;
    }

    pub fn finish_cycle(&mut self, cycle_start: Instant) {
        self.last_total_duration_ms = cycle_start.elapsed().as_millis() as u64;
        self.cycles_run += 1;

        if self.log_interval_cycles > 0 && self.cycles_run % self.log_interval_cycles == 0 {
            self.log_metrics();
        }
    }

    pub fn log_metrics(&self) {
        tracing::info!(
            cycles = self.cycles_run,
            coins_scanned = self.coins_scanned,
            coins_skipped = self.coins_skipped,
            signals_generated = self.signals_generated,
            entries_opened = self.entries_opened,
            exits_closed = self.exits_closed,
            orders_failed = self.orders_failed,
            near_misses = self.near_misses_recorded,
            last_cycle_ms = self.last_total_duration_ms,
            last_scan_ms = self.last_scan_duration_ms,
            "agent metrics summary"
        );
    }
}
