use std::time::Duration;

/// Per-step timing and counters, attached to the world and reset at the
/// start of every step.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhysicsProfiler {
    pub broad_phase_time: Duration,
    pub collide_time: Duration,
    pub solve_time: Duration,
    pub toi_time: Duration,
    pub total_step_time: Duration,

    pub body_count: usize,
    pub contact_count: usize,
    pub island_count: usize,
    pub toi_sub_steps: usize,
}

impl PhysicsProfiler {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn report(&self) -> String {
        let total_us = self.total_step_time.as_micros().max(1) as f64;
        let pct = |d: Duration| (d.as_micros() as f64 / total_us) * 100.0;
        format!(
            "bodies {} contacts {} islands {} | total {:.2} ms (broad {:.1}% collide {:.1}% solve {:.1}% toi {:.1}%)",
            self.body_count,
            self.contact_count,
            self.island_count,
            self.total_step_time.as_secs_f64() * 1000.0,
            pct(self.broad_phase_time),
            pct(self.collide_time),
            pct(self.solve_time),
            pct(self.toi_time),
        )
    }
}
