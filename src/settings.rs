//! Immutable per-step configuration. A `World` holds one `WorldSettings`
//! value and passes it by reference into every step; settings only change
//! between steps, never mid-step (see the DESIGN NOTES "settings snapshot").

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SahHeuristic {
    Area,
    Perimeter,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldSettings {
    pub dt: f32,
    pub inv_dt: f32,

    pub gravity: crate::math::Vec2,
    pub apply_gravity: bool,

    pub position_correction: bool,
    pub position_correction_beta: f32,

    pub warm_starting: bool,
    pub apply_warm_starting_threshold: bool,
    pub warm_starting_threshold: f32,

    pub block_solve: bool,

    pub velocity_iterations: u32,
    pub position_iterations: u32,

    pub penetration_slop: f32,
    pub restitution_slop: f32,
    pub linear_slop: f32,

    pub aabb_margin: f32,
    pub aabb_multiplier: f32,
    pub sah_heuristic: SahHeuristic,

    pub sleeping: bool,
    pub linear_sleep_tolerance: f32,
    pub angular_sleep_tolerance: f32,
    pub time_to_sleep: f32,

    pub gjk_max_iterations: u32,
    pub epa_max_iterations: u32,
    pub gjk_tolerance: f32,
    pub epa_tolerance: f32,

    pub toi_max_iterations: u32,
    pub toi_root_iterations: u32,

    pub contact_merge_threshold: f32,
}

impl Default for WorldSettings {
    fn default() -> Self {
        let dt = 1.0 / 60.0;
        WorldSettings {
            dt,
            inv_dt: 1.0 / dt,

            gravity: crate::math::Vec2::new(0.0, -10.0),
            apply_gravity: true,

            position_correction: true,
            position_correction_beta: 0.2,

            warm_starting: true,
            apply_warm_starting_threshold: false,
            warm_starting_threshold: 0.02 * 0.02,

            block_solve: true,

            velocity_iterations: 8,
            position_iterations: 3,

            penetration_slop: 0.005,
            restitution_slop: 0.5,
            linear_slop: 0.005,

            aabb_margin: 0.1,
            aabb_multiplier: 2.0,
            sah_heuristic: SahHeuristic::Area,

            sleeping: true,
            linear_sleep_tolerance: 0.01,
            angular_sleep_tolerance: 2.0_f32.to_radians(),
            time_to_sleep: 0.5,

            gjk_max_iterations: 20,
            epa_max_iterations: 20,
            gjk_tolerance: 1e-4,
            epa_tolerance: 1e-4,

            toi_max_iterations: 20,
            toi_root_iterations: 50,

            contact_merge_threshold: 0.01 * 0.01,
        }
    }
}

impl WorldSettings {
    /// Recomputes `inv_dt` after changing `dt`. Settings are a plain value;
    /// callers that mutate `dt` directly are expected to call this before
    /// the next step.
    pub fn refresh_inv_dt(&mut self) {
        self.inv_dt = if self.dt > 0.0 { 1.0 / self.dt } else { 0.0 };
    }
}
