/// Seat layout configuration. Distances in meters, angles in degrees.
/// The room is centred at the origin with its width along X and depth along Z.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeatingConfig {
    pub room_width: f64,
    pub room_depth: f64,
    pub wall_margin: f64,
    pub min_spacing: f64,
    pub min_radius: f64,
    pub max_radius: f64,
    /// Fixed Y of every seat
    pub seat_height: f64,
    /// Added to every seat heading to correct the visual model's default facing
    pub heading_offset_degrees: f64,
    /// Point every seat faces (front of the room)
    pub focal_anchor: [f64; 3],
}

impl Default for SeatingConfig {
    fn default() -> Self {
        Self {
            room_width: 8.0,
            room_depth: 10.0,
            wall_margin: 0.5,
            min_spacing: 0.78,
            min_radius: 2.5,
            max_radius: 4.5,
            seat_height: 0.0,
            heading_offset_degrees: 180.0,
            focal_anchor: [3.5, 0.0, 0.0],
        }
    }
}

impl SeatingConfig {
    /// Rejects geometry no layout can be placed in. A max_radius below
    /// min_radius is allowed: the solver falls back to the capped radius.
    pub fn validate(&self) -> Result<(), String> {
        if !self.room_width.is_finite() || self.room_width <= 0.0 {
            return Err("room_width must be finite and > 0".to_string());
        }
        if !self.room_depth.is_finite() || self.room_depth <= 0.0 {
            return Err("room_depth must be finite and > 0".to_string());
        }
        if !self.wall_margin.is_finite() || self.wall_margin < 0.0 {
            return Err("wall_margin must be finite and >= 0".to_string());
        }
        if 2.0 * self.wall_margin >= self.room_width.min(self.room_depth) {
            return Err("wall_margin leaves no usable floor".to_string());
        }
        if !self.min_spacing.is_finite() || self.min_spacing < 0.0 {
            return Err("min_spacing must be finite and >= 0".to_string());
        }
        if !self.min_radius.is_finite() || self.min_radius < 0.0 {
            return Err("min_radius must be finite and >= 0".to_string());
        }
        if !self.max_radius.is_finite() || self.max_radius <= 0.0 {
            return Err("max_radius must be finite and > 0".to_string());
        }
        if !self.heading_offset_degrees.is_finite() || !self.seat_height.is_finite() {
            return Err("seat_height and heading_offset_degrees must be finite".to_string());
        }
        if self.focal_anchor.iter().any(|c| !c.is_finite()) {
            return Err("focal_anchor must be finite".to_string());
        }
        Ok(())
    }
}

/// Transform replication tuning
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplicationConfig {
    /// Authoritative send checks per second
    pub tick_rate_hz: f64,
    /// Meters moved since last send before a new send is due
    pub position_threshold: f64,
    /// Degrees rotated since last send before a new send is due
    pub rotation_threshold_degrees: f64,
    /// Exponential smoothing rate toward the interpolation target (1/s)
    pub interpolation_speed: f64,
    /// Below this speed no dead reckoning is applied on receipt
    pub velocity_epsilon: f64,
    /// Above this speed the displayed position is pulled toward the predicted point
    pub prediction_threshold: f64,
    /// Extra blend fraction toward the predicted point
    pub prediction_blend: f64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 10.0,
            position_threshold: 0.01,
            rotation_threshold_degrees: 3.0,
            interpolation_speed: 12.0,
            velocity_epsilon: 0.01,
            prediction_threshold: 0.1,
            prediction_blend: 0.3,
        }
    }
}

impl ReplicationConfig {
    pub fn send_interval(&self) -> f64 {
        1.0 / self.tick_rate_hz
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.tick_rate_hz.is_finite() || self.tick_rate_hz <= 0.0 {
            return Err("tick_rate_hz must be finite and > 0".to_string());
        }
        if !self.position_threshold.is_finite() || self.position_threshold < 0.0 {
            return Err("position_threshold must be finite and >= 0".to_string());
        }
        if !self.rotation_threshold_degrees.is_finite() || self.rotation_threshold_degrees < 0.0 {
            return Err("rotation_threshold_degrees must be finite and >= 0".to_string());
        }
        if !self.interpolation_speed.is_finite() || self.interpolation_speed <= 0.0 {
            return Err("interpolation_speed must be finite and > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.prediction_blend) {
            return Err("prediction_blend must be within [0, 1]".to_string());
        }
        Ok(())
    }
}

/// Startup sequence timing (seconds)
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
    /// Delay between start() and the first phase poll
    pub start_delay: f64,
    /// CheckingNetwork
    pub network_timeout: f64,
    /// InitSeatingSystem, InitSpawner, InitBinder
    pub component_timeout: f64,
    /// GenerateSeatsAndEntities, SyncNetworkData
    pub seat_sync_timeout: f64,
    /// SetupViewpointControl
    pub viewpoint_timeout: f64,
    /// Time spent in ErrorRecovery before retrying
    pub recovery_delay: f64,
    /// Delay between a participant joining and the host regenerating seats
    pub regeneration_settle_delay: f64,
    /// Scheduler ticks per second for the async driver
    pub tick_rate_hz: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            start_delay: 0.0,
            network_timeout: 15.0,
            component_timeout: 5.0,
            seat_sync_timeout: 15.0,
            viewpoint_timeout: 5.0,
            recovery_delay: 3.0,
            regeneration_settle_delay: 1.0,
            tick_rate_hz: 30,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), String> {
        let durations = [
            ("start_delay", self.start_delay),
            ("network_timeout", self.network_timeout),
            ("component_timeout", self.component_timeout),
            ("seat_sync_timeout", self.seat_sync_timeout),
            ("viewpoint_timeout", self.viewpoint_timeout),
            ("recovery_delay", self.recovery_delay),
            ("regeneration_settle_delay", self.regeneration_settle_delay),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be finite and >= 0", name));
            }
        }
        if self.tick_rate_hz == 0 {
            return Err("tick_rate_hz must be > 0".to_string());
        }
        Ok(())
    }
}

/// Everything a participant process needs, as handed over by the
/// configuration-loading collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub seating: SeatingConfig,
    pub replication: ReplicationConfig,
    pub orchestrator: OrchestratorConfig,
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self, String> {
        let config: SessionConfig =
            serde_json::from_str(json).map_err(|e| format!("invalid session config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.seating.validate()?;
        self.replication.validate()?;
        self.orchestrator.validate()
    }
}
