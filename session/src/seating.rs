//! Circular-arc seat layout.
//!
//! Seats are placed on an arc around the focal anchor, all facing it. The
//! solver is pure: identical inputs give bit-identical layouts, which the
//! session relies on when the host broadcasts its result.

use classroom_shared::config::SeatingConfig;
use classroom_shared::protocol::SeatWire;
use classroom_shared::vec3::{distance, sub, vec3, wrap_degrees, yaw_of_direction, Vec3};
use std::f64::consts::PI;

/// Arc angles tried in order; the first whose required radius fits wins.
pub const CANDIDATE_ARC_DEGREES: [f64; 5] = [60.0, 90.0, 120.0, 150.0, 180.0];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SeatingError {
    #[error("participant count must be positive")]
    NoParticipants,
    #[error("invalid seating geometry: {0}")]
    InvalidGeometry(String),
    #[error("seating system is not initialized")]
    NotInitialized,
}

/// One computed placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seat {
    pub index: u32,
    pub position: Vec3,
    /// Yaw in degrees, [0, 360)
    pub heading: f64,
    /// Signed angle along the arc, 0 in the middle
    pub angle_from_focal_anchor: f64,
}

impl Seat {
    pub fn to_wire(&self) -> SeatWire {
        SeatWire {
            index: self.index,
            position: self.position.to_wire(),
            heading: self.heading as f32,
        }
    }
}

/// Which branch produced the arc.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Feasibility {
    /// A candidate angle fit the radius bounds
    Candidate(f64),
    /// No candidate fit; the arc was derived from the largest allowed radius
    Fallback,
    /// Minimum spacing cannot be met even on a half circle of the largest radius
    SpacingViolated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeatLayout {
    pub radius: f64,
    pub arc_angle_degrees: f64,
    pub feasibility: Feasibility,
    pub seats: Vec<Seat>,
}

impl SeatLayout {
    pub fn seat(&self, index: u32) -> Option<&Seat> {
        self.seats.iter().find(|s| s.index == index)
    }

    pub fn nearest_seat(&self, position: Vec3) -> Option<&Seat> {
        self.seats.iter().min_by(|a, b| {
            distance(a.position, position).total_cmp(&distance(b.position, position))
        })
    }

    pub fn to_wire(&self) -> Vec<SeatWire> {
        self.seats.iter().map(Seat::to_wire).collect()
    }
}

/// Pick the arc radius and angle for `count` seats.
fn solve_arc(count: usize, config: &SeatingConfig) -> (f64, f64, Feasibility) {
    let max_usable_radius = ((config.room_width - 2.0 * config.wall_margin) / 2.0)
        .min((config.room_depth - 2.0 * config.wall_margin) / 2.0);
    let radius_cap = max_usable_radius.min(config.max_radius);
    let required_arc_length = (count as f64 - 1.0) * config.min_spacing;

    for candidate in CANDIDATE_ARC_DEGREES {
        let required_radius = required_arc_length / candidate.to_radians();
        if required_radius >= config.min_radius && required_radius <= radius_cap {
            return (required_radius, candidate, Feasibility::Candidate(candidate));
        }
    }

    let radius = radius_cap;
    if required_arc_length <= radius * PI {
        let arc = (required_arc_length / radius).to_degrees().min(180.0);
        (radius, arc, Feasibility::Fallback)
    } else {
        tracing::warn!(
            "Cannot satisfy minimum spacing {:.2}m for {} seats within radius {:.2}m",
            config.min_spacing,
            count,
            radius
        );
        (radius, 180.0, Feasibility::SpacingViolated)
    }
}

/// Compute the seat layout for `count` participants around `anchor`.
pub fn solve(
    count: usize,
    config: &SeatingConfig,
    anchor: Vec3,
) -> Result<SeatLayout, SeatingError> {
    if count == 0 {
        return Err(SeatingError::NoParticipants);
    }
    config.validate().map_err(SeatingError::InvalidGeometry)?;

    let (radius, arc_angle_degrees, feasibility) = solve_arc(count, config);

    let seats = (0..count)
        .map(|i| {
            let angle_deg = if count == 1 {
                0.0
            } else {
                let t = i as f64 / (count - 1) as f64;
                -arc_angle_degrees / 2.0 + arc_angle_degrees * t
            };
            let angle = angle_deg.to_radians();
            let position = vec3(
                anchor.x - radius * angle.cos(),
                config.seat_height,
                anchor.z + radius * angle.sin(),
            );
            let toward_anchor = sub(anchor, position);
            let heading = wrap_degrees(yaw_of_direction(toward_anchor) + config.heading_offset_degrees);
            Seat {
                index: i as u32,
                position,
                heading,
                angle_from_focal_anchor: angle_deg,
            }
        })
        .collect();

    Ok(SeatLayout {
        radius,
        arc_angle_degrees,
        feasibility,
        seats,
    })
}

/// Owns the seating configuration and resolved focal anchor.
pub struct SeatingSystem {
    config: SeatingConfig,
    anchor: Option<Vec3>,
    layout: Option<SeatLayout>,
}

impl SeatingSystem {
    pub fn new(config: SeatingConfig) -> Self {
        Self {
            config,
            anchor: None,
            layout: None,
        }
    }

    /// Validate the configuration and pin the focal anchor inside the room.
    pub fn initialize(&mut self) -> Result<(), SeatingError> {
        self.config
            .validate()
            .map_err(SeatingError::InvalidGeometry)?;
        if self.config.max_radius < self.config.min_radius {
            tracing::warn!(
                "max_radius {:.2}m is below min_radius {:.2}m, layouts will use the capped radius",
                self.config.max_radius,
                self.config.min_radius
            );
        }

        let half_x = self.config.room_width / 2.0 - self.config.wall_margin;
        let half_z = self.config.room_depth / 2.0 - self.config.wall_margin;
        let [x, y, z] = self.config.focal_anchor;
        let anchor = vec3(x.clamp(-half_x, half_x), y, z.clamp(-half_z, half_z));
        if anchor.x != x || anchor.z != z {
            tracing::warn!(
                "Focal anchor ({:.2}, {:.2}) outside room bounds, clamped to ({:.2}, {:.2})",
                x,
                z,
                anchor.x,
                anchor.z
            );
        }
        self.anchor = Some(anchor);
        tracing::info!("Seating system initialized, focal anchor {:?}", anchor);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn focal_anchor(&self) -> Option<Vec3> {
        self.anchor
    }

    pub fn config(&self) -> &SeatingConfig {
        &self.config
    }

    /// Solve for `count` seats and keep the result for lookups.
    pub fn generate(&mut self, count: usize) -> Result<&SeatLayout, SeatingError> {
        let anchor = self.anchor.ok_or(SeatingError::NotInitialized)?;
        let layout = solve(count, &self.config, anchor)?;
        tracing::info!(
            "Generated {} seats: radius={:.2}m arc={:.1}deg ({:?})",
            layout.seats.len(),
            layout.radius,
            layout.arc_angle_degrees,
            layout.feasibility
        );
        Ok(self.layout.insert(layout))
    }

    pub fn layout(&self) -> Option<&SeatLayout> {
        self.layout.as_ref()
    }

    pub fn clear(&mut self) {
        self.layout = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroom_shared::vec3::{normalize, Quat};

    fn assert_close(actual: f64, expected: f64, eps: f64) {
        assert!(
            (actual - expected).abs() < eps,
            "Expected {} to be close to {}",
            actual,
            expected
        );
    }

    fn anchor() -> Vec3 {
        vec3(3.5, 0.0, 0.0)
    }

    fn spec_room() -> SeatingConfig {
        SeatingConfig {
            room_width: 8.0,
            room_depth: 10.0,
            wall_margin: 0.5,
            min_spacing: 0.78,
            min_radius: 2.5,
            max_radius: 4.5,
            ..Default::default()
        }
    }

    #[test]
    fn returns_exactly_n_seats_with_unique_indices() {
        let configs = [
            spec_room(),
            SeatingConfig {
                min_spacing: 1.5,
                ..spec_room()
            },
            SeatingConfig {
                room_width: 20.0,
                room_depth: 20.0,
                max_radius: 9.0,
                ..spec_room()
            },
        ];
        for config in configs {
            for n in 1..=40 {
                let layout = solve(n, &config, anchor()).unwrap();
                assert_eq!(layout.seats.len(), n);
                let mut indices: Vec<u32> = layout.seats.iter().map(|s| s.index).collect();
                indices.sort_unstable();
                assert_eq!(indices, (0..n as u32).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn candidate_layouts_keep_min_spacing() {
        let config = spec_room();
        let mut candidates_seen = 0;
        for n in 2..=20 {
            let layout = solve(n, &config, anchor()).unwrap();
            if !matches!(layout.feasibility, Feasibility::Candidate(_)) {
                continue;
            }
            candidates_seen += 1;
            for (i, a) in layout.seats.iter().enumerate() {
                for b in &layout.seats[i + 1..] {
                    let d = distance(a.position, b.position);
                    // Spacing is measured along the arc; the chord is at most 1% shorter
                    assert!(
                        d >= config.min_spacing * 0.99,
                        "seats {} and {} only {:.4}m apart (n={})",
                        a.index,
                        b.index,
                        d,
                        n
                    );
                }
            }
        }
        assert!(candidates_seen > 0);
    }

    #[test]
    fn solve_is_deterministic() {
        let config = spec_room();
        for n in [1, 4, 9, 17] {
            let a = solve(n, &config, anchor()).unwrap();
            let b = solve(n, &config, anchor()).unwrap();
            assert_eq!(a, b);
            for (sa, sb) in a.seats.iter().zip(&b.seats) {
                assert_eq!(sa.position.x.to_bits(), sb.position.x.to_bits());
                assert_eq!(sa.position.z.to_bits(), sb.position.z.to_bits());
                assert_eq!(sa.heading.to_bits(), sb.heading.to_bits());
            }
        }
    }

    #[test]
    fn single_seat_sits_on_axis() {
        for config in [
            spec_room(),
            SeatingConfig {
                min_spacing: 3.0,
                max_radius: 2.5,
                ..spec_room()
            },
        ] {
            let layout = solve(1, &config, anchor()).unwrap();
            assert_eq!(layout.seats[0].angle_from_focal_anchor, 0.0);
        }
    }

    #[test]
    fn four_seats_in_reference_room_fall_back_to_cap_radius() {
        let config = spec_room();
        let layout = solve(4, &config, anchor()).unwrap();
        // 2.34m of arc needs at most 2.23m radius at 60deg, below min_radius
        assert_eq!(layout.feasibility, Feasibility::Fallback);
        assert!(layout.radius >= 2.5 && layout.radius <= 3.5);
        assert_close(layout.radius, 3.5, 1e-12);
        assert_close(layout.arc_angle_degrees, (2.34_f64 / 3.5).to_degrees(), 1e-9);
    }

    #[test]
    fn max_radius_below_min_radius_still_seats_everyone() {
        let config = SeatingConfig {
            min_radius: 2.5,
            max_radius: 2.0,
            ..spec_room()
        };
        let layout = solve(4, &config, anchor()).unwrap();
        assert_eq!(layout.seats.len(), 4);
        assert_eq!(layout.feasibility, Feasibility::Fallback);
        assert_close(layout.radius, 2.0, 1e-12);
        assert_close(layout.arc_angle_degrees, (2.34_f64 / 2.0).to_degrees(), 1e-9);
        for seat in &layout.seats {
            assert_close(distance(seat.position, anchor()), 2.0, 1e-9);
        }
    }

    #[test]
    fn ten_seats_take_first_fitting_candidate() {
        let layout = solve(10, &spec_room(), anchor()).unwrap();
        assert_eq!(layout.feasibility, Feasibility::Candidate(120.0));
        assert_eq!(layout.arc_angle_degrees, 120.0);
        assert_close(layout.radius, 9.0 * 0.78 / 120f64.to_radians(), 1e-12);
    }

    #[test]
    fn overcrowded_room_flags_spacing_violation() {
        let layout = solve(40, &spec_room(), anchor()).unwrap();
        assert_eq!(layout.feasibility, Feasibility::SpacingViolated);
        assert_eq!(layout.arc_angle_degrees, 180.0);
        assert_close(layout.radius, 3.5, 1e-12);
        assert_eq!(layout.seats.len(), 40);
    }

    #[test]
    fn arc_endpoints_are_symmetric() {
        let layout = solve(10, &spec_room(), anchor()).unwrap();
        let first = layout.seats.first().unwrap();
        let last = layout.seats.last().unwrap();
        assert_close(first.angle_from_focal_anchor, -60.0, 1e-9);
        assert_close(last.angle_from_focal_anchor, 60.0, 1e-9);
        assert_close(first.position.x, last.position.x, 1e-9);
        assert_close(first.position.z, -last.position.z, 1e-9);
    }

    #[test]
    fn seats_face_the_anchor() {
        let config = SeatingConfig {
            heading_offset_degrees: 0.0,
            seat_height: 0.45,
            ..spec_room()
        };
        let layout = solve(7, &config, anchor()).unwrap();
        for seat in &layout.seats {
            assert_eq!(seat.position.y, 0.45);
            let toward = normalize(sub(anchor(), vec3(seat.position.x, 0.0, seat.position.z)));
            let facing = Quat::from_yaw_degrees(seat.heading);
            let yaw = facing.yaw_degrees().to_radians();
            assert_close(yaw.sin(), toward.x, 1e-9);
            assert_close(yaw.cos(), toward.z, 1e-9);
        }
    }

    #[test]
    fn heading_offset_is_added() {
        let plain = SeatingConfig {
            heading_offset_degrees: 0.0,
            ..spec_room()
        };
        let turned = SeatingConfig {
            heading_offset_degrees: 180.0,
            ..spec_room()
        };
        let a = solve(1, &plain, anchor()).unwrap();
        let b = solve(1, &turned, anchor()).unwrap();
        // Single seat sits at -X of the anchor and faces +X
        assert_close(a.seats[0].heading, 90.0, 1e-9);
        assert_close(b.seats[0].heading, 270.0, 1e-9);
    }

    #[test]
    fn zero_participants_is_rejected() {
        assert_eq!(
            solve(0, &spec_room(), anchor()),
            Err(SeatingError::NoParticipants)
        );
    }

    #[test]
    fn seating_system_requires_initialize() {
        let mut system = SeatingSystem::new(spec_room());
        assert!(!system.is_initialized());
        assert_eq!(
            system.generate(3).map(|l| l.seats.len()),
            Err(SeatingError::NotInitialized)
        );
        system.initialize().unwrap();
        assert!(system.is_initialized());
        assert_eq!(system.generate(3).unwrap().seats.len(), 3);
        assert_eq!(system.layout().unwrap().seats.len(), 3);
    }

    #[test]
    fn initialize_clamps_anchor_into_room() {
        let mut system = SeatingSystem::new(SeatingConfig {
            focal_anchor: [10.0, 1.5, -9.0],
            ..spec_room()
        });
        system.initialize().unwrap();
        assert_eq!(system.focal_anchor(), Some(vec3(3.5, 1.5, -4.5)));
    }

    #[test]
    fn initialize_rejects_invalid_geometry() {
        let mut system = SeatingSystem::new(SeatingConfig {
            room_width: -1.0,
            ..spec_room()
        });
        assert!(matches!(
            system.initialize(),
            Err(SeatingError::InvalidGeometry(_))
        ));
        assert!(!system.is_initialized());
    }

    #[test]
    fn nearest_seat_lookup() {
        let layout = solve(5, &spec_room(), anchor()).unwrap();
        let target = layout.seats[3].position;
        assert_eq!(layout.nearest_seat(target).unwrap().index, 3);
        assert_eq!(layout.seat(2).unwrap().index, 2);
        assert!(layout.seat(9).is_none());
    }
}
