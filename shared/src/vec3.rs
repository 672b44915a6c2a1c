/// 3D vector and rotation utilities for seat placement and transform replication.
/// Y is up; yaw rotates around +Y with 0 degrees facing +Z.

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Narrow to the f32 wire representation.
    pub fn to_wire(self) -> [f32; 3] {
        [self.x as f32, self.y as f32, self.z as f32]
    }

    pub fn from_wire(w: [f32; 3]) -> Self {
        Self::new(w[0] as f64, w[1] as f64, w[2] as f64)
    }
}

/// Shorthand constructor
pub fn vec3(x: f64, y: f64, z: f64) -> Vec3 {
    Vec3::new(x, y, z)
}

/// Dot product
pub fn dot(a: Vec3, b: Vec3) -> f64 {
    a.x * b.x + a.y * b.y + a.z * b.z
}

/// Vector length
pub fn length(v: Vec3) -> f64 {
    (v.x * v.x + v.y * v.y + v.z * v.z).sqrt()
}

/// Euclidean distance between two points
pub fn distance(a: Vec3, b: Vec3) -> f64 {
    length(sub(a, b))
}

/// Normalize vector to unit length. Near-zero input yields +Z.
pub fn normalize(v: Vec3) -> Vec3 {
    let len = length(v);
    if len < 1e-10 {
        return Vec3::new(0.0, 0.0, 1.0);
    }
    Vec3::new(v.x / len, v.y / len, v.z / len)
}

/// Scale vector by scalar
pub fn scale(v: Vec3, s: f64) -> Vec3 {
    Vec3::new(v.x * s, v.y * s, v.z * s)
}

/// Add two vectors
pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(a.x + b.x, a.y + b.y, a.z + b.z)
}

/// Subtract vectors (a - b)
pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(a.x - b.x, a.y - b.y, a.z - b.z)
}

/// Linear interpolation; t is not clamped.
pub fn lerp(a: Vec3, b: Vec3, t: f64) -> Vec3 {
    Vec3::new(
        a.x + (b.x - a.x) * t,
        a.y + (b.y - a.y) * t,
        a.z + (b.z - a.z) * t,
    )
}

/// Yaw (degrees) of a horizontal direction. The Y component is ignored.
pub fn yaw_of_direction(dir: Vec3) -> f64 {
    dir.x.atan2(dir.z).to_degrees()
}

/// Wrap an angle in degrees into [0, 360).
pub fn wrap_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Unit quaternion rotation.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Pure rotation around +Y.
    pub fn from_yaw_degrees(yaw: f64) -> Self {
        let half = yaw.to_radians() * 0.5;
        Self::new(0.0, half.sin(), 0.0, half.cos())
    }

    /// Yaw around +Y, then pitch around the turned +X. Positive pitch looks down.
    pub fn from_yaw_pitch_degrees(yaw: f64, pitch: f64) -> Self {
        let (sy, cy) = (yaw.to_radians() * 0.5).sin_cos();
        let (sp, cp) = (pitch.to_radians() * 0.5).sin_cos();
        Self::new(cy * sp, sy * cp, -sy * sp, cy * cp)
    }

    /// Where +Z ends up after the rotation.
    pub fn forward(self) -> Vec3 {
        Vec3::new(
            2.0 * (self.x * self.z + self.w * self.y),
            2.0 * (self.y * self.z - self.w * self.x),
            1.0 - 2.0 * (self.x * self.x + self.y * self.y),
        )
    }

    /// Pitch component in degrees, positive looking down.
    pub fn pitch_degrees(self) -> f64 {
        (-self.forward().y).clamp(-1.0, 1.0).asin().to_degrees()
    }

    /// Yaw component of the rotation in degrees, in (-180, 180].
    pub fn yaw_degrees(self) -> f64 {
        let siny = 2.0 * (self.w * self.y + self.z * self.x);
        let cosy = 1.0 - 2.0 * (self.x * self.x + self.y * self.y);
        siny.atan2(cosy).to_degrees()
    }

    pub fn to_wire(self) -> [f32; 4] {
        [self.x as f32, self.y as f32, self.z as f32, self.w as f32]
    }

    pub fn from_wire(w: [f32; 4]) -> Self {
        quat_normalize(Self::new(w[0] as f64, w[1] as f64, w[2] as f64, w[3] as f64))
    }
}

pub fn quat_dot(a: Quat, b: Quat) -> f64 {
    a.x * b.x + a.y * b.y + a.z * b.z + a.w * b.w
}

/// Normalize a quaternion. Degenerate input yields identity.
pub fn quat_normalize(q: Quat) -> Quat {
    let len = quat_dot(q, q).sqrt();
    if len < 1e-10 {
        return Quat::IDENTITY;
    }
    Quat::new(q.x / len, q.y / len, q.z / len, q.w / len)
}

/// Smallest angle (degrees) rotating `a` onto `b`.
pub fn angle_between_degrees(a: Quat, b: Quat) -> f64 {
    let d = quat_dot(quat_normalize(a), quat_normalize(b)).abs().min(1.0);
    (2.0 * d.acos()).to_degrees()
}

/// Spherical linear interpolation along the shortest arc.
/// t=0 returns a, t=1 returns b (or its negation, which is the same rotation).
pub fn quat_slerp(a: Quat, b: Quat, t: f64) -> Quat {
    let mut b = b;
    let mut d = quat_dot(a, b);
    if d < 0.0 {
        b = Quat::new(-b.x, -b.y, -b.z, -b.w);
        d = -d;
    }

    // Nearly identical rotations: lerp and renormalize
    if d > 0.9995 {
        return quat_normalize(Quat::new(
            a.x + t * (b.x - a.x),
            a.y + t * (b.y - a.y),
            a.z + t * (b.z - a.z),
            a.w + t * (b.w - a.w),
        ));
    }

    let theta = d.clamp(-1.0, 1.0).acos();
    let sin_theta = theta.sin();
    let s0 = ((1.0 - t) * theta).sin() / sin_theta;
    let s1 = (t * theta).sin() / sin_theta;

    Quat::new(
        s0 * a.x + s1 * b.x,
        s0 * a.y + s1 * b.y,
        s0 * a.z + s1 * b.z,
        s0 * a.w + s1 * b.w,
    )
}
