use serde::{Deserialize, Serialize};

use crate::Result;

/// Homogeneous 4x4 head transform, row major, translation in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub matrix: [[f64; 4]; 4],
}

impl Default for HeadPose {
    fn default() -> Self {
        Self::identity()
    }
}

impl HeadPose {
    pub fn identity() -> Self {
        let mut matrix = [[0.0; 4]; 4];
        for (i, row) in matrix.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self { matrix }
    }

    /// Composes a translation with extrinsic x-y-z Euler angles given in
    /// degrees, i.e. `R = Rz(yaw) * Ry(pitch) * Rx(roll)`.
    pub fn from_translation_rpy_degrees(
        [x, y, z]: [f64; 3],
        roll: f64,
        pitch: f64,
        yaw: f64,
    ) -> Self {
        let (sr, cr) = roll.to_radians().sin_cos();
        let (sp, cp) = pitch.to_radians().sin_cos();
        let (sy, cy) = yaw.to_radians().sin_cos();

        Self {
            matrix: [
                [cy * cp, cy * sp * sr - sy * cr, cy * sp * cr + sy * sr, x],
                [sy * cp, sy * sp * sr + cy * cr, sy * sp * cr - cy * sr, y],
                [-sp, cp * sr, cp * cr, z],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn translation(&self) -> [f64; 3] {
        [self.matrix[0][3], self.matrix[1][3], self.matrix[2][3]]
    }

    /// Recovers `(roll, pitch, yaw)` in degrees.
    pub fn rpy_degrees(&self) -> (f64, f64, f64) {
        let m = &self.matrix;
        let pitch = (-m[2][0]).clamp(-1.0, 1.0).asin();
        let roll = m[2][1].atan2(m[2][2]);
        let yaw = m[1][0].atan2(m[0][0]);
        (roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees())
    }
}

/// Target produced by a move for one animation tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    /// Head offset in metres.
    pub position: [f64; 3],
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub yaw_deg: f64,
    pub head: HeadPose,
    /// Antenna targets (left, right) in degrees.
    pub antennas_deg: [f64; 2],
    /// Antenna targets (left, right) in radians, as the robot expects them.
    pub antennas: [f64; 2],
    pub body_yaw: f64,
}

impl PoseSample {
    pub fn new(position: [f64; 3], roll_deg: f64, pitch_deg: f64, yaw_deg: f64) -> Self {
        Self {
            position,
            roll_deg,
            pitch_deg,
            yaw_deg,
            head: HeadPose::from_translation_rpy_degrees(position, roll_deg, pitch_deg, yaw_deg),
            antennas_deg: [0.0; 2],
            antennas: [0.0; 2],
            body_yaw: 0.0,
        }
    }

    pub fn with_antennas_deg(mut self, antennas_deg: [f64; 2]) -> Self {
        self.antennas_deg = antennas_deg;
        self.antennas = antennas_deg.map(f64::to_radians);
        self
    }
}

/// Consumer of head/antenna targets, typically the robot's motion layer.
pub trait PoseSink {
    /// Moves towards `sample` over `duration` seconds.
    fn set_target(&mut self, sample: &PoseSample, duration: f64) -> Result<()>;
}

/// Pose sink that only logs the targets it receives.
#[derive(Debug, Default)]
pub struct TracingPoseSink {
    applied: usize,
}

impl TracingPoseSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&self) -> usize {
        self.applied
    }
}

impl PoseSink for TracingPoseSink {
    fn set_target(&mut self, sample: &PoseSample, duration: f64) -> Result<()> {
        self.applied += 1;
        tracing::trace!(
            pitch = sample.pitch_deg,
            yaw = sample.yaw_deg,
            roll = sample.roll_deg,
            z = sample.position[2],
            antennas = ?sample.antennas,
            duration,
            "pose target"
        );
        Ok(())
    }
}
