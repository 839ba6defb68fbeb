use serde::Serialize;

/// Rotation about each axis, counted in quarter turns (90°).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RotationEdit {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl RotationEdit {
    pub fn step(&mut self, axis: Axis, quarter_turns: i32) {
        match axis {
            Axis::X => self.x += quarter_turns,
            Axis::Y => self.y += quarter_turns,
            Axis::Z => self.z += quarter_turns,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_identity(&self) -> bool {
        self.x.rem_euclid(4) == 0 && self.y.rem_euclid(4) == 0 && self.z.rem_euclid(4) == 0
    }

    /// Rotation in degrees, for display.
    pub fn degrees(&self) -> (i32, i32, i32) {
        (self.x * 90, self.y * 90, self.z * 90)
    }
}

/// Body of `POST /clothes/rotate`.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct RotationRequest {
    pub filename: String,
    pub rotation_x: i32,
    pub rotation_y: i32,
    pub rotation_z: i32,
}

impl RotationRequest {
    pub fn new(filename: &str, edit: RotationEdit) -> Self {
        Self {
            filename: filename.to_string(),
            rotation_x: edit.x,
            rotation_y: edit.y,
            rotation_z: edit.z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_and_reset() {
        let mut edit = RotationEdit::default();
        edit.step(Axis::X, 1);
        edit.step(Axis::X, 1);
        edit.step(Axis::Z, -1);
        assert_eq!(edit, RotationEdit { x: 2, y: 0, z: -1 });
        assert_eq!(edit.degrees(), (180, 0, -90));

        edit.reset();
        assert_eq!(edit, RotationEdit::default());
    }

    #[test]
    fn test_full_turn_is_identity() {
        let edit = RotationEdit { x: 4, y: -4, z: 0 };
        assert!(edit.is_identity());
        assert!(!RotationEdit { x: 1, y: 0, z: 0 }.is_identity());
    }

    #[test]
    fn test_request_body() {
        let request = RotationRequest::new("shirt.glb", RotationEdit { x: 1, y: 0, z: 3 });
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "filename": "shirt.glb",
                "rotation_x": 1,
                "rotation_y": 0,
                "rotation_z": 3
            })
        );
    }
}
