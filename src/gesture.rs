use crate::landmarks::{index, HandPose};
use std::fmt;
use std::str::FromStr;

/// Commands understood by the Lorenz renderer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Gesture {
    Pause,
    SpeedUp,
    SlowDown,
    Reset,
    RotateLeft,
    RotateRight,
}

impl Gesture {
    pub const ALL: [Gesture; 6] = [
        Gesture::Pause,
        Gesture::SpeedUp,
        Gesture::SlowDown,
        Gesture::Reset,
        Gesture::RotateLeft,
        Gesture::RotateRight,
    ];

    /// Payload string sent to the renderer
    pub fn as_str(self) -> &'static str {
        match self {
            Gesture::Pause => "pause",
            Gesture::SpeedUp => "speed_up",
            Gesture::SlowDown => "slow_down",
            Gesture::Reset => "reset",
            Gesture::RotateLeft => "rotate_left",
            Gesture::RotateRight => "rotate_right",
        }
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown gesture {0:?}")]
pub struct UnknownGesture(pub String);

impl FromStr for Gesture {
    type Err = UnknownGesture;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Gesture::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| UnknownGesture(s.to_string()))
    }
}

/// Classify a single hand pose
///
/// Checks run in a fixed order and the first match wins. Image coordinates
/// grow downwards, so a smaller `y` means higher on screen.
///
/// The tilt check only runs when none of the finger checks matched, which
/// means almost every pose that is not pause/speed_up/slow_down/reset comes
/// out as a rotation. `None` only when landmarks 5 and 17 share an exact x.
pub fn classify(pose: &HandPose) -> Option<Gesture> {
    let y = |i: usize| pose.get(i).y;
    let x = |i: usize| pose.get(i).x;

    let thumb = y(index::THUMB_TIP);
    let index_tip = y(index::INDEX_TIP);
    let middle = y(index::MIDDLE_TIP);

    // Open palm: every tip above the joint two steps down its finger
    if index::FINGERTIPS.iter().all(|&i| y(i) < y(i - 2)) {
        return Some(Gesture::Pause);
    } else if index_tip < thumb && index_tip < middle {
        return Some(Gesture::SpeedUp);
    } else if index_tip < thumb && middle < thumb {
        return Some(Gesture::SlowDown);
    } else if index::FINGERTIPS.iter().all(|&i| y(i) > y(index::WRIST)) {
        // Fist
        return Some(Gesture::Reset);
    }

    let index_base = x(index::INDEX_MCP);
    let pinky_base = x(index::PINKY_MCP);
    if index_base < pinky_base {
        Some(Gesture::RotateLeft)
    } else if index_base > pinky_base {
        Some(Gesture::RotateRight)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{Landmark, NUM_LANDMARKS};

    /// Flat pose: every joint at the same height, index and pinky bases level
    fn flat_pose() -> HandPose {
        HandPose::new([Landmark::new(0.5, 0.5, 0.0); NUM_LANDMARKS])
    }

    fn set_y(pose: &mut HandPose, i: usize, y: f32) {
        pose.landmarks[i].y = y;
    }

    fn set_x(pose: &mut HandPose, i: usize, x: f32) {
        pose.landmarks[i].x = x;
    }

    /// Upright open hand: each finger's joints climb towards the tip
    fn open_palm() -> HandPose {
        let mut pose = flat_pose();
        set_y(&mut pose, index::WRIST, 0.9);
        for tip in index::FINGERTIPS {
            for (step, joint) in (tip - 3..=tip).enumerate() {
                set_y(&mut pose, joint, 0.8 - 0.1 * step as f32);
            }
        }
        pose
    }

    #[test]
    fn open_palm_is_pause() {
        assert_eq!(classify(&open_palm()), Some(Gesture::Pause));
    }

    #[test]
    fn pause_wins_over_everything_else() {
        let mut pose = open_palm();
        // Tilted hand and an index tip above thumb and middle would match later rules
        set_x(&mut pose, index::INDEX_MCP, 0.2);
        set_x(&mut pose, index::PINKY_MCP, 0.8);
        set_y(&mut pose, index::INDEX_TIP, 0.1);
        assert_eq!(classify(&pose), Some(Gesture::Pause));
    }

    #[test]
    fn one_bent_finger_is_not_pause() {
        let mut pose = open_palm();
        set_y(&mut pose, index::RING_TIP, 0.9);
        assert_ne!(classify(&pose), Some(Gesture::Pause));
    }

    #[test]
    fn index_above_thumb_and_middle_is_speed_up() {
        let mut pose = flat_pose();
        set_y(&mut pose, index::THUMB_TIP, 0.5);
        set_y(&mut pose, index::INDEX_TIP, 0.1);
        set_y(&mut pose, index::MIDDLE_TIP, 0.6);
        assert_eq!(classify(&pose), Some(Gesture::SpeedUp));
    }

    #[test]
    fn index_and_middle_above_thumb_is_slow_down() {
        let mut pose = flat_pose();
        set_y(&mut pose, index::THUMB_TIP, 0.5);
        set_y(&mut pose, index::INDEX_TIP, 0.3);
        set_y(&mut pose, index::MIDDLE_TIP, 0.2);
        assert_eq!(classify(&pose), Some(Gesture::SlowDown));

        // Level index and middle tips fail the strict speed_up comparison
        set_y(&mut pose, index::INDEX_TIP, 0.2);
        assert_eq!(classify(&pose), Some(Gesture::SlowDown));
    }

    #[test]
    fn index_above_middle_is_speed_up_even_with_both_raised() {
        let mut pose = flat_pose();
        set_y(&mut pose, index::THUMB_TIP, 0.5);
        set_y(&mut pose, index::INDEX_TIP, 0.2);
        set_y(&mut pose, index::MIDDLE_TIP, 0.3);
        assert_eq!(classify(&pose), Some(Gesture::SpeedUp));
    }

    #[test]
    fn tips_below_wrist_is_reset() {
        let mut pose = flat_pose();
        set_y(&mut pose, index::WRIST, 0.2);
        for (n, tip) in index::FINGERTIPS.into_iter().enumerate() {
            set_y(&mut pose, tip, 0.6 + 0.05 * n as f32);
        }
        // Index is lowest of thumb/index/middle, so speed_up and slow_down miss
        set_y(&mut pose, index::THUMB_TIP, 0.6);
        set_y(&mut pose, index::INDEX_TIP, 0.7);
        set_y(&mut pose, index::MIDDLE_TIP, 0.65);
        set_x(&mut pose, index::INDEX_MCP, 0.3);
        set_x(&mut pose, index::PINKY_MCP, 0.7);
        assert_eq!(classify(&pose), Some(Gesture::Reset));
    }

    #[test]
    fn index_base_left_of_pinky_base_is_rotate_left() {
        let mut pose = flat_pose();
        set_x(&mut pose, index::INDEX_MCP, 0.3);
        set_x(&mut pose, index::PINKY_MCP, 0.7);
        assert_eq!(classify(&pose), Some(Gesture::RotateLeft));
    }

    #[test]
    fn index_base_right_of_pinky_base_is_rotate_right() {
        let mut pose = flat_pose();
        set_x(&mut pose, index::INDEX_MCP, 0.7);
        set_x(&mut pose, index::PINKY_MCP, 0.3);
        assert_eq!(classify(&pose), Some(Gesture::RotateRight));
    }

    #[test]
    fn level_bases_give_nothing() {
        let mut pose = flat_pose();
        set_x(&mut pose, index::INDEX_MCP, 0.42);
        set_x(&mut pose, index::PINKY_MCP, 0.42);
        assert_eq!(classify(&pose), None);
    }

    #[test]
    fn nan_coordinates_do_not_panic() {
        let pose = HandPose::new([Landmark::new(f32::NAN, f32::NAN, f32::NAN); NUM_LANDMARKS]);
        assert_eq!(classify(&pose), None);
    }

    #[test]
    fn out_of_range_coordinates_are_still_compared() {
        let mut pose = flat_pose();
        set_x(&mut pose, index::INDEX_MCP, -3.0);
        set_x(&mut pose, index::PINKY_MCP, 12.0);
        assert_eq!(classify(&pose), Some(Gesture::RotateLeft));
    }

    #[test]
    fn classification_is_repeatable() {
        let mut pose = flat_pose();
        set_y(&mut pose, index::INDEX_TIP, 0.1);
        let first = classify(&pose);
        for _ in 0..10 {
            assert_eq!(classify(&pose), first);
        }
        // An unrelated call in between changes nothing
        classify(&open_palm());
        assert_eq!(classify(&pose), first);
    }

    #[test]
    fn payload_strings_round_trip() {
        for gesture in Gesture::ALL {
            assert_eq!(gesture.as_str().parse::<Gesture>().unwrap(), gesture);
            assert_eq!(gesture.to_string(), gesture.as_str());
        }
        assert!("none".parse::<Gesture>().is_err());
    }
}
