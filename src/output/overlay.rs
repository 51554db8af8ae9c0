use crate::landmarks::{HandPose, HAND_CONNECTIONS};
use image::{Rgb, RgbImage};

const BONE_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const JOINT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const JOINT_RADIUS: i32 = 3;

/// Draw one hand's skeleton onto a frame
pub fn draw_hand(frame: &mut RgbImage, pose: &HandPose) {
    let (width, height) = frame.dimensions();
    let px = |i: usize| {
        let lm = pose.get(i);
        (lm.x * width as f32, lm.y * height as f32)
    };

    for (a, b) in HAND_CONNECTIONS {
        draw_line(frame, px(a), px(b), BONE_COLOR);
    }
    for lm in &pose.landmarks {
        draw_dot(frame, lm.x * width as f32, lm.y * height as f32, JOINT_COLOR);
    }
}

fn put(frame: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < frame.width() && (y as u32) < frame.height() {
        frame.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_line(frame: &mut RgbImage, from: (f32, f32), to: (f32, f32), color: Rgb<u8>) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let steps = dx.abs().max(dy.abs()).ceil();
    // Off-screen or degenerate landmarks draw nothing
    if !steps.is_finite() || steps > 8192.0 {
        return;
    }
    let steps = steps.max(1.0) as i32;
    for s in 0..=steps {
        let t = s as f32 / steps as f32;
        put(
            frame,
            (from.0 + dx * t).round() as i32,
            (from.1 + dy * t).round() as i32,
            color,
        );
    }
}

fn draw_dot(frame: &mut RgbImage, cx: f32, cy: f32, color: Rgb<u8>) {
    if !cx.is_finite() || !cy.is_finite() {
        return;
    }
    let (cx, cy) = (cx.round() as i32, cy.round() as i32);
    for y in -JOINT_RADIUS..=JOINT_RADIUS {
        for x in -JOINT_RADIUS..=JOINT_RADIUS {
            if x * x + y * y <= JOINT_RADIUS * JOINT_RADIUS {
                put(frame, cx + x, cy + y, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{Landmark, NUM_LANDMARKS};

    #[test]
    fn joints_and_bones_are_drawn() {
        let mut landmarks = [Landmark::new(0.5, 0.5, 0.0); NUM_LANDMARKS];
        landmarks[0] = Landmark::new(0.1, 0.5, 0.0);
        let mut frame = RgbImage::new(100, 100);
        draw_hand(&mut frame, &HandPose::new(landmarks));

        assert_eq!(frame.get_pixel(10, 50), &JOINT_COLOR);
        assert_eq!(frame.get_pixel(50, 50), &JOINT_COLOR);
        // Wrist to thumb bone runs along y = 50
        assert_eq!(frame.get_pixel(30, 50), &BONE_COLOR);
        assert_eq!(frame.get_pixel(30, 10), &Rgb([0, 0, 0]));
    }

    #[test]
    fn off_frame_and_nan_landmarks_are_ignored() {
        let mut landmarks = [Landmark::new(f32::NAN, 2.0, 0.0); NUM_LANDMARKS];
        landmarks[1] = Landmark::new(-5.0, -5.0, 0.0);
        let mut frame = RgbImage::new(10, 10);
        draw_hand(&mut frame, &HandPose::new(landmarks));
        assert!(frame.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}
