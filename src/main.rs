mod capture;
mod gesture;
mod landmarks;
mod output;
mod signal;

use anyhow::{Context, Result};
use capture::{CaptureSource, ImageSequence, WebcamCapture};
use clap::Parser;
use gesture::Gesture;
use image::RgbImage;
use landmarks::{HandDetector, HandsConfig};
use output::{OutputSink, V4L2Output};
use signal::{OscSink, SignalSink};
use std::io::BufRead;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about = "Hand gestures to OSC for the Lorenz attractor renderer", long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Read frames from a directory of images instead of the webcam
    #[arg(long)]
    frames_dir: Option<String>,

    /// Palm detection model (ONNX file)
    #[arg(long, default_value = "models/palm_detection_full.onnx")]
    palm_model: String,

    /// Hand landmark model (ONNX file)
    #[arg(long, default_value = "models/hand_landmark_full.onnx")]
    landmark_model: String,

    /// Minimum palm detection score to start tracking a hand
    #[arg(long, default_value_t = 0.7)]
    min_detection_confidence: f32,

    /// Minimum hand presence score to keep tracking a hand
    #[arg(long, default_value_t = 0.5)]
    min_tracking_confidence: f32,

    /// Maximum number of hands to track
    #[arg(long, default_value_t = 2)]
    max_hands: usize,

    /// Host of the OSC receiver
    #[arg(long, default_value = "127.0.0.1")]
    osc_host: String,

    /// Port of the OSC receiver
    #[arg(long, default_value_t = 12000)]
    osc_port: u16,

    /// OSC address of gesture messages
    #[arg(long, default_value = "/gesture")]
    osc_address: String,

    /// Write an annotated preview to this v4l2loopback device
    #[arg(short, long)]
    preview_device: Option<String>,

    /// Preview resolution width
    #[arg(long, default_value_t = 1280)]
    preview_width: u32,

    /// Preview resolution height
    #[arg(long, default_value_t = 720)]
    preview_height: u32,

    /// Target frames per second (0 = as fast as frames arrive)
    #[arg(long, default_value_t = 0)]
    fps: u32,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn hands_config(&self) -> HandsConfig {
        HandsConfig {
            min_detection_confidence: self.min_detection_confidence,
            min_tracking_confidence: self.min_tracking_confidence,
            max_num_hands: self.max_hands,
        }
    }

    fn osc_target(&self) -> Result<SocketAddr> {
        (self.osc_host.as_str(), self.osc_port)
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve {}:{}", self.osc_host, self.osc_port))?
            .next()
            .with_context(|| format!("No address for {}", self.osc_host))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("lorenz-hands starting");

    // Initialize capture
    let mut capture: Box<dyn CaptureSource> = match &args.frames_dir {
        Some(dir) => Box::new(ImageSequence::new(dir).context("Failed to open frame directory")?),
        None => Box::new(
            WebcamCapture::new(args.input_device, args.capture_width, args.capture_height)
                .context("Failed to initialize webcam capture")?,
        ),
    };
    let (width, height) = capture.resolution();
    tracing::info!("Capture: {}x{}", width, height);

    // Initialize hand tracking
    let config = args.hands_config();
    tracing::info!(
        "Hand tracking: detection>={}, tracking>={}, max hands {}",
        config.min_detection_confidence,
        config.min_tracking_confidence,
        config.max_num_hands
    );
    let mut detector = landmarks::create_default_detector(&args.palm_model, &args.landmark_model, config)
        .context("Failed to load hand models")?;

    // Initialize gesture output
    let mut sink = OscSink::new(args.osc_target()?, args.osc_address.as_str())
        .context("Failed to initialize OSC output")?;

    // Initialize preview if requested
    let mut preview = match &args.preview_device {
        Some(path) => {
            let output = V4L2Output::new(path, args.preview_width, args.preview_height)
                .context("Failed to initialize v4l2loopback preview")?;
            let (w, h) = output.resolution();
            tracing::info!("Preview: {}x{}", w, h);
            Some(output)
        }
        None => None,
    };

    let quit = watch_for_quit();

    let limits = LoopLimits {
        target_fps: args.fps,
        max_frames: args.max_frames,
    };
    let stats = run_pipeline(
        capture.as_mut(),
        detector.as_mut(),
        &mut sink,
        preview.as_mut().map(|p| p as &mut dyn OutputSink),
        &quit,
        limits,
    )?;

    tracing::info!(
        "Stopped after {} frames, {} gestures sent, {} sends failed",
        stats.frames,
        stats.gestures_sent,
        stats.send_failures
    );
    Ok(())
}

/// Set the returned flag when the operator types `q` on stdin
fn watch_for_quit() -> Arc<AtomicBool> {
    let quit = Arc::new(AtomicBool::new(false));
    let flag = quit.clone();
    std::thread::spawn(move || {
        // Closed stdin is not a quit request
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { return };
            if line.trim().eq_ignore_ascii_case("q") {
                flag.store(true, Ordering::Relaxed);
                return;
            }
        }
    });
    tracing::info!("Type q and press Enter to stop");
    quit
}

#[derive(Clone, Copy, Debug, Default)]
struct LoopLimits {
    target_fps: u32,
    max_frames: Option<u64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct PipelineStats {
    frames: u64,
    frames_with_hands: u64,
    gestures_sent: u64,
    send_failures: u64,
}

/// Result of processing one frame
#[derive(Debug, Default, PartialEq)]
struct FrameReport {
    hands: usize,
    gestures: Vec<Gesture>,
    send_failures: usize,
}

/// Classify every hand in a frame and send one message per recognised gesture
fn process_frame(
    detector: &mut dyn HandDetector,
    sink: &mut dyn SignalSink,
    frame: &RgbImage,
    preview: Option<&mut RgbImage>,
) -> Result<FrameReport> {
    let hands = detector.detect(frame).context("Failed to detect hands")?;
    let mut report = FrameReport {
        hands: hands.len(),
        ..FrameReport::default()
    };

    for hand in &hands {
        let Some(gesture) = gesture::classify(hand) else {
            continue;
        };
        report.gestures.push(gesture);

        // Best effort: a lost datagram is not worth stopping for
        match sink.send(gesture) {
            Ok(()) => tracing::debug!(
                "Sent {} ({:?} hand, presence {:.2})",
                gesture,
                hand.handedness,
                hand.score
            ),
            Err(err) => {
                report.send_failures += 1;
                tracing::warn!("{:#}", err);
            }
        }
    }

    if let Some(canvas) = preview {
        for hand in &hands {
            output::draw_hand(canvas, hand);
        }
    }

    Ok(report)
}

fn run_pipeline(
    capture: &mut dyn CaptureSource,
    detector: &mut dyn HandDetector,
    sink: &mut dyn SignalSink,
    mut preview: Option<&mut dyn OutputSink>,
    quit: &AtomicBool,
    limits: LoopLimits,
) -> Result<PipelineStats> {
    let frame_duration = (limits.target_fps > 0)
        .then(|| Duration::from_secs_f32(1.0 / limits.target_fps as f32));
    let mut stats = PipelineStats::default();
    let mut total_capture_time = Duration::ZERO;
    let mut total_detect_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;
    let mut frame_size = None;

    tracing::info!("Starting main pipeline loop");

    loop {
        if quit.load(Ordering::Relaxed) {
            tracing::info!("Quit requested");
            break;
        }
        if limits.max_frames.is_some_and(|max| stats.frames >= max) {
            tracing::info!("Reached frame limit");
            break;
        }

        let loop_start = Instant::now();

        // Capture frame
        let capture_start = Instant::now();
        let Some(mut frame) = capture.capture_frame().context("Failed to capture frame")? else {
            tracing::info!("Capture source exhausted");
            break;
        };
        total_capture_time += capture_start.elapsed();

        // Tracked hand regions are in pixels of the previous frame size
        if frame_size.is_some_and(|size| size != frame.dimensions()) {
            detector.reset_state();
        }
        frame_size = Some(frame.dimensions());

        // Detect, classify, send
        let detect_start = Instant::now();
        let report = if preview.is_some() {
            let original = frame.clone();
            process_frame(detector, sink, &original, Some(&mut frame))?
        } else {
            process_frame(detector, sink, &frame, None)?
        };
        total_detect_time += detect_start.elapsed();

        stats.frames += 1;
        if report.hands > 0 {
            stats.frames_with_hands += 1;
        }
        stats.gestures_sent += (report.gestures.len() - report.send_failures) as u64;
        stats.send_failures += report.send_failures as u64;

        // Preview output
        if let Some(out) = preview.as_deref_mut() {
            let output_start = Instant::now();
            out.write_frame(&frame).context("Failed to write preview frame")?;
            total_output_time += output_start.elapsed();
        }

        // Log stats every 30 frames
        if stats.frames % 30 == 0 {
            let n = stats.frames as f64;
            let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / n;
            let avg_detect_ms = total_detect_time.as_secs_f64() * 1000.0 / n;
            let avg_output_ms = total_output_time.as_secs_f64() * 1000.0 / n;
            let total_ms = avg_capture_ms + avg_detect_ms + avg_output_ms;

            tracing::info!(
                "Frame {}: capture={:.1}ms, detect={:.1}ms, output={:.1}ms, fps={:.1}, hands in {} frames, {} gestures sent",
                stats.frames,
                avg_capture_ms,
                avg_detect_ms,
                avg_output_ms,
                1000.0 / total_ms.max(f64::EPSILON),
                stats.frames_with_hands,
                stats.gestures_sent
            );
        }

        // Frame rate limiting
        if let Some(frame_duration) = frame_duration {
            let elapsed = loop_start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
        }
    }

    Ok(stats)
}
