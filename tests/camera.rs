//! End-to-end tests against a scripted capture process
//!
//! The capture program is replaced by `sh -c <script>`; the standard
//! rpicam-vid arguments land in the script's positional parameters and are
//! ignored.

use std::time::{Duration, Instant};

use rpicam_rs::capture::END_OF_IMAGE;
use rpicam_rs::mjpeg::MultipartEncoder;
use rpicam_rs::{Camera, CaptureConfig, CaptureStats, Error, Frame, Subscription};

/// Emits a small JPEG-shaped frame every 20ms until stopped
const STREAM: &str = "while :; do printf '\\377\\330frame\\377\\331'; sleep 0.02; done";

const PULL_TIMEOUT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn script_config(script: &str) -> CaptureConfig {
    CaptureConfig::with_resolution(64, 48)
        .wrapper("sh", ["-c", script, "rpicam-vid"])
        .stop_timeout(Duration::from_millis(500))
}

fn script_camera(script: &str) -> Camera {
    init_tracing();
    Camera::new(script_config(script))
}

async fn pull(sub: &Subscription) -> Frame {
    tokio::time::timeout(PULL_TIMEOUT, sub.pull())
        .await
        .expect("pull timed out")
        .expect("stream ended")
}

async fn wait_for_stats(camera: &Camera, what: &str, check: impl Fn(&CaptureStats) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let stats = camera.stats().await;
        if check(&stats) {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {}: {:?}", what, stats);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_frames_arrive_whole_and_in_order() {
    let camera = script_camera(STREAM);
    let sub = camera.attach().await.unwrap();

    let mut last = 0;
    for _ in 0..5 {
        let frame = pull(&sub).await;
        assert_eq!(frame.bytes(), b"\xFF\xD8frame\xFF\xD9");
        assert!(frame.sequence() > last, "frames reordered or duplicated");
        last = frame.sequence();
        frame.release();
    }

    sub.close().await;
    wait_for_stats(&camera, "teardown", |s| s.sessions_stopped == 1).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_session_for_concurrent_subscribers() {
    let camera = script_camera(STREAM);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let camera = camera.clone();
            tokio::spawn(async move {
                let sub = camera.attach().await.unwrap();
                let frame = pull(&sub).await;
                assert!(frame.bytes().ends_with(&END_OF_IMAGE));
                frame.release();
                sub
            })
        })
        .collect();

    let mut subs = Vec::new();
    for handle in handles {
        subs.push(handle.await.unwrap());
    }

    let stats = camera.stats().await;
    assert_eq!(stats.sessions_started, 1);
    assert_eq!(stats.active_sessions(), 1);
    assert_eq!(stats.subscribers, 8);
    assert!(stats.streaming);

    for sub in subs {
        sub.close().await;
    }

    wait_for_stats(&camera, "teardown", |s| s.sessions_stopped == 1).await;
    assert!(!camera.is_streaming().await);
    assert_eq!(camera.subscriber_count().await, 0);
}

#[tokio::test]
async fn test_stop_escalates_when_interrupt_ignored() {
    let script = format!("trap '' INT; {}", STREAM);
    let camera = Camera::new(script_config(&script).stop_timeout(Duration::from_millis(200)));
    init_tracing();

    let sub = camera.attach().await.unwrap();
    pull(&sub).await.release();
    sub.close().await;

    wait_for_stats(&camera, "forced teardown", |s| s.sessions_stopped == 1).await;

    // The next subscriber gets a fresh process
    let sub = camera.attach().await.unwrap();
    pull(&sub).await.release();
    assert_eq!(camera.stats().await.sessions_started, 2);
    sub.close().await;
    camera.shutdown().await;
}

#[tokio::test]
async fn test_immediate_detach_does_not_wedge_next_attach() {
    let camera = script_camera(STREAM);

    for _ in 0..3 {
        let sub = camera.attach().await.unwrap();
        sub.close().await;
        assert_eq!(camera.subscriber_count().await, 0);
    }

    let sub = tokio::time::timeout(PULL_TIMEOUT, camera.attach())
        .await
        .expect("attach deadlocked")
        .unwrap();
    pull(&sub).await.release();

    let stats = camera.stats().await;
    assert_eq!(stats.sessions_started, 4);
    assert_eq!(stats.active_sessions(), 1);

    sub.close().await;
    wait_for_stats(&camera, "teardown", |s| s.sessions_stopped == 4).await;
}

#[tokio::test]
async fn test_detaching_one_subscriber_leaves_others_undisturbed() {
    let camera = script_camera(STREAM);
    let a = camera.attach().await.unwrap();
    let b = camera.attach().await.unwrap();

    let fa = pull(&a).await;
    let fb = pull(&b).await;
    assert_eq!(fa.bytes(), fb.bytes());
    fa.release();
    fb.release();

    a.close().await;
    assert!(matches!(a.pull().await, Err(Error::Closed)));

    let mut last = 0;
    for _ in 0..3 {
        let frame = pull(&b).await;
        assert!(frame.sequence() > last);
        last = frame.sequence();
    }
    assert!(camera.is_streaming().await);

    b.close().await;
    wait_for_stats(&camera, "teardown", |s| s.sessions_stopped == 1).await;
}

#[tokio::test]
async fn test_producer_exit_ends_streams() {
    let camera = script_camera("printf '\\377\\330a\\377\\331\\377\\330b\\377\\331'");
    let sub = camera.attach().await.unwrap();

    assert_eq!(pull(&sub).await.bytes(), b"\xFF\xD8a\xFF\xD9");
    assert_eq!(pull(&sub).await.bytes(), b"\xFF\xD8b\xFF\xD9");

    let end = tokio::time::timeout(PULL_TIMEOUT, sub.pull()).await.unwrap();
    assert!(matches!(end, Err(Error::EndOfStream)));
    assert!(matches!(sub.pull().await, Err(Error::Closed)));

    wait_for_stats(&camera, "producer exit", |s| s.sessions_stopped == 1 && !s.streaming).await;
    assert_eq!(camera.subscriber_count().await, 0);
    sub.close().await;

    // A new subscriber starts the process again
    let sub = camera.attach().await.unwrap();
    assert_eq!(pull(&sub).await.bytes(), b"\xFF\xD8a\xFF\xD9");
    assert_eq!(camera.stats().await.sessions_started, 2);
    sub.close().await;
    camera.shutdown().await;
}

#[tokio::test]
async fn test_oversized_frame_dropped_stream_continues() {
    let script = "printf '\\377\\330'; head -c 500 /dev/zero; printf '\\377\\331'; \
                  while :; do printf '\\377\\330ok\\377\\331'; sleep 0.02; done";
    let camera = Camera::new(script_config(script).max_frame_size(64).read_chunk_size(32));
    init_tracing();

    let sub = camera.attach().await.unwrap();
    for _ in 0..3 {
        assert_eq!(pull(&sub).await.bytes(), b"\xFF\xD8ok\xFF\xD9");
    }

    let stats = camera.stats().await;
    assert!(stats.frames_oversized >= 1);
    assert_eq!(stats.sessions_started, 1);

    sub.close().await;
    camera.shutdown().await;
}

#[tokio::test]
async fn test_missing_capture_binary() {
    init_tracing();
    let camera = Camera::new(CaptureConfig::default().program("/nonexistent/rpicam-vid"));

    let err = camera.attach().await.unwrap_err();
    assert!(err.is_unavailable(), "unexpected error: {}", err);
    assert_eq!(camera.subscriber_count().await, 0);
    assert!(!camera.is_streaming().await);
    assert_eq!(camera.stats().await.sessions_started, 0);
}

#[tokio::test]
async fn test_shutdown_ends_every_subscriber() {
    let camera = script_camera(STREAM);
    let a = camera.attach().await.unwrap();
    let b = camera.attach().await.unwrap();
    pull(&a).await.release();

    camera.shutdown().await;

    for sub in [&a, &b] {
        loop {
            match tokio::time::timeout(PULL_TIMEOUT, sub.pull()).await.unwrap() {
                Ok(frame) => frame.release(),
                Err(e) => {
                    assert!(matches!(e, Error::EndOfStream));
                    break;
                }
            }
        }
    }
    let stats = camera.stats().await;
    assert_eq!(stats.sessions_stopped, 1);
    assert!(!stats.streaming);
}

#[tokio::test]
async fn test_frames_encode_as_multipart() {
    let camera = script_camera(STREAM);
    let encoder = MultipartEncoder::new("frame");
    let sub = camera.attach().await.unwrap();

    let frame = pull(&sub).await;
    let part = encoder.encode_part(frame.bytes());
    let len = frame.len();
    frame.release();

    let text = String::from_utf8_lossy(&part);
    assert!(text.starts_with("--frame\r\nContent-Type: image/jpeg\r\n"));
    assert!(text.contains(&format!("Content-Length: {}\r\n\r\n", len)));

    sub.close().await;
    camera.shutdown().await;
}
