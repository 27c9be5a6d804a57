use super::*;
use crate::config::SourceConfig;

use crate::streaming::{multipart_part, MJPEG_CONTENT_TYPE};

use axum::{
    body::Body, extract::RawQuery, extract::State, http::header, http::StatusCode, routing::get,
    Router,
};
use image::{ImageOutputFormat, Rgb};
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn png_bytes(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .unwrap();
    bytes
}

/// Serve `/snap` returning a fixed PNG and record every query string
async fn spawn_camera(body: Vec<u8>) -> (String, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let state = (Arc::new(body), Arc::clone(&seen));

    let app = Router::new()
        .route(
            "/snap",
            get(
                |State((body, seen)): State<(Arc<Vec<u8>>, Arc<Mutex<Vec<String>>>)>,
                 RawQuery(query): RawQuery| async move {
                    seen.lock().push(query.unwrap_or_default());
                    body.as_ref().clone()
                },
            ),
        )
        .route("/broken", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route("/garbage", get(|| async { "not an image" }))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), seen)
}

/// Serve `/stream` as multipart MJPEG: each connection sends `parts` of
/// `frames` (cycling) at `interval`, then closes. Returns the connection count.
async fn spawn_mjpeg_camera(
    frames: Vec<Vec<u8>>,
    parts: usize,
    interval: Duration,
) -> (String, Arc<AtomicU64>) {
    let connections = Arc::new(AtomicU64::new(0));
    let state = (Arc::new(frames), Arc::clone(&connections));

    let app = Router::new()
        .route(
            "/stream",
            get(
                move |State((frames, connections)): State<(Arc<Vec<Vec<u8>>>, Arc<AtomicU64>)>| async move {
                    connections.fetch_add(1, Ordering::SeqCst);
                    let body = async_stream::stream! {
                        for i in 0..parts {
                            tokio::time::sleep(interval).await;
                            let frame = &frames[i % frames.len()];
                            yield Ok::<_, std::convert::Infallible>(multipart_part(frame));
                        }
                    };
                    (
                        [(header::CONTENT_TYPE, MJPEG_CONTENT_TYPE)],
                        Body::from_stream(body),
                    )
                },
            ),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), connections)
}

fn shaded_frames(count: u8) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| png_bytes(&RgbImage::from_pixel(16, 12, Rgb([i * 40, 0, 0]))))
        .collect()
}

#[test]
fn test_counter_substitution() {
    assert_eq!(
        snapshot_url("http://cam/snapshot.cgi?chn=0&q=0&COUNTER", 7),
        "http://cam/snapshot.cgi?chn=0&q=0&7"
    );
    assert_eq!(
        snapshot_url("http://cam/fast.jpg?rand=COUNTER&again=COUNTER", 3),
        "http://cam/fast.jpg?rand=3&again=3"
    );
    assert_eq!(snapshot_url("http://cam/still.jpg", 9), "http://cam/still.jpg");
}

#[test]
fn test_synthetic_subject_moves() {
    let source = SyntheticSource::new((320, 240), 30);
    let first = source.render(0);
    let later = source.render(10);

    assert_eq!(first.dimensions(), (320, 240));
    assert_ne!(source.subject_origin(0), source.subject_origin(10));
    assert_ne!(first, later);

    let (x, y) = source.subject_origin(10);
    assert_eq!(later.get_pixel(x + 1, y + 1), &Rgb([235, 235, 225]));
}

#[test]
fn test_synthetic_subject_stays_in_frame() {
    let source = SyntheticSource::new((160, 120), 30);
    let size = source.subject_size();
    for frame_no in 0..500 {
        let (x, y) = source.subject_origin(frame_no);
        assert!(x + size <= 160 && y + size <= 120, "frame {}", frame_no);
    }
}

#[tokio::test]
async fn test_synthetic_source_reads_frames() {
    let mut source = SyntheticSource::new((64, 48), 200);
    let first = source.read_frame().await.unwrap().unwrap();
    let second = source.read_frame().await.unwrap().unwrap();
    assert_eq!(first.dimensions(), (64, 48));
    assert_eq!(second.dimensions(), (64, 48));
    assert!(source.name().starts_with("synthetic"));
}

#[tokio::test]
async fn test_snapshot_fetches_and_decodes() {
    let expected = RgbImage::from_pixel(32, 24, Rgb([10, 200, 30]));
    let (base, seen) = spawn_camera(png_bytes(&expected)).await;

    let mut source =
        SnapshotSource::new(format!("{}/snap?rand=COUNTER", base), Duration::from_secs(5))
            .unwrap();

    let frame = source.read_frame().await.unwrap().unwrap();
    assert_eq!(frame, expected);
    source.read_frame().await.unwrap().unwrap();

    assert_eq!(source.requests(), 2);
    assert_eq!(*seen.lock(), vec!["rand=0".to_string(), "rand=1".to_string()]);
}

#[tokio::test]
async fn test_snapshot_http_failure_is_reported() {
    let (base, _seen) = spawn_camera(Vec::new()).await;
    let mut source =
        SnapshotSource::new(format!("{}/broken", base), Duration::from_secs(5)).unwrap();

    let err = source.read_frame().await.unwrap_err();
    assert!(matches!(err, SourceError::Http { .. }), "{:?}", err);
}

#[tokio::test]
async fn test_snapshot_undecodable_body_is_reported() {
    let (base, _seen) = spawn_camera(Vec::new()).await;
    let mut source =
        SnapshotSource::new(format!("{}/garbage", base), Duration::from_secs(5)).unwrap();

    let err = source.read_frame().await.unwrap_err();
    assert!(matches!(err, SourceError::Decode { .. }), "{:?}", err);
}

#[tokio::test]
async fn test_mjpeg_stream_is_read_part_by_part() {
    let (base, connections) =
        spawn_mjpeg_camera(shaded_frames(3), usize::MAX, Duration::from_millis(50)).await;
    let mut source =
        SnapshotSource::new(format!("{}/stream?rand=COUNTER", base), Duration::from_secs(5))
            .unwrap();

    for i in 0..5u8 {
        let frame = source.read_frame().await.unwrap().unwrap();
        assert_eq!(frame.dimensions(), (16, 12));
        assert_eq!(frame.get_pixel(0, 0), &Rgb([(i % 3) * 40, 0, 0]), "part {}", i);
    }

    assert!(source.is_streaming());
    assert_eq!(source.requests(), 1);
    assert_eq!(connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ended_mjpeg_stream_is_reopened() {
    let (base, connections) =
        spawn_mjpeg_camera(shaded_frames(2), 2, Duration::from_millis(10)).await;
    let mut source =
        SnapshotSource::new(format!("{}/stream", base), Duration::from_secs(5)).unwrap();

    source.read_frame().await.unwrap().unwrap();
    source.read_frame().await.unwrap().unwrap();

    let err = source.read_frame().await.unwrap_err();
    assert!(matches!(err, SourceError::Http { .. }), "{:?}", err);
    assert!(!source.is_streaming());

    let frame = source.read_frame().await.unwrap().unwrap();
    assert_eq!(frame.get_pixel(0, 0), &Rgb([0, 0, 0]));
    assert_eq!(source.requests(), 2);
    assert_eq!(connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stalled_mjpeg_stream_times_out() {
    let (base, _connections) =
        spawn_mjpeg_camera(shaded_frames(1), usize::MAX, Duration::from_secs(30)).await;
    let mut source =
        SnapshotSource::new(format!("{}/stream", base), Duration::from_millis(200)).unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), source.read_frame())
        .await
        .expect("read should give up on its own")
        .unwrap_err();
    assert!(matches!(err, SourceError::Http { .. }), "{:?}", err);
    assert!(!source.is_streaming());
}

#[test]
fn test_from_config_requires_snapshot_url() {
    let config = SourceConfig {
        kind: SourceKind::Snapshot,
        url: None,
        ..SourceConfig::default()
    };
    assert!(from_config(&config).is_err());
}

#[cfg(not(all(feature = "camera", target_os = "linux")))]
#[test]
fn test_device_source_unavailable_without_feature() {
    let config = SourceConfig {
        kind: SourceKind::Device,
        ..SourceConfig::default()
    };
    assert!(matches!(
        from_config(&config),
        Err(SourceError::Device { .. })
    ));
}

#[test]
fn test_from_config_builds_synthetic() {
    let source = from_config(&SourceConfig::default()).unwrap();
    assert!(source.name().contains("640x480"));
}
