//! Actix Web server exposing the viewer page, the MJPEG feed, and status.
//!
//! Each `/video_feed` subscriber gets its own capture session on a dedicated
//! thread. Sessions are serialised by a [`DeviceGate`] so only one of them
//! touches the camera at a time.

use std::{io, net::SocketAddr, time::Duration};

use actix_web::{
    App, HttpResponse, HttpServer,
    http::header,
    web::{self, Bytes},
};
use anyhow::{Context, Result};
use async_stream::stream;
use camera_ingest::{CameraAcquirer, Clock, DeviceLister, DeviceOpener};
use mjpeg_stream::{
    FrameChunk, PipelineSettings, SharedStatus,
    pipeline::{CONTENT_TYPE, telemetry},
    spawn_session,
};
use tokio::sync::{OwnedSemaphorePermit, mpsc};
use tracing::{error, info, warn};

use crate::{gate::DeviceGate, html::index::INDEX_HTML};

type SpawnSession =
    dyn Fn(OwnedSemaphorePermit) -> io::Result<mpsc::Receiver<FrameChunk>> + Send + Sync;

/// Shared state backing HTTP handlers.
pub(crate) struct ServerState {
    gate: DeviceGate,
    status: SharedStatus,
    spawn: Box<SpawnSession>,
}

impl ServerState {
    pub(crate) fn new<L, O, C>(
        acquirer: CameraAcquirer<L, O, C>,
        pipeline: PipelineSettings,
        status: SharedStatus,
        session_wait: Duration,
    ) -> Self
    where
        L: DeviceLister + Clone + Send + Sync + 'static,
        O: DeviceOpener + Clone + Send + Sync + 'static,
        C: Clock + Clone + Send + Sync + 'static,
    {
        let session_status = status.clone();
        Self {
            gate: DeviceGate::new(session_wait),
            status,
            spawn: Box::new(move |permit| {
                spawn_session(acquirer.clone(), pipeline, session_status.clone(), permit)
            }),
        }
    }
}

/// Register every route on `cfg`. Shared by the server and the tests.
pub(crate) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index_route))
        .route("/video_feed", web::get().to(stream_handler))
        .route("/stream.mjpg", web::get().to(stream_handler))
        .route("/status", web::get().to(status_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

/// Bind and run until the process is interrupted.
pub(crate) async fn serve(bind: SocketAddr, state: ServerState) -> Result<()> {
    let state = web::Data::new(state);
    let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(routes))
        .bind(bind)
        .with_context(|| format!("Failed to bind HTTP server to {bind}"))?
        .run();
    info!(%bind, "serving MJPEG feed at http://{bind}/video_feed");
    server.await.context("HTTP server error")
}

/// Stream annotated frames over a multipart response.
async fn stream_handler(state: web::Data<ServerState>) -> HttpResponse {
    let Some(permit) = state.gate.acquire().await else {
        warn!("camera busy; turning subscriber away");
        return HttpResponse::ServiceUnavailable()
            .insert_header((header::RETRY_AFTER, state.gate.retry_after_secs().to_string()))
            .content_type("text/plain; charset=utf-8")
            .body("camera is in use by another viewer, retry shortly");
    };

    let mut frames = match (state.spawn)(permit) {
        Ok(rx) => rx,
        Err(err) => {
            error!("failed to start capture session: {err}");
            return HttpResponse::InternalServerError().body("failed to start capture session");
        }
    };

    let stream = stream! {
        while let Some(chunk) = frames.recv().await {
            yield Ok::<Bytes, actix_web::Error>(Bytes::from(chunk.into_bytes()));
        }
    };

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((header::CONTENT_TYPE, CONTENT_TYPE))
        .streaming(stream)
}

async fn index_route() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}

/// Return the current stream status as JSON.
async fn status_handler(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .json(state.status.snapshot())
}

/// Prometheus text exposition.
async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;

    use actix_web::{body::MessageBody, http::StatusCode, test};
    use camera_ingest::{
        AcquireConfig, DeviceId,
        stub::{InstantClock, StubLister, StubOpener, StubScript, solid_frame},
    };

    use super::*;

    fn stub_state(opener: StubOpener, lister: StubLister, wait: Duration) -> ServerState {
        let acquirer = CameraAcquirer::new(
            lister,
            opener,
            InstantClock::default(),
            AcquireConfig {
                max_attempts: 1,
                ..AcquireConfig::default()
            },
        );
        ServerState::new(acquirer, PipelineSettings::default(), SharedStatus::new(), wait)
    }

    fn one_camera() -> (StubOpener, StubLister) {
        let opener = StubOpener::new([(
            DeviceId::video_path(0),
            StubScript::streaming(solid_frame(32, 24, [180, 180, 180])),
        )]);
        (opener, StubLister::empty().with_device(0, "USB Camera"))
    }

    #[actix_web::test]
    async fn index_embeds_the_feed() {
        let (opener, lister) = one_camera();
        let state = web::Data::new(stub_state(opener, lister, Duration::from_secs(1)));
        let app = test::init_service(App::new().app_data(state).configure(routes)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        let html = std::str::from_utf8(&body).unwrap();
        assert!(html.contains(r#"<img src="/video_feed""#));
    }

    #[actix_web::test]
    async fn feed_is_multipart_and_byte_exact() {
        let (opener, lister) = one_camera();
        let state = web::Data::new(stub_state(opener.clone(), lister, Duration::from_secs(1)));
        let app = test::init_service(App::new().app_data(state).configure(routes)).await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/video_feed").to_request())
                .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "multipart/x-mixed-replace; boundary=frame"
        );
        assert_eq!(resp.headers().get(header::CACHE_CONTROL).unwrap(), "no-cache");

        let mut body = Box::pin(resp.into_body());
        let first = poll_fn(|cx| body.as_mut().poll_next(cx))
            .await
            .unwrap()
            .ok()
            .unwrap();
        assert!(first.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8"));
        assert!(first.ends_with(b"\xFF\xD9\r\n"));

        drop(body);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while opener.releases(&DeviceId::video_path(0)) == 0 {
            assert!(std::time::Instant::now() < deadline, "device never released");
            actix_web::rt::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[actix_web::test]
    async fn alias_route_serves_the_same_feed() {
        let (opener, lister) = one_camera();
        let state = web::Data::new(stub_state(opener, lister, Duration::from_secs(1)));
        let app = test::init_service(App::new().app_data(state).configure(routes)).await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/stream.mjpg").to_request())
                .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            CONTENT_TYPE
        );
    }

    #[actix_web::test]
    async fn busy_camera_returns_503_with_retry_after() {
        let (opener, lister) = one_camera();
        let state = web::Data::new(stub_state(opener, lister, Duration::from_millis(50)));
        let app = test::init_service(App::new().app_data(state).configure(routes)).await;

        let first =
            test::call_service(&app, test::TestRequest::get().uri("/video_feed").to_request())
                .await;
        assert_eq!(first.status(), StatusCode::OK);

        let second =
            test::call_service(&app, test::TestRequest::get().uri("/video_feed").to_request())
                .await;
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(second.headers().get(header::RETRY_AFTER).unwrap(), "1");
        drop(first);
    }

    #[actix_web::test]
    async fn missing_camera_yields_a_text_part_then_ends() {
        let state = web::Data::new(stub_state(
            StubOpener::default(),
            StubLister::empty(),
            Duration::from_secs(1),
        ));
        let status = state.status.clone();
        let app = test::init_service(App::new().app_data(state).configure(routes)).await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/video_feed").to_request())
                .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.starts_with("--frame\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n"));
        assert!(text.contains("no camera found after 1 sweep(s)"));
        assert!(status.snapshot().last_error.is_some());
    }

    #[actix_web::test]
    async fn status_reports_json() {
        let state = web::Data::new(stub_state(
            StubOpener::default(),
            StubLister::empty(),
            Duration::from_secs(1),
        ));
        let app = test::init_service(App::new().app_data(state).configure(routes)).await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/status").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["streaming"], false);
        assert_eq!(json["sessions_started"], 0);
    }
}
