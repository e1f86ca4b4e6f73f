use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use camrelay::config::{AppConfig, ConfigSource, EndpointConfig, ObsConfig, ObsStreamData, StaticConfigSource};
use camrelay::endpoint::obs::ObsClientError;
use camrelay::endpoint::{EndpointHandler, EndpointResult, EndpointState, ServiceHooks};
use camrelay::error::{AuthFailure, EndpointError, ObsError, StreamError};
use camrelay::model::StreamProtocol;
use camrelay::sim::{EngineEvent, ScriptedRemote, SimEngine};
use camrelay::stream::{SessionManager, VideoTarget, VideoTargetState};

struct Idle;

#[async_trait]
impl VideoTarget for Idle {
    async fn run(&self, _state: VideoTargetState, cancel: CancellationToken) {
        cancel.cancelled().await;
    }
}

#[derive(Default)]
struct CountingHooks {
    started: AtomicUsize,
    stopped: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl ServiceHooks for CountingHooks {
    fn start_service(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_service(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }

    fn acquire_locks(&self) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    fn release_locks(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

fn obs(url: &str) -> EndpointConfig {
    EndpointConfig::Obs(ObsConfig::new(url, 4455, ""))
}

fn stream_data(host: &str) -> ObsStreamData {
    ObsStreamData::new(StreamProtocol::Mpegts, host)
}

struct Fixture {
    source: Arc<StaticConfigSource>,
    remote: ScriptedRemote,
    engine: SimEngine,
    hooks: Arc<CountingHooks>,
    handler: EndpointHandler,
}

impl Fixture {
    fn new(endpoint: Option<EndpointConfig>, stream: Option<ObsStreamData>) -> Self {
        let source = Arc::new(StaticConfigSource::new(AppConfig {
            endpoint,
            stream,
            ..AppConfig::default()
        }));
        let remote = ScriptedRemote::new();
        let engine = SimEngine::new();
        let hooks = Arc::new(CountingHooks::default());
        let manager = Arc::new(SessionManager::new(Arc::new(engine.clone())));

        let handler = EndpointHandler::new(source.clone(), Arc::new(remote.clone()), manager, Arc::new(Idle))
            .with_hooks(hooks.clone());

        Self {
            source,
            remote,
            engine,
            hooks,
            handler,
        }
    }

    fn ready() -> Self {
        Self::new(Some(obs("10.0.0.2")), Some(stream_data("udp://10.0.0.3:9000")))
    }
}

#[tokio::test]
async fn missing_stream_data_makes_no_network_call() {
    let fx = Fixture::new(Some(obs("10.0.0.2")), None);

    let state = fx.handler.connect().await;

    assert_eq!(state, EndpointState::Stopped(Some(EndpointError::Obs(ObsError::NotHaveData))));
    assert_eq!(fx.remote.connect_count(), 0);
    assert!(fx.remote.requests().is_empty());
    assert!(fx.engine.log().events().is_empty());
}

#[tokio::test]
async fn refused_connection_is_a_warning_while_streaming() {
    let fx = Fixture::ready();
    fx.remote.fail_connect(Some(ObsClientError::ConnectionRefused));

    let state = fx.handler.connect().await;

    assert_eq!(
        state,
        EndpointState::Started(Some(EndpointError::Obs(ObsError::ConnectionRefused)))
    );
    assert!(fx.handler.is_service_held());
}

#[tokio::test]
async fn connect_creates_stream_input() {
    let fx = Fixture::ready();

    let state = fx.handler.connect().await;
    assert_eq!(state, EndpointState::Started(None));

    let inputs = fx.remote.created_inputs();
    assert_eq!(inputs.len(), 1);
    let scene = fx.remote.program_scene().unwrap();
    assert_eq!(inputs[0].scene_uuid, scene.uuid);
    assert_eq!(inputs[0].name, "CameraStream");
    assert_eq!(inputs[0].kind, "ffmpeg_source");
    assert_eq!(
        inputs[0].settings,
        json!({"input": "udp://10.0.0.3:9000", "is_local_file": false, "speed": 100})
    );

    let state = fx.handler.disconnect().await;
    assert_eq!(state, EndpointState::Stopped(None));
}

#[tokio::test]
async fn existing_input_is_reused_and_made_visible() {
    let fx = Fixture::ready();
    let scene = fx.remote.program_scene().unwrap();
    fx.remote.add_item(&scene.uuid, "CameraStream", false);

    assert!(fx.handler.connect().await.is_started());

    assert!(fx.remote.created_inputs().is_empty());
    let items = fx.remote.items(&scene.uuid);
    assert_eq!(items.len(), 1);
    assert!(items[0].enabled);

    fx.handler.disconnect().await;
    assert!(fx.handler.connect().await.is_started());
    assert!(fx.remote.created_inputs().is_empty());
    assert_eq!(
        fx.remote.requests().iter().filter(|r| *r == "SetSceneItemEnabled").count(),
        1
    );
}

#[tokio::test]
async fn missing_program_scene_falls_back() {
    let fx = Fixture::ready();
    fx.remote.clear_program_scene();

    assert_eq!(fx.handler.connect().await, EndpointState::Started(None));
    assert!(fx.remote.scene_names().contains(&"MainScene".to_string()));
    let scene = fx.remote.program_scene().unwrap();
    assert_eq!(scene.name, "MainScene");
    assert_eq!(fx.remote.created_inputs()[0].scene_uuid, scene.uuid);
}

#[tokio::test]
async fn failing_fallback_scene_is_reported() {
    let fx = Fixture::ready();
    fx.remote.clear_program_scene();
    fx.remote.fail_create_scene(true);

    let state = fx.handler.connect().await;
    assert!(matches!(
        state,
        EndpointState::Started(Some(EndpointError::Obs(ObsError::RequestFailed { code: 601, .. })))
    ));
    assert!(fx.remote.created_inputs().is_empty());
}

#[tokio::test]
async fn unsupported_input_kind() {
    let fx = Fixture::ready();
    fx.remote.set_input_kinds(&["image_source"]);

    let state = fx.handler.connect().await;
    assert_eq!(
        state,
        EndpointState::Started(Some(EndpointError::Obs(ObsError::UnknownInput("ffmpeg_source".into()))))
    );
    assert_eq!(fx.remote.requests(), vec!["GetInputKindList"]);
}

#[tokio::test]
async fn stream_failure_stops_endpoint_and_service() {
    let fx = Fixture::new(Some(obs("10.0.0.2")), Some(stream_data(" ")));

    let state = fx.handler.connect().await;

    assert_eq!(state, EndpointState::Stopped(Some(EndpointError::Stream(StreamError::NoHost))));
    assert!(!fx.handler.is_service_held());
    assert_eq!(fx.hooks.started.load(Ordering::SeqCst), 1);
    assert_eq!(fx.hooks.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(fx.hooks.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(fx.hooks.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn service_is_held_until_disconnect() {
    let fx = Fixture::ready();

    assert!(fx.handler.connect().await.is_started());
    assert!(fx.handler.is_service_held());
    assert_eq!(fx.hooks.released.load(Ordering::SeqCst), 0);

    assert!(fx.handler.disconnect().await.is_stopped());
    assert!(!fx.handler.is_service_held());
    assert_eq!(fx.hooks.released.load(Ordering::SeqCst), 1);
    assert_eq!(fx.hooks.stopped.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reconnect_while_streaming_keeps_service() {
    let fx = Fixture::ready();

    assert!(fx.handler.connect().await.is_started());
    assert!(fx.handler.connect().await.is_started());

    assert!(fx.handler.is_service_held());
    assert_eq!(fx.hooks.started.load(Ordering::SeqCst), 1);
    assert_eq!(fx.hooks.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(fx.hooks.stopped.load(Ordering::SeqCst), 0);
    assert_eq!(fx.hooks.released.load(Ordering::SeqCst), 0);

    assert!(fx.handler.disconnect().await.is_stopped());
    assert_eq!(fx.hooks.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(fx.hooks.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancelled_connect_releases_locks() {
    let fx = Fixture::ready();
    fx.remote.delay_connect(Some(Duration::from_secs(10)));

    let connect = fx.handler.connect();
    let timed_out = tokio::time::timeout(Duration::from_millis(50), connect).await;
    assert!(timed_out.is_err());

    assert_eq!(fx.hooks.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(fx.hooks.released.load(Ordering::SeqCst), 1);
    assert!(!fx.handler.is_service_held());
}

#[tokio::test]
async fn unconfigured_endpoint() {
    let fx = Fixture::new(None, Some(stream_data("udp://10.0.0.3:9000")));

    let expected = EndpointState::Stopped(Some(EndpointError::EndpointNotConfigured));
    assert_eq!(fx.handler.connect().await, expected);
    assert_eq!(fx.handler.disconnect().await, expected);
    assert_eq!(fx.handler.state().get(), expected);
    assert_eq!(fx.hooks.started.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn config_change_rebuilds_endpoint() {
    let fx = Fixture::ready();

    let first = fx.handler.retrieve_latest_endpoint().await.unwrap();
    let same = fx.handler.retrieve_latest_endpoint().await.unwrap();
    assert!(Arc::ptr_eq(&first, &same));

    assert!(fx.handler.connect().await.is_started());

    fx.source.set_endpoint(Some(obs("10.0.0.9")));
    let rebuilt = fx.handler.retrieve_latest_endpoint().await.unwrap();

    assert!(!Arc::ptr_eq(&first, &rebuilt));
    assert_eq!(rebuilt.config(), obs("10.0.0.9"));
    assert_eq!(first.state().get(), EndpointState::Stopped(None));
    assert!(!fx.handler.is_service_held());
    assert_eq!(fx.source.endpoint_config(), Some(obs("10.0.0.9")));
}

#[tokio::test]
async fn concurrent_config_changes_settle_on_last_write() {
    let fx = Fixture::ready();
    let original = fx.handler.retrieve_latest_endpoint().await.unwrap();
    assert!(fx.handler.connect().await.is_started());

    let (_, latest) = tokio::join!(
        async {
            fx.source.set_endpoint(Some(obs("10.0.0.7")));
            fx.handler.retrieve_latest_endpoint().await
        },
        async {
            fx.source.set_endpoint(Some(obs("10.0.0.9")));
            fx.handler.retrieve_latest_endpoint().await
        },
    );

    let latest = latest.unwrap();
    assert_eq!(latest.config(), obs("10.0.0.9"));
    let current = fx.handler.endpoint().unwrap();
    assert!(Arc::ptr_eq(&current, &latest));

    assert_eq!(original.state().get(), EndpointState::Stopped(None));
    let closed = fx.engine.log().count(|e| matches!(e, EngineEvent::OutputClosed { .. }));
    assert_eq!(closed, 1);
    assert_eq!(fx.hooks.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(fx.hooks.released.load(Ordering::SeqCst), 1);
    assert!(!fx.handler.is_service_held());

    assert!(fx.handler.connect().await.is_started());
    assert!(fx.handler.is_service_held());
}

#[tokio::test]
async fn observable_state_follows_endpoint() {
    let fx = Fixture::ready();
    let mut states = fx.handler.state().subscribe();
    assert_eq!(
        states.recv().await,
        Some(EndpointState::Stopped(Some(EndpointError::EndpointNotConfigured)))
    );

    assert!(fx.handler.connect().await.is_started());

    let seen = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match states.recv().await {
                Some(state) if state.is_started() => break state,
                Some(_) => continue,
                None => panic!("state stream closed"),
            }
        }
    })
    .await
    .expect("started state not forwarded");
    assert_eq!(seen, EndpointState::Started(None));
}

#[tokio::test]
async fn check_connection_is_handshake_only() {
    let fx = Fixture::ready();

    assert_eq!(fx.handler.check_connection(&obs("10.0.0.2")).await, EndpointResult::Success);
    assert_eq!(fx.remote.connect_count(), 1);
    assert!(fx.remote.requests().is_empty());
    assert!(fx.handler.endpoint().is_none());
}

#[tokio::test]
async fn check_connection_reports_auth_failure() {
    let fx = Fixture::ready();
    fx.remote.require_password("hunter2");

    assert_eq!(
        fx.handler.check_connection(&obs("10.0.0.2")).await,
        EndpointResult::Error(EndpointError::Obs(ObsError::AuthFailed(AuthFailure::PasswordRequired)))
    );

    let with_password = EndpointConfig::Obs(ObsConfig::new("10.0.0.2", 4455, "hunter2"));
    assert_eq!(fx.handler.check_connection(&with_password).await, EndpointResult::Success);
}

#[tokio::test]
async fn check_connection_times_out() {
    let fx = Fixture::ready();
    fx.remote.delay_connect(Some(Duration::from_secs(5)));

    let mut config = ObsConfig::new("10.0.0.2", 4455, "");
    config.connect_timeout_ms = 20;

    assert_eq!(
        fx.handler.check_connection(&EndpointConfig::Obs(config)).await,
        EndpointResult::Error(EndpointError::Obs(ObsError::ConnectionTimeout))
    );
}

#[tokio::test]
async fn unclassified_client_error_is_unknown() {
    let fx = Fixture::ready();
    fx.remote.fail_connect(Some(ObsClientError::Other("tls handshake".into())));

    assert_eq!(
        fx.handler.check_connection(&obs("10.0.0.2")).await,
        EndpointResult::Error(EndpointError::Unknown("tls handshake".into()))
    );
}
