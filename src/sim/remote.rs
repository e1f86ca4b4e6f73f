//! Scripted remote-control server

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::endpoint::obs::{
    ClientResult, ObsClientError, ObsConnector, ObsSession, SceneItem, SceneRef, SessionParams,
};
use crate::error::AuthFailure;

/// A media input created through the remote
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedInput {
    pub scene_uuid: String,
    pub name: String,
    pub kind: String,
    pub settings: Value,
}

struct Scene {
    scene: SceneRef,
    items: Vec<SceneItem>,
}

struct RemoteState {
    password: Option<String>,
    connect_error: Option<ObsClientError>,
    connect_delay: Option<Duration>,
    input_kinds: Vec<String>,
    program_scene: Option<String>,
    scenes: Vec<Scene>,
    fail_create_scene: bool,
    connects: usize,
    requests: Vec<String>,
    inputs: Vec<CreatedInput>,
    next_item: i64,
}

/// In-process stand-in for an OBS instance
#[derive(Clone)]
pub struct ScriptedRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl Default for ScriptedRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRemote {
    /// Remote with one program scene and support for network media inputs
    pub fn new() -> Self {
        let remote = Self {
            state: Arc::new(Mutex::new(RemoteState {
                password: None,
                connect_error: None,
                connect_delay: None,
                input_kinds: vec!["ffmpeg_source".into(), "image_source".into()],
                program_scene: None,
                scenes: Vec::new(),
                fail_create_scene: false,
                connects: 0,
                requests: Vec::new(),
                inputs: Vec::new(),
                next_item: 1,
            })),
        };
        let uuid = remote.add_scene("Scene");
        remote.state.lock().program_scene = Some(uuid);
        remote
    }

    pub fn require_password(&self, password: impl Into<String>) {
        self.state.lock().password = Some(password.into());
    }

    /// Fail every connect attempt with `error`
    pub fn fail_connect(&self, error: Option<ObsClientError>) {
        self.state.lock().connect_error = error;
    }

    pub fn delay_connect(&self, delay: Option<Duration>) {
        self.state.lock().connect_delay = delay;
    }

    pub fn set_input_kinds(&self, kinds: &[&str]) {
        self.state.lock().input_kinds = kinds.iter().map(|k| k.to_string()).collect();
    }

    /// Drop the program scene so the client has to create one
    pub fn clear_program_scene(&self) {
        self.state.lock().program_scene = None;
    }

    pub fn fail_create_scene(&self, fail: bool) {
        self.state.lock().fail_create_scene = fail;
    }

    /// Add a scene, returning its uuid
    pub fn add_scene(&self, name: &str) -> String {
        let uuid = Uuid::new_v4().to_string();
        self.state.lock().scenes.push(Scene {
            scene: SceneRef {
                name: name.to_string(),
                uuid: uuid.clone(),
            },
            items: Vec::new(),
        });
        uuid
    }

    pub fn program_scene(&self) -> Option<SceneRef> {
        let state = self.state.lock();
        let uuid = state.program_scene.as_ref()?;
        state.scenes.iter().find(|s| &s.scene.uuid == uuid).map(|s| s.scene.clone())
    }

    pub fn scene_names(&self) -> Vec<String> {
        self.state.lock().scenes.iter().map(|s| s.scene.name.clone()).collect()
    }

    /// Place an input in `scene_uuid` without going through a session
    pub fn add_item(&self, scene_uuid: &str, input_name: &str, enabled: bool) {
        let mut state = self.state.lock();
        let id = state.next_item;
        state.next_item += 1;
        if let Some(scene) = state.scenes.iter_mut().find(|s| s.scene.uuid == scene_uuid) {
            scene.items.push(SceneItem {
                id,
                input_name: input_name.to_string(),
                enabled,
            });
        }
    }

    pub fn items(&self, scene_uuid: &str) -> Vec<SceneItem> {
        let state = self.state.lock();
        state
            .scenes
            .iter()
            .find(|s| s.scene.uuid == scene_uuid)
            .map(|s| s.items.clone())
            .unwrap_or_default()
    }

    /// Number of connect attempts seen, successful or not
    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    /// Names of the requests issued, in order
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().requests.clone()
    }

    pub fn created_inputs(&self) -> Vec<CreatedInput> {
        self.state.lock().inputs.clone()
    }
}

#[async_trait]
impl ObsConnector for ScriptedRemote {
    async fn connect(&self, params: &SessionParams) -> ClientResult<Box<dyn ObsSession>> {
        let delay = {
            let mut state = self.state.lock();
            state.connects += 1;
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        if let Some(err) = &state.connect_error {
            return Err(err.clone());
        }
        if let Some(expected) = &state.password {
            match &params.password {
                None => return Err(ObsClientError::Auth(AuthFailure::PasswordRequired)),
                Some(given) if given != expected => {
                    return Err(ObsClientError::Auth(AuthFailure::InvalidPassword))
                }
                Some(_) => {}
            }
        }

        debug!(host = %params.host, port = params.port, "Scripted remote session opened");
        Ok(Box::new(ScriptedSession {
            state: self.state.clone(),
            closed: false,
        }))
    }
}

struct ScriptedSession {
    state: Arc<Mutex<RemoteState>>,
    closed: bool,
}

impl ScriptedSession {
    fn request(&self, name: &str) -> ClientResult<parking_lot::MutexGuard<'_, RemoteState>> {
        if self.closed {
            return Err(ObsClientError::Other("session closed".into()));
        }
        let mut state = self.state.lock();
        state.requests.push(name.to_string());
        Ok(state)
    }
}

fn not_found(what: &str) -> ObsClientError {
    ObsClientError::Request {
        code: 600,
        comment: format!("No source was found by the name of `{}`", what),
    }
}

#[async_trait]
impl ObsSession for ScriptedSession {
    async fn input_kinds(&mut self) -> ClientResult<Vec<String>> {
        let state = self.request("GetInputKindList")?;
        Ok(state.input_kinds.clone())
    }

    async fn current_program_scene(&mut self) -> ClientResult<SceneRef> {
        let state = self.request("GetCurrentProgramScene")?;
        let uuid = state.program_scene.as_ref().ok_or_else(|| not_found("program scene"))?;
        state
            .scenes
            .iter()
            .find(|s| &s.scene.uuid == uuid)
            .map(|s| s.scene.clone())
            .ok_or_else(|| not_found(uuid))
    }

    async fn create_scene(&mut self, name: &str) -> ClientResult<String> {
        let mut state = self.request("CreateScene")?;
        if state.fail_create_scene {
            return Err(ObsClientError::Request {
                code: 601,
                comment: format!("A source already exists by that scene name `{}`", name),
            });
        }
        let uuid = Uuid::new_v4().to_string();
        state.scenes.push(Scene {
            scene: SceneRef {
                name: name.to_string(),
                uuid: uuid.clone(),
            },
            items: Vec::new(),
        });
        state.program_scene = Some(uuid.clone());
        Ok(uuid)
    }

    async fn scene_items(&mut self, scene_uuid: &str) -> ClientResult<Vec<SceneItem>> {
        let state = self.request("GetSceneItemList")?;
        state
            .scenes
            .iter()
            .find(|s| s.scene.uuid == scene_uuid)
            .map(|s| s.items.clone())
            .ok_or_else(|| not_found(scene_uuid))
    }

    async fn set_scene_item_enabled(&mut self, scene_uuid: &str, item_id: i64, enabled: bool) -> ClientResult<()> {
        let mut state = self.request("SetSceneItemEnabled")?;
        let item = state
            .scenes
            .iter_mut()
            .find(|s| s.scene.uuid == scene_uuid)
            .and_then(|s| s.items.iter_mut().find(|i| i.id == item_id))
            .ok_or_else(|| not_found(scene_uuid))?;
        item.enabled = enabled;
        Ok(())
    }

    async fn create_input(&mut self, scene_uuid: &str, name: &str, kind: &str, settings: Value) -> ClientResult<()> {
        let mut state = self.request("CreateInput")?;
        let id = state.next_item;
        let scene = state
            .scenes
            .iter_mut()
            .find(|s| s.scene.uuid == scene_uuid)
            .ok_or_else(|| not_found(scene_uuid))?;
        scene.items.push(SceneItem {
            id,
            input_name: name.to_string(),
            enabled: true,
        });
        state.next_item += 1;
        state.inputs.push(CreatedInput {
            scene_uuid: scene_uuid.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            settings,
        });
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
