// src/test_utils/fake_engine.rs
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::errors::EngineError;
use crate::executors::images::DEFINITION_DIGEST_LABEL;
use crate::executors::{
    CapturedOutput, ContainerEngine, ContainerSpec, EngineStats, ImageDefinition, ManagedContainer,
};

/// How the next (and every following) container behaves.
#[derive(Debug, Clone)]
pub enum Scripted {
    Exit {
        code: i64,
        stdout: String,
        stderr: String,
        oom_killed: bool,
    },
    /// Never exits on its own.
    Hang,
    FailCreate,
    /// The daemon created the container but the create call still failed.
    FailCreateAfterRegister,
    FailStart,
    FailWait,
}

impl Default for Scripted {
    fn default() -> Self {
        Scripted::Exit {
            code: 0,
            stdout: String::new(),
            stderr: String::new(),
            oom_killed: false,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    /// tag -> definition digest label, if any.
    images: HashMap<String, Option<String>>,
    /// id -> (name, image) of containers that exist right now.
    live: HashMap<String, (String, String)>,
    specs: Vec<ContainerSpec>,
    killed: Vec<String>,
    created: usize,
    next_id: usize,
}

/// In-memory [`ContainerEngine`] with scripted container behavior.
pub struct FakeEngine {
    state: Mutex<State>,
    script: Mutex<Scripted>,
    builds: AtomicUsize,
    build_delay: Duration,
    create_delay: Duration,
    fail_builds: bool,
    available: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            script: Mutex::new(Scripted::default()),
            builds: AtomicUsize::new(0),
            build_delay: Duration::ZERO,
            create_delay: Duration::ZERO,
            fail_builds: false,
            available: true,
        }
    }

    /// An image that exists without a definition digest label.
    pub fn with_image(self, image: &str) -> Self {
        self.state.lock().unwrap().images.insert(image.to_string(), None);
        self
    }

    /// An image previously built from `definition`.
    pub fn with_built_image(self, image: &str, definition: &ImageDefinition) -> Self {
        self.state
            .lock()
            .unwrap()
            .images
            .insert(image.to_string(), Some(definition.digest()));
        self
    }

    /// Delay before the daemon registers a created container.
    pub fn with_create_delay_ms(mut self, millis: u64) -> Self {
        self.create_delay = Duration::from_millis(millis);
        self
    }

    pub fn with_build_delay_ms(mut self, millis: u64) -> Self {
        self.build_delay = Duration::from_millis(millis);
        self
    }

    pub fn failing_builds(mut self) -> Self {
        self.fail_builds = true;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn scripted(self, script: Scripted) -> Self {
        *self.script.lock().unwrap() = script;
        self
    }

    pub fn exits_with(self, code: i64, stdout: &str, stderr: &str) -> Self {
        self.scripted(Scripted::Exit {
            code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            oom_killed: false,
        })
    }

    pub fn drop_image(&self, image: &str) {
        self.state.lock().unwrap().images.remove(image);
    }

    /// Pretend a container was left behind by an earlier process.
    pub fn add_stale_container(&self, name: &str, image: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("stale{:04}", state.next_id);
        state.live.insert(id.clone(), (name.to_string(), image.to_string()));
        id
    }

    pub fn image_digest(&self, image: &str) -> Option<String> {
        self.state.lock().unwrap().images.get(image).cloned().flatten()
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.state.lock().unwrap().created
    }

    pub fn live_containers(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }

    pub fn killed(&self) -> Vec<String> {
        self.state.lock().unwrap().killed.clone()
    }

    pub fn specs(&self) -> Vec<ContainerSpec> {
        self.state.lock().unwrap().specs.clone()
    }

    fn script(&self) -> Scripted {
        self.script.lock().unwrap().clone()
    }

    fn require_live(&self, id: &str) -> Result<(), EngineError> {
        if self.state.lock().unwrap().live.contains_key(id) {
            Ok(())
        } else {
            Err(EngineError::Other(format!("no such container: {}", id)))
        }
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        if self.available {
            Ok(())
        } else {
            Err(EngineError::Unavailable("fake daemon is down".to_string()))
        }
    }

    async fn image_exists(&self, image: &str) -> Result<bool, EngineError> {
        Ok(self.state.lock().unwrap().images.contains_key(image))
    }

    async fn image_label(&self, image: &str, label: &str) -> Result<Option<String>, EngineError> {
        if label != DEFINITION_DIGEST_LABEL {
            return Ok(None);
        }
        Ok(self.image_digest(image))
    }

    async fn build_image(&self, image: &str, definition: &ImageDefinition) -> Result<(), EngineError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        definition.build_context()?;
        if !self.build_delay.is_zero() {
            tokio::time::sleep(self.build_delay).await;
        }
        if self.fail_builds {
            return Err(EngineError::BuildFailed("step 2/5 exited with 1".to_string()));
        }
        self.state
            .lock()
            .unwrap()
            .images
            .insert(image.to_string(), Some(definition.digest()));
        Ok(())
    }

    async fn remove_image(&self, image: &str) -> Result<(), EngineError> {
        self.state.lock().unwrap().images.remove(image);
        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<String>, EngineError> {
        let mut images: Vec<String> = self.state.lock().unwrap().images.keys().cloned().collect();
        images.sort();
        Ok(images)
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        let script = self.script();
        let mut state = self.state.lock().unwrap();
        state.specs.push(spec.clone());

        match script {
            Scripted::FailCreate => {
                return Err(EngineError::Other("create refused".to_string()));
            }
            Scripted::FailCreateAfterRegister => {
                state.next_id += 1;
                let id = format!("c{:04}", state.next_id);
                state.live.insert(id, (spec.name.clone(), spec.image.clone()));
                state.created += 1;
                return Err(EngineError::Other("create timed out".to_string()));
            }
            _ => {}
        }

        state.next_id += 1;
        let id = format!("c{:04}", state.next_id);
        state
            .live
            .insert(id.clone(), (spec.name.clone(), spec.image.clone()));
        state.created += 1;
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.require_live(id)?;
        match self.script() {
            Scripted::FailStart => Err(EngineError::Other("OCI runtime create failed".to_string())),
            _ => Ok(()),
        }
    }

    async fn wait_container(&self, id: &str) -> Result<i64, EngineError> {
        self.require_live(id)?;
        match self.script() {
            Scripted::Exit { code, .. } => Ok(code),
            Scripted::Hang => {
                std::future::pending::<()>().await;
                Ok(0)
            }
            Scripted::FailWait => Err(EngineError::WaitStreamEnded(id.to_string())),
            _ => Err(EngineError::Other("container never started".to_string())),
        }
    }

    async fn collect_output(&self, id: &str, max_bytes: usize) -> Result<CapturedOutput, EngineError> {
        self.require_live(id)?;
        match self.script() {
            Scripted::Exit { stdout, stderr, .. } => {
                let mut out = crate::executors::output::CappedBuffer::new(max_bytes);
                out.push(stdout.as_bytes());
                let mut err = crate::executors::output::CappedBuffer::new(max_bytes);
                err.push(stderr.as_bytes());
                Ok(CapturedOutput {
                    stdout: out.into_string(),
                    stderr: err.into_string(),
                })
            }
            _ => Ok(CapturedOutput::default()),
        }
    }

    async fn oom_killed(&self, id: &str) -> Result<bool, EngineError> {
        self.require_live(id)?;
        Ok(matches!(self.script(), Scripted::Exit { oom_killed: true, .. }))
    }

    async fn kill_container(&self, id: &str) -> Result<(), EngineError> {
        self.state.lock().unwrap().killed.push(id.to_string());
        Ok(())
    }

    async fn remove_container(&self, id_or_name: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state
            .live
            .retain(|id, (name, _)| id != id_or_name && name != id_or_name);
        Ok(())
    }

    async fn list_managed_containers(&self) -> Result<Vec<ManagedContainer>, EngineError> {
        let state = self.state.lock().unwrap();
        let mut containers: Vec<ManagedContainer> = state
            .live
            .iter()
            .map(|(id, (_, image))| ManagedContainer {
                id: id.clone(),
                image: image.clone(),
                state: Some("exited".to_string()),
            })
            .collect();
        containers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(containers)
    }

    async fn stats(&self) -> Result<EngineStats, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(EngineStats {
            containers_running: 0,
            containers_stopped: state.live.len() as i64,
            images: state.images.len() as i64,
            memory_total: 8 * 1024 * 1024 * 1024,
            cpus: 4,
        })
    }
}
