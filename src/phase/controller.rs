use super::{ComponentState, Lifecycle};
use crate::error::{ContainerError, Result};
use crate::lifecycle::ContainerSettings;
use crate::registry::Registry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

struct Member {
    name: String,
    lifecycle: Arc<dyn Lifecycle>,
}

/// Starts and stops [`Lifecycle`] components group by group.
///
/// Within a phase group, components are layered by their dependencies: a
/// start wave only holds components whose dependencies already run, a stop
/// wave only holds components none of whose dependents still run. Members of
/// a start wave run concurrently when parallel start is enabled; every stop
/// wave requests all stops first and then awaits the handles.
pub struct PhaseController {
    members: Vec<Member>,
    index: HashMap<String, usize>,
    /// component -> the components it depends on
    dependencies: HashMap<String, Vec<String>>,
    states: Mutex<HashMap<String, ComponentState>>,
    parallel_start: bool,
    stop_timeout: Option<Duration>,
}

impl PhaseController {
    pub fn new(settings: &ContainerSettings) -> Self {
        Self {
            members: Vec::new(),
            index: HashMap::new(),
            dependencies: HashMap::new(),
            states: Mutex::new(HashMap::new()),
            parallel_start: settings.parallel_start,
            stop_timeout: settings.stop_timeout,
        }
    }

    /// Collects every built singleton exposing [`Lifecycle`], with the direct
    /// dependency edges recorded between them.
    pub fn from_registry(registry: &Registry, settings: &ContainerSettings) -> Self {
        let mut controller = Self::new(settings);
        for (name, instance) in registry.singletons() {
            if let Some(lifecycle) = instance.lifecycle() {
                controller = controller.with_component(name, lifecycle.clone());
            }
        }
        let names: Vec<String> = controller.members.iter().map(|m| m.name.clone()).collect();
        for name in names {
            for dependency in registry.dependencies_of(&name) {
                if controller.index.contains_key(&dependency) {
                    controller = controller.with_dependency(&name, dependency);
                }
            }
        }
        debug!(components = controller.members.len(), "Phase controller prepared");
        controller
    }

    pub fn with_component(mut self, name: impl Into<String>, lifecycle: Arc<dyn Lifecycle>) -> Self {
        let name = name.into();
        self.index.insert(name.clone(), self.members.len());
        self.states
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), ComponentState::Stopped);
        self.members.push(Member { name, lifecycle });
        self
    }

    pub fn with_dependency(mut self, dependent: &str, dependency: impl Into<String>) -> Self {
        let dependency = dependency.into();
        let entry = self.dependencies.entry(dependent.to_string()).or_default();
        if !entry.contains(&dependency) {
            entry.push(dependency);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn state(&self, name: &str) -> Option<ComponentState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }

    /// True when any managed component runs.
    pub fn is_running(&self) -> bool {
        self.members.iter().any(|m| m.lifecycle.is_running())
    }

    /// Starts auto-start components.
    pub async fn on_boot(&self) -> Result<()> {
        self.start_components(true).await
    }

    /// Starts every component, including those without auto-start.
    pub async fn start_all(&self) -> Result<()> {
        self.start_components(false).await
    }

    /// Stops every running component. Failures and timeouts are logged.
    pub async fn on_shutdown(&self) {
        self.stop_components().await
    }

    pub async fn stop_all(&self) {
        self.stop_components().await
    }

    // -------------------------------------------------------------------------
    // Start
    // -------------------------------------------------------------------------

    async fn start_components(&self, auto_only: bool) -> Result<()> {
        let mut phases: BTreeMap<i32, Vec<String>> = BTreeMap::new();
        for member in &self.members {
            if !auto_only || member.lifecycle.is_auto_startup() {
                phases
                    .entry(member.lifecycle.phase())
                    .or_default()
                    .push(member.name.clone());
            }
        }

        for (phase, names) in phases {
            let group = self.with_pending_dependencies(&names);
            if group.is_empty() {
                continue;
            }
            info!(phase, count = group.len(), "Starting lifecycle phase");
            for wave in layers(&group, |name| self.dependencies_of(name)) {
                self.start_wave(wave).await?;
            }
        }
        Ok(())
    }

    /// `names` plus their transitive dependencies, minus whatever already runs.
    /// Dependencies come first.
    fn with_pending_dependencies(&self, names: &[String]) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut group = Vec::new();
        for name in names {
            self.visit(name, &mut visited, &mut group, &|n| self.dependencies_of(n));
        }
        group.retain(|name| !self.lifecycle(name).is_running());
        group
    }

    async fn start_wave(&self, wave: Vec<String>) -> Result<()> {
        if !self.parallel_start || wave.len() == 1 {
            for name in wave {
                self.set_state(&name, ComponentState::Starting);
                let lifecycle = self.lifecycle(&name);
                match lifecycle.start().await {
                    Ok(()) => self.started(&name),
                    Err(source) => {
                        self.set_state(&name, ComponentState::Stopped);
                        warn!(component = %name, error = %source, "Start failed");
                        return Err(ContainerError::StartFailed { name, source });
                    }
                }
            }
            return Ok(());
        }

        let mut pending: HashSet<String> = wave.iter().cloned().collect();
        let mut tasks = JoinSet::new();
        for name in wave {
            self.set_state(&name, ComponentState::Starting);
            let lifecycle = self.lifecycle(&name);
            tasks.spawn(async move {
                let outcome = lifecycle.start().await;
                (name, outcome)
            });
        }

        let mut first: Option<ContainerError> = None;
        let mut aborted = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    pending.remove(&name);
                    self.started(&name);
                }
                Ok((name, Err(source))) => {
                    pending.remove(&name);
                    self.set_state(&name, ComponentState::Stopped);
                    warn!(component = %name, error = %source, "Start failed");
                    if first.is_none() {
                        first = Some(ContainerError::StartFailed { name, source });
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Start task aborted");
                    aborted.get_or_insert(e);
                }
            }
        }

        // Anything still pending belongs to a task that panicked.
        for name in &pending {
            self.set_state(name, ComponentState::Stopped);
        }
        if first.is_none() {
            if let Some(e) = aborted {
                first = Some(ContainerError::StartFailed {
                    name: pending.into_iter().next().unwrap_or_default(),
                    source: Box::new(e),
                });
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn started(&self, name: &str) {
        self.set_state(name, ComponentState::Running);
        debug!(component = %name, "Started");
    }

    // -------------------------------------------------------------------------
    // Stop
    // -------------------------------------------------------------------------

    async fn stop_components(&self) {
        let mut phases: BTreeMap<i32, Vec<String>> = BTreeMap::new();
        for member in &self.members {
            phases
                .entry(member.lifecycle.phase())
                .or_default()
                .push(member.name.clone());
        }

        for (phase, names) in phases.into_iter().rev() {
            let group = self.with_running_dependents(&names);
            if group.is_empty() {
                continue;
            }
            info!(phase, count = group.len(), "Stopping lifecycle phase");
            for wave in layers(&group, |name| self.dependents_of(name)) {
                self.stop_wave(wave).await;
            }
        }
    }

    /// Running members of `names` plus their running transitive dependents.
    /// Dependents come first.
    fn with_running_dependents(&self, names: &[String]) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut group = Vec::new();
        for name in names {
            self.visit(name, &mut visited, &mut group, &|n| self.dependents_of(n));
        }
        group.retain(|name| self.lifecycle(name).is_running());
        group
    }

    async fn stop_wave(&self, wave: Vec<String>) {
        let mut handles = Vec::with_capacity(wave.len());
        for name in wave {
            self.set_state(&name, ComponentState::Stopping);
            match self.lifecycle(&name).request_stop().await {
                Ok(handle) => handles.push((name, handle)),
                Err(e) => {
                    warn!(component = %name, error = %e, "Stop failed");
                    self.set_state(&name, ComponentState::Stopped);
                }
            }
        }

        for (name, handle) in handles {
            let stopped = match self.stop_timeout {
                Some(limit) => match tokio::time::timeout(limit, handle.stopped()).await {
                    Ok(stopped) => stopped,
                    Err(_) => {
                        warn!(component = %name, timeout_ms = limit.as_millis() as u64, "Stop timed out, continuing");
                        self.set_state(&name, ComponentState::Stopped);
                        continue;
                    }
                },
                None => handle.stopped().await,
            };
            if !stopped {
                warn!(component = %name, "Stop signal dropped without completion");
            }
            self.set_state(&name, ComponentState::Stopped);
            debug!(component = %name, "Stopped");
        }
    }

    // -------------------------------------------------------------------------
    // Graph helpers
    // -------------------------------------------------------------------------

    fn lifecycle(&self, name: &str) -> Arc<dyn Lifecycle> {
        // Groups only ever hold member names.
        self.members[self.index[name]].lifecycle.clone()
    }

    fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.dependencies
            .get(name)
            .map(|deps| {
                deps.iter()
                    .filter(|d| self.index.contains_key(*d))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn dependents_of(&self, name: &str) -> Vec<String> {
        self.members
            .iter()
            .filter(|m| {
                self.dependencies
                    .get(&m.name)
                    .is_some_and(|deps| deps.iter().any(|d| d == name))
            })
            .map(|m| m.name.clone())
            .collect()
    }

    /// Post-order walk along `edges`.
    fn visit(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        out: &mut Vec<String>,
        edges: &dyn Fn(&str) -> Vec<String>,
    ) {
        if !visited.insert(name.to_string()) {
            return;
        }
        for next in edges(name) {
            self.visit(&next, visited, out, edges);
        }
        out.push(name.to_string());
    }

    fn set_state(&self, name: &str, state: ComponentState) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), state);
    }
}

/// Splits `group` into waves: a member joins a wave once every `blockers`
/// entry inside the group sits in an earlier wave. A cycle puts the remaining
/// members into one final wave.
fn layers(group: &[String], blockers: impl Fn(&str) -> Vec<String>) -> Vec<Vec<String>> {
    let members: HashSet<&str> = group.iter().map(String::as_str).collect();
    let mut placed: HashSet<String> = HashSet::new();
    let mut remaining = group.to_vec();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<String>, Vec<String>) = remaining.into_iter().partition(|name| {
            blockers(name)
                .iter()
                .all(|b| !members.contains(b.as_str()) || placed.contains(b))
        });
        if ready.is_empty() {
            warn!(components = ?blocked, "Dependency cycle between lifecycle components");
            waves.push(blocked);
            break;
        }
        placed.extend(ready.iter().cloned());
        waves.push(ready);
        remaining = blocked;
    }
    waves
}
