//! Shared fakes for control-plane tests
//!
//! Hand-rolled trait fakes with scripted responses, in the style of the
//! in-crate mocks used across the workspace tests.
#![allow(dead_code)] // not every test binary uses every helper

use async_trait::async_trait;
use deskrelay_control::SessionManager;
use deskrelay_ports::{BandRange, PortAllocator};
use deskrelay_proto::{LaunchOutput, LaunchPorts, SessionReport, StopDisposition};
use deskrelay_registry::SessionRegistry;
use deskrelay_runtime::{ContainerRuntime, RuntimeError, RuntimeResult, SessionLauncher};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct FakeRuntime {
    /// Scripted list_sessions responses; the last entry repeats
    lists: Mutex<VecDeque<Vec<SessionReport>>>,
    fail_list: AtomicBool,
    /// Captured output per id; entries are consumed in order, the last repeats
    outputs: Mutex<HashMap<String, VecDeque<String>>>,
    pub stop_calls: Mutex<Vec<String>>,
    fail_stop: AtomicBool,
    stop_absent: AtomicBool,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_list(&self, reports: Vec<SessionReport>) {
        self.lists.lock().unwrap().push_back(reports);
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_output(&self, id: &str, outputs: &[&str]) {
        self.outputs.lock().unwrap().insert(
            id.to_string(),
            outputs.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn set_stop_absent(&self, absent: bool) {
        self.stop_absent.store(absent, Ordering::SeqCst);
    }

    fn command_failed(command: &str, stderr: &str) -> RuntimeError {
        RuntimeError::CommandFailed {
            command: command.to_string(),
            status: "exit status: 1".to_string(),
            stderr: stderr.to_string(),
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_sessions(&self) -> RuntimeResult<Vec<SessionReport>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Self::command_failed("docker ps", "daemon unreachable"));
        }
        let mut lists = self.lists.lock().unwrap();
        if lists.len() > 1 {
            Ok(lists.pop_front().unwrap())
        } else {
            Ok(lists.front().cloned().unwrap_or_default())
        }
    }

    async fn capture_output(&self, id: &str) -> RuntimeResult<String> {
        let mut outputs = self.outputs.lock().unwrap();
        match outputs.get_mut(id) {
            Some(queue) if !queue.is_empty() => {
                if queue.len() > 1 {
                    Ok(queue.pop_front().unwrap())
                } else {
                    Ok(queue.front().cloned().unwrap())
                }
            }
            _ => Err(Self::command_failed(
                &format!("docker logs {}", id),
                "no such container",
            )),
        }
    }

    async fn stop(&self, id: &str) -> RuntimeResult<StopDisposition> {
        self.stop_calls.lock().unwrap().push(id.to_string());
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(Self::command_failed("docker stop", "daemon unreachable"));
        }
        if self.stop_absent.load(Ordering::SeqCst) {
            Ok(StopDisposition::AlreadyAbsent)
        } else {
            Ok(StopDisposition::Stopped)
        }
    }
}

#[derive(Default)]
pub struct FakeLauncher {
    outputs: Mutex<VecDeque<LaunchOutput>>,
    pub launches: Mutex<Vec<LaunchPorts>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_output(&self, output: LaunchOutput) {
        self.outputs.lock().unwrap().push_back(output);
    }
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn launch(&self, ports: LaunchPorts) -> RuntimeResult<LaunchOutput> {
        self.launches.lock().unwrap().push(ports);
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| FakeRuntime::command_failed("launch", "no scripted launch output"))
    }
}

/// Successful launcher output announcing the given session id
pub fn launch_ok(id: &str) -> LaunchOutput {
    LaunchOutput {
        stdout: format!(r#"{{"containerId": "{}"}}"#, id),
        stderr: String::new(),
        success: true,
    }
}

/// The VNC server banner announcing readiness on a port
pub fn ready_banner(port: u16) -> String {
    format!("Listening for VNC connections on TCP port {}\n", port)
}

/// A running session report whose output already carries the ready banner
pub fn running_report(id: &str, port: u16) -> SessionReport {
    SessionReport {
        id: id.to_string(),
        is_running: true,
        captured_output: ready_banner(port),
    }
}

pub struct Harness {
    pub registry: SessionRegistry,
    pub allocator: Arc<PortAllocator>,
    pub runtime: Arc<FakeRuntime>,
    pub launcher: Arc<FakeLauncher>,
    pub manager: SessionManager,
}

/// Manager over small bands with fast polling, suitable for tests
pub fn harness() -> Harness {
    harness_with_bands(
        BandRange::new(9222, 9224),
        BandRange::new(5900, 5902),
        BandRange::new(99, 101),
    )
}

pub fn harness_with_bands(debug: BandRange, vnc: BandRange, display: BandRange) -> Harness {
    let registry = SessionRegistry::new();
    let allocator = Arc::new(PortAllocator::new(debug, vnc, display));
    let runtime = Arc::new(FakeRuntime::new());
    let launcher = Arc::new(FakeLauncher::new());
    let manager = SessionManager::new(
        registry.clone(),
        allocator.clone(),
        runtime.clone(),
        launcher.clone(),
    )
    .with_ready_timeout(Duration::from_millis(200))
    .with_poll_interval(Duration::from_millis(10));

    Harness {
        registry,
        allocator,
        runtime,
        launcher,
        manager,
    }
}
