// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fakes for the integration tests
//!
//! - [`FakeHost`] interprets the shell command lines the engine sends to a
//!   service host and keeps a tiny model of its mount table, NFS export
//!   table, Samba registry and the files the engine copies around. Command
//!   lines are split the way a POSIX shell splits them; an unquoted shell
//!   metacharacter other than the `&&` operator is a syntax error.
//! - [`FakeCloud`] is an in-memory volume and compute backend whose
//!   resources advance one status step each time they are read.

#![allow(dead_code)]

use aegis_shares::application::share_orchestrator::StandardShareService;
use aegis_shares::domain::driver_config::ShareDriverSpec;
use aegis_shares::domain::host::{HostCredentials, HostId, InstanceStatus, ServiceHost};
use aegis_shares::domain::storage::{BackendError, ComputeBackend, VolumeBackend};
use aegis_shares::domain::volume::{
    BackendVolume, CreateVolumeRequest, SnapshotStatus, VolumeId, VolumeSnapshot,
    VolumeSnapshotId, VolumeStatus,
};
use aegis_shares::infrastructure::event_bus::EventBus;
use aegis_shares::infrastructure::exports::ExportAdapterRegistry;
use aegis_shares::infrastructure::locks::ResourceLockRegistry;
use aegis_shares::infrastructure::remote::{
    CommandOutput, RemoteCommandError, RemoteExecutionChannel, RemoteSession, SessionConnector,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Fake service host
// ============================================================================

#[derive(Default)]
pub struct HostState {
    /// mount path -> device
    pub mounts: BTreeMap<String, String>,
    /// (path, client) pairs of the kernel export table
    pub exports: Vec<(String, String)>,
    /// share name -> parameters
    pub cifs: BTreeMap<String, BTreeMap<String, String>>,
    /// Plain files; `/etc/mtab` and `/var/lib/nfs/etab` are rendered from
    /// the mount and export tables instead
    pub files: BTreeMap<String, String>,
    /// Command lines with quoting removed, words joined by single spaces
    pub commands: Vec<String>,
    /// Command lines exactly as received
    pub raw_commands: Vec<String>,
    pub nfs_missing: bool,
    /// Any command line containing this text fails
    pub fail_matching: Option<String>,
}

pub struct FakeHost {
    pub state: Mutex<HostState>,
    pub reachable: AtomicBool,
    pub connects: AtomicUsize,
    pub mount_calls: AtomicUsize,
    pub format_calls: AtomicUsize,
}

const MTAB: &str = "/etc/mtab";
const ETAB: &str = "/var/lib/nfs/etab";

impl HostState {
    fn read_file(&self, path: &str) -> Option<String> {
        match path {
            MTAB => Some(
                self.mounts
                    .iter()
                    .map(|(path, device)| format!("{} {} ext4 rw,relatime 0 0\n", device, path))
                    .collect(),
            ),
            ETAB => Some(
                self.exports
                    .iter()
                    .map(|(path, client)| format!("{}\t{}(rw,no_subtree_check)\n", path, client))
                    .collect(),
            ),
            other => self.files.get(other).cloned(),
        }
    }
}

impl Default for FakeHost {
    fn default() -> Self {
        let mut state = HostState::default();
        for file in ["/etc/fstab", "/etc/exports"] {
            state.files.insert(file.to_string(), String::new());
        }
        Self {
            state: Mutex::new(state),
            reachable: AtomicBool::new(true),
            connects: AtomicUsize::new(0),
            mount_calls: AtomicUsize::new(0),
            format_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeHost {
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn fail_commands_matching(&self, text: &str) {
        self.state.lock().fail_matching = Some(text.to_string());
    }

    /// Simulate an out-of-band mount made by an administrator
    pub fn mount_out_of_band(&self, device: &str, path: &str) {
        self.state
            .lock()
            .mounts
            .insert(path.to_string(), device.to_string());
    }

    pub fn is_mounted(&self, path: &str) -> bool {
        self.state.lock().mounts.contains_key(path)
    }

    pub fn exports_of(&self, path: &str) -> Vec<String> {
        self.state
            .lock()
            .exports
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn cifs_param(&self, share: &str, param: &str) -> Option<String> {
        self.state
            .lock()
            .cifs
            .get(share)
            .and_then(|params| params.get(param).cloned())
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().read_file(path)
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    pub fn raw_commands(&self) -> Vec<String> {
        self.state.lock().raw_commands.clone()
    }

    pub fn commands_containing(&self, text: &str) -> usize {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|c| c.contains(text))
            .count()
    }

    fn execute(&self, command: &str) -> CommandOutput {
        let mut state = self.state.lock();
        state.raw_commands.push(command.to_string());

        let segments = match parse_command_line(command) {
            Ok(segments) => segments,
            Err(stderr) => {
                return CommandOutput {
                    stdout: String::new(),
                    stderr,
                    exit_code: Some(2),
                }
            }
        };
        let normalized = segments
            .iter()
            .map(|argv| argv.join(" "))
            .collect::<Vec<_>>()
            .join(" && ");
        state.commands.push(normalized.clone());

        if let Some(text) = &state.fail_matching {
            if normalized.contains(text.as_str()) {
                return CommandOutput {
                    stdout: String::new(),
                    stderr: format!("injected failure: {}", normalized),
                    exit_code: Some(1),
                };
            }
        }

        let mut stdout = String::new();
        for argv in &segments {
            match self.apply(&mut state, argv) {
                Ok(out) => stdout.push_str(&out),
                Err(stderr) => {
                    return CommandOutput {
                        stdout,
                        stderr,
                        exit_code: Some(1),
                    }
                }
            }
        }

        CommandOutput {
            stdout,
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    fn apply(&self, state: &mut HostState, argv: &[String]) -> Result<String, String> {
        let args: Vec<&str> = argv.iter().map(String::as_str).collect();
        match args.as_slice() {
            [":"] => Ok(String::new()),

            // Mount table
            ["sudo", "mount"] => Ok(state
                .mounts
                .iter()
                .map(|(path, device)| format!("{} on {} type ext4 (rw,relatime)\n", device, path))
                .collect()),
            ["sudo", "mount", "-a"] => Ok(String::new()),
            ["sudo", "mount", device, path] => {
                self.mount_calls.fetch_add(1, Ordering::SeqCst);
                if state.mounts.contains_key(*path) {
                    return Err(format!("mount: {} is already mounted", path));
                }
                state.mounts.insert(path.to_string(), device.to_string());
                Ok(String::new())
            }
            ["sudo", "umount", path] => match state.mounts.remove(*path) {
                Some(_) => Ok(String::new()),
                None => Err(format!("umount: {}: not mounted", path)),
            },
            ["sudo", "mkdir", "-p", _] | ["sudo", "chmod", "777", _] | ["sudo", "rmdir", _] => {
                Ok(String::new())
            }
            ["sudo", "cp", source, target] => {
                let contents = state.read_file(source).ok_or_else(|| {
                    format!("cp: cannot stat '{}': No such file or directory", source)
                })?;
                state.files.insert(target.to_string(), contents);
                Ok(String::new())
            }
            ["sudo", mkfs, _device] if mkfs.starts_with("mkfs.") => {
                self.format_calls.fetch_add(1, Ordering::SeqCst);
                Ok(String::new())
            }
            ["sudo", "df", "-PBG", path] => match state.mounts.get(*path) {
                Some(device) => Ok(format!(
                    "Filesystem 1G-blocks Used Available Capacity Mounted on\n{} 5G 1G 4G 20% {}\n",
                    device, path
                )),
                None => Err(format!("df: {}: No such file or directory", path)),
            },

            // NFS
            ["sudo", "exportfs"] => {
                if state.nfs_missing {
                    return Err("sudo: exportfs: command not found".to_string());
                }
                Ok(state
                    .exports
                    .iter()
                    .map(|(path, client)| format!("{}\t{}\n", path, client))
                    .collect())
            }
            ["sudo", "exportfs", "-a"] => Ok(String::new()),
            ["sudo", "exportfs", "-o", _options, target] => {
                let (client, path) = target
                    .split_once(':')
                    .ok_or_else(|| format!("exportfs: bad target {}", target))?;
                state.exports.push((path.to_string(), client.to_string()));
                Ok(String::new())
            }
            ["sudo", "exportfs", "-u", target] => {
                let (client, path) = target
                    .split_once(':')
                    .ok_or_else(|| format!("exportfs: bad target {}", target))?;
                let before = state.exports.len();
                state.exports.retain(|(p, c)| !(p == path && c == client));
                if state.exports.len() == before {
                    return Err(format!("exportfs: Could not find '{}' to unexport.", target));
                }
                Ok(String::new())
            }

            // Samba registry
            ["sudo", "net", "conf", "list"] => Ok(String::new()),
            ["sudo", "net", "conf", "showshare", name] => match state.cifs.contains_key(*name) {
                true => Ok(format!("[{}]\n", name)),
                false => Err("SMBConf: no such service".to_string()),
            },
            ["sudo", "net", "conf", "addshare", name, path, ..] => {
                if state.cifs.contains_key(*name) {
                    return Err(format!("ERROR: share {} already exists", name));
                }
                let mut params = BTreeMap::new();
                params.insert("path".to_string(), path.to_string());
                state.cifs.insert(name.to_string(), params);
                Ok(String::new())
            }
            ["sudo", "net", "conf", "delshare", name] => match state.cifs.remove(*name) {
                Some(_) => Ok(String::new()),
                None => Err("SMBConf: no such service".to_string()),
            },
            ["sudo", "net", "conf", "setparm", name, param, value] => {
                let params = state
                    .cifs
                    .get_mut(*name)
                    .ok_or_else(|| "SMBConf: no such service".to_string())?;
                params.insert(param.to_string(), value.to_string());
                Ok(String::new())
            }
            ["sudo", "net", "conf", "getparm", name, param] => state
                .cifs
                .get(*name)
                .and_then(|params| params.get(*param))
                .map(|value| format!("{}\n", value))
                .ok_or_else(|| "SMBConf: no such parameter".to_string()),
            ["sudo", "smbcontrol", "all", "close-share", name] => {
                state.cifs.remove(*name);
                Ok(String::new())
            }

            _ => Err(format!("{}: command not found", args.join(" "))),
        }
    }
}

/// Split a command line into `&&`-separated argv lists the way a POSIX
/// shell would: single quotes, double quotes and backslashes are honoured and
/// removed.
fn parse_command_line(line: &str) -> Result<Vec<Vec<String>>, String> {
    let mut segments = vec![Vec::new()];
    let mut word = String::new();
    let mut in_word = false;
    let mut quoted = false;
    let mut unquoted_meta = false;
    let mut chars = line.chars();

    let mut finish = |word: &mut String,
                      in_word: &mut bool,
                      quoted: &mut bool,
                      unquoted_meta: &mut bool|
     -> Result<(), String> {
        if *in_word {
            if word.as_str() == "&&" && !*quoted {
                segments.push(Vec::new());
            } else if *unquoted_meta {
                return Err(format!("sh: syntax error near unexpected token `{}'", word));
            } else if let Some(segment) = segments.last_mut() {
                segment.push(std::mem::take(word));
            }
        }
        word.clear();
        *in_word = false;
        *quoted = false;
        *unquoted_meta = false;
        Ok(())
    };

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                quoted = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => word.push(c),
                        None => return Err("sh: unterminated quoted string".to_string()),
                    }
                }
            }
            '"' => {
                in_word = true;
                quoted = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c) => word.push(c),
                            None => return Err("sh: unterminated quoted string".to_string()),
                        },
                        Some(c) => word.push(c),
                        None => return Err("sh: unterminated quoted string".to_string()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                quoted = true;
                if let Some(c) = chars.next() {
                    word.push(c);
                }
            }
            c if c.is_whitespace() => {
                finish(&mut word, &mut in_word, &mut quoted, &mut unquoted_meta)?;
            }
            ';' | '|' | '&' | '$' | '`' | '<' | '>' | '(' | ')' => {
                in_word = true;
                unquoted_meta = true;
                word.push(c);
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    finish(&mut word, &mut in_word, &mut quoted, &mut unquoted_meta)?;

    segments.retain(|segment| !segment.is_empty());
    Ok(segments)
}

struct FakeSession {
    host: Arc<FakeHost>,
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn run(&self, command: &str) -> Result<CommandOutput, RemoteCommandError> {
        // Give concurrent callers a chance to interleave.
        tokio::task::yield_now().await;
        Ok(self.host.execute(command))
    }

    async fn is_alive(&self) -> bool {
        self.host.reachable.load(Ordering::SeqCst)
    }
}

pub struct FakeConnector {
    pub host: Arc<FakeHost>,
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn connect(&self, host: &ServiceHost) -> Result<Arc<dyn RemoteSession>, RemoteCommandError> {
        if !self.host.reachable.load(Ordering::SeqCst) {
            return Err(RemoteCommandError::Connection {
                host: host.address.clone(),
                reason: "connection refused".to_string(),
            });
        }
        self.host.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession {
            host: Arc::clone(&self.host),
        }))
    }

    async fn probe(&self, _host: &ServiceHost) -> bool {
        self.host.reachable.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Fake cloud (volume + compute backends)
// ============================================================================

pub struct CloudState {
    pub volumes: BTreeMap<VolumeId, BackendVolume>,
    pub snapshots: BTreeMap<VolumeSnapshotId, VolumeSnapshot>,
    pub attachments: HashMap<HostId, Vec<VolumeId>>,
    pub created: Vec<CreateVolumeRequest>,
    pub instance_status: Option<InstanceStatus>,
    pub stuck_creating: bool,
    next_id: usize,
}

impl Default for CloudState {
    fn default() -> Self {
        Self {
            volumes: BTreeMap::new(),
            snapshots: BTreeMap::new(),
            attachments: HashMap::new(),
            created: Vec::new(),
            instance_status: Some(InstanceStatus::Active),
            stuck_creating: false,
            next_id: 1,
        }
    }
}

impl CloudState {
    fn next_id(&mut self, prefix: &str) -> String {
        let id = format!("{}-{}", prefix, self.next_id);
        self.next_id += 1;
        id
    }
}

#[derive(Default)]
pub struct FakeCloud {
    pub state: Mutex<CloudState>,
}

impl FakeCloud {
    pub fn set_instance_status(&self, status: Option<InstanceStatus>) {
        self.state.lock().instance_status = status;
    }

    pub fn set_stuck_creating(&self, stuck: bool) {
        self.state.lock().stuck_creating = stuck;
    }

    /// Insert a volume directly, optionally already attached to `host`
    pub fn seed_volume(&self, name: &str, size_gb: u64, attached_to: Option<&HostId>) -> VolumeId {
        let mut state = self.state.lock();
        let id = VolumeId::new(state.next_id("vol"));
        let (status, device_path) = match attached_to {
            Some(host) => {
                let attached = state.attachments.entry(host.clone()).or_default();
                attached.push(id.clone());
                let device = device_for(attached.len());
                (VolumeStatus::InUse, Some(device))
            }
            None => (VolumeStatus::Available, None),
        };
        state.volumes.insert(
            id.clone(),
            BackendVolume {
                id: id.clone(),
                name: name.to_string(),
                size_gb,
                status,
                device_path,
            },
        );
        id
    }

    pub fn force_status(&self, id: &VolumeId, status: VolumeStatus) {
        if let Some(volume) = self.state.lock().volumes.get_mut(id) {
            volume.status = status;
        }
    }

    pub fn volumes_named(&self, name: &str) -> Vec<BackendVolume> {
        self.state
            .lock()
            .volumes
            .values()
            .filter(|v| v.name == name)
            .cloned()
            .collect()
    }

    pub fn volume_count(&self) -> usize {
        self.state.lock().volumes.len()
    }

    pub fn attached_to(&self, host: &HostId) -> Vec<VolumeId> {
        self.state
            .lock()
            .attachments
            .get(host)
            .cloned()
            .unwrap_or_default()
    }
}

fn device_for(slot: usize) -> String {
    // vda is the root disk
    let letter = (b'a' + slot as u8) as char;
    format!("/dev/vd{}", letter)
}

fn not_found(what: &str, id: impl std::fmt::Display) -> BackendError {
    BackendError::NotFound(format!("{} {}", what, id))
}

#[async_trait]
impl VolumeBackend for FakeCloud {
    async fn create_volume(&self, request: CreateVolumeRequest) -> Result<BackendVolume, BackendError> {
        let mut state = self.state.lock();
        if let Some(source) = &request.source_snapshot {
            if !state.snapshots.contains_key(source) {
                return Err(BackendError::Rejected(format!("snapshot {} does not exist", source)));
            }
        }

        let id = VolumeId::new(state.next_id("vol"));
        let volume = BackendVolume {
            id: id.clone(),
            name: request.name.clone(),
            size_gb: request.size_gb,
            status: VolumeStatus::Creating,
            device_path: None,
        };
        state.volumes.insert(id, volume.clone());
        state.created.push(request);
        Ok(volume)
    }

    async fn get_volume(&self, id: &VolumeId) -> Result<BackendVolume, BackendError> {
        let mut state = self.state.lock();
        let stuck = state.stuck_creating;
        let status = state
            .volumes
            .get(id)
            .map(|v| v.status)
            .ok_or_else(|| not_found("volume", id))?;

        if status == VolumeStatus::Deleting {
            state.volumes.remove(id);
            return Err(not_found("volume", id));
        }

        let volume = state
            .volumes
            .get_mut(id)
            .ok_or_else(|| not_found("volume", id))?;
        match status {
            VolumeStatus::Creating if !stuck => volume.status = VolumeStatus::Available,
            VolumeStatus::Attaching => volume.status = VolumeStatus::InUse,
            VolumeStatus::Detaching => {
                volume.status = VolumeStatus::Available;
                volume.device_path = None;
            }
            _ => {}
        }
        Ok(volume.clone())
    }

    async fn delete_volume(&self, id: &VolumeId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let volume = state
            .volumes
            .get_mut(id)
            .ok_or_else(|| not_found("volume", id))?;
        if volume.status == VolumeStatus::InUse {
            return Err(BackendError::Rejected(format!("volume {} is in use", id)));
        }
        volume.status = VolumeStatus::Deleting;
        Ok(())
    }

    async fn rename_volume(&self, id: &VolumeId, name: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let volume = state
            .volumes
            .get_mut(id)
            .ok_or_else(|| not_found("volume", id))?;
        volume.name = name.to_string();
        Ok(())
    }

    async fn list_volumes_by_name(
        &self,
        name: &str,
        _all_tenants: bool,
    ) -> Result<Vec<BackendVolume>, BackendError> {
        Ok(self.volumes_named(name))
    }

    async fn create_snapshot(
        &self,
        volume_id: &VolumeId,
        name: &str,
    ) -> Result<VolumeSnapshot, BackendError> {
        let mut state = self.state.lock();
        if !state.volumes.contains_key(volume_id) {
            return Err(not_found("volume", volume_id));
        }
        let id = VolumeSnapshotId::new(state.next_id("snap"));
        let snapshot = VolumeSnapshot {
            id: id.clone(),
            volume_id: volume_id.clone(),
            name: name.to_string(),
            status: SnapshotStatus::Creating,
            owners: Default::default(),
        };
        state.snapshots.insert(id, snapshot.clone());
        Ok(snapshot)
    }

    async fn get_snapshot(&self, id: &VolumeSnapshotId) -> Result<VolumeSnapshot, BackendError> {
        let mut state = self.state.lock();
        let status = state
            .snapshots
            .get(id)
            .map(|s| s.status)
            .ok_or_else(|| not_found("snapshot", id))?;

        match status {
            SnapshotStatus::Deleting => {
                state.snapshots.remove(id);
                Err(not_found("snapshot", id))
            }
            _ => {
                let snapshot = state
                    .snapshots
                    .get_mut(id)
                    .ok_or_else(|| not_found("snapshot", id))?;
                if snapshot.status == SnapshotStatus::Creating {
                    snapshot.status = SnapshotStatus::Available;
                }
                Ok(snapshot.clone())
            }
        }
    }

    async fn delete_snapshot(&self, id: &VolumeSnapshotId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let snapshot = state
            .snapshots
            .get_mut(id)
            .ok_or_else(|| not_found("snapshot", id))?;
        snapshot.status = SnapshotStatus::Deleting;
        Ok(())
    }

    async fn list_snapshots_by_name(&self, name: &str) -> Result<Vec<VolumeSnapshot>, BackendError> {
        Ok(self
            .state
            .lock()
            .snapshots
            .values()
            .filter(|s| s.name == name)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ComputeBackend for FakeCloud {
    async fn attach_volume(&self, host: &HostId, volume: &VolumeId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if !state.volumes.contains_key(volume) {
            return Err(not_found("volume", volume));
        }
        let attached = state.attachments.entry(host.clone()).or_default();
        attached.push(volume.clone());
        let device = device_for(attached.len());

        if let Some(v) = state.volumes.get_mut(volume) {
            v.status = VolumeStatus::Attaching;
            v.device_path = Some(device);
        }
        Ok(())
    }

    async fn detach_volume(&self, host: &HostId, volume: &VolumeId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if let Some(attached) = state.attachments.get_mut(host) {
            attached.retain(|v| v != volume);
        }
        let v = state
            .volumes
            .get_mut(volume)
            .ok_or_else(|| not_found("volume", volume))?;
        v.status = VolumeStatus::Detaching;
        Ok(())
    }

    async fn list_attached_volumes(&self, host: &HostId) -> Result<Vec<VolumeId>, BackendError> {
        Ok(self.attached_to(host))
    }

    async fn instance_status(&self, host: &HostId) -> Result<InstanceStatus, BackendError> {
        self.state
            .lock()
            .instance_status
            .clone()
            .ok_or_else(|| not_found("instance", host))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub fn test_spec() -> ShareDriverSpec {
    let mut spec = ShareDriverSpec::default();
    spec.timeouts.poll_interval = Duration::from_millis(10);
    spec
}

pub fn test_host() -> ServiceHost {
    ServiceHost::new("instance-1", "192.168.0.10", HostCredentials::new("manila"))
        .with_public_address("10.0.0.4")
}

pub struct Harness {
    pub service: StandardShareService,
    pub cloud: Arc<FakeCloud>,
    pub fake_host: Arc<FakeHost>,
    pub host: ServiceHost,
    pub channel: Arc<RemoteExecutionChannel>,
    pub locks: ResourceLockRegistry,
    pub exports: ExportAdapterRegistry,
    pub event_bus: Arc<EventBus>,
    pub spec: ShareDriverSpec,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_spec(test_spec())
    }

    pub fn with_spec(spec: ShareDriverSpec) -> Self {
        let cloud = Arc::new(FakeCloud::default());
        let fake_host = Arc::new(FakeHost::default());
        let channel = Arc::new(RemoteExecutionChannel::new(Arc::new(FakeConnector {
            host: Arc::clone(&fake_host),
        })));
        let locks = ResourceLockRegistry::in_process();
        let exports = ExportAdapterRegistry::from_spec(&spec, Arc::clone(&channel), locks.clone())
            .expect("default config enables protocols");
        let event_bus = Arc::new(EventBus::with_default_capacity());

        let service = StandardShareService::new(
            spec.clone(),
            cloud.clone(),
            cloud.clone(),
            Arc::clone(&channel),
            locks.clone(),
            exports.clone(),
            Arc::clone(&event_bus),
        );

        Self {
            service,
            cloud,
            fake_host,
            host: test_host(),
            channel,
            locks,
            exports,
            event_bus,
            spec,
        }
    }
}
