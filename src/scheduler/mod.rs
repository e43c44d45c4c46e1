//! The scheduling loop.
//!
//! One long-lived task owns both timed triggers (discovery and download
//! sweep) and all lifecycle commands. Everything reaches it through a
//! control channel, so the loop never reads mutable state written by
//! another thread. A tick that fires while the previous run of the same
//! kind is still in flight is coalesced (skipped and counted, never
//! queued), which bounds the system to one discovery run and one sweep at
//! a time.

pub mod cadence;

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::discovery::DiscoveryCoordinator;
use crate::download::QueueManager;
use crate::model::EngineStatus;
use crate::settings::{ScheduleConfig, SettingsProvider};
use crate::storage::Repository;

/// Commands accepted by the scheduling loop.
#[derive(Debug)]
pub enum ControlMsg {
    /// Exit after the current tick; in-flight runs are awaited.
    Stop,
    /// Swap the configuration snapshot without dropping in-flight work.
    Reload(ScheduleConfig),
    /// Forced discovery run, optionally narrowed to one artist.
    TriggerDiscovery(Option<i64>),
    /// Forced download sweep.
    TriggerDownload,
}

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    tx: mpsc::Sender<ControlMsg>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn reload(&self, config: ScheduleConfig) {
        self.send(ControlMsg::Reload(config)).await;
    }

    pub async fn trigger_discovery(&self, artist_id: Option<i64>) {
        self.send(ControlMsg::TriggerDiscovery(artist_id)).await;
    }

    pub async fn trigger_download(&self) {
        self.send(ControlMsg::TriggerDownload).await;
    }

    /// Stop the loop and wait for it (and its in-flight runs) to finish.
    pub async fn stop(self) {
        self.send(ControlMsg::Stop).await;
        if let Err(e) = self.join.await {
            log::error!("Scheduler loop panicked on shutdown: {}", e);
        }
    }

    /// True when the loop exited without being stopped (a panic). The
    /// engine reports this as the degraded state.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    async fn send(&self, msg: ControlMsg) {
        if self.tx.send(msg).await.is_err() {
            log::warn!("Scheduler control channel closed, command dropped");
        }
    }
}

/// Everything the loop needs, cloned into spawned run tasks as required.
#[derive(Clone)]
struct LoopCtx {
    coordinator: Arc<DiscoveryCoordinator>,
    queue: Arc<QueueManager>,
    settings: Arc<dyn SettingsProvider>,
    repo: Arc<dyn Repository>,
    status: Arc<Mutex<EngineStatus>>,
}

impl LoopCtx {
    fn with_status(&self, f: impl FnOnce(&mut EngineStatus)) {
        if let Ok(mut status) = self.status.lock() {
            f(&mut status);
        }
    }
}

/// Start the scheduling loop (STOPPED → RUNNING).
pub fn start(
    coordinator: Arc<DiscoveryCoordinator>,
    queue: Arc<QueueManager>,
    settings: Arc<dyn SettingsProvider>,
    repo: Arc<dyn Repository>,
    status: Arc<Mutex<EngineStatus>>,
) -> SchedulerHandle {
    let (tx, rx) = mpsc::channel(16);
    let ctx = LoopCtx {
        coordinator,
        queue,
        settings,
        repo,
        status,
    };
    let join = tokio::spawn(run_loop(ctx, rx));
    SchedulerHandle { tx, join }
}

async fn run_loop(ctx: LoopCtx, mut rx: mpsc::Receiver<ControlMsg>) {
    ctx.with_status(|s| s.running = true);
    log::info!("Scheduler started");

    let mut snapshot = read_snapshot(&ctx);
    let mut discovery_run: Option<JoinHandle<()>> = None;
    let mut download_run: Option<JoinHandle<()>> = None;

    loop {
        let now = Utc::now();
        let next_discovery = next_fire_for(snapshot.as_ref().map(|c| &c.discovery), now);
        let next_download = next_fire_for(snapshot.as_ref().map(|c| &c.download), now);

        tokio::select! {
            msg = rx.recv() => match msg {
                None | Some(ControlMsg::Stop) => break,
                Some(ControlMsg::Reload(config)) => {
                    log::info!("Scheduler configuration reloaded");
                    ctx.with_status(|s| s.degraded = false);
                    snapshot = Some(config);
                }
                Some(ControlMsg::TriggerDiscovery(artist_id)) => {
                    // Manual triggers reuse the current snapshot; when the
                    // scheduler is degraded they retry the provider, which
                    // is one of the ways back out.
                    if snapshot.is_none() {
                        snapshot = read_snapshot(&ctx);
                    }
                    if let Some(config) = snapshot.clone() {
                        spawn_discovery(&ctx, &mut discovery_run, config, artist_id);
                    }
                }
                Some(ControlMsg::TriggerDownload) => {
                    if snapshot.is_none() {
                        snapshot = read_snapshot(&ctx);
                    }
                    if let Some(config) = snapshot.clone() {
                        spawn_download(&ctx, &mut download_run, config);
                    }
                }
            },
            _ = sleep_until(next_discovery), if next_discovery.is_some() => {
                snapshot = read_snapshot(&ctx);
                if let Some(config) = snapshot.clone() {
                    if config.discovery.enabled {
                        spawn_discovery(&ctx, &mut discovery_run, config, None);
                    }
                }
            }
            _ = sleep_until(next_download), if next_download.is_some() => {
                snapshot = read_snapshot(&ctx);
                if let Some(config) = snapshot.clone() {
                    if config.download.enabled {
                        spawn_download(&ctx, &mut download_run, config);
                    }
                }
            }
        }
    }

    // Current ticks complete; nothing is interrupted mid-artist or
    // mid-download.
    if let Some(handle) = discovery_run {
        let _ = handle.await;
    }
    if let Some(handle) = download_run {
        let _ = handle.await;
    }

    ctx.with_status(|s| s.running = false);
    log::info!("Scheduler stopped");
}

fn read_snapshot(ctx: &LoopCtx) -> Option<ScheduleConfig> {
    match ctx.settings.schedule_config() {
        Ok(config) => {
            ctx.with_status(|s| s.degraded = false);
            Some(config)
        }
        Err(e) => {
            log::error!("Scheduler degraded, cannot read schedule config: {}", e);
            ctx.with_status(|s| s.degraded = true);
            None
        }
    }
}

fn next_fire_for(trigger: Option<&crate::settings::TriggerConfig>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let trigger = trigger?;
    if !trigger.enabled {
        return None;
    }
    cadence::next_fire(&trigger.cadence, now)
}

async fn sleep_until(at: Option<DateTime<Utc>>) {
    // Disabled branches still construct their future; give them a sleep
    // that never meaningfully completes.
    let wait = match at {
        Some(at) => (at - Utc::now()).to_std().unwrap_or(Duration::ZERO),
        None => Duration::from_secs(86_400 * 365),
    };
    tokio::time::sleep(wait).await;
}

fn spawn_discovery(
    ctx: &LoopCtx,
    slot: &mut Option<JoinHandle<()>>,
    config: ScheduleConfig,
    artist_id: Option<i64>,
) {
    if slot.as_ref().is_some_and(|h| !h.is_finished()) {
        log::info!("Discovery tick coalesced, previous run still in flight");
        ctx.with_status(|s| s.ticks_coalesced += 1);
        return;
    }

    let run_ctx = ctx.clone();
    *slot = Some(tokio::spawn(async move {
        let summary = run_ctx.coordinator.run(&config, artist_id).await;
        let depth = run_ctx.repo.queue_depth().unwrap_or(0);
        run_ctx.with_status(|s| {
            s.last_discovery = Some(summary);
            s.queue_depth = depth;
        });
    }));
}

fn spawn_download(ctx: &LoopCtx, slot: &mut Option<JoinHandle<()>>, config: ScheduleConfig) {
    if slot.as_ref().is_some_and(|h| !h.is_finished()) {
        log::info!("Download sweep coalesced, previous sweep still in flight");
        ctx.with_status(|s| s.ticks_coalesced += 1);
        return;
    }

    let run_ctx = ctx.clone();
    *slot = Some(tokio::spawn(async move {
        let summary = run_ctx.queue.run_sweep(&config).await;
        let depth = run_ctx.repo.queue_depth().unwrap_or(0);
        run_ctx.with_status(|s| {
            s.last_download = Some(summary);
            s.queue_depth = depth;
        });
    }));
}
