//! `tcast replay`: drive a producer script through in-process windows.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{info, warn};

use transcast_core::config::{Config, DisplayConfig};
use transcast_core::engine::{DisplaySnapshot, WindowEngine};
use transcast_core::producer::{ProducerFeed, ScriptLine};
use transcast_core::surface::{GridProjection, LingerView};
use transcast_core::transport::BroadcastHub;
use transcast_core::window::{WindowHandle, spawn_window};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub windows: usize,
    pub late_join_ms: Option<u64>,
    pub time_scale: f64,
    pub format: OutputFormat,
}

/// One observed snapshot change, in script milliseconds.
#[derive(Debug, Clone, Serialize)]
struct SnapshotEvent {
    at_ms: u64,
    window: usize,
    revision: u64,
    active: bool,
    rendered: Vec<u64>,
}

#[derive(Debug, Clone, Default, Serialize)]
struct WindowSummary {
    window: usize,
    late: bool,
    peak_rendered: usize,
    grid_filled: usize,
    /// Records the main display held when the run ended.
    lingered: usize,
    /// Script time at which the lingering content faded out.
    faded_at_ms: Option<u64>,
    last_rendered: Vec<u64>,
}

#[derive(Debug, Clone, Serialize)]
struct ReplaySummary {
    frames: usize,
    added: u64,
    finalized: bool,
    converged: bool,
    windows: Vec<WindowSummary>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum OutputLine<'a> {
    Snapshot(&'a SnapshotEvent),
    Summary(&'a ReplaySummary),
}

/// Converts between script time and wall time.
#[derive(Debug, Clone, Copy)]
struct Clock {
    start: Instant,
    scale: f64,
}

impl Clock {
    fn wall(&self, script_ms: u64) -> Instant {
        self.start + Duration::from_millis((script_ms as f64 * self.scale).round() as u64)
    }

    fn script_ms(&self, at: Instant) -> u64 {
        (at.duration_since(self.start).as_millis() as f64 / self.scale).round() as u64
    }
}

pub async fn run(config: &Config, lines: Vec<ScriptLine>, options: &ReplayOptions) -> anyhow::Result<()> {
    let pacing = config.pacing.scaled(options.time_scale);
    let display = config.display.scaled(options.time_scale);
    let hub = BroadcastHub::new();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let clock = Clock {
        start: Instant::now(),
        scale: options.time_scale,
    };

    let open = |label: usize, late: bool| -> anyhow::Result<(WindowHandle, JoinHandle<WindowSummary>)> {
        let endpoint = hub
            .open(&config.channel.name, config.channel.capacity)
            .context("failed to open broadcast channel")?;
        let window = spawn_window(endpoint.id(), WindowEngine::new(pacing), endpoint);
        let watcher = spawn_watcher(
            label,
            late,
            window.subscribe(),
            clock,
            display,
            events_tx.clone(),
        );
        Ok((window, watcher))
    };

    let mut windows = Vec::with_capacity(options.windows + 1);
    let mut watchers = Vec::with_capacity(options.windows + 1);
    for label in 1..=options.windows {
        let (window, watcher) = open(label, false)?;
        windows.push(window);
        watchers.push(watcher);
    }
    info!(windows = options.windows, frames = lines.len(), "replay started");

    let producer = &windows[0];
    let feed = async {
        let mut feed = ProducerFeed::new(producer);
        feed.begin_run().await?;
        for line in &lines {
            if let Some(at_ms) = line.at_ms {
                time::sleep_until(clock.wall(at_ms)).await;
            }
            feed.apply(&line.frame).await?;
        }
        anyhow::Ok(feed.added())
    };
    let late = async {
        match options.late_join_ms {
            Some(at_ms) => {
                time::sleep_until(clock.wall(at_ms)).await;
                open(options.windows + 1, true).map(Some)
            }
            None => Ok(None),
        }
    };
    let (added, late) = tokio::join!(feed, late);
    let added = added?;

    let finalized = wait_for_idle(producer, config, options.time_scale, added).await?;

    if let Some((window, watcher)) = late? {
        windows.push(window);
        watchers.push(watcher);
    }
    for window in windows {
        window.close().await?;
    }
    drop(events_tx);

    let mut summaries = Vec::with_capacity(watchers.len());
    for watcher in watchers {
        summaries.push(watcher.await.context("snapshot watcher failed")?);
    }

    let mut events = Vec::new();
    while let Some(event) = events_rx.recv().await {
        events.push(event);
    }
    events.sort_by_key(|e: &SnapshotEvent| (e.at_ms, e.window, e.revision));

    let reference = summaries.first().map(|s| s.last_rendered.clone()).unwrap_or_default();
    let summary = ReplaySummary {
        frames: lines.len(),
        added,
        finalized,
        converged: summaries.iter().all(|s| s.last_rendered == reference),
        windows: summaries,
    };

    print_report(&events, &summary, options.format)?;
    Ok(())
}

/// Wait until the producing window ends its run, bounded by the slowest pacing.
async fn wait_for_idle(
    producer: &WindowHandle,
    config: &Config,
    scale: f64,
    added: u64,
) -> anyhow::Result<bool> {
    let pacing = config.pacing.scaled(scale);
    let bound = Duration::from_millis(pacing.max_delay_ms)
        .saturating_mul(u32::try_from(added + 1).unwrap_or(u32::MAX))
        + pacing.grace()
        + Duration::from_secs(1);

    producer.flush().await?;
    let mut rx = producer.subscribe();
    let finalized = match time::timeout(bound, rx.wait_for(|s| !s.is_active)).await {
        Ok(result) => result.is_ok(),
        Err(_) => {
            warn!(bound_ms = bound.as_millis() as u64, "run did not finalize in time");
            false
        }
    };
    Ok(finalized)
}

fn spawn_watcher(
    label: usize,
    late: bool,
    mut rx: watch::Receiver<DisplaySnapshot>,
    clock: Clock,
    display: DisplayConfig,
    events: mpsc::UnboundedSender<SnapshotEvent>,
) -> JoinHandle<WindowSummary> {
    tokio::spawn(async move {
        let mut linger = LingerView::from_config(&display);
        let mut grid = GridProjection::from_config(&display);
        let mut summary = WindowSummary {
            window: label,
            late,
            ..WindowSummary::default()
        };

        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = rx.borrow_and_update().clone();
                    let now = Instant::now();
                    poll_fade(&mut linger, &mut summary, clock, now);
                    let was_fading = linger.is_fading();
                    linger.observe(&snapshot, now.into_std());
                    if linger.is_fading() && !was_fading {
                        summary.lingered = linger.content().len();
                        summary.faded_at_ms = None;
                    }
                    grid.update(&snapshot.rendered);

                    let rendered: Vec<u64> = snapshot.rendered.iter().map(|r| r.index).collect();
                    if !rendered.is_empty() {
                        summary.last_rendered.clone_from(&rendered);
                    }
                    summary.peak_rendered = summary.peak_rendered.max(rendered.len());
                    summary.grid_filled = summary.grid_filled.max(grid.filled());

                    let _ = events.send(SnapshotEvent {
                        at_ms: clock.script_ms(now),
                        window: label,
                        revision: snapshot.revision,
                        active: snapshot.is_active,
                        rendered,
                    });
                }
                () = sleep_until_std(linger.deadline()) => {
                    poll_fade(&mut linger, &mut summary, clock, Instant::now());
                }
            }
        }

        // Window closed; let a pending fade-out run to completion.
        if let Some(deadline) = linger.deadline() {
            time::sleep_until(Instant::from_std(deadline)).await;
            poll_fade(&mut linger, &mut summary, clock, Instant::now());
        }
        summary
    })
}

fn poll_fade(linger: &mut LingerView, summary: &mut WindowSummary, clock: Clock, now: Instant) {
    if linger.poll(now.into_std()) {
        summary.faded_at_ms = Some(clock.script_ms(now));
    }
}

async fn sleep_until_std(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

fn print_report(events: &[SnapshotEvent], summary: &ReplaySummary, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            for event in events {
                println!("{}", serde_json::to_string(&OutputLine::Snapshot(event))?);
            }
            println!("{}", serde_json::to_string(&OutputLine::Summary(summary))?);
        }
        OutputFormat::Plain => {
            for event in events {
                println!(
                    "{:>7}ms  window {:<2} {:<6}  rev {:<3} rendered {:?}",
                    event.at_ms,
                    event.window,
                    if event.active { "active" } else { "idle" },
                    event.revision,
                    event.rendered
                );
            }
            println!(
                "summary: frames={} added={} finalized={} converged={}",
                summary.frames,
                summary.added,
                yes_no(summary.finalized),
                yes_no(summary.converged)
            );
            for window in &summary.windows {
                let faded = window
                    .faded_at_ms
                    .map_or_else(|| "-".to_string(), |ms| format!("{ms}ms"));
                println!(
                    "  window {}{}: peak {} grid {} lingered {} faded {} last {:?}",
                    window.window,
                    if window.late { " (late)" } else { "" },
                    window.peak_rendered,
                    window.grid_filled,
                    window.lingered,
                    faded,
                    window.last_rendered
                );
            }
        }
    }
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
