// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Per-button playback state.
//!
//! The registry is the only place player processes are started or stopped. Every
//! button has its own lock, so transitions on one button are serialized while
//! different buttons never wait on each other.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::player::{Completion, Launcher, PlayerHandle, SpawnError, TerminationError};
use crate::util::filename_display;

/// Identifies a button and its bound sample. Button IDs are dense, starting at 0.
pub type ButtonId = usize;

/// Counters kept for each button.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ButtonStats {
    /// Players successfully started.
    pub spawned: u64,
    /// Presses that failed to start a player.
    pub spawn_failures: u64,
    /// Players stopped by a release or shutdown.
    pub stopped: u64,
    /// Players that finished on their own.
    pub completed: u64,
    /// Players that did not exit within the stop timeout.
    pub stuck: u64,
}

/// The result of a press.
#[derive(Debug)]
pub enum PressOutcome {
    /// A new player was started.
    Started { handle: u64, pid: Option<u32> },
    /// A player is already live for this button.
    AlreadyPlaying { handle: u64 },
    /// The player could not be started. The button stays idle.
    Failed(SpawnError),
    /// No such button.
    UnknownButton,
}

/// The result of a release.
#[derive(Debug)]
pub enum ReleaseOutcome {
    /// The player was killed and has exited.
    Stopped(ExitStatus),
    /// Nothing was playing.
    NotPlaying,
    /// The player did not confirm its exit. The button is idle regardless.
    Stuck(TerminationError),
    /// No such button.
    UnknownButton,
}

/// A snapshot of a button's state.
#[derive(Clone, Debug)]
pub struct ButtonStatus {
    /// The sample bound to the button.
    pub sample: PathBuf,
    /// The live player handle, if any.
    pub handle: Option<u64>,
    /// The live player's process ID, if any.
    pub pid: Option<u32>,
    /// The button's counters.
    pub stats: ButtonStats,
}

impl ButtonStatus {
    /// True while the button has a player on record.
    pub fn is_playing(&self) -> bool {
        self.handle.is_some()
    }
}

struct ButtonState {
    sample: PathBuf,
    player: Option<PlayerHandle>,
    stats: ButtonStats,
}

/// Owns the state of every configured button.
pub struct SamplerRegistry {
    buttons: Vec<Mutex<ButtonState>>,
    launcher: Launcher,
    stop_timeout: Duration,
    completions_tx: mpsc::UnboundedSender<Completion>,
}

impl SamplerRegistry {
    /// Creates a registry with one button per sample, in order, and starts the task that
    /// applies completion notifications. Must be called within a tokio runtime.
    pub fn start(
        samples: Vec<PathBuf>,
        launcher: Launcher,
        stop_timeout: Duration,
    ) -> Arc<SamplerRegistry> {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(SamplerRegistry {
            buttons: samples
                .into_iter()
                .map(|sample| {
                    Mutex::new(ButtonState {
                        sample,
                        player: None,
                        stats: ButtonStats::default(),
                    })
                })
                .collect(),
            launcher,
            stop_timeout,
            completions_tx,
        });

        tokio::spawn(
            Self::apply_completions(Arc::downgrade(&registry), completions_rx)
                .instrument(info_span!("completions")),
        );

        registry
    }

    async fn apply_completions(
        registry: Weak<SamplerRegistry>,
        mut completions_rx: mpsc::UnboundedReceiver<Completion>,
    ) {
        while let Some(completion) = completions_rx.recv().await {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            debug!(
                button = completion.button,
                handle = completion.handle,
                status = ?completion.status,
                "Player finished on its own"
            );
            registry
                .on_completion(completion.button, completion.handle)
                .await;
        }
    }

    /// The number of buttons.
    pub fn button_count(&self) -> usize {
        self.buttons.len()
    }

    /// Starts the button's player unless one is already live.
    pub async fn on_press(&self, button: ButtonId) -> PressOutcome {
        let Some(slot) = self.buttons.get(button) else {
            warn!(button, "Press for unknown button");
            return PressOutcome::UnknownButton;
        };
        let mut state = slot.lock().await;

        if let Some(player) = &state.player {
            if player.is_alive() {
                debug!(button, handle = player.id(), "Already playing, ignoring press");
                return PressOutcome::AlreadyPlaying {
                    handle: player.id(),
                };
            }
            // Finished, but the completion hasn't been applied yet.
            debug!(button, handle = player.id(), "Reaping finished player");
            state.player = None;
            state.stats.completed += 1;
        }

        match PlayerHandle::spawn(
            &self.launcher,
            button,
            &state.sample,
            self.completions_tx.clone(),
        )
        .await
        {
            Ok(player) => {
                let handle = player.id();
                let pid = player.pid();
                info!(
                    button,
                    handle,
                    pid,
                    sample = filename_display(&state.sample),
                    "Playing sample"
                );
                state.player = Some(player);
                state.stats.spawned += 1;
                PressOutcome::Started { handle, pid }
            }
            Err(e) => {
                error!(
                    button,
                    sample = %state.sample.display(),
                    error = %e,
                    "Failed to start player"
                );
                state.stats.spawn_failures += 1;
                PressOutcome::Failed(e)
            }
        }
    }

    /// Kills the button's player and waits until it has exited.
    pub async fn on_release(&self, button: ButtonId) -> ReleaseOutcome {
        let Some(slot) = self.buttons.get(button) else {
            warn!(button, "Release for unknown button");
            return ReleaseOutcome::UnknownButton;
        };
        let mut state = slot.lock().await;

        let Some(mut player) = state.player.take() else {
            debug!(button, "Nothing playing, ignoring release");
            return ReleaseOutcome::NotPlaying;
        };

        player.request_stop();
        match player.await_termination(self.stop_timeout).await {
            Ok(status) => {
                info!(
                    button,
                    handle = player.id(),
                    sample = filename_display(player.sample()),
                    %status,
                    "Stopped sample"
                );
                state.stats.stopped += 1;
                ReleaseOutcome::Stopped(status)
            }
            Err(e) => {
                error!(
                    button,
                    handle = player.id(),
                    pid = player.pid(),
                    error = %e,
                    "Player did not stop, marking button idle anyway"
                );
                state.stats.stuck += 1;
                ReleaseOutcome::Stuck(e)
            }
        }
    }

    /// Clears the button if `handle` is still its current player. Returns true if
    /// the state was cleared.
    pub async fn on_completion(&self, button: ButtonId, handle: u64) -> bool {
        let Some(slot) = self.buttons.get(button) else {
            warn!(button, "Completion for unknown button");
            return false;
        };
        let mut state = slot.lock().await;

        match &state.player {
            Some(player) if player.id() == handle => {
                debug!(button, handle, "Sample finished");
                state.player = None;
                state.stats.completed += 1;
                true
            }
            _ => {
                debug!(button, handle, "Ignoring stale completion");
                false
            }
        }
    }

    /// Kills every live player and waits for each one. Returns the number of players
    /// that were stopped.
    pub async fn stop_all(&self) -> usize {
        // Buttons are always locked in ascending order here, single locks elsewhere.
        let mut states = Vec::with_capacity(self.buttons.len());
        for slot in &self.buttons {
            states.push(slot.lock().await);
        }

        let mut stopping = Vec::new();
        for (button, state) in states.iter_mut().enumerate() {
            if let Some(mut player) = state.player.take() {
                player.request_stop();
                stopping.push((button, player));
            }
        }

        let count = stopping.len();
        for (button, player) in stopping {
            match player.await_termination(self.stop_timeout).await {
                Ok(_) => states[button].stats.stopped += 1,
                Err(e) => {
                    error!(
                        button,
                        pid = player.pid(),
                        error = %e,
                        "Player did not stop during shutdown"
                    );
                    states[button].stats.stuck += 1;
                }
            }
        }

        if count > 0 {
            info!(stopped = count, "All players stopped");
        }
        count
    }

    /// Returns a snapshot of the button's state.
    pub async fn status(&self, button: ButtonId) -> Option<ButtonStatus> {
        let state = self.buttons.get(button)?.lock().await;
        Some(ButtonStatus {
            sample: state.sample.clone(),
            handle: state.player.as_ref().map(PlayerHandle::id),
            pid: state.player.as_ref().and_then(PlayerHandle::pid),
            stats: state.stats,
        })
    }
}

#[cfg(test)]
impl SamplerRegistry {
    /// Puts a player on record for the button (test only).
    pub async fn insert_player(&self, button: ButtonId, player: PlayerHandle) {
        let mut state = self.buttons[button].lock().await;
        state.player = Some(player);
        state.stats.spawned += 1;
    }
}

impl std::fmt::Debug for SamplerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplerRegistry")
            .field("buttons", &self.buttons.len())
            .field("launcher", &self.launcher)
            .field("stop_timeout", &self.stop_timeout)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::player::{Launcher, PlayerHandle, SpawnError, TerminationError};
    use crate::testutil::{
        eventually_async, failing_launcher, finishing_launcher, pid_alive, process_args,
        sample_file, tail_launcher,
    };

    use super::{ButtonId, ButtonStats, PressOutcome, ReleaseOutcome, SamplerRegistry};

    const STOP_TIMEOUT: Duration = Duration::from_secs(2);

    fn started(outcome: PressOutcome) -> (u64, u32) {
        match outcome {
            PressOutcome::Started {
                handle,
                pid: Some(pid),
            } => (handle, pid),
            other => panic!("expected a started player, got {:?}", other),
        }
    }

    async fn is_playing(registry: &SamplerRegistry, button: ButtonId) -> bool {
        registry
            .status(button)
            .await
            .expect("expected button")
            .is_playing()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_press_and_release() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let kick = sample_file(dir.path(), "kick.wav")?;
        let registry = SamplerRegistry::start(vec![kick.clone()], tail_launcher(), STOP_TIMEOUT);

        let (handle, pid) = started(registry.on_press(0).await);
        let status = registry.status(0).await.expect("expected button");
        assert_eq!(Some(handle), status.handle);
        assert_eq!(Some(pid), status.pid);
        assert_eq!(kick, status.sample);
        assert!(process_args(pid).contains(&kick.to_string_lossy().to_string()));

        assert!(matches!(
            registry.on_release(0).await,
            ReleaseOutcome::Stopped(_)
        ));
        assert!(!is_playing(&registry, 0).await);
        assert!(!pid_alive(pid));

        let stats = registry.status(0).await.expect("expected button").stats;
        assert_eq!(
            ButtonStats {
                spawned: 1,
                stopped: 1,
                ..Default::default()
            },
            stats
        );
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_double_press_spawns_once() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let kick = sample_file(dir.path(), "kick.wav")?;
        let registry = SamplerRegistry::start(vec![kick], tail_launcher(), STOP_TIMEOUT);

        let (handle, _) = started(registry.on_press(0).await);
        assert!(matches!(
            registry.on_press(0).await,
            PressOutcome::AlreadyPlaying { handle: h } if h == handle
        ));
        assert_eq!(
            1,
            registry.status(0).await.expect("expected button").stats.spawned
        );

        registry.on_release(0).await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_release_without_press() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let kick = sample_file(dir.path(), "kick.wav")?;
        let registry = SamplerRegistry::start(vec![kick], tail_launcher(), STOP_TIMEOUT);

        assert!(matches!(
            registry.on_release(0).await,
            ReleaseOutcome::NotPlaying
        ));
        assert_eq!(
            ButtonStats::default(),
            registry.status(0).await.expect("expected button").stats
        );
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_press_right_after_release() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let kick = sample_file(dir.path(), "kick.wav")?;
        let registry = SamplerRegistry::start(vec![kick], tail_launcher(), STOP_TIMEOUT);

        let (first, first_pid) = started(registry.on_press(0).await);
        registry.on_release(0).await;
        assert!(!pid_alive(first_pid));

        let (second, second_pid) = started(registry.on_press(0).await);
        assert_ne!(first, second);
        assert!(pid_alive(second_pid));

        registry.on_release(0).await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_buttons_are_independent() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let samples = vec![
            sample_file(dir.path(), "kick.wav")?,
            sample_file(dir.path(), "snare.wav")?,
        ];
        let registry = SamplerRegistry::start(samples, tail_launcher(), STOP_TIMEOUT);

        let (a, b) = tokio::time::timeout(Duration::from_secs(3), async {
            tokio::join!(registry.on_press(0), registry.on_press(1))
        })
        .await?;
        started(a);
        started(b);
        assert!(is_playing(&registry, 0).await);
        assert!(is_playing(&registry, 1).await);

        // Releasing one button leaves the other alone.
        registry.on_release(0).await;
        assert!(!is_playing(&registry, 0).await);
        assert!(is_playing(&registry, 1).await);

        registry.on_release(1).await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_natural_completion() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let kick = sample_file(dir.path(), "kick.wav")?;
        let registry = SamplerRegistry::start(vec![kick], finishing_launcher(), STOP_TIMEOUT);

        assert!(matches!(
            registry.on_press(0).await,
            PressOutcome::Started { .. }
        ));
        eventually_async(
            || {
                let registry = registry.clone();
                async move { !is_playing(&registry, 0).await }
            },
            "button never went idle after the sample finished",
        )
        .await;

        let stats = registry.status(0).await.expect("expected button").stats;
        assert_eq!(1, stats.spawned);
        assert_eq!(1, stats.completed);
        assert_eq!(0, stats.stopped);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stale_completion_is_ignored() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let kick = sample_file(dir.path(), "kick.wav")?;
        let registry = SamplerRegistry::start(vec![kick], tail_launcher(), STOP_TIMEOUT);

        let (first, _) = started(registry.on_press(0).await);
        registry.on_release(0).await;
        let (second, second_pid) = started(registry.on_press(0).await);

        assert!(!registry.on_completion(0, first).await);
        let status = registry.status(0).await.expect("expected button");
        assert_eq!(Some(second), status.handle);
        assert!(pid_alive(second_pid));

        registry.on_release(0).await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_spawn_failure_leaves_button_idle() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("missing.wav");
        let registry = SamplerRegistry::start(vec![missing], tail_launcher(), STOP_TIMEOUT);

        assert!(matches!(
            registry.on_press(0).await,
            PressOutcome::Failed(SpawnError::Sample { .. })
        ));
        let status = registry.status(0).await.expect("expected button");
        assert!(!status.is_playing());
        assert_eq!(1, status.stats.spawn_failures);

        // The button can be pressed again once the sample shows up.
        sample_file(dir.path(), "missing.wav")?;
        let (_, pid) = started(registry.on_press(0).await);
        assert!(pid_alive(pid));
        registry.on_release(0).await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_player_binary() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let kick = sample_file(dir.path(), "kick.wav")?;
        let registry = SamplerRegistry::start(
            vec![kick],
            Launcher::new("/nonexistent/player", vec![]),
            STOP_TIMEOUT,
        );

        assert!(matches!(
            registry.on_press(0).await,
            PressOutcome::Failed(SpawnError::Launch { .. })
        ));
        assert!(!is_playing(&registry, 0).await);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_player_failing_at_startup_leaves_button_idle() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let kick = sample_file(dir.path(), "kick.wav")?;
        let registry = SamplerRegistry::start(vec![kick], failing_launcher(), STOP_TIMEOUT);

        assert!(matches!(
            registry.on_press(0).await,
            PressOutcome::Failed(SpawnError::Exited { .. })
        ));
        let status = registry.status(0).await.expect("expected button");
        assert!(!status.is_playing());
        assert_eq!(
            ButtonStats {
                spawn_failures: 1,
                ..Default::default()
            },
            status.stats
        );
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stuck_player_still_goes_idle() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let kick = sample_file(dir.path(), "kick.wav")?;
        let registry =
            SamplerRegistry::start(vec![kick], tail_launcher(), Duration::from_millis(50));

        registry.insert_player(0, PlayerHandle::unresponsive()).await;
        assert!(is_playing(&registry, 0).await);

        assert!(matches!(
            registry.on_release(0).await,
            ReleaseOutcome::Stuck(TerminationError::Timeout { .. })
        ));
        let status = registry.status(0).await.expect("expected button");
        assert!(!status.is_playing());
        assert_eq!(1, status.stats.stuck);

        // Future presses are not blocked by the stuck player.
        let (_, pid) = started(registry.on_press(0).await);
        assert!(pid_alive(pid));
        registry.on_release(0).await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_button() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let kick = sample_file(dir.path(), "kick.wav")?;
        let registry = SamplerRegistry::start(vec![kick], tail_launcher(), STOP_TIMEOUT);

        assert!(matches!(
            registry.on_press(1).await,
            PressOutcome::UnknownButton
        ));
        assert!(matches!(
            registry.on_release(1).await,
            ReleaseOutcome::UnknownButton
        ));
        assert!(!registry.on_completion(1, 1).await);
        assert!(registry.status(1).await.is_none());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_all() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let samples = vec![
            sample_file(dir.path(), "kick.wav")?,
            sample_file(dir.path(), "snare.wav")?,
            sample_file(dir.path(), "hat.wav")?,
        ];
        let registry = SamplerRegistry::start(samples, tail_launcher(), STOP_TIMEOUT);

        let (_, first) = started(registry.on_press(0).await);
        let (_, third) = started(registry.on_press(2).await);

        assert_eq!(2, registry.stop_all().await);
        assert!(!pid_alive(first));
        assert!(!pid_alive(third));
        for button in 0..registry.button_count() {
            assert!(!is_playing(&registry, button).await);
        }
        assert_eq!(0, registry.stop_all().await);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_random_interleavings_keep_one_player_per_button() -> Result<(), Box<dyn Error>>
    {
        const BUTTONS: usize = 2;

        let dir = tempfile::tempdir()?;
        let samples = vec![
            sample_file(dir.path(), "kick.wav")?,
            sample_file(dir.path(), "snare.wav")?,
        ];
        let registry = SamplerRegistry::start(samples, tail_launcher(), STOP_TIMEOUT);
        let players: Arc<Mutex<Vec<(ButtonId, u64, u32)>>> = Arc::new(Mutex::new(Vec::new()));

        let mut tasks = Vec::new();
        for seed in 0..4u64 {
            let registry = registry.clone();
            let players = players.clone();
            tasks.push(tokio::spawn(async move {
                let mut rng = StdRng::seed_from_u64(seed);
                for _ in 0..25 {
                    let button = rng.gen_range(0..BUTTONS);
                    match rng.gen_range(0..3) {
                        0 => {
                            if let PressOutcome::Started {
                                handle,
                                pid: Some(pid),
                            } = registry.on_press(button).await
                            {
                                players
                                    .lock()
                                    .expect("failed to get lock")
                                    .push((button, handle, pid));
                            }
                        }
                        1 => {
                            registry.on_release(button).await;
                        }
                        _ => {
                            // Replay the completion of any player this button has had,
                            // current or stale.
                            let handle = {
                                let players = players.lock().expect("failed to get lock");
                                let handles: Vec<u64> = players
                                    .iter()
                                    .filter(|(b, _, _)| *b == button)
                                    .map(|(_, handle, _)| *handle)
                                    .collect();
                                if handles.is_empty() {
                                    0
                                } else {
                                    handles[rng.gen_range(0..handles.len())]
                                }
                            };
                            registry.on_completion(button, handle).await;
                        }
                    }

                    for button in 0..BUTTONS {
                        let status = registry.status(button).await.expect("expected button");
                        let stats = status.stats;
                        let ended = stats.stopped + stats.completed + stats.stuck;
                        assert_eq!(
                            stats.spawned,
                            ended + u64::from(status.is_playing()),
                            "button {} has more than one live player: {:?}",
                            button,
                            stats
                        );
                    }
                }
            }));
        }
        for task in tasks {
            task.await?;
        }

        registry.stop_all().await;
        for button in 0..BUTTONS {
            assert!(!is_playing(&registry, button).await);
        }

        let pids: Vec<u32> = players
            .lock()
            .expect("failed to get lock")
            .iter()
            .map(|(_, _, pid)| *pid)
            .collect();
        eventually_async(
            || {
                let pids = pids.clone();
                async move { pids.iter().all(|pid| !pid_alive(*pid)) }
            },
            "player processes leaked",
        )
        .await;
        Ok(())
    }
}
