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
use std::io;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{self, ConfigError};
use crate::controller::Driver;
use crate::dispatcher::{spawn_workers, EventDispatcher};
use crate::registry::SamplerRegistry;
use crate::util::filename_display;

/// A running sampler: the registry, its button workers and the driver feeding them.
pub struct Sampler {
    registry: Arc<SamplerRegistry>,
    workers: Vec<JoinHandle<()>>,
    /// Tells the workers to stop once their current transition is done.
    stop_workers: watch::Sender<bool>,
    /// Cleared once the driver has been joined.
    driver: Option<JoinHandle<Result<(), io::Error>>>,
}

impl Sampler {
    /// Starts the sampler. Must be called within a tokio runtime.
    pub fn new(config: &config::Sampler, driver: Arc<dyn Driver>) -> Result<Sampler, ConfigError> {
        let registry = SamplerRegistry::start(
            config.samples(),
            config.player().launcher()?,
            config.player().stop_timeout()?,
        );
        let (dispatcher, receivers) = EventDispatcher::new(config.bindings());
        let (stop_workers, stop_rx) = watch::channel(false);
        let workers = spawn_workers(registry.clone(), receivers, stop_rx);
        let driver = driver.monitor_events(Arc::new(dispatcher));

        info!(
            buttons = registry.button_count(),
            player = config.player().command(),
            controller = %config.controller(),
            "Sampler started."
        );

        Ok(Sampler {
            registry,
            workers,
            stop_workers,
            driver: Some(driver),
        })
    }

    pub fn registry(&self) -> &Arc<SamplerRegistry> {
        &self.registry
    }

    /// Waits until the driver stops on its own.
    pub async fn join(&mut self) -> Result<(), io::Error> {
        let Some(driver) = self.driver.as_mut() else {
            return Ok(());
        };
        let result = driver.await;
        self.driver = None;
        match result {
            Ok(result) => result,
            Err(e) => Err(io::Error::other(e)),
        }
    }

    /// Stops listening for edges, then kills every live player and waits for it.
    pub async fn shutdown(self) {
        info!("Shutting down.");

        if let Some(driver) = self.driver {
            driver.abort();
            if let Err(e) = driver.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Driver failed during shutdown");
                }
            }
        }
        // Transitions already in progress, including a release waiting on its
        // player, run to completion before the remaining players are stopped.
        self.stop_workers.send_replace(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Button worker failed during shutdown");
            }
        }

        self.registry.stop_all().await;

        for button in 0..self.registry.button_count() {
            if let Some(status) = self.registry.status(button).await {
                info!(
                    button,
                    sample = filename_display(&status.sample),
                    spawned = status.stats.spawned,
                    spawn_failures = status.stats.spawn_failures,
                    stopped = status.stats.stopped,
                    completed = status.stats.completed,
                    stuck = status.stats.stuck,
                    "Button stats"
                );
            }
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn wait_for_shutdown_signal() -> Result<(), io::Error> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
