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
mod config;
mod controller;
mod dispatcher;
mod player;
mod registry;
mod sampler;
#[cfg(test)]
mod testutil;
mod util;

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::registry::{PressOutcome, SamplerRegistry};
use crate::sampler::{wait_for_shutdown_signal, Sampler};

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=button-triggered sampler

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/pisampler
ExecStart=/usr/local/bin/pisampler start "$PISAMPLER_CONFIG"

[Install]
WantedBy=multi-user.target
Alias=pisampler.service
"#;

/// How often `play` checks whether the sample has finished.
const PLAY_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A button-triggered audio sampler."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start will run the sampler until it receives SIGINT or SIGTERM.
    Start {
        /// The path to the sampler config.
        config_path: PathBuf,
    },
    /// Validates a config and prints its buttons.
    Check {
        /// The path to the sampler config.
        config_path: PathBuf,
    },
    /// Plays a single button's sample until it finishes or Ctrl-C is pressed.
    Play {
        /// The path to the sampler config.
        config_path: PathBuf,
        /// The button to play, counting from 0.
        button: usize,
    },
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config_path } => {
            let config = config::Sampler::deserialize(&config_path)?;
            let driver = controller::driver(config.controller(), &config.pins())?;
            let mut sampler = Sampler::new(&config, driver)?;

            tokio::select! {
                result = sampler.join() => match result {
                    Ok(()) => info!("Controller finished."),
                    Err(e) => error!(error = %e, "Controller failed"),
                },
                result = wait_for_shutdown_signal() => {
                    if let Err(e) = result {
                        error!(error = %e, "Unable to listen for shutdown signals");
                    }
                }
            }
            sampler.shutdown().await;
        }
        Commands::Check { config_path } => {
            let config = config::Sampler::deserialize(&config_path)?;

            println!(
                "Player: {} {}",
                config.player().command(),
                config.player().args().join(" ")
            );
            println!("Stop timeout: {:?}", config.player().stop_timeout()?);
            println!("Controller: {}", config.controller());
            println!("Buttons (count: {}):", config.buttons().len());
            for button in config.buttons() {
                println!(
                    "- {}: pin {} -> {}",
                    button.button,
                    button.pin,
                    button.sample.display()
                );
                if !button.sample.is_file() {
                    warn!(
                        button = button.button,
                        sample = %button.sample.display(),
                        "Sample file does not exist"
                    );
                }
            }
        }
        Commands::Play {
            config_path,
            button,
        } => {
            let config = config::Sampler::deserialize(&config_path)?;
            let registry = SamplerRegistry::start(
                config.samples(),
                config.player().launcher()?,
                config.player().stop_timeout()?,
            );

            match registry.on_press(button).await {
                PressOutcome::Started { .. } | PressOutcome::AlreadyPlaying { .. } => {}
                PressOutcome::Failed(e) => return Err(e.into()),
                PressOutcome::UnknownButton => {
                    return Err(format!(
                        "button {} does not exist, config has {} buttons",
                        button,
                        registry.button_count()
                    )
                    .into())
                }
            }

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);
            loop {
                tokio::select! {
                    _ = &mut ctrl_c => {
                        registry.on_release(button).await;
                        break;
                    }
                    _ = tokio::time::sleep(PLAY_POLL_INTERVAL) => {
                        if !registry
                            .status(button)
                            .await
                            .is_some_and(|status| status.is_playing())
                        {
                            break;
                        }
                    }
                }
            }
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}
