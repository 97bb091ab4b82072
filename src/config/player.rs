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
use std::time::Duration;

use serde::Deserialize;

use super::error::ConfigError;
use crate::player::{Launcher, DEFAULT_STARTUP_GRACE};

const DEFAULT_COMMAND: &str = "aplay";
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// The configuration for the external player program.
#[derive(Deserialize, Clone, Debug)]
pub struct Player {
    /// The program to run. The sample path is appended as the final argument.
    #[serde(default = "default_command")]
    command: String,

    /// Arguments passed before the sample path.
    #[serde(default)]
    args: Vec<String>,

    /// How long a release waits for the player to exit after being killed.
    stop_timeout: Option<String>,

    /// How long a new player is watched for an immediate failure.
    startup_grace: Option<String>,
}

fn default_command() -> String {
    DEFAULT_COMMAND.to_string()
}

impl Default for Player {
    fn default() -> Self {
        Player {
            command: default_command(),
            args: Vec::new(),
            stop_timeout: None,
            startup_grace: None,
        }
    }
}

impl Player {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The stop timeout. Defaults to 2 seconds.
    pub fn stop_timeout(&self) -> Result<Duration, ConfigError> {
        match &self.stop_timeout {
            Some(value) => super::parse_duration("stop_timeout", value),
            None => Ok(DEFAULT_STOP_TIMEOUT),
        }
    }

    /// The startup grace period. Defaults to 100 milliseconds.
    pub fn startup_grace(&self) -> Result<Duration, ConfigError> {
        match &self.startup_grace {
            Some(value) => super::parse_duration("startup_grace", value),
            None => Ok(DEFAULT_STARTUP_GRACE),
        }
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.command.trim().is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        self.stop_timeout()?;
        self.startup_grace()?;
        Ok(())
    }

    /// Builds a launcher for this player.
    pub fn launcher(&self) -> Result<Launcher, ConfigError> {
        Ok(Launcher::new(self.command.clone(), self.args.clone())
            .with_startup_grace(self.startup_grace()?))
    }
}
