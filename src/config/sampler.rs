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
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use super::controller::Controller;
use super::error::ConfigError;
use super::player::Player;
use crate::dispatcher::Binding;
use crate::registry::ButtonId;

/// The highest BCM GPIO number on the 40-pin header.
pub(super) const MAX_PIN: u32 = 27;

/// Prefix for environment overrides, e.g. `PISAMPLER_PLAYER__COMMAND=mpv`.
const ENV_PREFIX: &str = "PISAMPLER";

/// The configuration for the sampler.
#[derive(Deserialize, Clone, Debug)]
pub struct Sampler {
    /// The GPIO pins of the buttons, in button order.
    pins: Vec<u32>,

    /// The sample for each button, index-aligned with `pins`. Relative paths are
    /// resolved against the directory of the config file.
    samples: Vec<String>,

    /// The external player configuration.
    #[serde(default)]
    player: Player,

    /// Where button edges come from.
    #[serde(default)]
    controller: Controller,

    /// The directory the config was loaded from.
    #[serde(skip)]
    base_path: PathBuf,
}

/// A fully resolved button.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonBinding {
    pub button: ButtonId,
    pub pin: u8,
    pub sample: PathBuf,
}

impl Sampler {
    /// Loads and validates the sampler configuration from a YAML file, with
    /// environment overrides applied on top.
    pub fn deserialize(path: &Path) -> Result<Sampler, ConfigError> {
        let sampler = Config::builder()
            .add_source(File::from(path))
            .add_source(environment())
            .build()?
            .try_deserialize::<Sampler>()?;
        let base_path = path.parent().map(Path::to_path_buf).unwrap_or_default();
        sampler.with_base_path(base_path)
    }

    /// Parses and validates the sampler configuration from a YAML string.
    #[cfg(test)]
    pub fn from_yaml(yaml: &str, base_path: &Path) -> Result<Sampler, ConfigError> {
        use config::FileFormat;

        let sampler = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Sampler>()?;
        sampler.with_base_path(base_path.to_path_buf())
    }

    fn with_base_path(mut self, base_path: PathBuf) -> Result<Sampler, ConfigError> {
        self.base_path = base_path;
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pins.is_empty() && self.samples.is_empty() {
            return Err(ConfigError::NoButtons);
        }
        if self.pins.len() != self.samples.len() {
            return Err(ConfigError::MismatchedLengths {
                pins: self.pins.len(),
                samples: self.samples.len(),
            });
        }

        let mut seen = HashSet::new();
        for pin in self.pins.iter().copied() {
            if pin > MAX_PIN {
                return Err(ConfigError::InvalidPin(pin));
            }
            if !seen.insert(pin) {
                return Err(ConfigError::DuplicatePin(pin));
            }
        }

        self.player.validate()?;
        self.controller.validate()?;
        Ok(())
    }

    /// The buttons, in order.
    pub fn buttons(&self) -> Vec<ButtonBinding> {
        self.pins
            .iter()
            .zip(self.samples.iter())
            .enumerate()
            .map(|(button, (pin, sample))| ButtonBinding {
                button,
                // Validated against MAX_PIN.
                pin: *pin as u8,
                sample: self.base_path.join(sample),
            })
            .collect()
    }

    /// The pin to button table for the dispatcher.
    pub fn bindings(&self) -> Vec<Binding> {
        self.buttons()
            .into_iter()
            .map(|button| Binding {
                pin: button.pin,
                button: button.button,
            })
            .collect()
    }

    /// The pins, in button order.
    pub fn pins(&self) -> Vec<u8> {
        self.buttons().into_iter().map(|button| button.pin).collect()
    }

    /// The samples, in button order.
    pub fn samples(&self) -> Vec<PathBuf> {
        self.buttons()
            .into_iter()
            .map(|button| button.sample)
            .collect()
    }

    /// The player configuration.
    pub fn player(&self) -> &Player {
        &self.player
    }

    /// The controller configuration.
    pub fn controller(&self) -> &Controller {
        &self.controller
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("pins")
        .with_list_parse_key("samples")
}
