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
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use super::error::ConfigError;

/// Where button edges come from.
#[derive(Deserialize, Clone, Debug)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Controller {
    /// GPIO edge interrupts.
    Gpio(GpioController),
    /// Commands typed on stdin, for running without hardware.
    Keyboard,
}

impl Default for Controller {
    fn default() -> Self {
        Controller::Gpio(GpioController::default())
    }
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Controller::Gpio(_) => write!(f, "gpio"),
            Controller::Keyboard => write!(f, "keyboard"),
        }
    }
}

impl Controller {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Controller::Gpio(gpio) => gpio.debounce().map(|_| ()),
            Controller::Keyboard => Ok(()),
        }
    }
}

/// The resistor a button pin is biased with.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Pull {
    /// Pulled up, so the button is active-low.
    #[default]
    Up,
    /// Pulled down, so the button is active-high.
    Down,
}

/// GPIO controller settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct GpioController {
    /// Optional debounce window for edge interrupts.
    debounce: Option<String>,

    #[serde(default)]
    pull: Pull,
}

impl GpioController {
    pub fn debounce(&self) -> Result<Option<Duration>, ConfigError> {
        self.debounce
            .as_deref()
            .map(|value| super::parse_duration("debounce", value))
            .transpose()
    }

    pub fn pull(&self) -> Pull {
        self.pull
    }
}
