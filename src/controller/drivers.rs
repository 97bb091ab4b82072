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
use std::sync::Arc;

use crate::config::{ConfigError, Controller};

use super::Driver;

/// Creates a controller driver from the config.
pub fn driver(config: &Controller, pins: &[u8]) -> Result<Arc<dyn Driver>, ConfigError> {
    match config {
        #[cfg(feature = "gpio")]
        Controller::Gpio(gpio) => Ok(Arc::new(super::gpio::Driver::new(
            pins.to_vec(),
            gpio.debounce()?,
            gpio.pull(),
        ))),
        #[cfg(not(feature = "gpio"))]
        Controller::Gpio(_) => {
            let _ = pins;
            Err(ConfigError::UnsupportedController(config.to_string()))
        }
        Controller::Keyboard => Ok(Arc::new(super::keyboard::Driver::new())),
    }
}
