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

/// Typed error for config load/parse failures so callers can distinguish
/// e.g. file-not-found from validation errors without string matching.
/// All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config load/parse error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("no buttons configured")]
    NoButtons,

    #[error("{pins} pins but {samples} samples configured, the lists must be the same length")]
    MismatchedLengths { pins: usize, samples: usize },

    #[error("pin {0} is not a valid GPIO pin (expected 0 to {max})", max = super::sampler::MAX_PIN)]
    InvalidPin(u32),

    #[error("pin {0} is bound to more than one button")]
    DuplicatePin(u32),

    #[error("player command must not be empty")]
    EmptyCommand,

    #[error("invalid {field} duration '{value}': {reason}")]
    Duration {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("controller '{0}' is not supported by this build")]
    UnsupportedController(String),
}
