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

use tokio::task::JoinHandle;

use crate::dispatcher::EventDispatcher;

mod drivers;
#[cfg(feature = "gpio")]
pub mod gpio;
pub mod keyboard;

pub use self::drivers::driver;

/// A source of pin edges. Drivers hand every edge to the dispatcher and never wait
/// on the work it triggers.
pub trait Driver: Send + Sync + 'static {
    fn monitor_events(
        &self,
        dispatcher: Arc<EventDispatcher>,
    ) -> JoinHandle<Result<(), io::Error>>;
}
