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

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use crate::player::Launcher;

/// Wait for the given async predicate to return true or fail.
#[inline]
pub async fn eventually_async<F, Fut>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed();
        if elapsed.is_err() {
            panic!("System time error");
        }
        let elapsed = elapsed.unwrap();

        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate().await {
            return;
        }
        tokio::time::sleep(tick).await;
    }
}

/// Creates an empty sample file in the given directory.
pub fn sample_file(dir: &Path, name: &str) -> Result<PathBuf, io::Error> {
    let path = dir.join(name);
    File::create(&path)?;
    Ok(path)
}

/// A player that runs until it is killed.
pub fn tail_launcher() -> Launcher {
    Launcher::new("tail", vec!["-f".to_string()])
}

/// A player that finishes immediately and successfully.
pub fn finishing_launcher() -> Launcher {
    Launcher::new("true", vec![])
}

/// A player that exits with a failure status right away.
pub fn failing_launcher() -> Launcher {
    Launcher::new("false", vec![]).with_startup_grace(Duration::from_secs(2))
}

/// Returns true if the process exists and has not been reaped.
pub fn pid_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

/// Returns the command line of a running process.
pub fn process_args(pid: u32) -> Vec<String> {
    std::fs::read(format!("/proc/{}/cmdline", pid))
        .map(|cmdline| {
            cmdline
                .split(|b| *b == 0)
                .filter(|arg| !arg.is_empty())
                .map(|arg| String::from_utf8_lossy(arg).to_string())
                .collect()
        })
        .unwrap_or_default()
}
