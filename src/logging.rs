// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file,
// You can obtain one at <https://mozilla.org/MPL/2.0/>.

// Logging setup for hosts and test binaries embedding this crate.
//
// The library itself only talks to the `log` facade; a host that has no
// logger of its own can call `init` once at startup.

/// Initializes `env_logger` to capture logs from the given crates at `log_level`,
/// unless `RUST_LOG` is set, in which case it takes precedence.
pub fn init_with_level(crates: &[&str], log_level: log::LevelFilter) {
    let level_str = match log_level {
        log::LevelFilter::Off => "off",
        log::LevelFilter::Error => "error",
        log::LevelFilter::Warn => "warn",
        log::LevelFilter::Info => "info",
        log::LevelFilter::Debug => "debug",
        log::LevelFilter::Trace => "trace",
    };
    let filter_string = crates
        .iter()
        .map(|pkg_name| format!("{}={}", pkg_name, level_str))
        .collect::<Vec<_>>()
        .join(",");

    // try_init: a second initialization (e.g. from another test) is not an error.
    let _ = if std::env::var("RUST_LOG").is_err() {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&filter_string))
            .try_init()
    } else {
        env_logger::try_init()
    };
}

/// Initializes logging for this crate at [`Info`](log::Level::Info) in debug
/// builds and [`Warn`](log::Level::Warn) in release builds.
pub fn init() {
    init_with_level(
        &["colvar_atoms"],
        if cfg!(debug_assertions) {
            log::LevelFilter::Info
        } else {
            log::LevelFilter::Warn
        },
    );
}

// End of File
