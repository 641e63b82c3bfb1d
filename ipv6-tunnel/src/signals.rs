//! Process-wide tunnel registry with a one-shot `SIGINT`/`SIGTERM` (Unix) or
//! Ctrl-C (Windows) hook, plus a panic hook, both installed lazily on the
//! first `TunnelSession::connect`.

use crate::session::Inner;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

static REGISTRY: OnceCell<Mutex<Vec<Weak<Inner>>>> = OnceCell::new();
static HOOKS_INSTALLED: OnceCell<()> = OnceCell::new();

fn registry() -> &'static Mutex<Vec<Weak<Inner>>> {
    REGISTRY.get_or_init(|| Mutex::new(Vec::new()))
}

/// Adds `inner` to the registry and installs the process-wide hooks on the
/// first call.
pub(crate) fn register(inner: &Arc<Inner>) {
    registry().lock().push(Arc::downgrade(inner));
    HOOKS_INSTALLED.get_or_init(install_hooks);
}

fn live_tunnels() -> Vec<Arc<Inner>> {
    let mut guard = registry().lock();
    guard.retain(|weak| weak.strong_count() > 0);
    guard.iter().filter_map(Weak::upgrade).collect()
}

/// Stops every registered tunnel from a fresh single-threaded runtime on a
/// dedicated OS thread, so it can be called from both async signal-handler
/// tasks and a synchronous panic hook without nesting runtimes.
fn shutdown_all_blocking() {
    let tunnels = live_tunnels();
    if tunnels.is_empty() {
        return;
    }

    let joined = std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!(error = %e, "failed to build shutdown runtime");
                return;
            }
        };
        rt.block_on(async move {
            let mut set = tokio::task::JoinSet::new();
            for inner in tunnels {
                set.spawn(async move { inner.stop().await });
            }
            while set.join_next().await.is_some() {}
        });
    })
    .join();

    if joined.is_err() {
        tracing::error!("shutdown thread panicked");
    }
}

fn install_hooks() {
    install_signal_hook();
    install_panic_hook();
}

#[cfg(unix)]
fn install_signal_hook() {
    use tokio::signal::unix::{signal, SignalKind};

    let spawn_result = std::thread::Builder::new().name("tunnel-signal-listener".into()).spawn(|| {
        let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!(error = %e, "failed to build signal-listener runtime");
                return;
            }
        };
        rt.block_on(async {
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };
            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "failed to install SIGINT handler");
                    return;
                }
            };
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = sigint.recv() => {}
            }
            tracing::info!("received shutdown signal, stopping all tunnels");
            shutdown_all_blocking();
            std::process::exit(0);
        });
    });

    if let Err(e) = spawn_result {
        tracing::error!(error = %e, "failed to spawn signal-listener thread");
    }
}

#[cfg(windows)]
fn install_signal_hook() {
    let spawn_result = std::thread::Builder::new().name("tunnel-signal-listener".into()).spawn(|| {
        let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!(error = %e, "failed to build signal-listener runtime");
                return;
            }
        };
        rt.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received Ctrl-C, stopping all tunnels");
                shutdown_all_blocking();
                std::process::exit(0);
            }
        });
    });

    if let Err(e) = spawn_result {
        tracing::error!(error = %e, "failed to spawn signal-listener thread");
    }
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        tracing::error!("uncaught panic, stopping all tunnels");
        shutdown_all_blocking();
        std::process::exit(1);
    }));
}
