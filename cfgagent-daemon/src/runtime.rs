use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{broadcast, mpsc};

use cfgagent_core::{config, AgentConfig, LogFormat};
use cfgagent_detector::SystemProbe;
use cfgagent_sync::{PassReport, ReconciliationEngine, SapiClient};

use crate::bootstrap::bootstrap;
use crate::error::{io_err, DaemonError};

/// Bounds of the random factor applied to the poll interval.
pub const JITTER_RANGE: (f64, f64) = (0.5, 1.5);

/// How the agent was asked to run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_path: PathBuf,
    /// Run a single pass and return instead of polling.
    pub synchronous: bool,
    /// Overall deadline for synchronous mode.
    pub timeout: Option<Duration>,
}

/// Load the configuration, start the runtime and block until the agent exits.
pub fn start_blocking(options: &RunOptions) -> Result<(), DaemonError> {
    let config = config::load_at(&options.config_path)?;
    init_tracing(&config.log_level, config.log_format);
    tracing::info!(config = %options.config_path.display(), "starting config-agent");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(start(config, options))
}

async fn start(config: AgentConfig, options: &RunOptions) -> Result<(), DaemonError> {
    let client = Arc::new(SapiClient::new(&config.sapi.url, config.sapi.timeout()));
    let probe = Arc::new(SystemProbe::new());

    if options.synchronous {
        let pass = async {
            let agent = bootstrap(&config, probe, client).await?;
            run_once(&agent.engine).await
        };
        with_deadline(options.timeout, pass).await.map(|_| ())
    } else {
        let agent = bootstrap(&config, probe, client).await?;
        run(agent.engine, config.poll_interval()).await
    }
}

// ---------------------------------------------------------------------------
// One-shot
// ---------------------------------------------------------------------------

/// Run a single pass. Fails if any instance failed.
pub async fn run_once(engine: &ReconciliationEngine) -> Result<PassReport, DaemonError> {
    let report = engine.reconcile_all().await;
    report.log_summary();
    if report.is_success() {
        Ok(report)
    } else {
        Err(DaemonError::PassFailed(
            report
                .failed_instances()
                .map(|r| r.instance.to_string())
                .collect(),
        ))
    }
}

/// Abandon `fut` and fail with [`DaemonError::Timeout`] once `deadline` passes.
pub async fn with_deadline<T>(
    deadline: Option<Duration>,
    fut: impl Future<Output = Result<T, DaemonError>>,
) -> Result<T, DaemonError> {
    match deadline {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(timeout_s = limit.as_secs_f64(), "reconciliation timed out");
                Err(DaemonError::Timeout(limit))
            }
        },
        None => fut.await,
    }
}

// ---------------------------------------------------------------------------
// Periodic
// ---------------------------------------------------------------------------

/// Poll forever: a pass now, then one every `interval` (jittered), plus one per
/// `SIGUSR1`. Returns on `SIGINT` or `SIGTERM` once any running pass finishes.
pub async fn run(engine: ReconciliationEngine, interval: Duration) -> Result<(), DaemonError> {
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let (refresh_tx, refresh_rx) = mpsc::channel::<()>(1);

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = signal_task(refresh_tx, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let loop_result = run_with(engine, interval, refresh_rx, shutdown_tx.clone()).await;
    let _ = shutdown_tx.send(());
    handle_join("signal_handler", signal_handle.await)?;
    loop_result
}

/// The periodic loop with externally driven refresh and shutdown.
///
/// Scheduled passes and refresh passes run on separate tasks; the engine
/// serializes them per instance.
pub async fn run_with(
    engine: ReconciliationEngine,
    interval: Duration,
    refresh_rx: mpsc::Receiver<()>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let scheduler_handle = {
        let shutdown = shutdown_tx.clone();
        let engine = engine.clone();
        tokio::spawn(async move {
            let result = scheduler_task(engine, interval, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let refresh_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = refresh_task(engine, refresh_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let (scheduler_result, refresh_result) = tokio::join!(scheduler_handle, refresh_handle);
    handle_join("scheduler", scheduler_result)?;
    handle_join("refresh", refresh_result)?;
    Ok(())
}

async fn scheduler_task(
    engine: ReconciliationEngine,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        // A pass in flight runs to completion; shutdown is honoured between passes.
        engine.reconcile_all().await.log_summary();
        if !matches!(shutdown_rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)) {
            break;
        }

        let delay = jittered(interval);
        tracing::debug!(delay_ms = delay.as_millis() as u64, "next pass scheduled");
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    tracing::info!("scheduler stopped");
    Ok(())
}

async fn refresh_task(
    engine: ReconciliationEngine,
    mut refresh_rx: mpsc::Receiver<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            request = refresh_rx.recv() => {
                let Some(()) = request else { break };
                tracing::info!("refresh requested, running reconciliation pass");
                let report = engine.reconcile_all().await;
                report.log_summary();
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn signal_task(
    refresh_tx: mpsc::Sender<()>,
    shutdown: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut usr1 = signal(SignalKind::user_defined1())
        .map_err(|err| DaemonError::Signal(format!("SIGUSR1: {err}")))?;
    let mut term = signal(SignalKind::terminate())
        .map_err(|err| DaemonError::Signal(format!("SIGTERM: {err}")))?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = usr1.recv() => {
                if refresh_tx.try_send(()).is_err() {
                    tracing::debug!("refresh already pending");
                }
            }
            _ = term.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                let _ = shutdown.send(());
                break;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|err| DaemonError::Signal(format!("ctrl-c handler failed: {err}")))?;
                tracing::info!("received ctrl-c, shutting down");
                let _ = shutdown.send(());
                break;
            }
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn signal_task(
    _refresh_tx: mpsc::Sender<()>,
    shutdown: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    tokio::select! {
        _ = shutdown_rx.recv() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|err| DaemonError::Signal(format!("ctrl-c handler failed: {err}")))?;
            tracing::info!("received ctrl-c, shutting down");
            let _ = shutdown.send(());
        }
    }
    Ok(())
}

/// `interval` scaled by a uniform factor from [`JITTER_RANGE`].
pub fn jittered(interval: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(JITTER_RANGE.0..=JITTER_RANGE.1);
    interval.mul_f64(factor)
}

fn handle_join(
    task: &'static str,
    joined: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match joined {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(task, error = %err, "daemon task panicked");
            Err(DaemonError::Join(err))
        }
    }
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Install the global subscriber. `RUST_LOG` overrides `level`.
pub fn init_tracing(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}

/// Map the configured level name onto a tracing directive.
fn filter_directive(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "fatal" => "error".to_string(),
        other => other.to_string(),
    }
}
