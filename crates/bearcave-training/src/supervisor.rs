//! Subprocess supervision for one training job.
//!
//! A supervisor owns exactly one external trainer process. Its combined
//! stdout+stderr is read line by line on a single dedicated thread, which
//! applies the progress parser under the state lock. Callers on any other
//! thread observe the job through cloned snapshots; the terminal state is
//! resolved from the process exit code, never from log lines alone.

use crate::config::TrainingConfig;
use crate::dataset;
use crate::error::{TrainingError, TrainingResult};
use crate::progress::TrainingProgress;
use crate::status::TrainingStatus;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long a stop request waits for graceful termination before forcing.
const STOP_GRACE: Duration = Duration::from_secs(10);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Invoked with a state snapshot after every output line that updated at
/// least one field. Runs on the reader thread, so it must stay cheap.
pub type ProgressCallback = Box<dyn Fn(&TrainingProgress) + Send + Sync>;

/// How to invoke the external trainer. The job-specific arguments produced by
/// [`TrainingConfig::to_trainer_args`] are appended after `leading_args`.
#[derive(Debug, Clone)]
pub struct TrainerCommand {
    pub program: PathBuf,
    pub leading_args: Vec<String>,
}

impl Default for TrainerCommand {
    fn default() -> Self {
        Self {
            program: PathBuf::from("python3"),
            leading_args: vec!["-m".to_string(), "kohya_ss.train_network".to_string()],
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Supervisor for a single trainer process.
///
/// One-shot: a supervisor that has left `Idle` cannot be started again.
pub struct TrainingSupervisor {
    command: TrainerCommand,
    state: Arc<Mutex<TrainingProgress>>,
    child: Arc<Mutex<Option<Child>>>,
    stop_requested: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TrainingSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingSupervisor")
            .field("command", &self.command)
            .field("status", &lock(&self.state).status)
            .finish_non_exhaustive()
    }
}

impl TrainingSupervisor {
    #[must_use]
    pub fn new(command: TrainerCommand) -> Self {
        Self {
            command,
            state: Arc::new(Mutex::new(TrainingProgress::default())),
            child: Arc::new(Mutex::new(None)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
        }
    }

    /// Verifies the training environment and creates output directories.
    ///
    /// Idempotent; also used standalone for dry runs. Returns the number of
    /// recognized training images.
    pub fn prepare(&self, config: &TrainingConfig) -> TrainingResult<usize> {
        std::fs::create_dir_all(&config.output_dir)?;
        std::fs::create_dir_all(&config.logging_dir)?;

        if !config.train_data_dir.is_dir() {
            return Err(TrainingError::Validation(format!(
                "training data directory does not exist: {}",
                config.train_data_dir.display()
            )));
        }

        let image_count = dataset::count_images(&config.train_data_dir);
        if image_count == 0 {
            return Err(TrainingError::Validation(format!(
                "no training images found in: {}",
                config.train_data_dir.display()
            )));
        }

        info!(images = image_count, dir = %config.train_data_dir.display(), "training environment prepared");
        Ok(image_count)
    }

    /// Spawns the trainer process and the dedicated reader thread.
    ///
    /// Fails if this supervisor has already been started. Expects `prepare`
    /// to have run; does not re-validate the input directory.
    pub fn start(
        &self,
        config: &TrainingConfig,
        on_update: Option<ProgressCallback>,
    ) -> TrainingResult<()> {
        {
            let mut state = lock(&self.state);
            if state.status != TrainingStatus::Idle {
                return Err(TrainingError::Launch(format!(
                    "trainer already started (status: {})",
                    state.status
                )));
            }
            state.status = TrainingStatus::Starting;
        }

        let args = config.to_trainer_args();
        debug!(program = %self.command.program.display(), ?args, "launching trainer");

        // One pipe carries both stdout and stderr so a single reader thread
        // sees the combined stream in production order.
        let (pipe_reader, pipe_writer) = std::io::pipe().map_err(|e| {
            TrainingError::Launch(format!("failed to create output pipe: {e}"))
        })?;
        let stderr_writer = pipe_writer.try_clone().map_err(|e| {
            TrainingError::Launch(format!("failed to clone output pipe: {e}"))
        })?;

        let mut command = Command::new(&self.command.program);
        command
            .args(&self.command.leading_args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(pipe_writer)
            .stderr(stderr_writer);

        // Own process group so a stop can take down trainer subprocesses too.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let mut state = lock(&self.state);
                state.status = TrainingStatus::Error;
                state.error_message = format!("failed to spawn trainer: {e}");
                return Err(TrainingError::Launch(state.error_message.clone()));
            }
        };
        // Parent copies of the pipe writers die with `command` at the end of
        // this scope; after that only the child holds them, so the reader
        // sees EOF exactly when the process tree exits.
        drop(command);

        info!(pid = child.id(), "trainer process started");
        *lock(&self.child) = Some(child);
        lock(&self.state).status = TrainingStatus::Training;

        let state = Arc::clone(&self.state);
        let child_slot = Arc::clone(&self.child);
        let stop_requested = Arc::clone(&self.stop_requested);
        let handle = std::thread::Builder::new()
            .name("trainer-reader".to_string())
            .spawn(move || {
                read_trainer_output(pipe_reader, &state, &child_slot, &stop_requested, on_update);
            })
            .map_err(|e| TrainingError::Launch(format!("failed to spawn reader thread: {e}")))?;
        *lock(&self.reader) = Some(handle);

        Ok(())
    }

    /// Snapshot of the current progress state. Never blocks on process I/O.
    #[must_use]
    pub fn poll(&self) -> TrainingProgress {
        lock(&self.state).clone()
    }

    /// Requests termination: graceful signal, bounded grace period, then kill.
    ///
    /// Fails without side effects if the process already exited (or never
    /// started). On success the job's terminal status is `Stopped`.
    pub fn stop(&self) -> TrainingResult<()> {
        let mut child_guard = lock(&self.child);
        let Some(child) = child_guard.as_mut() else {
            return Err(TrainingError::Stop("no training process is running".to_string()));
        };
        if child.try_wait()?.is_some() {
            return Err(TrainingError::Stop("training process already exited".to_string()));
        }

        // Set before signalling so the reader thread resolves to Stopped.
        self.stop_requested.store(true, Ordering::SeqCst);
        info!(pid = child.id(), "stopping trainer");
        request_terminate(child);

        let deadline = Instant::now() + STOP_GRACE;
        loop {
            if child.try_wait()?.is_some() {
                break;
            }
            if Instant::now() >= deadline {
                warn!(pid = child.id(), "trainer ignored termination request, killing");
                child.kill()?;
                child.wait()?;
                break;
            }
            std::thread::sleep(STOP_POLL_INTERVAL);
        }
        drop(child_guard);

        let mut state = lock(&self.state);
        if !state.status.is_terminal() {
            state.status = TrainingStatus::Stopped;
        }
        Ok(())
    }

    /// Blocks until the reader thread has finished, for tests and shutdown.
    pub fn wait_for_reader(&self) {
        if let Some(handle) = lock(&self.reader).take() {
            let _ = handle.join();
        }
    }
}

/// Reader-thread body: scrape lines until EOF, then resolve the terminal
/// state from the exit code.
fn read_trainer_output(
    pipe_reader: std::io::PipeReader,
    state: &Mutex<TrainingProgress>,
    child_slot: &Mutex<Option<Child>>,
    stop_requested: &AtomicBool,
    on_update: Option<ProgressCallback>,
) {
    let reader = BufReader::new(pipe_reader);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        debug!(line = %line, "trainer output");

        let snapshot = {
            let mut progress = lock(state);
            progress.log.push_str(&line);
            progress.log.push('\n');
            progress.apply_line(&line).then(|| progress.clone())
        };
        if let (Some(callback), Some(snapshot)) = (&on_update, snapshot) {
            callback(&snapshot);
        }
    }

    // Reap without holding the child lock across a blocking wait, so a
    // concurrent stop request is never locked out.
    let exit = loop {
        let mut guard = lock(child_slot);
        match guard.as_mut() {
            None => break None,
            Some(child) => match child.try_wait() {
                Ok(Some(exit_status)) => break Some(Ok(exit_status)),
                Ok(None) => {}
                Err(e) => break Some(Err(e)),
            },
        }
        drop(guard);
        std::thread::sleep(Duration::from_millis(50));
    };

    let mut progress = lock(state);
    match exit {
        Some(Ok(exit_status)) => {
            if stop_requested.load(Ordering::SeqCst) {
                progress.status = TrainingStatus::Stopped;
                info!("training stopped by request");
            } else if exit_status.success() {
                // Exit code is authoritative: a clean exit wins over any
                // error-looking log line seen along the way.
                progress.status = TrainingStatus::Completed;
                progress.error_message.clear();
                info!("training completed");
            } else {
                progress.status = TrainingStatus::Error;
                if progress.error_message.is_empty() {
                    progress.error_message = format!("trainer exited with {exit_status}");
                }
                error!(%exit_status, "training failed");
            }
        }
        Some(Err(e)) => {
            progress.status = TrainingStatus::Error;
            progress.error_message = format!("failed to wait for trainer: {e}");
            error!(error = %e, "failed to wait for trainer");
        }
        None => {
            // Child slot emptied before exit; treat as stopped.
            progress.status = TrainingStatus::Stopped;
        }
    }
}

#[cfg(unix)]
fn request_terminate(child: &Child) {
    // SIGTERM the whole process group (negative pid) for a graceful shutdown.
    #[allow(unsafe_code)]
    unsafe {
        libc::kill(-(child.id() as i32), libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn request_terminate(child: &mut Child) {
    let _ = child.kill();
}
