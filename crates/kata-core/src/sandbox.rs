//! Bounded-time, bounded-memory execution of one untrusted snippet.
//!
//! Each invocation gets a dedicated worker on the blocking pool with its own
//! output buffer and resource limits; nothing is shared between invocations.
//! The caller races the worker against a wall-clock timeout. On timeout the
//! shared kill flag is raised and the caller returns immediately; the worker
//! observes the flag at its next tick and unwinds on its own, so cleanup is
//! asynchronous and best-effort. All failures, including worker panics, come
//! back as data inside the [`ExecutionResult`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::core_types::{ClassifiedError, ErrorCategory, ExecOptions, ExecutionResult};
use crate::interp::{self, ExecLimits};

pub struct Sandbox {
    max_call_depth: usize,
    output_limit_bytes: usize,
    executions: AtomicU64,
}

impl Sandbox {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_call_depth: config.max_call_depth,
            output_limit_bytes: config.output_limit_bytes,
            executions: AtomicU64::new(0),
        }
    }

    /// Number of worker dispatches since construction. Used by callers to
    /// assert that gated or denied submissions never reached execution.
    pub fn execution_count(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    /// Run one snippet to completion, fault, or timeout. Never errors.
    pub async fn run(&self, source: &str, options: &ExecOptions) -> ExecutionResult {
        let started = Instant::now();

        // Empty and whitespace-only submissions are valid no-ops.
        if source.trim().is_empty() {
            return ExecutionResult::success(None, String::new(), elapsed_ms(started));
        }

        self.executions.fetch_add(1, Ordering::Relaxed);
        let kill = Arc::new(AtomicBool::new(false));
        let limits = ExecLimits {
            deadline: started + options.timeout,
            kill: kill.clone(),
            memory_ceiling_bytes: options.memory_ceiling_bytes,
            max_call_depth: self.max_call_depth,
            output_limit_bytes: self.output_limit_bytes,
        };
        let snippet = source.to_string();
        let capture = options.capture_output;
        let worker =
            tokio::task::spawn_blocking(move || interp::run_program(&snippet, limits, capture));

        match tokio::time::timeout(options.timeout, worker).await {
            Ok(Ok((outcome, output))) => {
                let elapsed = elapsed_ms(started);
                match outcome {
                    Ok(value) => ExecutionResult::success(Some(value), output, elapsed),
                    Err(error) => ExecutionResult::failure(error, output, elapsed),
                }
            }
            Ok(Err(join_error)) => {
                log::error!("sandbox worker failed: {}", join_error);
                let message = if join_error.is_panic() {
                    "execution worker panicked"
                } else {
                    "execution worker was cancelled"
                };
                ExecutionResult::failure(
                    ClassifiedError::new(ErrorCategory::UnknownRuntime, message),
                    String::new(),
                    elapsed_ms(started),
                )
            }
            Err(_) => {
                // Tell the worker to stop and return without waiting for it.
                kill.store(true, Ordering::Relaxed);
                log::debug!("execution timed out after {:?}", options.timeout);
                ExecutionResult::failure(
                    ClassifiedError::new(
                        ErrorCategory::Timeout,
                        format!("limit of {}ms", options.timeout.as_millis()),
                    ),
                    String::new(),
                    options.timeout.as_millis() as u64,
                )
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
