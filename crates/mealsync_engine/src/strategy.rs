//! Execution strategy selection.
//!
//! Each capability (sync, recommendations, health analysis) has a local and
//! a remote implementation. The selector holds the mode per capability and
//! [`execute`] runs the implementation(s) the mode calls for.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};

/// How a capability is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionMode {
    /// Local implementation only.
    #[default]
    Local,
    /// Remote implementation only.
    Remote,
    /// Remote first, local on failure.
    Hybrid,
    /// Neither implementation runs.
    Disabled,
}

/// A capability with interchangeable local and remote implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Cloud sync.
    Sync,
    /// Meal recommendations.
    Recommendation,
    /// Health analysis.
    HealthAnalysis,
}

/// Why a strategy produced no value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError<E> {
    /// The capability is disabled.
    #[error("strategy is disabled")]
    Disabled,

    /// The implementation that ran failed.
    #[error("strategy failed: {0}")]
    Failed(E),
}

/// Outcome of running a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyResult<T, E> {
    /// The selected implementation succeeded.
    Success(T),
    /// The remote failed and the local implementation supplied the value.
    Fallback {
        /// Value from the local implementation.
        value: T,
        /// The remote failure.
        cause: E,
    },
    /// No value.
    Failure(StrategyError<E>),
}

impl<T, E> StrategyResult<T, E> {
    /// Returns true for `Success` and `Fallback`.
    pub fn is_ok(&self) -> bool {
        !matches!(self, StrategyResult::Failure(_))
    }

    /// Returns true if the value came from the fallback path.
    pub fn is_fallback(&self) -> bool {
        matches!(self, StrategyResult::Fallback { .. })
    }

    /// The value, if any.
    pub fn value(self) -> Option<T> {
        match self {
            StrategyResult::Success(value) | StrategyResult::Fallback { value, .. } => Some(value),
            StrategyResult::Failure(_) => None,
        }
    }

    /// Converts into a `Result`, dropping the fallback cause.
    pub fn into_result(self) -> Result<T, StrategyError<E>> {
        match self {
            StrategyResult::Success(value) | StrategyResult::Fallback { value, .. } => Ok(value),
            StrategyResult::Failure(err) => Err(err),
        }
    }
}

/// Runs `local` and/or `remote` according to `mode`.
///
/// In `Hybrid` mode a remote failure falls back to `local`; if that fails
/// too, the remote error is returned. `Disabled` calls neither.
pub async fn execute<T, E, L, LF, R, RF>(mode: ExecutionMode, local: L, remote: R) -> StrategyResult<T, E>
where
    E: fmt::Display,
    L: FnOnce() -> LF,
    LF: Future<Output = Result<T, E>>,
    R: FnOnce() -> RF,
    RF: Future<Output = Result<T, E>>,
{
    execute_filtered(mode, local, remote, |_| true).await
}

/// Like [`execute`], but in `Hybrid` mode only remote errors accepted by
/// `can_fall_back` reach the local path. Any other error is returned as is.
pub async fn execute_filtered<T, E, L, LF, R, RF, F>(
    mode: ExecutionMode,
    local: L,
    remote: R,
    can_fall_back: F,
) -> StrategyResult<T, E>
where
    E: fmt::Display,
    L: FnOnce() -> LF,
    LF: Future<Output = Result<T, E>>,
    R: FnOnce() -> RF,
    RF: Future<Output = Result<T, E>>,
    F: FnOnce(&E) -> bool,
{
    match mode {
        ExecutionMode::Local => match local().await {
            Ok(value) => StrategyResult::Success(value),
            Err(err) => StrategyResult::Failure(StrategyError::Failed(err)),
        },
        ExecutionMode::Remote => match remote().await {
            Ok(value) => StrategyResult::Success(value),
            Err(err) => StrategyResult::Failure(StrategyError::Failed(err)),
        },
        ExecutionMode::Hybrid => match remote().await {
            Ok(value) => StrategyResult::Success(value),
            Err(cause) if !can_fall_back(&cause) => {
                debug!(error = %cause, "remote error not eligible for fallback");
                StrategyResult::Failure(StrategyError::Failed(cause))
            }
            Err(cause) => {
                warn!(error = %cause, "remote strategy failed, falling back to local");
                match local().await {
                    Ok(value) => StrategyResult::Fallback { value, cause },
                    Err(local_err) => {
                        debug!(error = %local_err, "local fallback failed");
                        StrategyResult::Failure(StrategyError::Failed(cause))
                    }
                }
            }
        },
        ExecutionMode::Disabled => StrategyResult::Failure(StrategyError::Disabled),
    }
}

/// Holds the execution mode of every capability. All modes start `Local`.
#[derive(Debug, Default)]
pub struct StrategySelector {
    modes: RwLock<HashMap<Capability, ExecutionMode>>,
}

impl StrategySelector {
    /// Creates a selector with every capability local.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the mode of a capability.
    pub fn set_mode(&self, capability: Capability, mode: ExecutionMode) {
        debug!(?capability, ?mode, "execution mode changed");
        self.modes.write().insert(capability, mode);
    }

    /// Mode of a capability.
    pub fn mode(&self, capability: Capability) -> ExecutionMode {
        self.modes
            .read()
            .get(&capability)
            .copied()
            .unwrap_or_default()
    }

    /// Switches a capability to remote-first with local fallback.
    pub fn enable_remote(&self, capability: Capability) {
        self.set_mode(capability, ExecutionMode::Hybrid);
    }

    /// Switches a capability back to local.
    pub fn disable_remote(&self, capability: Capability) {
        self.set_mode(capability, ExecutionMode::Local);
    }

    /// Switches every capability back to local, e.g. on sign-out.
    pub fn reset_to_local(&self) {
        self.modes.write().clear();
    }

    /// Returns true if the capability may use the network.
    pub fn is_remote_enabled(&self, capability: Capability) -> bool {
        matches!(
            self.mode(capability),
            ExecutionMode::Remote | ExecutionMode::Hybrid
        )
    }

    /// Runs a capability in its current mode.
    pub async fn execute<T, E, L, LF, R, RF>(
        &self,
        capability: Capability,
        local: L,
        remote: R,
    ) -> StrategyResult<T, E>
    where
        E: fmt::Display,
        L: FnOnce() -> LF,
        LF: Future<Output = Result<T, E>>,
        R: FnOnce() -> RF,
        RF: Future<Output = Result<T, E>>,
    {
        execute(self.mode(capability), local, remote).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn ok(value: u32) -> Result<u32, String> {
        Ok(value)
    }

    async fn fail(message: &str) -> Result<u32, String> {
        Err(message.to_string())
    }

    #[tokio::test]
    async fn local_and_remote_modes_run_one_side() {
        let result = execute(ExecutionMode::Local, || ok(1), || ok(2)).await;
        assert_eq!(result, StrategyResult::Success(1));

        let result = execute(ExecutionMode::Remote, || ok(1), || ok(2)).await;
        assert_eq!(result, StrategyResult::Success(2));

        let result = execute(ExecutionMode::Remote, || ok(1), || fail("offline")).await;
        assert_eq!(
            result,
            StrategyResult::Failure(StrategyError::Failed("offline".into()))
        );
    }

    #[tokio::test]
    async fn hybrid_prefers_remote() {
        let result = execute(ExecutionMode::Hybrid, || ok(1), || ok(2)).await;
        assert_eq!(result, StrategyResult::Success(2));
        assert!(!result.is_fallback());
    }

    #[tokio::test]
    async fn hybrid_falls_back_to_local() {
        let result = execute(ExecutionMode::Hybrid, || ok(1), || fail("timeout")).await;
        assert!(result.is_fallback());
        assert_eq!(
            result,
            StrategyResult::Fallback {
                value: 1,
                cause: "timeout".into()
            }
        );
    }

    #[tokio::test]
    async fn hybrid_reports_remote_error_when_both_fail() {
        let result = execute(ExecutionMode::Hybrid, || fail("disk"), || fail("timeout")).await;
        assert_eq!(
            result,
            StrategyResult::Failure(StrategyError::Failed("timeout".into()))
        );
    }

    #[tokio::test]
    async fn hybrid_filter_skips_fallback() {
        let calls = AtomicUsize::new(0);
        let result = execute_filtered(
            ExecutionMode::Hybrid,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                ok(1)
            },
            || fail("cancelled"),
            |cause: &String| cause != "cancelled",
        )
        .await;

        assert_eq!(
            result,
            StrategyResult::Failure(StrategyError::Failed("cancelled".into()))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let result = execute_filtered(
            ExecutionMode::Hybrid,
            || ok(1),
            || fail("timeout"),
            |cause: &String| cause != "cancelled",
        )
        .await;
        assert!(result.is_fallback());
    }

    #[tokio::test]
    async fn disabled_calls_nothing() {
        let calls = AtomicUsize::new(0);
        let result = execute(
            ExecutionMode::Disabled,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                ok(1)
            },
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                ok(2)
            },
        )
        .await;

        assert_eq!(result, StrategyResult::Failure(StrategyError::Disabled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn selector_modes() {
        let selector = StrategySelector::new();
        assert_eq!(selector.mode(Capability::Sync), ExecutionMode::Local);
        assert!(!selector.is_remote_enabled(Capability::Sync));

        selector.enable_remote(Capability::Sync);
        selector.set_mode(Capability::HealthAnalysis, ExecutionMode::Remote);
        assert_eq!(selector.mode(Capability::Sync), ExecutionMode::Hybrid);
        assert!(selector.is_remote_enabled(Capability::HealthAnalysis));
        assert_eq!(selector.mode(Capability::Recommendation), ExecutionMode::Local);

        let value = selector
            .execute(Capability::Sync, || ok(1), || ok(2))
            .await
            .value();
        assert_eq!(value, Some(2));

        selector.disable_remote(Capability::Sync);
        assert_eq!(selector.mode(Capability::Sync), ExecutionMode::Local);

        selector.reset_to_local();
        assert_eq!(selector.mode(Capability::HealthAnalysis), ExecutionMode::Local);
    }
}
