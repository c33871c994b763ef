//! Deployer account funding via faucet/airdrop.
//!
//! Funding is best-effort: once the bounded airdrop attempts are
//! exhausted the deployment proceeds with whatever balance is there,
//! and an underfunded deploy fails later with the chain's own error.

use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use backon::{ConstantBuilder, Retryable};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Result, ToolchainError},
    exec::sleep_cancellable,
};

/// Grace delay before the first balance check after a network start.
const STARTUP_GRACE: Duration = Duration::from_secs(2);
/// Balance polling cadence and bound.
const BALANCE_POLL_INTERVAL: Duration = Duration::from_secs(2);
const BALANCE_POLL_ATTEMPTS: u32 = 3;
/// Airdrop retry bound (1 initial try + 2 retries).
const AIRDROP_RETRIES: usize = 2;
/// Per-request airdrop caps. Public faucets rate-limit hard, so remote
/// endpoints get a smaller cap than a local validator.
const LOCAL_AIRDROP_CAP: f64 = 10.0;
const REMOTE_AIRDROP_CAP: f64 = 2.0;

/// Snapshot of one funding round, recomputed per deployment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FundingState {
    pub minimum: f64,
    pub balance: f64,
    pub requested: f64,
    pub attempts: u32,
}

impl FundingState {
    pub fn is_sufficient(&self) -> bool {
        self.balance >= self.minimum
    }
}

/// Narrow seam over the chain's balance/faucet mechanism, so the retry
/// policy is testable without the real CLI.
#[allow(async_fn_in_trait)]
pub trait FaucetClient {
    /// Current balance of the deployer account, in the chain's display
    /// unit. Unparseable output reads as zero, never an error.
    async fn balance(&self, token: &CancellationToken) -> Result<f64>;

    /// Request `amount` from the faucet.
    async fn airdrop(&self, amount: f64, token: &CancellationToken) -> Result<()>;

    /// Whether the endpoint is a local dev network.
    fn is_local(&self) -> bool;
}

pub struct FundingManager<C> {
    client: C,
    minimum: f64,
}

impl<C: FaucetClient> FundingManager<C> {
    pub fn new(client: C, minimum: f64) -> Self {
        Self { client, minimum }
    }

    /// Bring the deployer balance up to the minimum if the faucet will
    /// cooperate. Never fails on an uncooperative faucet; only
    /// cancellation and I/O-level balance errors propagate.
    pub async fn ensure_funded(&self, token: &CancellationToken) -> Result<FundingState> {
        sleep_cancellable(STARTUP_GRACE, token, "funding grace period").await?;

        let mut balance = self.poll_balance(token).await?;
        let mut state = FundingState {
            minimum: self.minimum,
            balance,
            requested: 0.0,
            attempts: 0,
        };

        if state.is_sufficient() {
            tracing::debug!(balance, minimum = self.minimum, "account already funded");
            return Ok(state);
        }

        let cap = if self.client.is_local() {
            LOCAL_AIRDROP_CAP
        } else {
            REMOTE_AIRDROP_CAP
        };
        let shortfall = self.minimum - balance;
        let amount = shortfall.max(1.0).min(cap);
        state.requested = amount;

        tracing::info!(balance, minimum = self.minimum, amount, "requesting airdrop");

        let attempts = AtomicU32::new(0);
        let airdrop = || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            self.client.airdrop(amount, token).await?;
            let balance = self.client.balance(token).await?;
            if balance < self.minimum {
                return Err(ToolchainError::Validation(format!(
                    "balance {balance} still below minimum {}",
                    self.minimum
                )));
            }
            Ok(balance)
        };

        let outcome = airdrop
            .retry(
                ConstantBuilder::default()
                    .with_delay(BALANCE_POLL_INTERVAL)
                    .with_max_times(AIRDROP_RETRIES),
            )
            .when(|e| !matches!(e, ToolchainError::Cancelled { .. }))
            .await;

        state.attempts = attempts.load(Ordering::SeqCst);

        match outcome {
            Ok(funded) => {
                state.balance = funded;
                tracing::debug!(balance = funded, attempts = state.attempts, "account funded");
            }
            Err(ToolchainError::Cancelled { operation }) => {
                return Err(ToolchainError::Cancelled { operation });
            }
            Err(e) => {
                balance = self.client.balance(token).await.unwrap_or(balance);
                state.balance = balance;
                tracing::warn!(
                    balance,
                    minimum = self.minimum,
                    error = %e,
                    "airdrop attempts exhausted, continuing with current balance"
                );
            }
        }

        Ok(state)
    }

    /// Poll the balance a bounded number of times, accepting the first
    /// nonzero reading as proof the network answers queries.
    async fn poll_balance(&self, token: &CancellationToken) -> Result<f64> {
        let mut last = 0.0;
        for attempt in 1..=BALANCE_POLL_ATTEMPTS {
            last = self.client.balance(token).await?;
            if last > 0.0 {
                return Ok(last);
            }
            if attempt < BALANCE_POLL_ATTEMPTS {
                sleep_cancellable(BALANCE_POLL_INTERVAL, token, "balance poll").await?;
            }
        }
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    };

    struct MockFaucet {
        balances: Mutex<Vec<f64>>,
        airdrops: AtomicU32,
        airdrop_ok: bool,
        local: bool,
    }

    impl MockFaucet {
        fn new(balances: Vec<f64>, airdrop_ok: bool, local: bool) -> Self {
            Self {
                balances: Mutex::new(balances),
                airdrops: AtomicU32::new(0),
                airdrop_ok,
                local,
            }
        }
    }

    impl FaucetClient for &MockFaucet {
        async fn balance(&self, _token: &CancellationToken) -> Result<f64> {
            let mut balances = self.balances.lock().unwrap();
            Ok(if balances.len() > 1 {
                balances.remove(0)
            } else {
                balances[0]
            })
        }

        async fn airdrop(&self, _amount: f64, _token: &CancellationToken) -> Result<()> {
            self.airdrops.fetch_add(1, Ordering::SeqCst);
            if self.airdrop_ok {
                Ok(())
            } else {
                Err(ToolchainError::Validation("faucet refused".to_string()))
            }
        }

        fn is_local(&self) -> bool {
            self.local
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sufficient_balance_skips_airdrop() {
        let faucet = MockFaucet::new(vec![5.0], true, true);
        let manager = FundingManager::new(&faucet, 1.0);
        let state = manager.ensure_funded(&CancellationToken::new()).await.unwrap();
        assert!(state.is_sufficient());
        assert_eq!(faucet.airdrops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_airdrop_funds_account() {
        // zero before the airdrop, funded after
        let faucet = MockFaucet::new(vec![0.0, 0.0, 0.0, 2.0], true, true);
        let manager = FundingManager::new(&faucet, 1.0);
        let state = manager.ensure_funded(&CancellationToken::new()).await.unwrap();
        assert!(state.is_sufficient());
        assert_eq!(state.attempts, 1);
        assert_eq!(faucet.airdrops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_count_each_airdrop_round() {
        // first airdrop leaves the balance short, second tops it up
        let faucet = MockFaucet::new(vec![0.0, 0.0, 0.0, 0.5, 2.0], true, true);
        let manager = FundingManager::new(&faucet, 1.0);
        let state = manager.ensure_funded(&CancellationToken::new()).await.unwrap();
        assert!(state.is_sufficient());
        assert_eq!(state.attempts, 2);
        assert_eq!(faucet.airdrops.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_airdrop_attempts_are_bounded() {
        let faucet = MockFaucet::new(vec![0.2], false, true);
        let manager = FundingManager::new(&faucet, 1.0);
        let state = manager.ensure_funded(&CancellationToken::new()).await.unwrap();
        // failed faucet never blocks the deployment
        assert!(!state.is_sufficient());
        assert_eq!(state.attempts, 3);
        assert_eq!(faucet.airdrops.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_shortfall_continues_with_current_balance() {
        let faucet = MockFaucet::new(vec![0.5], true, true);
        let manager = FundingManager::new(&faucet, 100.0);
        let state = manager.ensure_funded(&CancellationToken::new()).await.unwrap();
        assert!(!state.is_sufficient());
        assert_eq!(state.balance, 0.5);
        assert_eq!(faucet.airdrops.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_cap_is_smaller() {
        let faucet = MockFaucet::new(vec![0.0, 0.0, 0.0, 2.0], true, false);
        let manager = FundingManager::new(&faucet, 50.0);
        let state = manager.ensure_funded(&CancellationToken::new()).await.unwrap();
        assert_eq!(state.requested, REMOTE_AIRDROP_CAP);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_propagates() {
        let faucet = MockFaucet::new(vec![5.0], true, true);
        let manager = FundingManager::new(&faucet, 1.0);
        let token = CancellationToken::new();
        token.cancel();
        let err = manager.ensure_funded(&token).await.unwrap_err();
        assert!(matches!(err, ToolchainError::Cancelled { .. }));
    }
}
