use std::{fmt::Display, future::Future};

use tracing::{error, info};

/// Attempt budget for calls to external collaborators.
///
/// Every failure is treated the same: log it, run the recovery callback (for
/// example rebuild an HTTP client), then try again. Once the budget is spent the
/// caller's fallback value is returned and the error is swallowed.
///
/// This is blunt on purpose. It does not distinguish a provider outage from a
/// bug in the adapter; both degrade to "no data this cycle". Panics are not
/// caught.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub tries: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { tries: 2 }
    }
}

impl RetryPolicy {
    pub fn new(tries: usize) -> Self {
        Self { tries }
    }

    /// Run `op` up to `tries` times, calling `recover` after each failure.
    pub async fn run<T, E, Op, Fut, Rec, RecFut>(
        &self,
        what: &str,
        mut op: Op,
        mut recover: Rec,
        fallback: T,
    ) -> T
    where
        E: Display,
        Op: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        Rec: FnMut() -> RecFut,
        RecFut: Future<Output = ()>,
    {
        for attempt in 1..=self.tries {
            match op().await {
                Ok(v) => return v,
                Err(e) => {
                    error!(call = what, attempt, tries = self.tries, error = %e, "external call failed");
                    info!(call = what, "running recovery before retry");
                    recover().await;
                }
            }
        }
        info!(call = what, "retries exhausted, using fallback");
        fallback
    }
}
