//! Ordered acquisition tiers with early exit on the first tier that yields
//! records.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::runner::CommandRunner;
use crate::error::NetError;

#[async_trait]
pub trait Tier<T>: Send + Sync {
    /// Provenance tag stamped on records this tier produces.
    fn source(&self) -> &'static str;

    async fn acquire(&self, runner: &dyn CommandRunner) -> Result<Vec<T>, NetError>;
}

/// Try each tier in order. A failing or empty tier is logged and skipped; the
/// result is empty only when every tier came back empty.
pub async fn first_non_empty<T: Send>(
    domain: &'static str,
    tiers: &[Box<dyn Tier<T>>],
    runner: &dyn CommandRunner,
) -> Vec<T> {
    for tier in tiers {
        match tier.acquire(runner).await {
            Ok(records) if !records.is_empty() => {
                debug!(domain, tier = tier.source(), count = records.len(), "tier succeeded");
                return records;
            }
            Ok(_) => debug!(domain, tier = tier.source(), "tier returned no records"),
            Err(e) => warn!(domain, tier = tier.source(), error = %e, "tier failed, falling back"),
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::runner::testing::ScriptedRunner;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed {
        name: &'static str,
        result: fn() -> Result<Vec<u32>, NetError>,
        hits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tier<u32> for Fixed {
        fn source(&self) -> &'static str {
            self.name
        }

        async fn acquire(&self, _runner: &dyn CommandRunner) -> Result<Vec<u32>, NetError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    fn tier(
        name: &'static str,
        result: fn() -> Result<Vec<u32>, NetError>,
        hits: &Arc<AtomicUsize>,
    ) -> Box<dyn Tier<u32>> {
        Box::new(Fixed {
            name,
            result,
            hits: hits.clone(),
        })
    }

    #[tokio::test]
    async fn stops_at_first_non_empty_tier() {
        let hits = Arc::new(AtomicUsize::new(0));
        let tiers = vec![
            tier("broken", || Err(NetError::parse("json", "eof")), &hits),
            tier("empty", || Ok(vec![]), &hits),
            tier("good", || Ok(vec![7]), &hits),
            tier("never", || Ok(vec![9]), &hits),
        ];
        let runner = ScriptedRunner::new();
        let records = first_non_empty("test", &tiers, &runner).await;
        assert_eq!(records, vec![7]);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn all_empty_yields_empty() {
        let hits = Arc::new(AtomicUsize::new(0));
        let tiers = vec![tier("a", || Ok(vec![]), &hits), tier("b", || Ok(vec![]), &hits)];
        let runner = ScriptedRunner::new();
        assert!(first_non_empty("test", &tiers, &runner).await.is_empty());
    }
}
