//! Ordered registry of site strategies.

use tracing::debug;

use super::LinkStrategy;

/// Site strategies in registration order.
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn LinkStrategy>>,
}

impl StrategyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Appends a strategy; earlier registrations contribute links first.
    #[tracing::instrument(skip(self, strategy), fields(strategy_name))]
    pub fn register(&mut self, strategy: Box<dyn LinkStrategy>) {
        tracing::Span::current().record("strategy_name", strategy.name());
        debug!(name = strategy.name(), "registering link strategy");
        self.strategies.push(strategy);
    }

    /// Returns the number of registered strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true if no strategies are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategies that apply to `host`, in registration order.
    pub fn matching<'a>(&'a self, host: &'a str) -> impl Iterator<Item = &'a dyn LinkStrategy> {
        self.strategies
            .iter()
            .filter(move |strategy| strategy.matches(host))
            .map(|strategy| &**strategy)
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("StrategyRegistry")
            .field("strategy_count", &self.strategies.len())
            .field("strategies", &names)
            .finish()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
