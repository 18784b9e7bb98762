pub mod balance_aggregator;
pub mod debt_simplifier;
pub mod settlement_fingerprint;
pub mod split_builder;

pub use balance_aggregator::{BalanceAccumulator, BalanceAggregator};
pub use debt_simplifier::{DebtSimplifier, apply_transfers};
pub use settlement_fingerprint::SettlementFingerprint;
pub use split_builder::SplitBuilder;
