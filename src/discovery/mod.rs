pub mod client;
pub mod local;
pub mod normalize;

pub use client::{ActionMatch, ActionSearchOptions, DiscoveryClient, SearchOptions};
pub use local::{LocalRanker, RankedTool};
pub use normalize::normalize_action_name;
