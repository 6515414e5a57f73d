pub mod cache;
pub mod resolver;

pub use cache::TimedCache;
pub use resolver::{closest_sample, run_cache_sweeper, PriceResolver, ResolverSettings};
