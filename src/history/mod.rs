pub mod fetcher;

pub use fetcher::{
    normalize_transfers, FetcherSettings, MissingTimestampPolicy, TransferBatch, TransferFetcher,
};
