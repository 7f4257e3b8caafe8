//! Price data: fetcher trait, providers, and date alignment

pub mod align;
pub mod provider;
pub mod synthetic;
pub mod yahoo;

pub use align::{align_pair, common_span, AlignedPair};
pub use provider::{
    Adjustment, DataError, DataSource, FetchRequest, Interval, PriceFetcher, PricePoint,
    PriceSeries,
};
pub use synthetic::SyntheticProvider;
pub use yahoo::YahooProvider;
