//! Domain types: bars, pairs, timeframes, account state, fundamental bias.

pub mod account;
pub mod bar;
pub mod bias;
pub mod pair;
pub mod series;

pub use account::AccountState;
pub use bar::Bar;
pub use bias::FundamentalBias;
pub use pair::{Direction, Pair, Timeframe, TrendDirection};
pub use series::{BarSeries, SeriesError};
