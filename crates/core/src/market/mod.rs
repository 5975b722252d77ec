//! Market data facade.
//!
//! Wraps the resolver, verification engine and trust scorer behind one
//! service object built from [`Config`](crate::config::Config).

mod service;
mod traits;

pub use service::MarketDataService;
pub use traits::MarketDataServiceTrait;
