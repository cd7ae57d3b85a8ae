//! Extractors: one request per monitored point or location, decoded into
//! reading rows. Failures skip the item rather than aborting the run.

pub mod traffic;
pub mod weather;

pub use traffic::{extract_point, extract_traffic};
pub use weather::{extract_location, extract_weather};
