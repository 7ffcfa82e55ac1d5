pub mod classifier;
pub mod probe;

pub use probe::AvailabilityExtractor;
