pub mod demand;
pub mod params;
pub mod reporting;
