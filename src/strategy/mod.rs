pub mod implementations;
pub mod stats;
pub mod traits;
