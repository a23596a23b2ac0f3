pub mod lp;
pub mod store;
