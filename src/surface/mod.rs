pub mod metamodel;
pub mod optimizer;
