pub mod audit;
pub mod case;
