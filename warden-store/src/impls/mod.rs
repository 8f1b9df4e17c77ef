pub mod audit;
pub mod cases;
