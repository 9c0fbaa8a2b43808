pub mod forecast;
pub mod optimization;
pub mod solver;
pub mod traits;
