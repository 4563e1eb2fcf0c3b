mod health;
pub mod sizes;

pub use health::health_check;
pub use sizes::{count_sizes, method_not_allowed};
