pub mod align;
pub mod comparison;
pub mod distance;
