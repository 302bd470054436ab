pub mod assignment;
pub mod candidate;
pub mod lead;
pub mod rule;
pub mod timer;
