pub mod allocator;
pub mod recalc;
