pub mod allocation;
pub mod location;
pub mod lot;
