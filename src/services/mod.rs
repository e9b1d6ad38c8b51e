pub mod sequencer;
pub mod store;
pub mod sweep;
pub mod trips;
