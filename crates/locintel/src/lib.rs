pub mod agent;
pub mod aggregator;
pub mod errors;
pub mod models;
pub mod overlay;
pub mod prompt_template;
pub mod providers;
pub mod reducer;
pub mod session;
pub mod systems;
pub mod tracker;
