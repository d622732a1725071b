pub mod results;
pub mod sessions;
pub mod stats;
pub mod votes;
