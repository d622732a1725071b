pub mod results;
pub mod session;
pub mod vote;

pub use results::*;
pub use session::*;
pub use vote::*;
