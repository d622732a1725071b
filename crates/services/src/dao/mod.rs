pub mod base;
pub mod session;
pub mod vote;

pub use base::BaseDao;
pub use session::SessionDao;
pub use vote::VoteDao;
