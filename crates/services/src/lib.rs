pub mod bus;
pub mod cache;
pub mod dao;
pub mod infra;
pub mod pipeline;
pub mod realtime;
pub mod session;
pub mod store;

pub use dao::{BaseDao, SessionDao, VoteDao};
pub use infra::{Infrastructure, Services};
pub use session::{NewQuestion, NewSession, SessionService};
