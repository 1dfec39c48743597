//! Knowledge context: the external retriever port and prompt fusion.

pub mod fuser;
pub mod retriever;

pub use fuser::ContextFuser;
pub use retriever::{BoxRetriever, Retriever};
