pub mod gateway;
pub mod lock;
pub mod repository;

pub use gateway::{BranchScope, GitGateway, RawCommit, Signature};
pub use repository::{Repository, find_repository, find_repository_in_path};

#[cfg(feature = "test-support")]
pub mod test_utils;
