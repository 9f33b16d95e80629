pub mod branches;
pub mod changes;
pub mod lineage_handlers;
pub mod rewrite;
