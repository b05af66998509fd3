pub mod router;

pub use router::ShardRouter;
