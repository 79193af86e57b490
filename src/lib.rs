//! HOMELOG - a durable, segmented commit log served over gRPC.

pub mod api;
pub mod common;
pub mod server;
pub mod storage;
