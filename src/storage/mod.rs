pub mod commitlog;

pub use commitlog::Log;

use crate::api::Record;
use crate::common::Result;

/// What the service layer needs from a log.
pub trait CommitLog: Send + Sync {
    // Appends a record, returning the offset it was assigned
    fn append(&self, record: Record) -> Result<u64>;

    // Reads the record at an offset
    fn read(&self, off: u64) -> Result<Record>;

    fn lowest_offset(&self) -> Result<u64>;

    fn highest_offset(&self) -> Result<u64>;
}
