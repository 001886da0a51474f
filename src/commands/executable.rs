use crate::frame::Frame;
use crate::store::Store;

/// Runs a parsed command against the store and produces the reply. Arguments were validated while
/// parsing, so execution itself cannot fail; problems a client must hear about are returned as
/// `Frame::Error`.
pub trait Executable {
    fn exec(self, store: &Store) -> Frame;
}
