//! Client-side stack of the stripefs teaching file system.
//!
//! Four layers, leaves first:
//!
//!   + Transport: one RPC endpoint per block server, with socket timeouts
//!     and reconnect.
//!   + Striped store: the logical block space, RAID-5 striping with rotating
//!     parity, the write-through cache, the last-writer stamp and the
//!     cross-client lock, plus on-the-fly reconstruction when one server is
//!     down.
//!   + Metadata: inode table, free-block bitmap, directories, path
//!     resolution, all of it ordinary block I/O through the store.
//!   + File operations: create/read/write/unlink and friends, the calls the
//!     interactive shell wraps in acquire/release.
//!
//! Every piece of persistent state lives in the logical block space; no
//! client-side state survives except the cache, which the coherence
//! protocol invalidates whenever another client wrote.

pub use self::{
    error::FsError,
    fs::FileSystem,
    store::{BlockClient, DumpError},
    transport::{BlockTransport, TcpTransport, TransportError},
};

mod error;
pub mod fs;
pub mod store;
pub mod transport;
