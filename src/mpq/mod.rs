//! MPQ archive reader.
//!
//! StarCraft II replays are MPQ archives prefixed by a user data header that
//! carries the serialized replay header.

pub mod archive;
pub mod crypto;

pub use archive::{ArchiveHeader, BlockEntry, HashEntry, MpqArchive, MpqError, UserDataHeader};
pub use crypto::HashType;
