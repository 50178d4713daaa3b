//! Command implementations for OxiBak CLI.

pub mod cat;
pub mod diff;
pub mod entries;
pub mod list;
pub mod transfer;
pub mod verify;

pub use cat::cmd_cat;
pub use diff::cmd_diff;
pub use entries::cmd_entries;
pub use list::{ListOptions, cmd_list};
pub use transfer::{cmd_pack, cmd_unpack};
pub use verify::cmd_verify;
