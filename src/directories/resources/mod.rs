//! Resources: the type/name/language directory tree, plus the two
//! resource kinds this crate decodes further, `VS_VERSIONINFO` and message
//! tables.

pub mod message_table;
pub mod tree;
pub mod version_info;
