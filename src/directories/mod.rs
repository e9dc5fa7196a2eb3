//! L5: directory parsers. Each one is handed a ref-buffer already carved
//! out of a loaded image (typically via the address converter) and decodes
//! it independently of the rest of the image.

pub mod bound_import;
pub mod debug;
pub mod dotnet;
pub mod load_config;
pub mod relocations;
pub mod resources;
pub mod security;

pub use bound_import::BoundImportErrc;
pub use debug::DebugDirectoryErrc;
pub use dotnet::DotnetDirectoryErrc;
pub use load_config::LoadConfigErrc;
pub use relocations::RelocationErrc;
pub use resources::message_table::MessageTableErrc;
pub use resources::tree::ResourceErrc;
pub use resources::version_info::VersionInfoErrc;
pub use security::SecurityErrc;
