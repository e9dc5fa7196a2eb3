//! L4: the image container, loader, address converter, and builder.

pub mod address_converter;
pub mod builder;
pub mod checksum;
pub mod container;
pub mod loader;

pub use address_converter::AddressConverter;
pub use container::Image;
pub use loader::{load, LoadOptions, LoadResult};
