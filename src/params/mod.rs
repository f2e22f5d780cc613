//! Parameter mapping: descriptor registry, sanitization and the mapper that
//! turns filter state into remote named parameters.

pub mod descriptor;
pub mod mapper;
pub mod sanitize;

pub use descriptor::{DescriptorRegistry, QueryDescriptor};
pub use mapper::{translate_key, ParameterMapper};
pub use sanitize::{is_blank, sanitize_value};
