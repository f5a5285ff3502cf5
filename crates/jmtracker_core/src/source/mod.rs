//! Source configuration layer.
//!
//! # Responsibility
//! - Describe each origin system as data ([`SourceDescriptor`]).
//! - Assemble defaults and user-declared sources into a [`SourceRegistry`].
//!
//! # See also
//! - `normalize` for how descriptors drive column mapping.

pub mod custom;
pub mod defaults;
pub mod descriptor;
pub mod generators;
pub mod registry;

pub use custom::{load_custom_sources, parse_custom_sources, CustomSourceSpec, LoaderSpec};
pub use defaults::{default_sources, default_sources_with_scraper, AEA, AJO, EJM};
pub use descriptor::{DownloadInfo, SourceDescriptor, SourceDescriptorBuilder};
pub use generators::{Generator, GeneratorError, JoinColumns, UrlTemplate};
pub use registry::SourceRegistry;
