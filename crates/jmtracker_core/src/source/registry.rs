//! Ordered, origin-indexed collection of source descriptors.

use crate::error::ConfigurationError;
use crate::source::descriptor::SourceDescriptor;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of all sources known to one process.
///
/// Iteration order is declaration order; lookups by origin are O(1).
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<SourceDescriptor>>,
    index: HashMap<String, usize>,
}

impl SourceRegistry {
    /// Builds a registry, rejecting duplicate origins.
    pub fn new(descriptors: Vec<SourceDescriptor>) -> Result<Self, ConfigurationError> {
        let mut registry = Self::default();
        for descriptor in descriptors {
            registry.push(descriptor)?;
        }
        Ok(registry)
    }

    /// Combines default and custom descriptors.
    ///
    /// With `custom_overrides_default`, a custom descriptor replaces the
    /// default with the same origin in place. Otherwise a colliding custom
    /// descriptor is registered as `"{origin}-custom"`. Custom descriptors
    /// with fresh origins are appended either way.
    pub fn with_custom(
        defaults: Vec<SourceDescriptor>,
        custom: Vec<SourceDescriptor>,
        custom_overrides_default: bool,
    ) -> Result<Self, ConfigurationError> {
        let mut registry = Self::new(defaults)?;
        let mut seen_custom = HashMap::new();
        for descriptor in custom {
            let origin = descriptor.origin().to_string();
            if seen_custom.insert(origin.clone(), ()).is_some() {
                return Err(ConfigurationError::DuplicateOrigin(origin));
            }
            match registry.index.get(&origin).copied() {
                Some(position) if custom_overrides_default => {
                    log::info!(
                        "event=registry_build module=source status=ok origin={} action=override",
                        origin
                    );
                    registry.sources[position] = Arc::new(descriptor);
                }
                Some(_) => {
                    let alias = format!("{origin}-custom");
                    log::warn!(
                        "event=registry_build module=source status=warn origin={} action=rename alias={}",
                        origin,
                        alias
                    );
                    registry.push(descriptor.renamed(&alias)?)?;
                }
                None => registry.push(descriptor)?,
            }
        }
        Ok(registry)
    }

    fn push(&mut self, descriptor: SourceDescriptor) -> Result<(), ConfigurationError> {
        let origin = descriptor.origin().to_string();
        if origin.is_empty() {
            return Err(ConfigurationError::EmptyOrigin);
        }
        if self.index.contains_key(&origin) {
            return Err(ConfigurationError::DuplicateOrigin(origin));
        }
        self.index.insert(origin, self.sources.len());
        self.sources.push(Arc::new(descriptor));
        Ok(())
    }

    /// Looks up one descriptor; a miss is a configuration error.
    pub fn get(&self, origin: &str) -> Result<Arc<SourceDescriptor>, ConfigurationError> {
        let origin = origin.trim();
        self.index
            .get(origin)
            .map(|position| Arc::clone(&self.sources[*position]))
            .ok_or_else(|| ConfigurationError::UnknownOrigin(origin.to_string()))
    }

    pub fn contains(&self, origin: &str) -> bool {
        self.index.contains_key(origin.trim())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SourceDescriptor>> {
        self.sources.iter()
    }

    /// Returns origins in declaration order.
    pub fn origins(&self) -> Vec<String> {
        self.sources
            .iter()
            .map(|source| source.origin().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::SourceRegistry;
    use crate::error::ConfigurationError;
    use crate::loader::CsvLoader;
    use crate::source::descriptor::SourceDescriptor;

    fn csv_source(origin: &str, extension: &str) -> SourceDescriptor {
        SourceDescriptor::builder(origin)
            .expected_extension(extension)
            .loader(CsvLoader::new())
            .build()
            .expect("descriptor should build")
    }

    #[test]
    fn rejects_duplicate_origins() {
        let err = SourceRegistry::new(vec![csv_source("A", "csv"), csv_source("A", "csv")])
            .unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateOrigin("A".to_string()));
    }

    #[test]
    fn lookup_miss_is_configuration_error() {
        let registry = SourceRegistry::new(vec![csv_source("A", "csv")]).unwrap();
        assert!(registry.get(" A ").is_ok());
        assert_eq!(
            registry.get("B").unwrap_err(),
            ConfigurationError::UnknownOrigin("B".to_string())
        );
    }

    #[test]
    fn custom_override_replaces_in_place() {
        let registry = SourceRegistry::with_custom(
            vec![csv_source("A", "csv"), csv_source("B", "csv")],
            vec![csv_source("A", "tsv"), csv_source("C", "csv")],
            true,
        )
        .unwrap();
        assert_eq!(registry.origins(), vec!["A", "B", "C"]);
        assert_eq!(registry.get("A").unwrap().expected_extension(), "tsv");
    }

    #[test]
    fn custom_without_override_is_renamed() {
        let registry = SourceRegistry::with_custom(
            vec![csv_source("A", "csv")],
            vec![csv_source("A", "tsv")],
            false,
        )
        .unwrap();
        assert_eq!(registry.origins(), vec!["A", "A-custom"]);
        assert_eq!(registry.get("A").unwrap().expected_extension(), "csv");
        assert_eq!(registry.get("A-custom").unwrap().expected_extension(), "tsv");
    }

    #[test]
    fn duplicate_custom_origins_are_rejected() {
        let err = SourceRegistry::with_custom(
            Vec::new(),
            vec![csv_source("X", "csv"), csv_source("X", "csv")],
            true,
        )
        .unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateOrigin("X".to_string()));
    }
}
