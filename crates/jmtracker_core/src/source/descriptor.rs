//! Declarative per-source configuration.
//!
//! # Responsibility
//! - Bind loader, validators, rename rules, drop list and generators for one
//!   origin into a single immutable value.
//! - Reject misconfigured descriptors at construction time.
//!
//! # Invariants
//! - `origin` is non-empty and trimmed.
//! - Rename rules are one-to-one and never target a protected column.
//! - Generators only target canonical or protected columns.

use crate::error::ConfigurationError;
use crate::loader::{ScrapeAction, SourceLoader};
use crate::model::columns::{self, LOCATION, ORIGIN_ID, REQUIRED_COLUMNS, URL};
use crate::model::record::NormalizedBatch;
use crate::model::table::RawTable;
use crate::source::generators::Generator;
use crate::validate::checks::normalize_extension;
use crate::validate::{ExtensionCheck, RequiredColumnsCheck, UniqueIdCheck, Validator};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

/// Instructions shown to users for obtaining a source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadInfo {
    pub url: Option<String>,
    pub instructions: String,
    /// File name of the cached copy kept in the input directory.
    pub input_file_name: Option<String>,
}

/// Static configuration for one origin system.
pub struct SourceDescriptor {
    origin: String,
    expected_extension: String,
    renaming_rules: BTreeMap<String, String>,
    to_drop: BTreeSet<String>,
    generators: BTreeMap<String, Arc<dyn Generator>>,
    loader: Arc<dyn SourceLoader>,
    path_validator: Option<Validator<Path>>,
    raw_id_column: Option<String>,
    raw_validator: Option<Validator<RawTable>>,
    post_rename_validator: Validator<NormalizedBatch>,
    download: DownloadInfo,
    download_action: Option<Arc<dyn ScrapeAction>>,
    beta: bool,
}

impl SourceDescriptor {
    pub fn builder(origin: impl Into<String>) -> SourceDescriptorBuilder {
        SourceDescriptorBuilder::new(origin)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn expected_extension(&self) -> &str {
        &self.expected_extension
    }

    pub fn renaming_rules(&self) -> &BTreeMap<String, String> {
        &self.renaming_rules
    }

    pub fn to_drop(&self) -> &BTreeSet<String> {
        &self.to_drop
    }

    pub fn generator(&self, column: &str) -> Option<&Arc<dyn Generator>> {
        self.generators.get(column)
    }

    pub fn generator_columns(&self) -> impl Iterator<Item = &str> {
        self.generators.keys().map(String::as_str)
    }

    /// Fallback used when no `url` column survives renaming.
    pub fn url_generator(&self) -> Option<&Arc<dyn Generator>> {
        self.generator(URL)
    }

    /// Fallback used when no `location` column survives renaming.
    pub fn location_generator(&self) -> Option<&Arc<dyn Generator>> {
        self.generator(LOCATION)
    }

    pub fn loader(&self) -> &Arc<dyn SourceLoader> {
        &self.loader
    }

    pub fn path_validator(&self) -> Option<&Validator<Path>> {
        self.path_validator.as_ref()
    }

    pub fn raw_validator(&self) -> Option<&Validator<RawTable>> {
        self.raw_validator.as_ref()
    }

    pub fn post_rename_validator(&self) -> &Validator<NormalizedBatch> {
        &self.post_rename_validator
    }

    pub fn download(&self) -> &DownloadInfo {
        &self.download
    }

    pub fn download_action(&self) -> Option<&Arc<dyn ScrapeAction>> {
        self.download_action.as_ref()
    }

    pub fn is_beta(&self) -> bool {
        self.beta
    }

    /// Raw identifier column checked for uniqueness before normalizing.
    pub fn raw_id_column(&self) -> Option<&str> {
        self.raw_id_column.as_deref()
    }

    /// Returns a copy registered under another origin name.
    ///
    /// Validators are rebuilt so their messages carry the new label.
    pub(crate) fn renamed(self, origin: &str) -> Result<Self, ConfigurationError> {
        SourceDescriptorBuilder {
            origin: origin.trim().to_string(),
            expected_extension: Some(self.expected_extension),
            renaming_rules: self.renaming_rules.into_iter().collect(),
            to_drop: self.to_drop,
            generators: self.generators,
            loader: Some(self.loader),
            path_checks: self.path_validator.is_some(),
            raw_id_column: self.raw_id_column,
            download: self.download,
            download_action: self.download_action,
            beta: self.beta,
        }
        .build()
    }
}

impl std::fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("origin", &self.origin)
            .field("expected_extension", &self.expected_extension)
            .field("renaming_rules", &self.renaming_rules)
            .field("to_drop", &self.to_drop)
            .field("generators", &self.generators.keys().collect::<Vec<_>>())
            .field("loader", &self.loader.kind())
            .field("beta", &self.beta)
            .finish()
    }
}

/// Builder for [`SourceDescriptor`].
///
/// Validators are derived from declarative fields: `path_checks` enables the
/// extension check and `raw_id_column` enables the raw unique-id check.
pub struct SourceDescriptorBuilder {
    origin: String,
    expected_extension: Option<String>,
    renaming_rules: Vec<(String, String)>,
    to_drop: BTreeSet<String>,
    generators: BTreeMap<String, Arc<dyn Generator>>,
    loader: Option<Arc<dyn SourceLoader>>,
    path_checks: bool,
    raw_id_column: Option<String>,
    download: DownloadInfo,
    download_action: Option<Arc<dyn ScrapeAction>>,
    beta: bool,
}

impl SourceDescriptorBuilder {
    fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into().trim().to_string(),
            expected_extension: None,
            renaming_rules: Vec::new(),
            to_drop: BTreeSet::new(),
            generators: BTreeMap::new(),
            loader: None,
            path_checks: true,
            raw_id_column: None,
            download: DownloadInfo::default(),
            download_action: None,
            beta: false,
        }
    }

    pub fn expected_extension(mut self, extension: impl AsRef<str>) -> Self {
        self.expected_extension = Some(normalize_extension(extension.as_ref()));
        self
    }

    pub fn rename(mut self, raw: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.renaming_rules.push((raw.into(), canonical.into()));
        self
    }

    pub fn renames<I, K, V>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.renaming_rules
            .extend(rules.into_iter().map(|(raw, canonical)| (raw.into(), canonical.into())));
        self
    }

    pub fn drop_column(mut self, column: impl Into<String>) -> Self {
        self.to_drop.insert(column.into());
        self
    }

    pub fn drop_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.to_drop.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn generator(mut self, column: impl Into<String>, generator: impl Generator + 'static) -> Self {
        self.generators.insert(column.into(), Arc::new(generator));
        self
    }

    pub fn url_generator(self, generator: impl Generator + 'static) -> Self {
        self.generator(URL, generator)
    }

    pub fn location_generator(self, generator: impl Generator + 'static) -> Self {
        self.generator(LOCATION, generator)
    }

    pub fn loader(self, loader: impl SourceLoader + 'static) -> Self {
        self.shared_loader(Arc::new(loader))
    }

    pub fn shared_loader(mut self, loader: Arc<dyn SourceLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Disables the extension check on candidate paths.
    pub fn without_path_validator(mut self) -> Self {
        self.path_checks = false;
        self
    }

    /// Enables the raw-table unique-id check on `column` (raw name).
    pub fn unique_raw_id(mut self, column: impl Into<String>) -> Self {
        self.raw_id_column = Some(column.into());
        self
    }

    pub fn download(mut self, download: DownloadInfo) -> Self {
        self.download = download;
        self
    }

    pub fn download_url(mut self, url: impl Into<String>) -> Self {
        self.download.url = Some(url.into());
        self
    }

    pub fn download_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.download.instructions = instructions.into();
        self
    }

    pub fn input_file_name(mut self, name: impl Into<String>) -> Self {
        self.download.input_file_name = Some(name.into());
        self
    }

    pub fn download_action(mut self, action: Arc<dyn ScrapeAction>) -> Self {
        self.download_action = Some(action);
        self
    }

    pub fn beta(mut self, beta: bool) -> Self {
        self.beta = beta;
        self
    }

    /// Validates the declaration and assembles the descriptor.
    pub fn build(self) -> Result<SourceDescriptor, ConfigurationError> {
        let origin = self.origin;
        if origin.is_empty() {
            return Err(ConfigurationError::EmptyOrigin);
        }

        let expected_extension = self.expected_extension.ok_or_else(|| {
            ConfigurationError::MissingField {
                origin: origin.clone(),
                field: "expected_extension",
            }
        })?;
        if expected_extension.is_empty()
            || !expected_extension.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigurationError::InvalidExtension {
                origin,
                extension: expected_extension,
            });
        }

        let loader = self.loader.ok_or_else(|| ConfigurationError::MissingField {
            origin: origin.clone(),
            field: "loader",
        })?;

        let renaming_rules = one_to_one_rules(&origin, self.renaming_rules)?;

        for column in self.generators.keys() {
            if !columns::is_canonical(column) && !columns::is_protected(column) {
                return Err(ConfigurationError::UnknownGeneratorColumn {
                    origin,
                    column: column.clone(),
                });
            }
            if columns::is_protected(column) {
                log::warn!(
                    "event=descriptor_build module=source status=warn origin={} column={} reason=protected_generator_superseded",
                    origin,
                    column
                );
            }
        }

        let path_validator = self
            .path_checks
            .then(|| Validator::new(origin.clone()).with_check(ExtensionCheck::new(&expected_extension)));
        let raw_validator = self
            .raw_id_column
            .as_ref()
            .map(|column| Validator::new(origin.clone()).with_check(UniqueIdCheck::new(column.clone())));
        let post_rename_validator = Validator::new(origin.clone())
            .with_check(RequiredColumnsCheck::new(REQUIRED_COLUMNS.iter().copied()))
            .with_check(UniqueIdCheck::new(ORIGIN_ID));

        Ok(SourceDescriptor {
            origin,
            expected_extension,
            renaming_rules,
            to_drop: self.to_drop,
            generators: self.generators,
            loader,
            path_validator,
            raw_id_column: self.raw_id_column,
            raw_validator,
            post_rename_validator,
            download: self.download,
            download_action: self.download_action,
            beta: self.beta,
        })
    }
}

fn one_to_one_rules(
    origin: &str,
    rules: Vec<(String, String)>,
) -> Result<BTreeMap<String, String>, ConfigurationError> {
    let mut by_raw: BTreeMap<String, String> = BTreeMap::new();
    let mut by_target: BTreeMap<String, String> = BTreeMap::new();
    for (raw, target) in rules {
        if columns::is_protected(&target) {
            return Err(ConfigurationError::ProtectedRenameTarget {
                origin: origin.to_string(),
                column: raw,
                target,
            });
        }
        if let Some(first) = by_target.get(&target) {
            if *first != raw {
                return Err(ConfigurationError::ManyToOneRename {
                    origin: origin.to_string(),
                    target,
                    first: first.clone(),
                    second: raw,
                });
            }
        }
        if let Some(first) = by_raw.get(&raw) {
            if *first != target {
                return Err(ConfigurationError::ConflictingRename {
                    origin: origin.to_string(),
                    column: raw,
                    first: first.clone(),
                    second: target,
                });
            }
        }
        by_target.insert(target.clone(), raw.clone());
        by_raw.insert(raw, target);
    }
    Ok(by_raw)
}
