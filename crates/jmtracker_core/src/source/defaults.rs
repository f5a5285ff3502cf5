//! Built-in source descriptors: AEA (JOE), EJM and AJO.

use crate::error::ConfigurationError;
use crate::loader::{CsvLoader, ScrapeAction, SpreadsheetLoader};
use crate::source::descriptor::SourceDescriptor;
use crate::source::generators::{JoinColumns, UrlTemplate};
use std::sync::Arc;

pub const AEA: &str = "AEA";
pub const EJM: &str = "EJM";
pub const AJO: &str = "AJO";

/// JOE listing URL, keyed by the posting id.
pub const AEA_URL_TEMPLATE: &str = "https://www.aeaweb.org/joe/listing.php?JOE_ID={origin_id}";

/// Default descriptors in registry order.
pub fn default_sources() -> Result<Vec<SourceDescriptor>, ConfigurationError> {
    default_sources_with_scraper(None)
}

/// Default descriptors with the AJO scraper collaborator bound.
pub fn default_sources_with_scraper(
    ajo_scraper: Option<Arc<dyn ScrapeAction>>,
) -> Result<Vec<SourceDescriptor>, ConfigurationError> {
    Ok(vec![aea()?, ejm()?, ajo(ajo_scraper)?])
}

fn aea() -> Result<SourceDescriptor, ConfigurationError> {
    SourceDescriptor::builder(AEA)
        .download_url("https://www.aeaweb.org/joe/listings?issue=2024-02")
        .download_instructions("Download the \"native xls\" file and do not modify it.")
        .input_file_name("latest_aea.xlsx")
        .expected_extension("xlsx")
        // JOE exports carry irregular header offsets.
        .loader(SpreadsheetLoader::tolerant())
        .unique_raw_id("jp_id")
        .renames([
            ("jp_id", "origin_id"),
            ("jp_section", "section"),
            ("jp_institution", "institution"),
            ("jp_division", "division"),
            ("jp_department", "department"),
            ("jp_keywords", "keywords"),
            ("jp_title", "title"),
            ("jp_full_text", "full_text"),
            ("jp_salary_range", "salary_range"),
            ("locations", "location"),
            ("Application_deadline", "deadline"),
        ])
        .url_generator(UrlTemplate::new(AEA_URL_TEMPLATE))
        .build()
}

fn ejm() -> Result<SourceDescriptor, ConfigurationError> {
    SourceDescriptor::builder(EJM)
        .download_url("https://econjobmarket.org/users/positions/download/a")
        .download_instructions(
            "Download the CSV file. Download all postings if this is your first time \
             using this app but not your first time using EJM.",
        )
        .input_file_name("latest_ejm.csv")
        .expected_extension("csv")
        .loader(CsvLoader::new().with_header_row(1))
        .unique_raw_id("Id")
        .renames([
            ("Id", "origin_id"),
            ("URL", "url"),
            ("Ad title", "title"),
            ("Types", "section"),
            ("Categories", "division"),
            ("Deadline", "deadline"),
            ("Department", "department"),
            ("Institution", "institution"),
            ("City", "city"),
            ("State/province", "state"),
            ("Country", "country"),
            ("Application method", "application_method"),
            ("Application URL", "application_url"),
            ("Application email", "application_email"),
            ("Ad text (in markdown format)", "full_text"),
        ])
        .location_generator(JoinColumns::location())
        .drop_columns(["city", "state", "country"])
        .build()
}

fn ajo(scraper: Option<Arc<dyn ScrapeAction>>) -> Result<SourceDescriptor, ConfigurationError> {
    let mut builder = SourceDescriptor::builder(AJO)
        .download_instructions(
            "Use the scrape action to collect AJO postings. \
             Please review any deadlines: this source is still in beta.",
        )
        .expected_extension("csv")
        .loader(CsvLoader::new())
        .without_path_validator()
        .unique_raw_id("origin_id")
        .beta(true);
    if let Some(scraper) = scraper {
        builder = builder.download_action(scraper);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::{default_sources, AEA, AJO, EJM};

    #[test]
    fn defaults_build_in_order() {
        let sources = default_sources().expect("defaults must be valid");
        let origins: Vec<&str> = sources.iter().map(|source| source.origin()).collect();
        assert_eq!(origins, vec![AEA, EJM, AJO]);
    }

    #[test]
    fn ejm_drops_location_parts_and_aggregates_location() {
        let sources = default_sources().unwrap();
        let ejm = &sources[1];
        assert!(ejm.location_generator().is_some());
        assert!(ejm.to_drop().contains("city"));
        assert_eq!(ejm.raw_id_column(), Some("Id"));
    }

    #[test]
    fn ajo_is_beta_without_path_validator() {
        let sources = default_sources().unwrap();
        let ajo = &sources[2];
        assert!(ajo.is_beta());
        assert!(ajo.path_validator().is_none());
        assert!(ajo.download_action().is_none());
    }
}
