use chrono::NaiveDate;
use jmtracker_core::source::{default_sources, parse_custom_sources, AEA, EJM};
use jmtracker_core::{
    ConfigurationError, IngestService, RecordKey, SourceInput, SourceRegistry, Value,
};
use std::path::Path;

const CUSTOM: &str = r#"
[[source]]
origin = "HIGHERED"
expected_extension = "csv"
url_template = "https://jobs.example.org/{origin_id}"
location_from = ["town", "nation"]
to_drop = ["town", "nation"]
download_instructions = "Export the saved search as CSV."
input_file_name = "highered.csv"

[source.loader]
kind = "csv"

[source.rename]
"Job ID" = "origin_id"
"Position" = "title"
"Employer" = "institution"
"Closing date" = "deadline"
"Town" = "town"
"Nation" = "nation"

[[source]]
origin = "EJM"
expected_extension = "tsv"

[source.loader]
kind = "csv"
delimiter = "\t"
"#;

fn custom() -> Vec<jmtracker_core::SourceDescriptor> {
    parse_custom_sources(CUSTOM, Path::new("custom_sources.toml"))
        .expect("custom sources should parse")
}

#[test]
fn colliding_custom_source_is_registered_under_alias() {
    let registry = SourceRegistry::with_custom(
        default_sources().expect("defaults should build"),
        custom(),
        false,
    )
    .expect("registry should build");
    assert_eq!(
        registry.origins(),
        vec!["AEA", "EJM", "AJO", "HIGHERED", "EJM-custom"]
    );
    assert_eq!(
        registry.get(EJM).expect("EJM is registered").expected_extension(),
        "csv"
    );
}

#[test]
fn overriding_custom_source_replaces_default_in_place() {
    let registry = SourceRegistry::with_custom(
        default_sources().expect("defaults should build"),
        custom(),
        true,
    )
    .expect("registry should build");
    assert_eq!(registry.origins(), vec!["AEA", "EJM", "AJO", "HIGHERED"]);
    assert_eq!(
        registry.get(EJM).expect("EJM is registered").expected_extension(),
        "tsv"
    );
    assert!(registry.get(AEA).is_ok());
}

#[test]
fn declarative_source_runs_through_the_pipeline() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = dir.path().join("highered.csv");
    std::fs::write(
        &path,
        "Job ID,Position,Employer,Closing date,Town,Nation\n\
         H-7,Lecturer,Uni D,2025-01-15,Leeds,UK\n",
    )
    .expect("fixture should be written");

    let registry = SourceRegistry::with_custom(Vec::new(), custom(), false)
        .expect("registry should build");
    let mut service = IngestService::new(
        registry,
        NaiveDate::from_ymd_opt(2024, 10, 1).expect("valid date"),
    );
    service
        .ingest_source("HIGHERED", SourceInput::File(path))
        .expect("ingest should succeed");

    let record = service
        .store()
        .get(&RecordKey::new("HIGHERED", "H-7"))
        .expect("record should be stored");
    assert_eq!(record.get("url"), Some(&Value::from("https://jobs.example.org/H-7")));
    assert_eq!(record.get("location"), Some(&Value::from("Leeds, UK")));
    assert!(!record.contains("town"));
}

#[test]
fn invalid_declaration_is_a_configuration_error() {
    let err = parse_custom_sources(
        "[[source]]\norigin = \"BAD\"\nexpected_extension = \"csv\"\n\
         [source.loader]\nkind = \"csv\"\n[source.rename]\na = \"status\"\n",
        Path::new("custom_sources.toml"),
    )
    .expect_err("renaming into a protected column must fail");
    assert!(matches!(err, ConfigurationError::ProtectedRenameTarget { .. }));
}
