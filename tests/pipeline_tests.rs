/// Request pipeline tests against the fixture dataset with a stub regressor.
///
/// Run with: cargo test --test pipeline_tests -- --nocapture
mod common;

use charge_predictor::{
    handler::{Failed, Stage, HINT},
    types::{ChatQuery, ChatReply},
    PipelineError,
};
use common::{calls, listed_locations, stub_handler};

#[test]
fn test_predict_berlin_ac_rewe() {
    println!("\n=== Test: Predict Berlin AC Rewe ===");
    let (handler, counter) = stub_handler(17.5);

    let reply = handler.handle("predict for Berlin AC Rewe");
    println!("  reply: {:?}", reply);

    assert!(!reply.is_error());
    assert!(reply.text().ends_with("kW."), "reply should end with kW");
    assert_eq!(reply.load_kw(), Some(17.5));
    assert_eq!(calls(&counter), 1);
    println!("✓ Prediction reply carries a parseable kW value");
}

#[test]
fn test_prediction_result_fields() {
    let (handler, _) = stub_handler(3.0);
    let mut query = ChatQuery::new("Predict for HAMBURG hpc PENNY");
    let result = handler.predict(&mut query).unwrap();

    assert_eq!(result.city, "hamburg");
    assert_eq!(result.address, "Hafenstrasse 12, 20359 Hamburg");
    assert_eq!(result.station_type, "HPC");
    assert_eq!(result.category, "Penny");
    assert_eq!(result.features.station_type, 2);
    assert_eq!(result.features.category, 2);
    // sorted addresses: Aachener (Köln), Alexanderplatz (Berlin), Hafenstrasse (Hamburg), ...
    assert_eq!(result.features.city, 2);
    assert!(query.parsed.is_some());
}

#[test]
fn test_unknown_city_is_case_folded() {
    println!("\n=== Test: Unknown City ===");
    let (handler, counter) = stub_handler(1.0);

    let reply = handler.handle("predict for Atlantis AC Rewe");
    assert_eq!(reply, ChatReply::error("No data found for city: atlantis"));
    assert_eq!(calls(&counter), 0, "model must not run for an unknown city");
    println!("✓ {}", reply.text());
}

#[test]
fn test_invalid_station_type_never_reaches_model() {
    let (handler, counter) = stub_handler(1.0);

    let reply = handler.handle("predict for Berlin ZZ Rewe");
    assert!(reply.is_error());
    assert_eq!(reply.text(), "Unknown station type: zz");
    assert_eq!(calls(&counter), 0);

    let reply = handler.handle("predict for Berlin AC Lidl");
    assert_eq!(reply.text(), "Unknown category: lidl");
    assert_eq!(calls(&counter), 0);
}

#[test]
fn test_malformed_query_stops_at_parser() {
    let (handler, counter) = stub_handler(1.0);

    let mut query = ChatQuery::new("predict Berlin AC");
    let failed = handler.predict(&mut query).unwrap_err();
    assert_eq!(
        failed,
        Failed {
            stage: Stage::Received,
            error: PipelineError::MalformedQuery { expected: 4, found: 3 },
        }
    );
    assert!(query.parsed.is_none(), "parser must not guess fields");

    let reply = handler.handle("please predict");
    assert!(reply.is_error());
    assert!(reply.text().contains("predict for <city> <station type> <category>"));
    assert_eq!(calls(&counter), 0);
}

#[test]
fn test_encoder_failures_report_parsed_stage() {
    let (handler, _) = stub_handler(1.0);
    let mut query = ChatQuery::new("predict for Atlantis DC Netto");
    let failed = handler.predict(&mut query).unwrap_err();
    assert_eq!(failed.stage, Stage::Parsed);
    assert_eq!(failed.error, PipelineError::UnknownCity("atlantis".into()));
}

#[test]
fn test_locations_listing() {
    println!("\n=== Test: Locations ===");
    let (handler, counter) = stub_handler(1.0);

    let reply = handler.handle("tell me about locations");
    assert!(!reply.is_error());
    let listed = listed_locations(reply.text());
    let mut expected: Vec<String> = handler
        .encoder()
        .stations()
        .addresses()
        .to_vec();
    expected.sort();
    assert_eq!(listed, expected);
    assert_eq!(listed.len(), 5);
    assert_eq!(calls(&counter), 0);
    println!("✓ {} locations listed", listed.len());
}

#[test]
fn test_vocabulary_listings_and_hint() {
    let (handler, _) = stub_handler(1.0);

    assert_eq!(
        handler.handle("Which Station Types exist?").text(),
        "Available station types: AC, DC, HPC"
    );
    assert_eq!(
        handler.handle("list categories").text(),
        "Available categories: Rewe, Netto, Penny"
    );
    assert_eq!(handler.handle("hello there").text(), HINT);
    assert_eq!(handler.handle("").text(), HINT);
}

#[test]
fn test_rule_priority_predict_wins() {
    // contains both "predict" and "location"; prediction rule is first
    let (handler, counter) = stub_handler(2.0);
    let reply = handler.handle("location predict for Berlin DC Netto");
    assert_eq!(reply.load_kw(), Some(2.0));
    assert_eq!(calls(&counter), 1);
}

#[test]
fn test_negative_model_output_is_clamped() {
    let (handler, _) = stub_handler(-12.0);
    let reply = handler.handle("predict for Köln AC Netto");
    assert_eq!(reply.load_kw(), Some(0.0));
}

#[test]
fn test_model_error_becomes_error_reply() {
    let (handler, counter) = stub_handler(f32::INFINITY);
    let reply = handler.handle("predict for Berlin AC Rewe");
    assert!(reply.is_error());
    assert!(!reply.text().contains("inf"), "detail stays in the log");
    assert_eq!(calls(&counter), 1);
}

#[test]
fn test_locations_joined_with_semicolons() {
    let (handler, _) = stub_handler(1.0);
    let reply = handler.handle("locations?");
    // first-seen dataset order; commas stay inside each address
    assert!(
        reply
            .text()
            .starts_with("Available locations: Alexanderplatz 3, 10178 Berlin; Hafenstrasse 12, 20359 Hamburg; "),
        "{}",
        reply.text()
    );
    assert_eq!(reply.text().matches("; ").count(), 4);
}

#[test]
fn test_prediction_result_serializes_to_json() {
    let (handler, _) = stub_handler(8.5);
    let mut query = ChatQuery::new("predict for Berlin DC Netto");
    let result = handler.predict(&mut query).unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["city"], "berlin");
    assert_eq!(json["station_type"], "DC");
    assert_eq!(json["category"], "Netto");
    assert_eq!(json["load_kw"], 8.5);
    assert_eq!(
        json["features"],
        serde_json::json!({ "station_type": 1, "category": 1, "city": 1 })
    );
}
