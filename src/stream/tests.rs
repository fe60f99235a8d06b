use super::*;
use crate::topic::TopicTable;
use chrono::TimeZone;

const TEMP: &str = "m2ccm/noa/g22315333/data/temperature";
const SOUND: &str = "m2ccm/noa/g22315333/data/sound";

fn validator() -> StreamValidator {
    StreamValidator::new(TopicTable::new("m2ccm", "noa/g22315333").unwrap())
}

fn at() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc.timestamp_millis_opt(1_707_668_400_000).unwrap()
}

#[test]
fn test_temperature_with_humidity_splits_into_two_readings() {
    let parsed = validator()
        .parse(TEMP, r#"{"value": 23.5, "humidity": 41}"#, at())
        .unwrap();

    assert_eq!(parsed.origin, Origin::Device);
    assert_eq!(parsed.readings.len(), 2);
    assert_eq!(parsed.readings[0].kind, SensorKind::Temperature);
    assert_eq!(parsed.readings[0].value, 23.5);
    assert_eq!(parsed.readings[1].kind, SensorKind::Humidity);
    assert_eq!(parsed.readings[1].value, 41.0);
    assert_eq!(parsed.readings[0].observed_at, parsed.readings[1].observed_at);
}

#[test]
fn test_out_of_range_temperature_rejected() {
    let result = validator().parse(TEMP, r#"{"value": 999}"#, at());
    assert_eq!(
        result.unwrap_err(),
        Rejection::OutOfRange {
            kind: SensorKind::Temperature,
            value: Some(999.0)
        }
    );
}

#[test]
fn test_range_bounds_are_inclusive() {
    let v = validator();
    assert!(v.parse(TEMP, r#"{"value": -40}"#, at()).is_ok());
    assert!(v.parse(TEMP, r#"{"value": 85}"#, at()).is_ok());
    assert!(v.parse(SOUND, r#"{"value": 100}"#, at()).is_ok());
    assert!(v.parse(SOUND, r#"{"value": 100.5}"#, at()).is_err());
}

#[test]
fn test_numeric_strings_are_coerced() {
    let parsed = validator().parse(SOUND, r#"{"value": " 12.5 "}"#, at()).unwrap();
    assert_eq!(parsed.readings[0].value, 12.5);
}

#[test]
fn test_non_numeric_value_rejected_as_out_of_range() {
    let v = validator();
    for payload in [
        r#"{"value": "loud"}"#,
        r#"{"value": true}"#,
        r#"{"value": null}"#,
        r#"{"other": 1}"#,
    ] {
        assert_eq!(
            v.parse(SOUND, payload, at()).unwrap_err(),
            Rejection::OutOfRange {
                kind: SensorKind::Sound,
                value: None
            },
            "payload {}",
            payload
        );
    }
}

#[test]
fn test_non_finite_string_rejected() {
    let err = validator().parse(SOUND, r#"{"value": "NaN"}"#, at()).unwrap_err();
    assert!(matches!(err, Rejection::OutOfRange { kind: SensorKind::Sound, .. }));
}

#[test]
fn test_malformed_payload_checked_before_topic() {
    let v = validator();
    assert!(matches!(
        v.parse("nowhere/at/all", "not json", at()),
        Err(Rejection::MalformedPayload(_))
    ));
    assert!(matches!(
        v.parse(TEMP, "42", at()),
        Err(Rejection::MalformedPayload(_))
    ));
}

#[test]
fn test_unknown_topic_rejected() {
    let v = validator();
    assert_eq!(
        v.parse("m2ccm/noa/g22315333/data/pressure", r#"{"value": 1}"#, at())
            .unwrap_err(),
        Rejection::UnknownTopic("m2ccm/noa/g22315333/data/pressure".to_string())
    );
    // Status and command topics are not data topics
    assert!(matches!(
        v.parse("m2ccm/noa/g22315333/command/led", r#"{"value": 1}"#, at()),
        Err(Rejection::UnknownTopic(_))
    ));
}

#[test]
fn test_source_topic_reads_temp_field() {
    let parsed = validator()
        .parse("m2ccm/alice/esp32/temp", r#"{"temp": "21.0"}"#, at())
        .unwrap();
    assert_eq!(parsed.origin, Origin::Source("alice".to_string()));
    assert_eq!(parsed.readings.len(), 1);
    assert_eq!(parsed.readings[0].kind, SensorKind::Temperature);
    assert_eq!(parsed.readings[0].value, 21.0);
}

#[test]
fn test_source_topic_ignores_humidity_and_checks_range() {
    let v = validator();
    let parsed = v
        .parse("m2ccm/bob/d1/temp", r#"{"temp": 20, "humidity": 50}"#, at())
        .unwrap();
    assert_eq!(parsed.readings.len(), 1);

    assert!(matches!(
        v.parse("m2ccm/bob/d1/temp", r#"{"temp": 120}"#, at()),
        Err(Rejection::OutOfRange { .. })
    ));
}

#[test]
fn test_bad_humidity_companion_dropped_temperature_kept() {
    let v = validator();
    let parsed = v
        .parse(TEMP, r#"{"value": 20, "humidity": 140}"#, at())
        .unwrap();
    assert_eq!(parsed.readings.len(), 1);

    let parsed = v
        .parse(TEMP, r#"{"value": 20, "humidity": "damp"}"#, at())
        .unwrap();
    assert_eq!(parsed.readings.len(), 1);
}

#[test]
fn test_rejection_display() {
    let err = Rejection::OutOfRange {
        kind: SensorKind::Temperature,
        value: Some(999.0),
    };
    assert_eq!(
        err.to_string(),
        "temperature value 999 out of range (expected -40..=85)"
    );
}
