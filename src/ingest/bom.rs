//! BOM bulletin parser
//!
//! Turns the Bureau of Meteorology XML products into typed records:
//!   - observation summaries (IDx60920): one `station` element per site with
//!     `element[@type='maximum_air_temperature']` and friends beneath it
//!   - precis forecasts (IDV10753 etc.): one `area` element per forecast
//!     district with a sequence of `forecast-period` children
//!
//! Product format: http://www.bom.gov.au/catalogue/data-feeds.shtml
//!
//! Parsing is pure. Fetching lives in `ingest::source`.

use chrono::{DateTime, NaiveDate};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::cities::CityProfile;
use crate::model::{BulletinError, ForecastPeriod, MetricKind, Observation};

/// Lowest and highest temperatures (°C) accepted from a bulletin.
const PLAUSIBLE_RANGE_C: std::ops::RangeInclusive<f64> = -100.0..=70.0;

// ============================================================================
// Observations
// ============================================================================

/// Reads one city's observed daily extreme of `kind`.
///
/// # Parameters
/// - `document`: observation bulletin XML
/// - `city`: supplies the station's `stn-name`, e.g. "MELBOURNE (OLYMPIC PARK)"
/// - `kind`: which extreme to read
/// - `day`: the calendar day the reading belongs to
///
/// # Errors
/// `ElementNotFound` if the station or its metric element is absent
/// (including truncated documents), `MalformedValue` if the element text is
/// not a plausible temperature, `MalformedDocument` on broken markup.
pub fn parse_observation(
    document: &str,
    city: &CityProfile,
    kind: MetricKind,
    day: NaiveDate,
) -> Result<Observation, BulletinError> {
    let value = station_value(document, &city.station, kind)?;
    Ok(Observation {
        city: city.code.clone(),
        date: day,
        kind,
        value,
    })
}

fn station_value(document: &str, station: &str, kind: MetricKind) -> Result<f64, BulletinError> {
    let wanted = kind.observation_element();

    let mut reader = Reader::from_str(document);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut station_found = false;
    let mut in_station = false;
    let mut capturing = false;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"station" => {
                    in_station = attribute(&e, "stn-name")?.as_deref() == Some(station);
                    station_found |= in_station;
                }
                b"element" if in_station => {
                    capturing = attribute(&e, "type")?.as_deref() == Some(wanted);
                    text.clear();
                }
                _ => {}
            },
            Ok(Event::Text(t)) if capturing => {
                text.push_str(&t.unescape().map_err(|e| malformed(&reader, e))?);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"element" if capturing => {
                    let context = format!("{} at '{}'", wanted, station);
                    return parse_temperature(&text, &context);
                }
                b"station" => in_station = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(&reader, e)),
            _ => {}
        }
        buf.clear();
    }

    if station_found {
        Err(BulletinError::ElementNotFound(format!(
            "{} element for station '{}'",
            wanted, station
        )))
    } else {
        Err(BulletinError::ElementNotFound(format!("station '{}'", station)))
    }
}

// ============================================================================
// Forecasts
// ============================================================================

#[derive(Debug, Default)]
struct PendingPeriod {
    start: Option<String>,
    max: Option<String>,
    min: Option<String>,
}

/// Reads the future forecast periods for one forecast area.
///
/// The first period of every area is the remainder of the issuance day and is
/// discarded; the rest are returned in document order.
///
/// # Errors
/// `ElementNotFound` if the area is absent or has no periods past the
/// issuance day, `IncompletePeriod` if a retained period lacks its maximum,
/// minimum or start time, `MalformedValue` for non-numeric temperatures or an
/// unparseable start time.
pub fn parse_forecast_periods(
    document: &str,
    area: &str,
) -> Result<Vec<ForecastPeriod>, BulletinError> {
    let mut reader = Reader::from_str(document);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut area_found = false;
    let mut in_area = false;
    let mut pending: Vec<PendingPeriod> = Vec::new();
    let mut current: Option<PendingPeriod> = None;
    let mut capturing: Option<MetricKind> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"area" => {
                    in_area = attribute(&e, "description")?.as_deref() == Some(area);
                    area_found |= in_area;
                }
                b"forecast-period" if in_area => {
                    current = Some(PendingPeriod {
                        start: attribute(&e, "start-time-local")?,
                        ..PendingPeriod::default()
                    });
                }
                b"element" if current.is_some() => {
                    let kind = attribute(&e, "type")?;
                    capturing = match kind.as_deref() {
                        Some(t) if t == MetricKind::Max.forecast_element() => Some(MetricKind::Max),
                        Some(t) if t == MetricKind::Min.forecast_element() => Some(MetricKind::Min),
                        _ => None,
                    };
                    text.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"area" => {
                    area_found |= attribute(&e, "description")?.as_deref() == Some(area);
                }
                // A period with no children still occupies its slot.
                b"forecast-period" if in_area => {
                    pending.push(PendingPeriod {
                        start: attribute(&e, "start-time-local")?,
                        ..PendingPeriod::default()
                    });
                }
                _ => {}
            },
            Ok(Event::Text(t)) if capturing.is_some() => {
                text.push_str(&t.unescape().map_err(|e| malformed(&reader, e))?);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"element" => {
                    if let (Some(kind), Some(period)) = (capturing.take(), current.as_mut()) {
                        let value = Some(text.trim().to_string());
                        match kind {
                            MetricKind::Max => period.max = value,
                            MetricKind::Min => period.min = value,
                        }
                    }
                }
                b"forecast-period" => {
                    if let Some(period) = current.take() {
                        pending.push(period);
                    }
                }
                b"area" => in_area = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(&reader, e)),
            _ => {}
        }
        buf.clear();
    }

    if !area_found {
        return Err(BulletinError::ElementNotFound(format!("forecast area '{}'", area)));
    }
    if pending.len() < 2 {
        return Err(BulletinError::ElementNotFound(format!(
            "forecast periods after the issuance day for area '{}'",
            area
        )));
    }

    // Index 0 is what is left of the issuance day.
    pending
        .into_iter()
        .enumerate()
        .skip(1)
        .map(|(index, period)| finish_period(index, period))
        .collect()
}

fn finish_period(index: usize, period: PendingPeriod) -> Result<ForecastPeriod, BulletinError> {
    let start = period.start.ok_or_else(|| BulletinError::IncompletePeriod {
        index,
        start: "<unknown>".to_string(),
        missing: "start-time-local",
    })?;

    if DateTime::parse_from_rfc3339(&start).is_err() {
        return Err(BulletinError::MalformedValue {
            context: format!("start-time-local of period #{}", index),
            value: start,
        });
    }

    let max = period.max.ok_or_else(|| BulletinError::IncompletePeriod {
        index,
        start: start.clone(),
        missing: MetricKind::Max.forecast_element(),
    })?;
    let min = period.min.ok_or_else(|| BulletinError::IncompletePeriod {
        index,
        start: start.clone(),
        missing: MetricKind::Min.forecast_element(),
    })?;

    let max = parse_temperature(&max, &format!("maximum of period {}", start))?;
    let min = parse_temperature(&min, &format!("minimum of period {}", start))?;

    Ok(ForecastPeriod {
        start_time_local: start,
        max,
        min,
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn attribute(e: &BytesStart, name: &str) -> Result<Option<String>, BulletinError> {
    match e.try_get_attribute(name) {
        Ok(Some(attr)) => attr
            .unescape_value()
            .map(|v| Some(v.into_owned()))
            .map_err(|err| BulletinError::MalformedDocument(err.to_string())),
        Ok(None) => Ok(None),
        Err(err) => Err(BulletinError::MalformedDocument(err.to_string())),
    }
}

fn malformed<R>(reader: &Reader<R>, err: quick_xml::Error) -> BulletinError {
    BulletinError::MalformedDocument(format!(
        "XML error at position {}: {}",
        reader.buffer_position(),
        err
    ))
}

fn parse_temperature(text: &str, context: &str) -> Result<f64, BulletinError> {
    let trimmed = text.trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && PLAUSIBLE_RANGE_C.contains(&value) => Ok(value),
        _ => Err(BulletinError::MalformedValue {
            context: context.to_string(),
            value: trimmed.to_string(),
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cities::CityRegistry;

    fn read(document: &str, station: &str, kind: MetricKind) -> Result<f64, BulletinError> {
        let city = CityProfile {
            station: station.to_string(),
            ..CityRegistry::builtin().find("MEL").unwrap().clone()
        };
        let day = NaiveDate::from_ymd_opt(2023, 3, 21).unwrap();
        parse_observation(document, &city, kind, day).map(|o| o.value)
    }

    const OBS_XML: &str = r#"<?xml version="1.0"?>
<product version="v1.7">
  <observations>
    <station wmo-id="95936" bom-id="086338" stn-name="MELBOURNE (OLYMPIC PARK)">
      <period index="0" time-local="2023-03-21T15:00:00+11:00">
        <level index="0" type="surface">
          <element units="Celsius" type="air_temperature">19.4</element>
          <element units="Celsius" type="maximum_air_temperature">20.0</element>
          <element units="Celsius" type="minimum_air_temperature">12.6</element>
        </level>
      </period>
    </station>
    <station wmo-id="94866" bom-id="086282" stn-name="MELBOURNE AIRPORT">
      <period index="0">
        <level index="0" type="surface">
          <element units="Celsius" type="maximum_air_temperature">18.1</element>
        </level>
      </period>
    </station>
  </observations>
</product>"#;

    const FORECAST_XML: &str = r#"<?xml version="1.0"?>
<product version="v1.7">
  <forecast>
    <area aac="VIC_FA001" description="Victoria" type="region"/>
    <area aac="VIC_PT042" description="Melbourne" type="location">
      <forecast-period index="0" start-time-local="2023-03-20T17:00:00+11:00">
        <element type="forecast_icon_code">3</element>
        <element type="air_temperature_maximum" units="Celsius">24</element>
      </forecast-period>
      <forecast-period index="1" start-time-local="2023-03-21T00:00:00+11:00">
        <element type="air_temperature_minimum" units="Celsius">14</element>
        <element type="air_temperature_maximum" units="Celsius">21</element>
        <text type="precis">Partly cloudy.</text>
      </forecast-period>
      <forecast-period index="2" start-time-local="2023-03-22T00:00:00+11:00">
        <element type="air_temperature_minimum" units="Celsius">13</element>
        <element type="air_temperature_maximum" units="Celsius">23</element>
      </forecast-period>
    </area>
  </forecast>
</product>"#;

    #[test]
    fn test_parse_observation_reads_requested_metric() {
        let max = read(OBS_XML, "MELBOURNE (OLYMPIC PARK)", MetricKind::Max).unwrap();
        let min = read(OBS_XML, "MELBOURNE (OLYMPIC PARK)", MetricKind::Min).unwrap();
        assert_eq!(max, 20.0);
        assert_eq!(min, 12.6);
    }

    #[test]
    fn test_parse_observation_builds_record_for_city() {
        let melbourne = CityRegistry::builtin().find("MEL").unwrap().clone();
        let day = NaiveDate::from_ymd_opt(2023, 3, 20).unwrap();

        let observation = parse_observation(OBS_XML, &melbourne, MetricKind::Min, day).unwrap();

        assert_eq!(
            observation,
            Observation {
                city: "MEL".to_string(),
                date: day,
                kind: MetricKind::Min,
                value: 12.6,
            }
        );
    }

    #[test]
    fn test_parse_observation_does_not_cross_station_boundary() {
        // The airport has no minimum; Olympic Park's must not be picked up.
        let err = read(OBS_XML, "MELBOURNE AIRPORT", MetricKind::Min).unwrap_err();
        assert!(matches!(err, BulletinError::ElementNotFound(msg) if msg.contains("minimum")));
    }

    #[test]
    fn test_parse_observation_unknown_station() {
        let err = read(OBS_XML, "ATLANTIS", MetricKind::Max).unwrap_err();
        assert_eq!(err, BulletinError::ElementNotFound("station 'ATLANTIS'".to_string()));
    }

    #[test]
    fn test_parse_observation_given_area_name_is_not_found() {
        let err = read(FORECAST_XML, "Melbourne", MetricKind::Max).unwrap_err();
        assert!(matches!(err, BulletinError::ElementNotFound(_)));
    }

    #[test]
    fn test_parse_observation_truncated_document_is_not_found() {
        let cut = &OBS_XML[..OBS_XML.find("20.0").unwrap()];
        let err = read(cut, "MELBOURNE (OLYMPIC PARK)", MetricKind::Max).unwrap_err();
        assert!(matches!(err, BulletinError::ElementNotFound(_)));
    }

    #[test]
    fn test_parse_observation_non_numeric_value() {
        let xml = OBS_XML.replace(">20.0<", ">-<");
        let err = read(&xml, "MELBOURNE (OLYMPIC PARK)", MetricKind::Max).unwrap_err();
        assert!(matches!(err, BulletinError::MalformedValue { value, .. } if value == "-"));
    }

    #[test]
    fn test_parse_observation_implausible_value() {
        let xml = OBS_XML.replace(">20.0<", ">999.0<");
        let err = read(&xml, "MELBOURNE (OLYMPIC PARK)", MetricKind::Max).unwrap_err();
        assert!(matches!(err, BulletinError::MalformedValue { .. }));
    }

    #[test]
    fn test_parse_observation_mismatched_tags_is_malformed_document() {
        let xml = OBS_XML.replace("</level>", "</levl>");
        let err = read(&xml, "MELBOURNE AIRPORT", MetricKind::Max);
        // The airport comes after the broken tag.
        assert!(matches!(err, Err(BulletinError::MalformedDocument(_))));
    }

    #[test]
    fn test_parse_forecast_drops_issuance_day() {
        let periods = parse_forecast_periods(FORECAST_XML, "Melbourne").unwrap();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].start_time_local, "2023-03-21T00:00:00+11:00");
        assert_eq!(periods[0].max, 21.0);
        assert_eq!(periods[0].min, 14.0);
        assert_eq!(periods[1].target_day(), "2023-03-22");
    }

    #[test]
    fn test_parse_forecast_self_closing_issuance_period_is_dropped() {
        let xml = FORECAST_XML.replace(
            r#"<forecast-period index="0" start-time-local="2023-03-20T17:00:00+11:00">
        <element type="forecast_icon_code">3</element>
        <element type="air_temperature_maximum" units="Celsius">24</element>
      </forecast-period>"#,
            r#"<forecast-period index="0" start-time-local="2023-03-20T17:00:00+11:00"/>"#,
        );
        assert!(xml.contains("/>\n      <forecast-period index=\"1\""));

        let periods = parse_forecast_periods(&xml, "Melbourne").unwrap();
        let days: Vec<&str> = periods.iter().map(|p| p.target_day()).collect();
        assert_eq!(days, vec!["2023-03-21", "2023-03-22"]);
    }

    #[test]
    fn test_parse_forecast_unknown_area() {
        let err = parse_forecast_periods(FORECAST_XML, "Geelong").unwrap_err();
        assert_eq!(err, BulletinError::ElementNotFound("forecast area 'Geelong'".to_string()));
    }

    #[test]
    fn test_parse_forecast_area_without_periods() {
        let err = parse_forecast_periods(FORECAST_XML, "Victoria").unwrap_err();
        assert!(matches!(err, BulletinError::ElementNotFound(msg) if msg.contains("after the issuance day")));
    }

    #[test]
    fn test_parse_forecast_missing_minimum_is_incomplete() {
        let xml = FORECAST_XML.replace(
            r#"<element type="air_temperature_minimum" units="Celsius">13</element>"#,
            "",
        );
        let err = parse_forecast_periods(&xml, "Melbourne").unwrap_err();
        assert_eq!(
            err,
            BulletinError::IncompletePeriod {
                index: 2,
                start: "2023-03-22T00:00:00+11:00".to_string(),
                missing: "air_temperature_minimum",
            }
        );
    }

    #[test]
    fn test_parse_forecast_bad_start_time() {
        let xml = FORECAST_XML.replace("2023-03-22T00:00:00+11:00", "next tuesday");
        let err = parse_forecast_periods(&xml, "Melbourne").unwrap_err();
        assert!(matches!(err, BulletinError::MalformedValue { value, .. } if value == "next tuesday"));
    }
}
