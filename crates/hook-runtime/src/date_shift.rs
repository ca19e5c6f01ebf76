//! Calendar shifting of timestamps inside JSON response bodies.
//!
//! The transform moves the year of every timestamp found in one field of the
//! elements of one array, keeps month, day and wall-clock time, and labels
//! the result with a fixed zone offset:
//!
//! ```text
//! {"data": [{"createdDate": "2020-01-15T10:00:00Z"}]}
//!   -> {"data": [{"createdDate": "2022-01-15T10:00:00+08:00"}]}
//! ```
//!
//! The zone is relabelled, not converted: `10:00Z` becomes `10:00+08:00`.
//! Because the wall clock is kept, shifting twice by two years lands exactly
//! four years ahead at the same time of day.

use async_trait::async_trait;
use chrono::{
    DateTime, FixedOffset, Months, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone,
};
use exchange_model::{Body, ExchangeContext, Request, Response};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::hook::{HookError, ResponseHook};
use crate::state::SharedState;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateShiftError {
    #[error("'{0}' is not a recognised date or date-time")]
    Unparseable(String),

    #[error("'{0}' is not a zone offset like +08:00")]
    InvalidOffset(String),

    #[error("shifting '{0}' leaves the supported calendar range")]
    OutOfRange(String),
}

/// Move a timestamp by whole years and relabel its zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateShift {
    pub years: i32,
    pub zone: FixedOffset,
}

impl DateShift {
    pub fn new(years: i32, zone: FixedOffset) -> Self {
        Self { years, zone }
    }

    /// Parse an offset written as `+08:00`, `-0530`, `+08` or `Z`.
    pub fn parse_offset(text: &str) -> Result<FixedOffset, DateShiftError> {
        let invalid = || DateShiftError::InvalidOffset(text.to_string());
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("z") {
            return FixedOffset::east_opt(0).ok_or_else(invalid);
        }

        let (sign, rest) = if let Some(rest) = trimmed.strip_prefix('+') {
            (1, rest)
        } else if let Some(rest) = trimmed.strip_prefix('-') {
            (-1, rest)
        } else {
            return Err(invalid());
        };
        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let (hours, minutes) = match digits.len() {
            2 => (digits.parse::<i32>().map_err(|_| invalid())?, 0),
            4 => (
                digits[..2].parse::<i32>().map_err(|_| invalid())?,
                digits[2..].parse::<i32>().map_err(|_| invalid())?,
            ),
            _ => return Err(invalid()),
        };
        if hours > 23 || minutes > 59 {
            return Err(invalid());
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
    }

    /// Shift one timestamp.
    ///
    /// Accepts RFC 3339 (`2020-01-15T10:00:00Z`, `...+02:00`), a zone-less
    /// date-time (`2020-01-15T10:00:00.250`) and a bare date (`2020-01-15`,
    /// taken as midnight). February 29 shifted into a common year becomes
    /// February 28.
    pub fn apply(&self, timestamp: &str) -> Result<String, DateShiftError> {
        let wall_clock = parse_wall_clock(timestamp)?;
        let out_of_range = || DateShiftError::OutOfRange(timestamp.to_string());

        let months = self
            .years
            .unsigned_abs()
            .checked_mul(12)
            .map(Months::new)
            .ok_or_else(out_of_range)?;
        let shifted = if self.years >= 0 {
            wall_clock.checked_add_months(months)
        } else {
            wall_clock.checked_sub_months(months)
        }
        .ok_or_else(out_of_range)?;

        let labelled: DateTime<FixedOffset> = self
            .zone
            .from_local_datetime(&shifted)
            .single()
            .ok_or_else(out_of_range)?;
        Ok(labelled.to_rfc3339_opts(SecondsFormat::AutoSi, false))
    }
}

fn parse_wall_clock(text: &str) -> Result<NaiveDateTime, DateShiftError> {
    let text = text.trim();
    if let Ok(with_zone) = DateTime::parse_from_rfc3339(text) {
        return Ok(with_zone.naive_local());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| DateShiftError::Unparseable(text.to_string()))
}

/// Shift `date_field` in every object of the `array_field` array of a JSON
/// body. Returns how many timestamps changed.
///
/// Only the targeted field of each element is replaced; other fields and
/// element order are untouched. Bodies that are not JSON objects, or lack the
/// array, are left as they are. Elements whose field is missing, not a
/// string, or not a timestamp keep their value.
pub fn shift_array_dates(
    body: &mut Body,
    array_field: &str,
    date_field: &str,
    shift: &DateShift,
) -> usize {
    let Some(Value::Array(elements)) = body
        .as_json_mut()
        .and_then(|root| root.get_mut(array_field))
    else {
        debug!(array_field, "body has no array to shift");
        return 0;
    };

    let mut shifted = 0;
    for (index, element) in elements.iter_mut().enumerate() {
        let Some(Value::String(timestamp)) = element.get_mut(date_field) else {
            continue;
        };
        match shift.apply(timestamp) {
            Ok(moved) => {
                *timestamp = moved;
                shifted += 1;
            }
            Err(err) => warn!(index, date_field, %err, "leaving timestamp unchanged"),
        }
    }
    shifted
}

/// Response hook that applies a [`DateShift`] to one array of a JSON body.
#[derive(Debug, Clone)]
pub struct DateShiftHook {
    name: String,
    array_field: String,
    date_field: String,
    shift: DateShift,
}

impl DateShiftHook {
    pub fn new(
        array_field: impl Into<String>,
        date_field: impl Into<String>,
        shift: DateShift,
    ) -> Self {
        Self {
            name: "date-shift".to_string(),
            array_field: array_field.into(),
            date_field: date_field.into(),
            shift,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl ResponseHook for DateShiftHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_response(
        &self,
        ctx: &ExchangeContext,
        _state: &SharedState,
        url: &Url,
        _request: &Request,
        mut response: Response,
    ) -> Result<Response, HookError> {
        let count = shift_array_dates(
            &mut response.body,
            &self.array_field,
            &self.date_field,
            &self.shift,
        );
        debug!(exchange_id = ctx.exchange_id, %url, count, "shifted response dates");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exchange_model::Scheme;
    use serde_json::json;

    fn plus_two_years() -> DateShift {
        DateShift::new(2, DateShift::parse_offset("+08:00").unwrap())
    }

    #[test]
    fn shifts_utc_timestamp_and_relabels_zone() {
        assert_eq!(
            plus_two_years().apply("2020-01-15T10:00:00Z").unwrap(),
            "2022-01-15T10:00:00+08:00"
        );
    }

    #[test]
    fn keeps_fractional_seconds() {
        assert_eq!(
            plus_two_years().apply("2020-01-15T10:00:00.250Z").unwrap(),
            "2022-01-15T10:00:00.250+08:00"
        );
    }

    #[test]
    fn leap_day_clamps_to_february_28() {
        assert_eq!(
            plus_two_years().apply("2020-02-29T23:30:00Z").unwrap(),
            "2022-02-28T23:30:00+08:00"
        );
    }

    #[test]
    fn leap_day_to_leap_year_is_kept() {
        let shift = DateShift::new(4, DateShift::parse_offset("Z").unwrap());
        assert_eq!(shift.apply("2020-02-29").unwrap(), "2024-02-29T00:00:00+00:00");
    }

    #[test]
    fn applying_twice_moves_four_years() {
        let shift = plus_two_years();
        for original in [
            "2019-03-31T00:00:01Z",
            "2020-01-15T10:00:00Z",
            "2021-12-31T23:59:59+05:30",
            "2023-07-04T12:00:00",
        ] {
            let once = shift.apply(original).unwrap();
            let twice = shift.apply(&once).unwrap();

            let before = parse_wall_clock(original).unwrap();
            let after = parse_wall_clock(&twice).unwrap();
            let expected = before.checked_add_months(Months::new(48)).unwrap();
            assert_eq!(after, expected, "{original} -> {twice}");
        }
    }

    #[test]
    fn negative_years_move_backwards() {
        let shift = DateShift::new(-1, DateShift::parse_offset("-05:00").unwrap());
        assert_eq!(
            shift.apply("2020-06-01T08:00:00Z").unwrap(),
            "2019-06-01T08:00:00-05:00"
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            plus_two_years().apply("yesterday"),
            Err(DateShiftError::Unparseable(_))
        ));
        for bad in ["08:00", "+8:0", "+25:00", "UTC", ""] {
            assert!(DateShift::parse_offset(bad).is_err(), "{bad}");
        }
        assert_eq!(
            DateShift::parse_offset("-0530").unwrap(),
            FixedOffset::west_opt(5 * 3600 + 30 * 60).unwrap()
        );
    }

    #[test]
    fn shifts_only_the_targeted_field() {
        let mut body = Body::Json(json!({
            "total": 2,
            "data": [
                {"id": 1, "name": "a", "createdDate": "2020-01-15T10:00:00Z"},
                {"id": 2, "createdDate": "not a date"},
                {"id": 3},
                "scalar"
            ]
        }));
        let count = shift_array_dates(&mut body, "data", "createdDate", &plus_two_years());
        assert_eq!(count, 1);
        assert_eq!(
            body,
            Body::Json(json!({
                "total": 2,
                "data": [
                    {"id": 1, "name": "a", "createdDate": "2022-01-15T10:00:00+08:00"},
                    {"id": 2, "createdDate": "not a date"},
                    {"id": 3},
                    "scalar"
                ]
            }))
        );
    }

    #[test]
    fn non_matching_bodies_are_untouched() {
        let shift = plus_two_years();
        for body in [
            Body::Json(json!({"items": []})),
            Body::Json(json!({"data": "not an array"})),
            Body::Json(json!([1, 2])),
            Body::PlainText(r#"{"data":[{"createdDate":"2020-01-15T10:00:00Z"}]}"#.into()),
        ] {
            let mut copy = body.clone();
            assert_eq!(shift_array_dates(&mut copy, "data", "createdDate", &shift), 0);
            assert_eq!(copy, body);
        }
    }

    #[tokio::test]
    async fn hook_rewrites_response_body() {
        let hook = DateShiftHook::new("data", "createdDate", plus_two_years());
        let request = Request::new(Scheme::Https, "api.example.com", "/users");
        let url = request.url().unwrap();
        let ctx = ExchangeContext::new(uuid::Uuid::new_v4(), 1);
        let response = Response::new(200).with_body(Body::Json(json!({
            "data": [{"createdDate": "2020-01-15T10:00:00Z"}]
        })));

        let out = hook
            .on_response(&ctx, &SharedState::new(), &url, &request, response)
            .await
            .unwrap();
        assert_eq!(
            out.body,
            Body::Json(json!({"data": [{"createdDate": "2022-01-15T10:00:00+08:00"}]}))
        );
        assert_eq!(out.status_code, 200);
    }
}
