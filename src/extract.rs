/* extract.rs

*
* Author: M.R.Siavash Katebzadeh <mr@katebzadeh.xyz>
* Keywords: Rust
* Version: 0.0.1
*
* This program is free software; you can redistribute it and/or modify
* it under the terms of the GNU General Public License as published by
* the Free Software Foundation, either version 3 of the License, or
* (at your option) any later version.
*
* This program is distributed in the hope that it will be useful,
* but WITHOUT ANY WARRANTY; without even the implied warranty of
* MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
* GNU General Public License for more details.
*
* You should have received a copy of the GNU General Public License
* along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

//! Recovery of the function-reported execution time from a response.
//!
//! Targets report it in several shapes. The strategies below are tried in a
//! fixed order and the first one yielding a positive value wins:
//!
//! 1. the `X-Execution-Time` header (seconds);
//! 2. a function report embedded as a JSON string in `response.result`,
//!    recognized by `"status": "success"`, read at
//!    `performance.execution_time_seconds`;
//! 3. a top-level `execution_time` (seconds).
//!
//! Nothing here fails: malformed input simply leaves the value unreported.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use spdlog::trace;

pub const EXECUTION_TIME_HEADER: &str = "x-execution-time";
pub const UNKNOWN_STATUS: &str = "unknown";
pub const ERROR_STATUS: &str = "error";
/// Status value marking the embedded function report.
const REPORT_MARKER: &str = "success";

/// Deserializes a field as `T`, turning any type mismatch into `None`
/// instead of failing the enclosing document.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Outer response body returned by the target.
#[derive(Debug, Default, Deserialize)]
pub struct Envelope {
    #[serde(default, deserialize_with = "lenient")]
    pub response: Option<ResponseField>,
    #[serde(default, deserialize_with = "lenient")]
    pub execution_time: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseField {
    /// Raw function output; may embed a [`FunctionReport`].
    #[serde(default, deserialize_with = "lenient")]
    pub result: Option<String>,
}

/// Report printed by the function itself.
#[derive(Debug, Default, Deserialize)]
pub struct FunctionReport {
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub performance: Option<Performance>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Performance {
    #[serde(default, deserialize_with = "lenient")]
    pub execution_time_seconds: Option<f64>,
}

/// Finds the first JSON object in `text` whose `status` is `"success"`.
///
/// Every `{` is tried as the start of a document; trailing text after the
/// object is ignored.
pub fn find_function_report(text: &str) -> Option<FunctionReport> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut stream =
            serde_json::Deserializer::from_str(&text[start..]).into_iter::<FunctionReport>();
        match stream.next() {
            Some(Ok(report)) if report.status.as_deref() == Some(REPORT_MARKER) => Some(report),
            _ => None,
        }
    })
}

/// Everything the strategies may look at, parsed once.
#[derive(Debug, Default)]
pub struct ResponseView<'a> {
    pub header: Option<&'a str>,
    pub envelope: Option<Envelope>,
    pub report: Option<FunctionReport>,
}

impl<'a> ResponseView<'a> {
    pub fn parse(header: Option<&'a str>, body: &[u8]) -> Self {
        // Structs also deserialize from arrays; only an object is an envelope.
        let envelope: Option<Envelope> = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .filter(serde_json::Value::is_object)
            .and_then(|value| serde_json::from_value(value).ok());
        let report = envelope
            .as_ref()
            .and_then(|e| e.response.as_ref())
            .and_then(|r| r.result.as_deref())
            .and_then(find_function_report);

        Self {
            header,
            envelope,
            report,
        }
    }

    /// Top-level status first, then the embedded report's.
    pub fn status(&self) -> Option<&str> {
        self.envelope
            .as_ref()
            .and_then(|e| e.status.as_deref())
            .or_else(|| self.report.as_ref().and_then(|r| r.status.as_deref()))
    }
}

type Strategy = fn(&ResponseView<'_>) -> Option<f64>;

/// Extraction strategies in priority order.
pub const STRATEGIES: [(&str, Strategy); 3] = [
    ("header", from_header),
    ("function-report", from_function_report),
    ("envelope", from_envelope),
];

fn seconds_to_ms(seconds: f64) -> Option<f64> {
    (seconds.is_finite() && seconds > 0.0).then_some(seconds * 1000.0)
}

fn from_header(view: &ResponseView<'_>) -> Option<f64> {
    view.header
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .and_then(seconds_to_ms)
}

fn from_function_report(view: &ResponseView<'_>) -> Option<f64> {
    view.report
        .as_ref()
        .and_then(|r| r.performance.as_ref())
        .and_then(|p| p.execution_time_seconds)
        .and_then(seconds_to_ms)
}

fn from_envelope(view: &ResponseView<'_>) -> Option<f64> {
    view.envelope
        .as_ref()
        .and_then(|e| e.execution_time)
        .and_then(seconds_to_ms)
}

/// Execution time and status label recovered from one response.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// `None` when no strategy produced a positive value.
    pub execution_ms: Option<f64>,
    pub status: String,
}

/// Runs the strategy chain over a successful response.
pub fn extract(header: Option<&str>, body: &[u8]) -> Extraction {
    let view = ResponseView::parse(header, body);

    let execution_ms = STRATEGIES.iter().find_map(|(name, strategy)| {
        let found = strategy(&view);
        if let Some(ms) = found {
            trace!("Execution time {:.3} ms from {}", ms, name);
        }
        found
    });

    Extraction {
        execution_ms,
        status: view.status().unwrap_or(UNKNOWN_STATUS).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nested(seconds: f64) -> Vec<u8> {
        let inner = json!({
            "status": "success",
            "performance": { "execution_time_seconds": seconds }
        });
        let result = format!("function output:\n{}\n", inner);
        serde_json::to_vec(&json!({ "response": { "result": result } })).unwrap()
    }

    #[test]
    fn header_wins_over_body() {
        let out = extract(Some("0.25"), &nested(1.5));
        assert_eq!(out.execution_ms, Some(250.0));
        assert_eq!(out.status, "success");
    }

    #[test]
    fn unusable_header_falls_through() {
        for header in ["abc", "0", "-1", "NaN", ""] {
            let out = extract(Some(header), &nested(1.5));
            assert_eq!(out.execution_ms, Some(1500.0), "header {:?}", header);
        }
    }

    #[test]
    fn nested_report_beats_top_level() {
        let mut body: serde_json::Value = serde_json::from_slice(&nested(0.5)).unwrap();
        body["execution_time"] = json!(2.0);
        let out = extract(None, &serde_json::to_vec(&body).unwrap());
        assert_eq!(out.execution_ms, Some(500.0));
    }

    #[test]
    fn zero_nested_value_falls_back_to_top_level() {
        let mut body: serde_json::Value = serde_json::from_slice(&nested(0.0)).unwrap();
        body["execution_time"] = json!(0.125);
        let out = extract(None, &serde_json::to_vec(&body).unwrap());
        assert_eq!(out.execution_ms, Some(125.0));
    }

    #[test]
    fn top_level_status_overrides_report_status() {
        let mut body: serde_json::Value = serde_json::from_slice(&nested(0.5)).unwrap();
        body["status"] = json!("completed");
        let out = extract(None, &serde_json::to_vec(&body).unwrap());
        assert_eq!(out.status, "completed");
    }

    #[test]
    fn report_is_found_after_unrelated_objects() {
        let text = r#"log {"level":"info"} then {"status": "success", "performance": {"execution_time_seconds": 0.01}} trailing }"#;
        let report = find_function_report(text).unwrap();
        assert_eq!(
            report.performance.unwrap().execution_time_seconds,
            Some(0.01)
        );
    }

    #[test]
    fn failed_report_is_not_matched() {
        let text = r#"{"status": "failed", "performance": {"execution_time_seconds": 3}}"#;
        assert!(find_function_report(text).is_none());
    }

    #[test]
    fn malformed_payloads_are_unreported() {
        let bodies: [&[u8]; 6] = [
            b"not json",
            b"[1,2,3]",
            br#"{"response": "flat string"}"#,
            br#"{"response": {"result": "{\"status\": \"success\", broken"}}"#,
            br#"{"execution_time": "fast"}"#,
            b"",
        ];
        for body in bodies {
            let out = extract(None, body);
            assert_eq!(out.execution_ms, None);
            assert_eq!(out.status, UNKNOWN_STATUS);
        }
    }

    #[test]
    fn mistyped_field_does_not_hide_siblings() {
        let out = extract(None, br#"{"response": 42, "execution_time": 0.2, "status": "ok"}"#);
        assert_eq!(out.execution_ms, Some(200.0));
        assert_eq!(out.status, "ok");
    }
}

/* extract.rs ends here */
