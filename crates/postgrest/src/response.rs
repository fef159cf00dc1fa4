//! Classification of transport responses into results or errors

use http::StatusCode;
use log::{trace, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{PostgrestApiErrorDetails, PostgrestError};
use crate::transport::HttpResponse;

/// Successful query result
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    /// Decoded rows; empty for `return=minimal` and empty bodies
    pub data: Vec<T>,
    /// Total reported by `Content-Range`, when a count was requested
    pub count: Option<u64>,
    pub status: StatusCode,
}

impl<T> ApiResponse<T> {
    /// First row, consuming the response
    pub fn into_first(self) -> Option<T> {
        self.data.into_iter().next()
    }
}

/// Reads the total from `Content-Range: <start>-<end>/<total>`.
///
/// A `*` total (count not computed) or an unparsable header yields `None`.
pub fn parse_content_range(value: &str) -> Option<u64> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.parse().ok()
}

/// Turns a response into rows of `T` or a [`PostgrestError`].
///
/// Any status >= 400 or a body that is not JSON is an API error. Every row must
/// decode as `T`; the first failing row fails the whole response.
pub fn classify<T: DeserializeOwned>(
    response: &HttpResponse,
    count_requested: bool,
) -> Result<ApiResponse<T>, PostgrestError> {
    let status = response.status;
    trace!(
        "response status {} content-range {:?}",
        status,
        response.header("content-range")
    );

    if status.as_u16() >= 400 {
        return Err(api_error(response));
    }

    let body = response.body.trim();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_str::<Value>(body).map_err(|_| api_error(response))?
    };

    let rows = match value {
        Value::Null => Vec::new(),
        Value::Array(rows) => rows,
        single => vec![single],
    };

    let data = rows
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            serde_json::from_value::<T>(row).map_err(|source| {
                warn!("row {} does not match the requested type: {}", index, source);
                PostgrestError::ValidationError { index, source }
            })
        })
        .collect::<Result<Vec<T>, _>>()?;

    let count = if count_requested {
        response.header("content-range").and_then(parse_content_range)
    } else {
        None
    };

    Ok(ApiResponse {
        data,
        count,
        status,
    })
}

/// Builds the error for a failed response, degrading to the raw body text
/// when it is not a PostgREST error object
pub(crate) fn api_error(response: &HttpResponse) -> PostgrestError {
    let details = serde_json::from_str::<Value>(&response.body)
        .ok()
        .as_ref()
        .and_then(PostgrestApiErrorDetails::from_value);

    match details {
        Some(details) => PostgrestError::ApiError {
            details,
            status: response.status,
        },
        None => PostgrestError::UnparsedApiError {
            message: response.body.clone(),
            status: response.status,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue};
    use serde::Deserialize;
    use serde_json::json;

    use crate::Row;

    fn response(status: u16, body: &str, content_range: Option<&'static str>) -> HttpResponse {
        let mut headers = HeaderMap::new();
        if let Some(range) = content_range {
            headers.insert("content-range", HeaderValue::from_static(range));
        }
        HttpResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            body: body.to_string(),
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: i64,
        name: String,
    }

    #[test]
    fn test_content_range() {
        assert_eq!(parse_content_range("0-9/42"), Some(42));
        assert_eq!(parse_content_range("0-9/*"), None);
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("garbage"), None);
    }

    #[test]
    fn test_count_only_when_requested() {
        let res = response(200, "[]", Some("0-9/42"));
        assert_eq!(classify::<Row>(&res, true).unwrap().count, Some(42));
        assert_eq!(classify::<Row>(&res, false).unwrap().count, None);

        let unknown = response(200, "[]", Some("0-9/*"));
        assert_eq!(classify::<Row>(&unknown, true).unwrap().count, None);
    }

    #[test]
    fn test_typed_rows() {
        let res = response(200, r#"[{"id":1,"name":"a"},{"id":2,"name":"b"}]"#, None);
        let api = classify::<Item>(&res, false).unwrap();
        assert_eq!(api.status, StatusCode::OK);
        assert_eq!(
            api.data,
            vec![
                Item { id: 1, name: "a".into() },
                Item { id: 2, name: "b".into() }
            ]
        );
    }

    #[test]
    fn test_one_bad_row_fails_everything() {
        let res = response(200, r#"[{"id":1,"name":"a"},{"id":"x"}]"#, None);
        match classify::<Item>(&res, false) {
            Err(PostgrestError::ValidationError { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_and_single_bodies() {
        let minimal = classify::<Row>(&response(201, "", None), false).unwrap();
        assert!(minimal.data.is_empty());
        assert_eq!(minimal.status, StatusCode::CREATED);

        let single = classify::<Item>(&response(200, r#"{"id":3,"name":"c"}"#, None), false).unwrap();
        assert_eq!(single.into_first(), Some(Item { id: 3, name: "c".into() }));

        let scalar = classify::<Value>(&response(200, "42", None), false).unwrap();
        assert_eq!(scalar.data, vec![json!(42)]);
    }

    #[test]
    fn test_error_bodies() {
        let err = classify::<Row>(&response(404, r#"{"message":"not found"}"#, None), false)
            .unwrap_err();
        let details = err.api_details().unwrap();
        assert_eq!(details.message.as_deref(), Some("not found"));
        assert_eq!(details.code, None);
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

        let err = classify::<Row>(&response(502, "<html>bad gateway</html>", None), false)
            .unwrap_err();
        match err {
            PostgrestError::UnparsedApiError { message, status } => {
                assert_eq!(message, "<html>bad gateway</html>");
                assert_eq!(status, StatusCode::BAD_GATEWAY);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_undecodable_success_body() {
        let err = classify::<Row>(&response(200, "not json", None), false).unwrap_err();
        assert!(matches!(err, PostgrestError::UnparsedApiError { .. }));
    }
}
