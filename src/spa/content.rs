//! Serving one file's bytes: conditional requests, byte ranges, MIME types.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use http::header::{
    ACCEPT_RANGES, CONTENT_RANGE, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue,
    IF_MODIFIED_SINCE, IF_UNMODIFIED_SINCE, LAST_MODIFIED, RANGE,
};
use http::{Method, StatusCode};

use super::assets::Asset;
use super::range::{RangeParse, parse_range};
use crate::request::Request;
use crate::response::{ContentType, Response};

/// Builds the response for `asset`, honouring `If-Modified-Since`,
/// `If-Unmodified-Since` and a single-part `Range`.
///
/// `content_type` overrides the type guessed from the asset's name.
pub(crate) fn serve_content(req: &Request, asset: &Asset, content_type: Option<HeaderValue>) -> Response {
    let mut headers = HeaderMap::new();
    let modified = asset.modified().filter(|t| *t > UNIX_EPOCH);
    if let Some(value) = modified.and_then(|t| HeaderValue::from_str(&http_date(t)).ok()) {
        headers.insert(LAST_MODIFIED, value);
    }

    if let Some(modified) = modified {
        let modified = unix_seconds(modified);
        if header_date(req, IF_UNMODIFIED_SINCE).is_some_and(|since| modified > since) {
            return Response::from_parts(StatusCode::PRECONDITION_FAILED, headers, Default::default());
        }
        let conditional_get = matches!(*req.method(), Method::GET | Method::HEAD);
        if conditional_get && header_date(req, IF_MODIFIED_SINCE).is_some_and(|since| modified <= since) {
            return Response::from_parts(StatusCode::NOT_MODIFIED, headers, Default::default());
        }
    }

    let content_type = content_type
        .unwrap_or_else(|| HeaderValue::from_static(content_type_for(asset.name())));
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let body = asset.contents();
    match parse_range(req.header(RANGE), body.len()) {
        RangeParse::Ignore => Response::from_parts(StatusCode::OK, headers, body.clone()),
        RangeParse::Satisfiable(range) => {
            let content_range = format!("bytes {}-{}/{}", range.start, range.end, body.len());
            if let Ok(value) = HeaderValue::from_str(&content_range) {
                headers.insert(CONTENT_RANGE, value);
            }
            let part = body.slice(range.start..range.start + range.len());
            Response::from_parts(StatusCode::PARTIAL_CONTENT, headers, part)
        }
        RangeParse::Unsatisfiable => {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", body.len())) {
                headers.insert(CONTENT_RANGE, value);
            }
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
            Response::from_parts(
                StatusCode::RANGE_NOT_SATISFIABLE,
                headers,
                "invalid range: failed to overlap\n".into(),
            )
        }
    }
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub(crate) fn http_date(t: SystemTime) -> String {
    DateTime::<Utc>::from(t).format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn unix_seconds(t: SystemTime) -> i64 {
    DateTime::<Utc>::from(t).timestamp()
}

fn header_date(req: &Request, name: HeaderName) -> Option<i64> {
    let value = req.header(name)?;
    DateTime::parse_from_rfc2822(value).ok().map(|d| d.timestamp())
}

/// MIME type for a file name, by extension.
pub(crate) fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("html" | "htm") => ContentType::Html.as_str(),
        Some("css") => ContentType::Css.as_str(),
        Some("js" | "mjs") => ContentType::Javascript.as_str(),
        Some("json" | "map") => ContentType::Json.as_str(),
        Some("txt") => ContentType::Text.as_str(),
        Some("xml") => "application/xml",
        Some("wasm") => "application/wasm",
        Some("webmanifest") => "application/manifest+json",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        Some("pdf") => "application/pdf",
        _ => ContentType::OctetStream.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::Uri;

    use super::*;

    fn asset() -> Asset {
        let modified = UNIX_EPOCH + Duration::from_secs(784_111_777); // Sun, 06 Nov 1994 08:49:37 GMT
        Asset::new("index.html", Some(modified), "0123456789")
    }

    fn get() -> Request {
        Request::new(Method::GET, Uri::from_static("/"))
    }

    #[test]
    fn formats_imf_fixdate() {
        assert_eq!(http_date(asset().modified().unwrap()), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn full_body_with_last_modified() {
        let res = serve_content(&get(), &asset(), None);
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), "0123456789");
        assert_eq!(res.headers()[LAST_MODIFIED], "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(res.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(res.headers()[ACCEPT_RANGES], "bytes");
    }

    #[test]
    fn if_modified_since_yields_304() {
        let req = get().with_header(
            IF_MODIFIED_SINCE,
            HeaderValue::from_static("Sun, 06 Nov 1994 08:49:37 GMT"),
        );
        let res = serve_content(&req, &asset(), None);
        assert_eq!(res.status_code(), StatusCode::NOT_MODIFIED);
        assert!(res.body().is_empty());

        let stale = get().with_header(
            IF_MODIFIED_SINCE,
            HeaderValue::from_static("Sat, 05 Nov 1994 08:49:37 GMT"),
        );
        assert_eq!(serve_content(&stale, &asset(), None).status_code(), StatusCode::OK);
    }

    #[test]
    fn if_unmodified_since_yields_412() {
        let req = get().with_header(
            IF_UNMODIFIED_SINCE,
            HeaderValue::from_static("Sat, 05 Nov 1994 08:49:37 GMT"),
        );
        let res = serve_content(&req, &asset(), None);
        assert_eq!(res.status_code(), StatusCode::PRECONDITION_FAILED);
    }

    #[test]
    fn single_range_yields_206() {
        let req = get().with_header(RANGE, HeaderValue::from_static("bytes=2-4"));
        let res = serve_content(&req, &asset(), None);
        assert_eq!(res.status_code(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(res.body(), "234");
        assert_eq!(res.headers()[CONTENT_RANGE], "bytes 2-4/10");
    }

    #[test]
    fn unsatisfiable_range_yields_416() {
        let req = get().with_header(RANGE, HeaderValue::from_static("bytes=20-"));
        let res = serve_content(&req, &asset(), None);
        assert_eq!(res.status_code(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(res.headers()[CONTENT_RANGE], "bytes */10");
    }

    #[test]
    fn explicit_content_type_wins() {
        let asset = Asset::new("shell", None, "<p>");
        let res = serve_content(&get(), &asset, Some(HeaderValue::from_static(ContentType::Html.as_str())));
        assert_eq!(res.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        assert!(res.headers().get(LAST_MODIFIED).is_none());
    }

    #[test]
    fn guesses_types_by_extension() {
        assert_eq!(content_type_for("app.JS"), "text/javascript; charset=utf-8");
        assert_eq!(content_type_for("logo.svg"), "image/svg+xml");
        assert_eq!(content_type_for("LICENSE"), "application/octet-stream");
        assert_eq!(content_type_for("site.css"), ContentType::Css.as_str());
        assert_eq!(content_type_for("app.js.map"), "application/json");
    }
}
