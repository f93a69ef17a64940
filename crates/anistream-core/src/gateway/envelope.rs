//! Response envelope decoding and the wire shape of the stream endpoint
//!
//! Every endpoint answers with `{success, results?, error?}`. A non-2xx status
//! or `success: false` takes the same error path so callers see one
//! `Error::Gateway` regardless of how the server reported the failure.

use crate::{
    error::Error,
    types::*,
    Result,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;
use url::Url;

/// `{success, results?, error?}`
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub results: Option<T>,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// Collapse the envelope into its payload or a gateway error
    pub fn into_result(self, endpoint: &str) -> Result<T> {
        if let Some(error) = self.error.or(if self.success { None } else { self.message }) {
            return Err(Error::Gateway(error));
        }
        if !self.success {
            return Err(Error::Gateway(format!("{endpoint} failed")));
        }
        self.results
            .ok_or_else(|| Error::InvalidResponseShape(format!("{endpoint}: missing results")))
    }
}

/// Decode an HTTP response body into the envelope payload
pub fn decode<T: DeserializeOwned>(endpoint: &str, status: StatusCode, body: &[u8]) -> Result<T> {
    if !status.is_success() {
        // Error bodies usually still carry {error} or {message}
        let message = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|value| {
                value
                    .get("error")
                    .or_else(|| value.get("message"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("{endpoint} failed (HTTP {})", status.as_u16()));
        return Err(Error::Gateway(message));
    }

    let envelope: Envelope<T> = serde_json::from_slice(body)
        .map_err(|e| Error::InvalidResponseShape(format!("{endpoint}: {e}")))?;
    envelope.into_result(endpoint)
}

/// Payloads that are sometimes wrapped in `{data: ...}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DataOr<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> DataOr<T> {
    pub fn into_inner(self) -> T {
        match self {
            DataOr::Wrapped { data } => data,
            DataOr::Bare(inner) => inner,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

/// `results` of the stream endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamResults {
    streaming_link: OneOrMany<StreamingLink>,
    #[serde(default)]
    servers: Vec<ServerEntry>,
}

#[derive(Debug, Deserialize)]
struct StreamingLink {
    #[serde(rename = "type")]
    track_type: Option<TrackType>,
    link: MediaLink,
    #[serde(default)]
    tracks: Vec<WireTrack>,
    intro: Option<TimeWindow>,
    outro: Option<TimeWindow>,
    server: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaLink {
    file: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct WireTrack {
    file: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    default: bool,
}

impl StreamResults {
    /// Validate the wire payload into a manifest for `selector`
    pub fn into_manifest(self, selector: &StreamSelector) -> Result<StreamManifest> {
        let link = match self.streaming_link {
            OneOrMany::One(link) => link,
            OneOrMany::Many(links) => links
                .into_iter()
                .next()
                .ok_or_else(|| Error::InvalidResponseShape("stream: empty streamingLink".into()))?,
        };

        let source = Url::parse(&link.link.file).map_err(|e| {
            Error::InvalidResponseShape(format!("stream: bad link '{}': {e}", link.link.file))
        })?;
        let media_kind = MediaKind::from_api(&link.link.kind, &source);

        let subtitle_tracks = link
            .tracks
            .into_iter()
            .filter(|t| t.kind != "thumbnails")
            .filter_map(|t| match Url::parse(&t.file) {
                Ok(uri) => Some(SubtitleTrack {
                    label: t.label.unwrap_or_else(|| "Unknown".to_string()),
                    uri,
                    kind: t.kind,
                    is_default: t.default,
                }),
                Err(e) => {
                    warn!(file = %t.file, error = %e, "Skipping subtitle track with invalid URL");
                    None
                }
            })
            .collect();

        Ok(StreamManifest {
            source,
            media_kind,
            subtitle_tracks,
            intro: link.intro.and_then(TimeWindow::into_marker),
            outro: link.outro.and_then(TimeWindow::into_marker),
            servers: self.servers,
            server_name: link.server.unwrap_or_else(|| selector.server.clone()),
            track_type: link.track_type.unwrap_or(selector.track_type),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stream_body() -> serde_json::Value {
        json!({
            "success": true,
            "results": {
                "streamingLink": {
                    "id": "7882",
                    "type": "sub",
                    "link": { "file": "https://cdn.example.com/ep/master.m3u8", "type": "hls" },
                    "tracks": [
                        { "file": "https://cdn.example.com/ep/eng.vtt", "label": "English", "kind": "captions", "default": true },
                        { "file": "https://cdn.example.com/ep/thumbs.vtt", "kind": "thumbnails" }
                    ],
                    "intro": { "start": 0, "end": 85 },
                    "outro": { "start": 0, "end": 0 },
                    "server": "HD-1"
                },
                "servers": [
                    { "type": "sub", "data_id": "1", "server_id": "4", "serverName": "HD-1" },
                    { "type": "dub", "data_id": "2", "server_id": "4", "serverName": "HD-1" }
                ]
            }
        })
    }

    #[test]
    fn test_decode_stream_manifest() {
        let body = serde_json::to_vec(&stream_body()).unwrap();
        let results: StreamResults = decode("stream", StatusCode::OK, &body).unwrap();
        let selector = StreamSelector::new("naruto", "hd-1", TrackType::Sub);
        let manifest = results.into_manifest(&selector).unwrap();

        assert_eq!(manifest.media_kind, MediaKind::Hls);
        assert_eq!(manifest.subtitle_tracks.len(), 1);
        assert!(manifest.subtitle_tracks[0].is_default);
        assert_eq!(manifest.intro, Some(TimeWindow::new(0.0, 85.0)));
        assert_eq!(manifest.outro, None);
        assert_eq!(manifest.servers.len(), 2);
        assert_eq!(manifest.server_name, "HD-1");
    }

    #[test]
    fn test_success_false_is_gateway_error() {
        let body = br#"{"success":false,"error":"Episode not found"}"#;
        let err = decode::<StreamResults>("stream", StatusCode::OK, body).unwrap_err();
        assert!(matches!(err, Error::Gateway(ref m) if m == "Episode not found"));
    }

    #[test]
    fn test_non_2xx_uses_body_message() {
        let body = br#"{"message":"Token has expired"}"#;
        let err = decode::<StreamResults>("stream", StatusCode::UNAUTHORIZED, body).unwrap_err();
        assert!(matches!(err, Error::Gateway(ref m) if m == "Token has expired"));

        let err = decode::<StreamResults>("stream", StatusCode::BAD_GATEWAY, b"<html>").unwrap_err();
        assert!(matches!(err, Error::Gateway(ref m) if m.contains("502")));
    }

    #[test]
    fn test_garbage_is_invalid_shape() {
        let err = decode::<StreamResults>("stream", StatusCode::OK, b"not json").unwrap_err();
        assert!(matches!(err, Error::InvalidResponseShape(_)));

        let err = decode::<StreamResults>("stream", StatusCode::OK, br#"{"success":true}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidResponseShape(_)));
    }

    #[test]
    fn test_bad_source_link_rejected() {
        let mut body = stream_body();
        body["results"]["streamingLink"]["link"]["file"] = json!("not a url");
        let body = serde_json::to_vec(&body).unwrap();
        let results: StreamResults = decode("stream", StatusCode::OK, &body).unwrap();
        let selector = StreamSelector::new("naruto", "hd-1", TrackType::Sub);
        assert!(matches!(
            results.into_manifest(&selector),
            Err(Error::InvalidResponseShape(_))
        ));
    }

    #[test]
    fn test_streaming_link_array() {
        let mut body = stream_body();
        let link = body["results"]["streamingLink"].clone();
        body["results"]["streamingLink"] = json!([link]);
        let body = serde_json::to_vec(&body).unwrap();
        let results: StreamResults = decode("stream", StatusCode::OK, &body).unwrap();
        let selector = StreamSelector::new("naruto", "hd-1", TrackType::Sub);
        assert!(results.into_manifest(&selector).is_ok());
    }

    #[test]
    fn test_data_wrapper() {
        let wrapped: DataOr<CatalogInfo> =
            serde_json::from_value(json!({"data": {"id": "x", "title": "X"}})).unwrap();
        assert_eq!(wrapped.into_inner().title, "X");
        let bare: DataOr<CatalogInfo> =
            serde_json::from_value(json!({"id": "y", "title": "Y"})).unwrap();
        assert_eq!(bare.into_inner().id, "y");
    }
}
