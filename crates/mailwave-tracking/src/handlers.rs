//! Tracking endpoint handlers
//!
//! These handlers face mail clients, privacy proxies and bots, not API
//! consumers. They never surface an error to the caller: a failed
//! recording is logged and the response (pixel, redirect, confirmation
//! page) is served anyway, because a broken image or dead link in a
//! delivered email is worse than a lost data point.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use mailwave_common::types::EventType;
use mailwave_storage::models::NewEvent;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use mailwave_core::verify_unsubscribe_token;

use crate::TrackingState;

/// 1x1 transparent GIF served as the tracking pixel
pub const PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, // GIF89a
    0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, // 1x1, one color
    0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, // palette
    0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, // transparency
    0x2C, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, // image descriptor
    0x02, 0x02, 0x44, 0x01, 0x00, // image data
    0x3B, // trailer
];

/// Caching must be defeated on every pixel response: proxies and clients
/// that cache the pixel would swallow repeat opens.
fn no_cache_headers() -> [(header::HeaderName, &'static str); 3] {
    [
        (
            header::CACHE_CONTROL,
            "no-cache, no-store, must-revalidate",
        ),
        (header::PRAGMA, "no-cache"),
        (header::EXPIRES, "0"),
    ]
}

fn pixel_response() -> Response {
    (
        no_cache_headers(),
        [(header::CONTENT_TYPE, "image/gif")],
        PIXEL_GIF,
    )
        .into_response()
}

/// First client IP from X-Forwarded-For, if present
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Country code injected by the edge proxy, if any
fn client_country(headers: &HeaderMap) -> Option<String> {
    for name in ["cf-ipcountry", "x-geo-country"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            let value = value.trim();
            if !value.is_empty() && value != "XX" {
                return Some(value.to_uppercase());
            }
        }
    }
    None
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
pub struct OpenQuery {
    pub email: Option<String>,
}

/// Redirect target for one pixel fetch. The timestamp comes from the
/// clock at request time, so repeated fetches, even through a caching
/// proxy, produce distinct render URLs. The address is re-encoded
/// because it left the query parser decoded.
fn render_url(campaign_id: Uuid, recipient_id: Uuid, t_ms: i64, email: Option<&str>) -> String {
    let mut url = format!(
        "/track/open/{}/{}/render.gif?t={}",
        campaign_id, recipient_id, t_ms
    );
    if let Some(email) = email {
        url.push_str("&email=");
        url.push_str(&urlencoding::encode(email));
    }
    url
}

/// GET /track/open/:campaign_id/:recipient_id.gif
///
/// The pixel URL embedded into emails. Redirects to the renderer with a
/// fresh timestamp stamped into the URL.
pub async fn track_open(
    State(state): State<TrackingState>,
    Path((campaign_id, recipient)): Path<(String, String)>,
    Query(query): Query<OpenQuery>,
) -> Response {
    let parsed = campaign_id.parse::<Uuid>().ok().zip(
        recipient
            .strip_suffix(".gif")
            .and_then(|r| r.parse::<Uuid>().ok()),
    );

    let (campaign_id, recipient_id) = match parsed {
        Some(ids) => ids,
        None => {
            debug!("Unparseable open-tracking path, serving bare pixel");
            return pixel_response();
        }
    };

    let target = render_url(
        campaign_id,
        recipient_id,
        state.clock.now_ms(),
        query.email.as_deref(),
    );

    (no_cache_headers(), Redirect::temporary(&target)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct RenderQuery {
    pub email: Option<String>,
}

/// GET /track/open/:campaign_id/:recipient_id/render.gif
///
/// Serves the pixel and records the open against the campaign and
/// recipient in the path. A request with an unparseable path still gets
/// the pixel.
pub async fn render_pixel(
    State(state): State<TrackingState>,
    Path((campaign_id, recipient_id)): Path<(String, String)>,
    Query(query): Query<RenderQuery>,
    headers: HeaderMap,
) -> Response {
    let parsed = campaign_id
        .parse::<Uuid>()
        .ok()
        .zip(recipient_id.parse::<Uuid>().ok());

    let (campaign_id, recipient_id) = match parsed {
        Some(ids) => ids,
        None => return pixel_response(),
    };

    let variation_id = match state.recipient_repo.get(campaign_id, recipient_id).await {
        Ok(Some(recipient)) => recipient.variation_id,
        Ok(None) => None,
        Err(e) => {
            warn!("Failed to look up recipient for open: {}", e);
            None
        }
    };

    let mut event = NewEvent::new(campaign_id, recipient_id, EventType::Open, state.clock.now());
    event.email = query.email;
    event.variation_id = variation_id;
    event.user_agent = user_agent(&headers);
    event.ip_address = client_ip(&headers);
    event.country = client_country(&headers);

    if let Err(e) = state.event_repo.append(event).await {
        warn!(
            "Failed to record open for campaign {} recipient {}: {}",
            campaign_id, recipient_id, e
        );
    } else if let Err(e) = state
        .recipient_repo
        .touch_last_event(campaign_id, recipient_id)
        .await
    {
        warn!("Failed to touch recipient engagement timestamp: {}", e);
    }

    pixel_response()
}

/// GET /track/click/:tracking_id
///
/// Records the click and redirects to the original destination. An
/// unknown or malformed tracking id redirects to the configured
/// fallback so the reader never lands on an error page.
pub async fn track_click(
    State(state): State<TrackingState>,
    Path(tracking_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let tracking_id = match tracking_id.parse::<Uuid>() {
        Ok(id) => id,
        Err(_) => {
            debug!("Unparseable click tracking id, redirecting to fallback");
            return Redirect::temporary(&state.config.fallback_url).into_response();
        }
    };

    let mapping = match state.link_repo.get(tracking_id).await {
        Ok(Some(m)) => m,
        Ok(None) => {
            warn!("Unknown click tracking id {}", tracking_id);
            return Redirect::temporary(&state.config.fallback_url).into_response();
        }
        Err(e) => {
            warn!("Failed to resolve click tracking id {}: {}", tracking_id, e);
            return Redirect::temporary(&state.config.fallback_url).into_response();
        }
    };

    let mut event = NewEvent::new(
        mapping.campaign_id,
        mapping.recipient_id,
        EventType::Click,
        state.clock.now(),
    );
    event.email = mapping.email.clone();
    event.variation_id = mapping.variation_id.clone();
    event.user_agent = user_agent(&headers);
    event.ip_address = client_ip(&headers);
    event.country = client_country(&headers);
    event.metadata = serde_json::json!({
        "link_id": mapping.link_id,
        "url": mapping.original_url,
    });

    if let Err(e) = state.event_repo.append(event).await {
        warn!("Failed to record click {}: {}", tracking_id, e);
    } else if let Err(e) = state
        .recipient_repo
        .touch_last_event(mapping.campaign_id, mapping.recipient_id)
        .await
    {
        warn!("Failed to touch recipient engagement timestamp: {}", e);
    }

    Redirect::temporary(&mapping.original_url).into_response()
}

/// GET /unsubscribe/:token
///
/// Verifies the signed token, adds the address to the suppression list
/// and records the event. Shows a plain confirmation page either way;
/// an invalid token gets a polite error instead of a stack trace.
pub async fn unsubscribe(
    State(state): State<TrackingState>,
    Path(token): Path<String>,
) -> Response {
    let claims = match verify_unsubscribe_token(&state.config.unsubscribe_secret, &token) {
        Some(claims) => claims,
        None => {
            warn!("Invalid unsubscribe token");
            return (
                StatusCode::BAD_REQUEST,
                Html(UNSUBSCRIBE_INVALID_PAGE.to_string()),
            )
                .into_response();
        }
    };

    if let Err(e) = state
        .unsubscribe_repo
        .insert(
            Some(claims.campaign_id),
            &claims.email,
            Some(claims.contact_id),
            "link",
        )
        .await
    {
        warn!("Failed to record unsubscribe for {}: {}", claims.email, e);
    }

    let mut event = NewEvent::new(
        claims.campaign_id,
        claims.contact_id,
        EventType::Unsubscribe,
        state.clock.now(),
    );
    event.email = Some(claims.email.clone());

    if let Err(e) = state.event_repo.append(event).await {
        warn!("Failed to record unsubscribe event: {}", e);
    }

    Html(unsubscribe_page(&claims.email)).into_response()
}

const UNSUBSCRIBE_INVALID_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Unsubscribe</title></head>
<body style="font-family:sans-serif;max-width:480px;margin:80px auto">
<h1>Link expired</h1>
<p>This unsubscribe link is invalid or has expired. Please use the link
from a more recent email.</p>
</body></html>"#;

fn unsubscribe_page(email: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html><head><title>Unsubscribed</title></head>
<body style="font-family:sans-serif;max-width:480px;margin:80px auto">
<h1>You're unsubscribed</h1>
<p>{} will no longer receive emails from this sender.</p>
</body></html>"#,
        email
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailwave_common::clock::{Clock, SteppingClock};

    fn timestamp_param(url: &str) -> i64 {
        url.split("t=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .and_then(|t| t.parse().ok())
            .expect("render url carries a t parameter")
    }

    #[test]
    fn test_repeat_opens_produce_distinct_render_urls() {
        let clock = SteppingClock::new(1_700_000_000_000, 1);
        let campaign_id = Uuid::new_v4();
        let recipient_id = Uuid::new_v4();

        let timestamps: Vec<i64> = (0..3)
            .map(|_| timestamp_param(&render_url(campaign_id, recipient_id, clock.now_ms(), None)))
            .collect();

        assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_render_url_shape_and_email_encoding() {
        let campaign_id = Uuid::new_v4();
        let recipient_id = Uuid::new_v4();

        let url = render_url(campaign_id, recipient_id, 42, Some("user+tag@example.com"));
        assert_eq!(
            url,
            format!(
                "/track/open/{}/{}/render.gif?t=42&email=user%2Btag%40example.com",
                campaign_id, recipient_id
            )
        );

        let bare = render_url(campaign_id, recipient_id, 42, None);
        assert!(bare.ends_with("/render.gif?t=42"));
    }

    #[test]
    fn test_pixel_is_valid_gif89a() {
        assert_eq!(&PIXEL_GIF[..6], b"GIF89a");
        assert_eq!(*PIXEL_GIF.last().unwrap(), 0x3B);
    }

    #[test]
    fn test_client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.9, 10.0.0.1".parse().unwrap(),
        );
        assert_eq!(client_ip(&headers), Some("203.0.113.9".to_string()));

        assert_eq!(client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn test_client_country_normalizes_and_skips_unknown() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-ipcountry", "de".parse().unwrap());
        assert_eq!(client_country(&headers), Some("DE".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert("cf-ipcountry", "XX".parse().unwrap());
        assert_eq!(client_country(&headers), None);
    }
}
