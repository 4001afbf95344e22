//! Email content instrumentation.
//!
//! Before a campaign email goes out, its HTML is rewritten so every
//! engagement comes back through the tracking endpoints: CTA links are
//! replaced with click-redirect URLs backed by stored mappings, a
//! tracking pixel is injected, and an unsubscribe footer is appended.

use mailwave_common::types::{CampaignId, ContactId};
use mailwave_storage::models::LinkMapping;
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::token::generate_unsubscribe_token;

/// Instrumented HTML plus the link mappings it references
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub html: String,
    pub link_mappings: Vec<LinkMapping>,
}

fn href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // href attribute with a double- or single-quoted value
        Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).expect("valid href pattern")
    })
}

/// URLs that must never be rewritten into click redirects
fn is_trackable(url: &str) -> bool {
    let lower = url.to_lowercase();
    (lower.starts_with("http://") || lower.starts_with("https://"))
        && !lower.contains("/track/")
        && !lower.contains("/unsubscribe/")
}

/// Rewrite every trackable link in the HTML to a click-redirect URL,
/// recording one mapping per link occurrence.
pub fn rewrite_links(
    html: &str,
    base_url: &str,
    campaign_id: CampaignId,
    recipient_id: ContactId,
    variation_id: Option<&str>,
    email: &str,
) -> (String, Vec<LinkMapping>) {
    let mut mappings = Vec::new();
    let mut link_index = 0usize;

    let rewritten = href_regex().replace_all(html, |caps: &regex::Captures<'_>| {
        let original = &caps[1];
        if !is_trackable(original) {
            return caps[0].to_string();
        }

        let tracking_id = Uuid::new_v4();
        link_index += 1;
        mappings.push(LinkMapping {
            tracking_id,
            campaign_id,
            recipient_id,
            link_id: format!("link-{}", link_index),
            original_url: original.to_string(),
            variation_id: variation_id.map(|v| v.to_string()),
            email: Some(email.to_string()),
            created_at: chrono::Utc::now(),
        });

        format!(r#"href="{}/track/click/{}""#, base_url, tracking_id)
    });

    (rewritten.into_owned(), mappings)
}

/// Inject the tracking pixel just before `</body>`, or append it when the
/// HTML has no body close tag. The pixel points at the redirect endpoint;
/// the redirect stamps the cache-busting timestamp at open time.
pub fn inject_pixel(html: &str, pixel_url: &str) -> String {
    let pixel = format!(
        r#"<img src="{}" width="1" height="1" border="0" alt="" style="display:block" />"#,
        pixel_url
    );

    match html.rfind("</body>") {
        Some(pos) => format!("{}{}{}", &html[..pos], pixel, &html[pos..]),
        None => format!("{}{}", html, pixel),
    }
}

/// Append an unsubscribe footer before `</body>`
pub fn append_unsubscribe_footer(html: &str, unsubscribe_url: &str) -> String {
    let footer = format!(
        r#"<p style="font-size:12px;color:#888"><a href="{}">Unsubscribe</a></p>"#,
        unsubscribe_url
    );

    match html.rfind("</body>") {
        Some(pos) => format!("{}{}{}", &html[..pos], footer, &html[pos..]),
        None => format!("{}{}", html, footer),
    }
}

/// Fully instrument one recipient's email body
#[allow(clippy::too_many_arguments)]
pub fn render_tracked_email(
    html: &str,
    base_url: &str,
    unsubscribe_secret: &str,
    campaign_id: CampaignId,
    recipient_id: ContactId,
    variation_id: Option<&str>,
    email: &str,
) -> RenderedEmail {
    // Footer first so its link is not rewritten into a click redirect
    let token = generate_unsubscribe_token(unsubscribe_secret, campaign_id, recipient_id, email);
    let unsubscribe_url = format!("{}/unsubscribe/{}", base_url, token);

    let (html, link_mappings) =
        rewrite_links(html, base_url, campaign_id, recipient_id, variation_id, email);

    // The address goes into a query parameter and back out through a
    // query parser, so characters like '+' must survive the round trip.
    let pixel_url = format!(
        "{}/track/open/{}/{}.gif?email={}",
        base_url,
        campaign_id,
        recipient_id,
        urlencoding::encode(email)
    );

    let html = inject_pixel(&html, &pixel_url);
    let html = append_unsubscribe_footer(&html, &unsubscribe_url);

    RenderedEmail {
        html,
        link_mappings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rewrites_http_links_and_records_mappings() {
        let html = r#"<body><a href="https://example.com/sale">Shop</a>
            <a href="https://example.com/docs">Docs</a></body>"#;

        let (rewritten, mappings) = rewrite_links(
            html,
            "https://track.test",
            Uuid::new_v4(),
            Uuid::new_v4(),
            Some("a"),
            "user@example.com",
        );

        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].link_id, "link-1");
        assert_eq!(mappings[0].original_url, "https://example.com/sale");
        assert_eq!(mappings[1].link_id, "link-2");
        assert!(rewritten.contains(&format!(
            "https://track.test/track/click/{}",
            mappings[0].tracking_id
        )));
        assert!(!rewritten.contains("https://example.com/sale"));
    }

    #[test]
    fn test_mailto_and_anchor_links_untouched() {
        let html = r##"<a href="mailto:hi@example.com">Mail</a><a href="#top">Top</a>"##;

        let (rewritten, mappings) = rewrite_links(
            html,
            "https://track.test",
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            "user@example.com",
        );

        assert!(mappings.is_empty());
        assert_eq!(rewritten, html);
    }

    #[test]
    fn test_already_tracked_links_untouched() {
        let html = r#"<a href="https://track.test/track/click/abc">Go</a>"#;

        let (rewritten, mappings) = rewrite_links(
            html,
            "https://track.test",
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            "user@example.com",
        );

        assert!(mappings.is_empty());
        assert_eq!(rewritten, html);
    }

    #[test]
    fn test_pixel_injected_before_body_close() {
        let html = "<body><p>Hello</p></body>";
        let result = inject_pixel(html, "https://track.test/track/open/c/r.gif");

        let pixel_pos = result.find("<img").unwrap();
        let body_pos = result.find("</body>").unwrap();
        assert!(pixel_pos < body_pos);
    }

    #[test]
    fn test_pixel_appended_without_body_tag() {
        let html = "<p>Hello</p>";
        let result = inject_pixel(html, "https://track.test/p.gif");
        assert!(result.ends_with("/>"));
        assert!(result.starts_with("<p>Hello</p>"));
    }

    #[test]
    fn test_render_tracked_email_combines_everything() {
        let campaign_id = Uuid::new_v4();
        let recipient_id = Uuid::new_v4();

        let rendered = render_tracked_email(
            r#"<body><a href="https://example.com">Go</a></body>"#,
            "https://track.test",
            "secret",
            campaign_id,
            recipient_id,
            Some("b"),
            "user@example.com",
        );

        assert_eq!(rendered.link_mappings.len(), 1);
        assert_eq!(rendered.link_mappings[0].variation_id.as_deref(), Some("b"));
        assert!(rendered.html.contains("/track/click/"));
        assert!(rendered
            .html
            .contains(&format!("/track/open/{}/{}.gif", campaign_id, recipient_id)));
        assert!(rendered.html.contains("/unsubscribe/"));
    }

    #[test]
    fn test_pixel_url_percent_encodes_email() {
        let rendered = render_tracked_email(
            "<body><p>Hi</p></body>",
            "https://track.test",
            "secret",
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            "user+tag@example.com",
        );

        assert!(rendered.html.contains("email=user%2Btag%40example.com"));
        assert!(!rendered.html.contains("email=user+tag@example.com"));
    }
}
