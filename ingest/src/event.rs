use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Engagement event categories we act on. Anything else is audited but
/// never mutates subscriber state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Open,
    Click,
    Other,
}

/// One decoded element of a SendGrid notification batch.
///
/// Field names follow the SendGrid wire format. Everything except `event`,
/// `email`, `timestamp` and `url` is opaque pass-through kept only for the
/// audit row.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventRecord {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sg_message_id: String,
    #[serde(default, rename = "smtp-id")]
    pub smtp_id: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub useragent: String,
}

impl EventRecord {
    /// A record with no email or a zero timestamp must never reach storage.
    pub fn is_valid(&self) -> bool {
        !self.email.is_empty() && self.timestamp != 0
    }

    pub fn event_type(&self) -> EventType {
        match self.event.as_str() {
            "open" => EventType::Open,
            "click" => EventType::Click,
            _ => EventType::Other,
        }
    }

    /// The event time as a UTC instant. `None` only for timestamps outside
    /// the representable range.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// Trim a clicked URL to fit the fixed-width subscriber column.
///
/// Keeps `min(len - 1, 254)` bytes: the final byte is dropped even for
/// short URLs, matching the boundary every existing row was written with.
/// Backs off to the previous char boundary rather than splitting a UTF-8
/// code point.
pub fn truncate_url(url: &str) -> &str {
    let mut keep = url.len().saturating_sub(1).min(254);
    while !url.is_char_boundary(keep) {
        keep -= 1;
    }
    &url[..keep]
}

#[cfg(test)]
mod tests {
    use chrono::SecondsFormat;

    use super::{truncate_url, EventRecord, EventType};

    #[test]
    fn parses_a_sendgrid_batch_element() {
        let body = r#"[{
            "event": "click",
            "email": "b@x.com",
            "timestamp": 1700000000,
            "url": "https://example.com/p",
            "category": "newsletter",
            "sg_message_id": "14c5d75ce93.dfd.64b469",
            "smtp-id": "<14c5d75ce93.dfd.64b469@ismtpd-555>",
            "ip": "10.0.0.1",
            "useragent": "Mozilla/4.0"
        }]"#;

        let events: Vec<EventRecord> = serde_json::from_str(body).unwrap();
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.event_type(), EventType::Click);
        assert_eq!(event.email, "b@x.com");
        assert_eq!(event.timestamp, 1700000000);
        assert_eq!(event.url, "https://example.com/p");
        assert_eq!(event.category, "newsletter");
        assert_eq!(event.smtp_id, "<14c5d75ce93.dfd.64b469@ismtpd-555>");
        assert_eq!(event.useragent, "Mozilla/4.0");
        assert!(event.is_valid());
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let events: Vec<EventRecord> = serde_json::from_str(r#"[{"event":"open"}]"#).unwrap();
        assert_eq!(events[0].email, "");
        assert_eq!(events[0].timestamp, 0);
        assert!(!events[0].is_valid());
    }

    #[test]
    fn unknown_event_types_map_to_other() {
        for name in ["bounce", "processed", "spamreport", ""] {
            let record = EventRecord {
                event: name.to_string(),
                ..Default::default()
            };
            assert_eq!(record.event_type(), EventType::Other);
        }
    }

    #[test]
    fn validation_requires_email_and_nonzero_timestamp() {
        let valid = EventRecord {
            email: "a@x.com".to_string(),
            timestamp: 1700000000,
            ..Default::default()
        };
        assert!(valid.is_valid());

        let no_email = EventRecord {
            timestamp: 1700000000,
            ..Default::default()
        };
        assert!(!no_email.is_valid());

        let zero_timestamp = EventRecord {
            email: "a@x.com".to_string(),
            ..Default::default()
        };
        assert!(!zero_timestamp.is_valid());
    }

    #[test]
    fn occurred_at_is_the_rfc3339_instant_of_the_epoch() {
        let record = EventRecord {
            email: "a@x.com".to_string(),
            timestamp: 1700000000,
            ..Default::default()
        };
        let occurred_at = record.occurred_at().unwrap();
        assert_eq!(
            occurred_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            "2023-11-14T22:13:20Z"
        );
    }

    #[test]
    fn truncation_drops_the_final_byte_of_short_urls() {
        assert_eq!(truncate_url("https://example.com/p"), "https://example.com/");
        assert_eq!(truncate_url("a"), "");
        assert_eq!(truncate_url(""), "");
    }

    #[test]
    fn truncation_caps_long_urls_at_254_bytes() {
        let url = "a".repeat(300);
        let kept = truncate_url(&url);
        assert_eq!(kept.len(), 254);
        assert_eq!(kept, &url[..254]);

        let url = "b".repeat(255);
        assert_eq!(truncate_url(&url).len(), 254);

        // 254 bytes sits under the cap, so only the historical trim applies.
        let url = "c".repeat(254);
        assert_eq!(truncate_url(&url).len(), 253);
    }

    #[test]
    fn truncation_never_splits_a_code_point() {
        // 253 ASCII bytes followed by a two-byte code point: the cap lands
        // in the middle of it.
        let url = format!("{}\u{e9}", "a".repeat(253));
        assert_eq!(url.len(), 255);
        assert_eq!(truncate_url(&url), "a".repeat(253));
    }
}
