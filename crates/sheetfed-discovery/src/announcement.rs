//! 公告报文编解码。
//!
//! # 教案式说明
//! - **意图 (Why)**：公告是域之间唯一的带外协议，格式必须稳定且解析必须“宁缺毋滥”：
//!   任何字段数量不对的报文都整体丢弃，绝不猜测；
//! - **契约 (What)**：报文为 ASCII 文本 `<domain>:<service>\t<uri>`，最长 1024 字节；
//!   左侧恰好被 `:` 分成两段，整体恰好被 `\t` 分成两段；`service` 必须是已知服务名；
//! - **执行 (How)**：纯字节切分，不做去空白或大小写归一，保证编码与解码一一对应。

use sheetfed_core::{ServiceEndpoint, ServiceName};

use crate::error::AnnouncementError;

/// 单个公告报文的上限。
pub const MAX_ANNOUNCEMENT_LEN: usize = 1024;

/// 已解析的公告。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Announcement {
    pub domain: String,
    pub service: ServiceName,
    pub uri: String,
}

impl Announcement {
    pub fn parse(payload: &[u8]) -> Result<Self, AnnouncementError> {
        if payload.len() > MAX_ANNOUNCEMENT_LEN {
            return Err(AnnouncementError::TooLong {
                len: payload.len(),
                max: MAX_ANNOUNCEMENT_LEN,
            });
        }
        if !payload.is_ascii() {
            return Err(AnnouncementError::NotText);
        }
        let text = std::str::from_utf8(payload).map_err(|_| AnnouncementError::NotText)?;

        let fields: Vec<&str> = text.split('\t').collect();
        let &[key, uri] = fields.as_slice() else {
            return Err(AnnouncementError::FieldCount {
                found: fields.len(),
            });
        };
        let parts: Vec<&str> = key.split(':').collect();
        let &[domain, service] = parts.as_slice() else {
            return Err(AnnouncementError::KeyFieldCount { found: parts.len() });
        };

        if domain.is_empty() {
            return Err(AnnouncementError::EmptyField { field: "domain" });
        }
        if uri.is_empty() {
            return Err(AnnouncementError::EmptyField { field: "uri" });
        }
        Ok(Self {
            domain: domain.to_owned(),
            service: service.parse()?,
            uri: uri.to_owned(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        format!("{}:{}\t{}", self.domain, self.service, self.uri).into_bytes()
    }

    pub fn into_endpoint(self) -> ServiceEndpoint {
        ServiceEndpoint::new(self.domain, self.service, self.uri)
    }
}

impl From<&ServiceEndpoint> for Announcement {
    fn from(endpoint: &ServiceEndpoint) -> Self {
        Self {
            domain: endpoint.domain.clone(),
            service: endpoint.service,
            uri: endpoint.uri.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_well_formed_announcement() {
        let parsed = Announcement::parse(b"alpha:sheets\thttp://10.0.0.7:8080/soap").unwrap();
        assert_eq!(parsed.domain, "alpha");
        assert_eq!(parsed.service, ServiceName::Spreadsheets);
        assert_eq!(parsed.uri, "http://10.0.0.7:8080/soap");
    }

    #[test]
    fn rejects_wrong_field_counts() {
        assert_eq!(
            Announcement::parse(b"alpha:users"),
            Err(AnnouncementError::FieldCount { found: 1 })
        );
        assert_eq!(
            Announcement::parse(b"alpha:users\thttp://a/rest\textra"),
            Err(AnnouncementError::FieldCount { found: 3 })
        );
        assert_eq!(
            Announcement::parse(b"alpha\thttp://a/rest"),
            Err(AnnouncementError::KeyFieldCount { found: 1 })
        );
        assert_eq!(
            Announcement::parse(b"a:b:users\thttp://a/rest"),
            Err(AnnouncementError::KeyFieldCount { found: 3 })
        );
    }

    #[test]
    fn rejects_unknown_services_and_empty_fields() {
        assert!(matches!(
            Announcement::parse(b"alpha:files\thttp://a/rest"),
            Err(AnnouncementError::UnknownService(_))
        ));
        assert_eq!(
            Announcement::parse(b":users\thttp://a/rest"),
            Err(AnnouncementError::EmptyField { field: "domain" })
        );
        assert_eq!(
            Announcement::parse(b"alpha:users\t"),
            Err(AnnouncementError::EmptyField { field: "uri" })
        );
    }

    #[test]
    fn rejects_oversized_payloads() {
        let mut payload = b"alpha:users\thttp://a/".to_vec();
        payload.resize(MAX_ANNOUNCEMENT_LEN + 1, b'x');
        assert!(matches!(
            Announcement::parse(&payload),
            Err(AnnouncementError::TooLong { .. })
        ));
    }

    proptest! {
        #[test]
        fn encoded_announcements_parse_back(
            domain in "[a-z][a-z0-9.-]{0,20}",
            users in any::<bool>(),
            uri in "http://[a-z0-9.]{1,20}:[0-9]{1,5}/(rest|soap)",
        ) {
            let service = if users { ServiceName::Users } else { ServiceName::Spreadsheets };
            let announcement = Announcement { domain, service, uri };
            prop_assert_eq!(Announcement::parse(&announcement.encode()), Ok(announcement));
        }

        #[test]
        fn arbitrary_bytes_never_panic(payload in proptest::collection::vec(any::<u8>(), 0..1100)) {
            let _ = Announcement::parse(&payload);
        }
    }
}
