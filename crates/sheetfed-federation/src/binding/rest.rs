//! REST 绑定：成功为 `200` + JSON 载荷，逻辑错误以 HTTP 状态码表达。

use serde::Serialize;
use serde::de::DeserializeOwned;
use sheetfed_core::{CallError, ErrorKind, ServiceError, ServiceResult};

use super::malformed;

/// 一次 REST 应答。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RestResponse {
    pub status: u16,
    pub body: String,
}

pub const fn status_of(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::BadRequest => 400,
        ErrorKind::Forbidden => 403,
        ErrorKind::NotFound => 404,
        ErrorKind::Conflict => 409,
        ErrorKind::Internal => 500,
        ErrorKind::Unavailable => 503,
    }
}

/// 未列出的错误状态码按服务端内部错误处理。
pub const fn kind_of(status: u16) -> ErrorKind {
    match status {
        400 => ErrorKind::BadRequest,
        403 => ErrorKind::Forbidden,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::Conflict,
        503 => ErrorKind::Unavailable,
        _ => ErrorKind::Internal,
    }
}

pub fn encode<T: Serialize>(result: ServiceResult<T>) -> RestResponse {
    let encoded = result.and_then(|value| {
        serde_json::to_string(&value)
            .map_err(|err| ServiceError::internal(format!("cannot encode response: {err}")))
    });
    match encoded {
        Ok(body) => RestResponse { status: 200, body },
        Err(err) => RestResponse {
            status: status_of(err.kind()),
            body: err.message().to_owned(),
        },
    }
}

pub fn decode<T: DeserializeOwned>(uri: &str, response: RestResponse) -> Result<T, CallError> {
    if (200..300).contains(&response.status) {
        return serde_json::from_str(&response.body).map_err(|err| malformed(uri, err));
    }
    Err(ServiceError::new(kind_of(response.status), response.body).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_travel_as_status_codes() {
        let response = encode::<()>(Err(ServiceError::conflict("already shared")));
        assert_eq!(response.status, 409);
        assert_eq!(response.body, "already shared");
    }

    #[test]
    fn unknown_error_status_decodes_as_internal() {
        let err = decode::<()>("http://beta/rest", RestResponse {
            status: 418,
            body: "teapot".to_owned(),
        })
        .unwrap_err();
        match err {
            CallError::Service(err) => assert_eq!(err.kind(), ErrorKind::Internal),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn garbled_bodies_are_transport_failures() {
        let err = decode::<Vec<String>>("http://beta/rest", RestResponse {
            status: 200,
            body: "{not json".to_owned(),
        })
        .unwrap_err();
        assert!(err.is_transport());
    }
}
