//! SOAP 绑定：应答是带可选 fault 的信封，fault code 为错误种类的稳定名称。

use serde::Serialize;
use serde::de::DeserializeOwned;
use sheetfed_core::{CallError, ErrorKind, ServiceError, ServiceResult};

use super::malformed;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SoapFault {
    pub code: String,
    pub reason: String,
}

/// 一次 SOAP 应答；`fault` 存在时忽略 `body`。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SoapEnvelope {
    pub body: String,
    pub fault: Option<SoapFault>,
}

pub fn kind_of(code: &str) -> ErrorKind {
    match code {
        "bad_request" => ErrorKind::BadRequest,
        "not_found" => ErrorKind::NotFound,
        "forbidden" => ErrorKind::Forbidden,
        "conflict" => ErrorKind::Conflict,
        "unavailable" => ErrorKind::Unavailable,
        _ => ErrorKind::Internal,
    }
}

pub fn encode<T: Serialize>(result: ServiceResult<T>) -> SoapEnvelope {
    let encoded = result.and_then(|value| {
        serde_json::to_string(&value)
            .map_err(|err| ServiceError::internal(format!("cannot encode response: {err}")))
    });
    match encoded {
        Ok(body) => SoapEnvelope { body, fault: None },
        Err(err) => SoapEnvelope {
            body: String::new(),
            fault: Some(SoapFault {
                code: err.kind().as_str().to_owned(),
                reason: err.message().to_owned(),
            }),
        },
    }
}

pub fn decode<T: DeserializeOwned>(uri: &str, envelope: SoapEnvelope) -> Result<T, CallError> {
    match envelope.fault {
        Some(fault) => Err(ServiceError::new(kind_of(&fault.code), fault.reason).into()),
        None => serde_json::from_str(&envelope.body).map_err(|err| malformed(uri, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_codes_use_stable_kind_names() {
        let envelope = encode::<()>(Err(ServiceError::forbidden("not shared")));
        let fault = envelope.fault.unwrap();
        assert_eq!(fault.code, "forbidden");
        assert_eq!(fault.reason, "not shared");
    }

    #[test]
    fn unknown_fault_codes_decode_as_internal() {
        let err = decode::<()>("http://beta/soap", SoapEnvelope {
            body: String::new(),
            fault: Some(SoapFault {
                code: "Server".to_owned(),
                reason: "stack trace".to_owned(),
            }),
        })
        .unwrap_err();
        match err {
            CallError::Service(err) => assert_eq!(err.kind(), ErrorKind::Internal),
            other => panic!("unexpected {other:?}"),
        }
    }
}
