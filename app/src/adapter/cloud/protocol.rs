use serde::{Deserialize, Serialize};

pub(super) const APP_TYPE: &str = "Kasa_Android";

/// Outbound request body. The cloud API is a JSON-RPC-like passthrough:
/// every call is a POST with a `method` and optional `params`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum CloudRequest<'a> {
    #[serde(rename = "login")]
    Login {
        #[serde(rename = "appType")]
        app_type: &'a str,
        #[serde(rename = "cloudUserName")]
        username: &'a str,
        #[serde(rename = "cloudPassword")]
        password: &'a str,
        #[serde(rename = "terminalUUID")]
        terminal_uuid: &'a str,
    },
    #[serde(rename = "getDeviceList")]
    GetDeviceList,
    #[serde(rename = "passthrough")]
    Passthrough {
        #[serde(rename = "deviceId")]
        device_id: &'a str,
        #[serde(rename = "requestData")]
        request_data: serde_json::Value,
    },
}

/// Raw cloud response. Kept as the untouched payload because the last
/// response is persisted verbatim per device; accessors only classify.
#[derive(Debug, Clone, Serialize, Deserialize, derive_more::From)]
#[serde(transparent)]
pub struct CloudResponse(serde_json::Value);

impl CloudResponse {
    pub fn error_code(&self) -> i64 {
        self.0.get("error_code").and_then(serde_json::Value::as_i64).unwrap_or(0)
    }

    /// The cloud reports failure as a negative error code.
    pub fn is_error(&self) -> bool {
        self.error_code() < 0
    }

    pub fn error_message(&self) -> &str {
        self.0
            .get("msg")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown cloud error")
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        self.0.get("result")
    }

    pub fn token(&self) -> Option<&str> {
        self.result()?.get("token")?.as_str()
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;

    use super::*;

    #[test]
    fn login_request_shape() {
        let request = CloudRequest::Login {
            app_type: APP_TYPE,
            username: "user@example.com",
            password: "hunter2",
            terminal_uuid: "b5f8c9a0",
        };

        assert_json_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "method": "login",
                "params": {
                    "appType": "Kasa_Android",
                    "cloudUserName": "user@example.com",
                    "cloudPassword": "hunter2",
                    "terminalUUID": "b5f8c9a0"
                }
            })
        );
    }

    #[test]
    fn device_list_request_shape() {
        assert_json_eq!(
            serde_json::to_value(&CloudRequest::GetDeviceList).unwrap(),
            serde_json::json!({"method": "getDeviceList"})
        );
    }

    #[test]
    fn passthrough_request_shape() {
        let request = CloudRequest::Passthrough {
            device_id: "d1",
            request_data: serde_json::json!({"system": {"set_relay_state": {"state": 0}}}),
        };

        assert_json_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "method": "passthrough",
                "params": {
                    "deviceId": "d1",
                    "requestData": {"system": {"set_relay_state": {"state": 0}}}
                }
            })
        );
    }

    #[test]
    fn negative_error_code_classifies_as_error() {
        let failed = CloudResponse::from(serde_json::json!({
            "error_code": -20651,
            "msg": "Token expired"
        }));

        assert!(failed.is_error());
        assert_eq!(failed.error_code(), -20651);
        assert_eq!(failed.error_message(), "Token expired");

        let ok = CloudResponse::from(serde_json::json!({"error_code": 0, "result": {}}));
        assert!(!ok.is_error());
    }

    #[test]
    fn token_extraction_from_login_result() {
        let response = CloudResponse::from(serde_json::json!({
            "error_code": 0,
            "result": {"accountId": "123", "token": "abc-def"}
        }));

        assert_eq!(response.token(), Some("abc-def"));
        assert_eq!(CloudResponse::from(serde_json::json!({"error_code": 0})).token(), None);
    }
}
