//! Shared REST response envelope used by every WaveGrid service.

use serde::{Deserialize, Serialize};

/// JSON envelope for API responses: `{ success, data?, error? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Unwrap the envelope into its payload (client side).
    pub fn into_data(self) -> Result<T, String> {
        if self.success {
            self.data.ok_or_else(|| "missing data in response".to_string())
        } else {
            Err(self.error.unwrap_or_else(|| "unknown error".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_roundtrip() {
        let resp = ApiResponse::ok(42u32);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("error"));
        let back: ApiResponse<u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.into_data().unwrap(), 42);
    }

    #[test]
    fn error_envelope_surfaces_message() {
        let resp: ApiResponse<u32> = ApiResponse::err("no spectrum");
        assert_eq!(resp.into_data().unwrap_err(), "no spectrum");
    }
}
