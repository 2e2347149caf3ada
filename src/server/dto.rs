//! Request and response bodies

use serde::{Deserialize, Serialize};

/// Fixed message for requests without an image URL
pub const MISSING_IMAGE_MESSAGE: &str = "Image URL not provided";

/// Fixed message for successful segmentation
pub const SUCCESS_MESSAGE: &str = "Image processed successfully";

/// Body of `POST /api/segment`
///
/// `image` is optional at the serde level so a missing key can be answered
/// with a dedicated message instead of a generic deserialization error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SegmentRequest {
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentResponse {
    pub status: String,
    pub message: String,
    pub output_path: String,
}

impl SegmentResponse {
    #[must_use]
    pub fn success(output_path: String) -> Self {
        Self {
            status: "success".to_string(),
            message: SUCCESS_MESSAGE.to_string(),
            output_path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub backend: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_tolerates_missing_and_null_image() {
        let request: SegmentRequest = serde_json::from_str("{}").unwrap();
        assert!(request.image.is_none());
        let request: SegmentRequest = serde_json::from_str(r#"{"image": null}"#).unwrap();
        assert!(request.image.is_none());
        let request: SegmentRequest =
            serde_json::from_str(r#"{"image": "https://a.test/x.png", "extra": 1}"#).unwrap();
        assert_eq!(request.image.as_deref(), Some("https://a.test/x.png"));
    }

    #[test]
    fn test_success_body_shape() {
        let body =
            serde_json::to_value(SegmentResponse::success("/tmp/temp_x.png".into())).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "status": "success",
                "message": "Image processed successfully",
                "output_path": "/tmp/temp_x.png"
            })
        );
    }
}
