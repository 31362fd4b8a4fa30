//! AWS Systems Manager Parameter Store backend.

use async_trait::async_trait;
use aws_sdk_ssm::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ssm::operation::get_parameter::GetParameterError;
use tracing::info;

use crate::error::LookupError;

use super::ParameterStore;

/// Parameter store backed by SSM `GetParameter` with decryption enabled.
#[derive(Debug, Clone)]
pub struct SsmParameterStore {
    client: aws_sdk_ssm::Client,
}

impl SsmParameterStore {
    /// Build a client from the default AWS credential chain.
    pub async fn from_env(region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        let sdk_config = loader.load().await;

        info!(
            region = %sdk_config
                .region()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unset".to_string()),
            "Parameter store client initialized"
        );
        Self::new(aws_sdk_ssm::Client::new(&sdk_config))
    }

    pub fn new(client: aws_sdk_ssm::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    async fn get_parameter(&self, key: &str) -> Result<String, LookupError> {
        let output = self
            .client
            .get_parameter()
            .name(key)
            .with_decryption(true)
            .send()
            .await
            .map_err(|err| classify_sdk_error(key, err))?;

        output
            .parameter()
            .and_then(|p| p.value())
            .map(str::to_string)
            .ok_or_else(|| LookupError::Backend {
                key: key.to_string(),
                message: "response carried no parameter value".to_string(),
            })
    }
}

/// Map an SDK failure onto the lookup failure categories.
fn classify_sdk_error(key: &str, err: SdkError<GetParameterError>) -> LookupError {
    match &err {
        SdkError::ServiceError(service_err) => classify_code(
            key,
            service_err.err().code(),
            &DisplayErrorContext(&err).to_string(),
        ),
        _ => LookupError::Backend {
            key: key.to_string(),
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

fn classify_code(key: &str, code: Option<&str>, message: &str) -> LookupError {
    match code {
        Some("ParameterNotFound") => LookupError::NotFound {
            key: key.to_string(),
        },
        Some("InvalidKeyId") => LookupError::InvalidKey {
            key: key.to_string(),
            message: message.to_string(),
        },
        _ => LookupError::Backend {
            key: key.to_string(),
            message: message.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_codes() {
        assert!(matches!(
            classify_code("/a", Some("ParameterNotFound"), "gone"),
            LookupError::NotFound { .. }
        ));
        assert!(matches!(
            classify_code("/a", Some("InvalidKeyId"), "bad key"),
            LookupError::InvalidKey { .. }
        ));
        assert!(matches!(
            classify_code("/a", Some("ThrottlingException"), "slow down"),
            LookupError::Backend { .. }
        ));
        assert!(matches!(
            classify_code("/a", None, "unknown"),
            LookupError::Backend { .. }
        ));
    }

    #[test]
    fn test_classified_error_messages() {
        let err = classify_code("/dev/db", Some("InvalidKeyId"), "KMS key disabled");
        assert_eq!(
            err.to_string(),
            "Parameter '/dev/db' has an invalid KMS key: KMS key disabled"
        );
        assert_eq!(err.category(), "invalid_key");
    }
}
