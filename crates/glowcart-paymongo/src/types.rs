use serde::{Deserialize, Serialize};

/// A request to charge a chargeable source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub source_id: String,
    /// Smallest currency unit (centavos for PHP).
    pub amount: i64,
    pub currency: String,
    pub description: Option<String>,
}

/// The payment PayMongo created for a [`ChargeRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargedPayment {
    pub payment_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePaymentBody<'a> {
    pub data: CreatePaymentData<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePaymentData<'a> {
    pub attributes: CreatePaymentAttributes<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePaymentAttributes<'a> {
    pub amount: i64,
    pub currency: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    pub source: SourceRef<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SourceRef<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
}

impl<'a> CreatePaymentBody<'a> {
    pub(crate) fn from_request(request: &'a ChargeRequest) -> Self {
        Self {
            data: CreatePaymentData {
                attributes: CreatePaymentAttributes {
                    amount: request.amount,
                    currency: &request.currency,
                    description: request.description.as_deref(),
                    source: SourceRef {
                        id: &request.source_id,
                        kind: "source",
                    },
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PaymentResponse {
    pub data: PaymentResource,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PaymentResource {
    pub id: String,
    pub attributes: PaymentResourceAttributes,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PaymentResourceAttributes {
    pub status: String,
}

/// `{"errors": [{"code": .., "detail": ..}]}`
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    #[serde(default)]
    pub errors: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorItem {
    pub code: Option<String>,
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_payment_body_has_paymongo_shape() {
        let request = ChargeRequest {
            source_id: "src_abc".to_string(),
            amount: 150_000,
            currency: "PHP".to_string(),
            description: None,
        };
        let json = serde_json::to_value(CreatePaymentBody::from_request(&request)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "data": {
                    "attributes": {
                        "amount": 150_000,
                        "currency": "PHP",
                        "source": {"id": "src_abc", "type": "source"}
                    }
                }
            })
        );
    }

    #[test]
    fn error_envelope_tolerates_missing_fields() {
        let parsed: ErrorEnvelope =
            serde_json::from_str(r#"{"errors":[{"detail":"source is not chargeable"}]}"#).unwrap();
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0].code.is_none());
    }
}
