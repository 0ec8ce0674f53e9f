use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::declaration::{DeclarationType, Period};
use crate::transmission::FiscalReceipt;

/// Downstream consumer of successful filings (billing, client portal).
pub trait PartnerNotifier: Send + Sync {
    fn notify(&self, payload: &PartnerPayload) -> Result<(), NotifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("partner transport unavailable: {0}")]
    Transport(String),
    #[error("partner rejected notification with status {status}")]
    Rejected { status: u16 },
}

/// Summary forwarded once a declaration is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerPayload {
    pub cnpj: String,
    pub pa: Period,
    #[serde(rename = "tipoDeclaracao")]
    pub declaration_type: Option<u8>,
    #[serde(rename = "totalDevido")]
    pub total_due: f64,
    #[serde(rename = "valoresDevidos")]
    pub amounts_due: Vec<Value>,
    #[serde(rename = "pdfBase64")]
    pub pdf_base64: Option<String>,
    #[serde(rename = "recibo")]
    pub receipt: Option<Value>,
    #[serde(rename = "idDeclaracao")]
    pub declaration_id: Option<String>,
}

impl PartnerPayload {
    /// An explicit declaration type or PDF wins over what the receipt carries.
    pub fn from_receipt(
        cnpj: impl Into<String>,
        period: Period,
        receipt: &FiscalReceipt,
        declaration_type: Option<DeclarationType>,
        pdf_base64: Option<String>,
    ) -> Self {
        Self {
            cnpj: cnpj.into(),
            pa: period,
            declaration_type: declaration_type
                .map(DeclarationType::code)
                .or(receipt.declaration_type),
            total_due: receipt.total_due(),
            amounts_due: receipt.amounts_due.clone(),
            pdf_base64: pdf_base64.or_else(|| receipt.document_base64.clone()),
            receipt: receipt.receipt.clone(),
            declaration_id: receipt.declaration_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn receipt() -> FiscalReceipt {
        FiscalReceipt::from_dados(&json!({
            "idDeclaracao": "ID-77",
            "recibo": "R-1",
            "declaracao": { "tipoDeclaracao": 2 },
            "valoresDevidos": [{ "valor": 100.0 }, { "valor": 0.5 }]
        }))
    }

    #[test]
    fn payload_falls_back_to_receipt_fields() {
        let payload = PartnerPayload::from_receipt(
            "11222333000181",
            Period::new(2025, 5).expect("valid period"),
            &receipt(),
            None,
            None,
        );

        assert_eq!(payload.declaration_type, Some(2));
        assert_eq!(payload.total_due, 100.5);
        assert!(payload.pdf_base64.is_none());

        let wire = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(wire["pa"], json!(202505));
        assert_eq!(wire["idDeclaracao"], json!("ID-77"));
        assert_eq!(wire["pdfBase64"], Value::Null);
    }

    #[test]
    fn explicit_values_override_receipt() {
        let payload = PartnerPayload::from_receipt(
            "11222333000181",
            Period::new(2025, 5).expect("valid period"),
            &receipt(),
            Some(DeclarationType::Original),
            Some("JVBERi0=".to_string()),
        );
        assert_eq!(payload.declaration_type, Some(1));
        assert_eq!(payload.pdf_base64.as_deref(), Some("JVBERi0="));
    }
}
