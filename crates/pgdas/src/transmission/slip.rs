use chrono::{Days, NaiveDate};
use serde_json::{json, Value};

use super::receipt::decode_dados;
use super::TransmissionResponse;
use crate::declaration::Period;

/// Input of a `GERARDAS12` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSlipRequest {
    pub taxpayer_id: String,
    pub period: Period,
    pub consolidation_date: NaiveDate,
}

impl PaymentSlipRequest {
    pub fn new(taxpayer_id: impl Into<String>, period: Period, consolidation_date: NaiveDate) -> Self {
        Self {
            taxpayer_id: taxpayer_id.into(),
            period,
            consolidation_date,
        }
    }

    /// Consolidates on the day after `today`, the default SERPRO accepts for
    /// slips issued during business hours.
    pub fn consolidated_tomorrow(
        taxpayer_id: impl Into<String>,
        period: Period,
        today: NaiveDate,
    ) -> Self {
        let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
        Self::new(taxpayer_id, period, tomorrow)
    }

    /// `AAAAMMDD` form of the consolidation date.
    pub fn consolidation_label(&self) -> String {
        self.consolidation_date.format("%Y%m%d").to_string()
    }

    pub fn payload(&self) -> Value {
        json!({
            "cnpj": self.taxpayer_id,
            "pa": self.period.yyyymm(),
            "dataConsolidacao": self.consolidation_label(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentSlip {
    pub pdf_base64: Option<String>,
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SlipOutcome {
    Issued(PaymentSlip),
    Rejected { status: u16, body: Value },
}

impl SlipOutcome {
    /// Non-2xx statuses and non-object bodies are rejections. A 2xx whose
    /// `dados` cannot be decoded still counts as issued, without a PDF.
    pub fn from_response(response: &TransmissionResponse) -> Self {
        if !response.is_success() || !response.body.is_object() {
            return Self::Rejected {
                status: response.status,
                body: response.body.clone(),
            };
        }

        let slip = match decode_dados(response.body.get("dados")) {
            Some(Value::Array(items)) => items.first().map(slip_from).unwrap_or_default(),
            Some(object @ Value::Object(_)) => slip_from(&object),
            _ => PaymentSlip::default(),
        };
        Self::Issued(slip)
    }
}

fn slip_from(entry: &Value) -> PaymentSlip {
    PaymentSlip {
        pdf_base64: entry
            .get("pdf")
            .and_then(Value::as_str)
            .filter(|pdf| !pdf.is_empty())
            .map(str::to_string),
        details: entry.get("detalhamento").filter(|value| !value.is_null()).cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: Value) -> TransmissionResponse {
        TransmissionResponse { status, body }
    }

    #[test]
    fn default_consolidation_is_next_day() {
        let request = PaymentSlipRequest::consolidated_tomorrow(
            "11222333000181",
            Period::new(2025, 5).expect("valid period"),
            NaiveDate::from_ymd_opt(2025, 6, 30).expect("valid date"),
        );
        assert_eq!(request.consolidation_label(), "20250701");
    }

    #[test]
    fn first_list_entry_carries_the_pdf() {
        let dados = json!([{ "pdf": "JVBERi0=", "detalhamento": [{ "numeroDocumento": "1" }] }]);
        let outcome = SlipOutcome::from_response(&response(200, json!({ "dados": dados.to_string() })));
        assert_eq!(
            outcome,
            SlipOutcome::Issued(PaymentSlip {
                pdf_base64: Some("JVBERi0=".to_string()),
                details: Some(json!([{ "numeroDocumento": "1" }])),
            })
        );
    }

    #[test]
    fn object_dados_and_garbage_dados() {
        let outcome = SlipOutcome::from_response(&response(200, json!({ "dados": { "pdf": "AA==" } })));
        assert!(matches!(outcome, SlipOutcome::Issued(PaymentSlip { pdf_base64: Some(_), .. })));

        let outcome = SlipOutcome::from_response(&response(200, json!({ "dados": "{broken" })));
        assert_eq!(outcome, SlipOutcome::Issued(PaymentSlip::default()));
    }

    #[test]
    fn non_success_or_text_body_is_rejected() {
        let outcome = SlipOutcome::from_response(&response(400, json!({ "mensagens": [] })));
        assert!(matches!(outcome, SlipOutcome::Rejected { status: 400, .. }));

        let outcome = SlipOutcome::from_response(&response(200, Value::String("ok".to_string())));
        assert!(matches!(outcome, SlipOutcome::Rejected { status: 200, .. }));
    }
}
