use serde_json::Value;

use crate::declaration::round_cents;

/// Fiscal fields SERPRO returns inside the string-encoded `dados` of a
/// finished declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FiscalReceipt {
    pub amounts_due: Vec<Value>,
    pub declaration_id: Option<String>,
    pub receipt: Option<Value>,
    /// `declaracao` when SERPRO returns the rendered document as base64.
    pub document_base64: Option<String>,
    /// `tipoDeclaracao` when `declaracao` comes back as an object instead.
    pub declaration_type: Option<u8>,
}

impl FiscalReceipt {
    /// Accepts either a raw SERPRO body (`{dados}`) or an audit snapshot
    /// (`{status, body: {dados}}`). Undecodable `dados` yields an empty receipt.
    pub fn from_response(response: &Value) -> Self {
        let dados = response
            .get("body")
            .and_then(|body| body.get("dados"))
            .or_else(|| response.get("dados"));

        match decode_dados(dados) {
            Some(inner) => Self::from_dados(&inner),
            None => Self::default(),
        }
    }

    pub fn from_dados(dados: &Value) -> Self {
        let amounts_due = dados
            .get("valoresDevidos")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let declaration_id = match dados.get("idDeclaracao") {
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        let receipt = dados.get("recibo").filter(|value| !value.is_null()).cloned();

        let (document_base64, declaration_type) = match dados.get("declaracao") {
            Some(Value::String(document)) if !document.is_empty() => (Some(document.clone()), None),
            Some(Value::Object(fields)) => (
                None,
                fields
                    .get("tipoDeclaracao")
                    .and_then(Value::as_u64)
                    .and_then(|code| u8::try_from(code).ok()),
            ),
            _ => (None, None),
        };

        Self {
            amounts_due,
            declaration_id,
            receipt,
            document_base64,
            declaration_type,
        }
    }

    /// Sum of `valoresDevidos[].valor`, rounded to cents.
    pub fn total_due(&self) -> f64 {
        let total = self
            .amounts_due
            .iter()
            .filter_map(|entry| match entry.get("valor") {
                Some(Value::Number(value)) => value.as_f64(),
                Some(Value::String(value)) => value.trim().parse::<f64>().ok(),
                _ => None,
            })
            .sum();
        round_cents(total)
    }
}

/// `dados` arrives as a JSON string on most services, but some gateways
/// already send the decoded list or object.
pub fn decode_dados(raw: Option<&Value>) -> Option<Value> {
    match raw? {
        Value::String(text) if !text.trim().is_empty() => serde_json::from_str(text).ok(),
        value @ (Value::Array(_) | Value::Object(_)) => Some(value.clone()),
        _ => None,
    }
}
