use serde::Serialize;
use serde_json::Value;

/// Serializes `value` and drops every `null`, `[]` and `{}` member, bottom-up,
/// so containers that only held empties disappear too. Zero and `false` stay.
pub fn to_wire<T: Serialize>(value: &T) -> Result<Value, serde_json::Error> {
    Ok(prune(serde_json::to_value(value)?).unwrap_or(Value::Null))
}

fn prune(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => {
            let kept: Vec<Value> = items.into_iter().filter_map(prune).collect();
            (!kept.is_empty()).then_some(Value::Array(kept))
        }
        Value::Object(fields) => {
            let kept: serde_json::Map<String, Value> = fields
                .into_iter()
                .filter_map(|(key, field)| prune(field).map(|field| (key, field)))
                .collect();
            (!kept.is_empty()).then_some(Value::Object(kept))
        }
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn removes_empty_members_recursively() {
        let raw = json!({
            "cnpjCompleto": "12345678000100",
            "indicadorTransmissao": false,
            "declaracao": {
                "receitaPaCompetenciaExterno": 0.0,
                "folhasSalario": [],
                "valorFixoIcms": null,
                "estabelecimentos": [{ "cnpjCompleto": "1", "atividades": [] }],
                "naoOptante": { "esferas": [] }
            }
        });

        let wire = to_wire(&raw).expect("serializes");

        assert_eq!(
            wire,
            json!({
                "cnpjCompleto": "12345678000100",
                "indicadorTransmissao": false,
                "declaracao": {
                    "receitaPaCompetenciaExterno": 0.0,
                    "estabelecimentos": [{ "cnpjCompleto": "1" }]
                }
            })
        );
    }
}
