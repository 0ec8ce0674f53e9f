use serde::Serialize;

pub const SYSTEM_ID: &str = "PGDASD";
pub const SYSTEM_VERSION: &str = "1.0";
pub const DECLARE_SERVICE: &str = "TRANSDECLARACAO11";
pub const EMIT_SLIP_SERVICE: &str = "GERARDAS12";

/// Document type for a CNPJ in the Integra-SN party blocks.
const CNPJ_DOCUMENT: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Party {
    pub numero: String,
    pub tipo: u8,
}

impl Party {
    pub fn company(cnpj: &str) -> Self {
        Self {
            numero: cnpj.to_string(),
            tipo: CNPJ_DOCUMENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestData {
    pub id_sistema: &'static str,
    pub id_servico: &'static str,
    pub versao_sistema: &'static str,
    /// Inner payload, JSON-encoded as a string.
    pub dados: String,
}

/// Outer Integra-SN request. The contractor signs as both `contratante` and
/// `autorPedidoDados`; the taxpayer goes in `contribuinte`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub contratante: Party,
    pub autor_pedido_dados: Party,
    pub contribuinte: Party,
    pub pedido_dados: RequestData,
}

impl Envelope {
    pub fn new(contractor_id: &str, taxpayer_id: &str, service: &'static str, dados: String) -> Self {
        Self {
            contratante: Party::company(contractor_id),
            autor_pedido_dados: Party::company(contractor_id),
            contribuinte: Party::company(taxpayer_id),
            pedido_dados: RequestData {
                id_sistema: SYSTEM_ID,
                id_servico: service,
                versao_sistema: SYSTEM_VERSION,
                dados,
            },
        }
    }
}
