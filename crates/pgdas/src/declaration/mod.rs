//! Typed PGDAS-D declaration document and its assembly from revenue rows.

mod assembler;
mod period;
mod wire;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::activity::ActivityCode;
use crate::sources::TaxQualifier;

pub use assembler::{
    AssembledDeclaration, AssemblyError, DeclarationAssembler, UnresolvedSegment, PAYROLL_MONTHS,
};
pub use period::{InvalidPeriod, Period};
pub use wire::to_wire;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationType {
    Original,
    Amended,
}

impl DeclarationType {
    pub const fn code(self) -> u8 {
        match self {
            Self::Original => 1,
            Self::Amended => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Original),
            2 => Some(Self::Amended),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Original => "ORIGINAL",
            Self::Amended => "RETIFICADORA",
        }
    }
}

impl Serialize for DeclarationType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for DeclarationType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown tipoDeclaracao {code}")))
    }
}

/// Root document sent as `dados` of a `TRANSDECLARACAO11` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    #[serde(rename = "cnpjCompleto")]
    pub taxpayer_id: String,
    #[serde(rename = "pa")]
    pub period: Period,
    #[serde(rename = "indicadorTransmissao")]
    pub transmit: bool,
    #[serde(rename = "indicadorComparacao")]
    pub compare: bool,
    #[serde(rename = "declaracao")]
    pub body: DeclarationBody,
}

impl Declaration {
    /// JSON as sent to SERPRO, with empty members omitted.
    pub fn to_wire(&self) -> Result<Value, serde_json::Error> {
        wire::to_wire(self)
    }

    pub fn declaration_type(&self) -> DeclarationType {
        self.body.declaration_type
    }

    pub fn total_revenue(&self) -> f64 {
        round_cents(self.body.domestic_revenue + self.body.export_revenue)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarationBody {
    #[serde(rename = "tipoDeclaracao")]
    pub declaration_type: DeclarationType,
    #[serde(rename = "receitaPaCompetenciaInterno")]
    pub domestic_revenue: f64,
    #[serde(rename = "receitaPaCompetenciaExterno")]
    pub export_revenue: f64,
    #[serde(rename = "folhasSalario", default, skip_serializing_if = "Option::is_none")]
    pub payroll: Option<Vec<PayrollEntry>>,
    #[serde(rename = "estabelecimentos", default)]
    pub establishments: Vec<Establishment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollEntry {
    pub pa: Period,
    pub valor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Establishment {
    #[serde(rename = "cnpjCompleto")]
    pub taxpayer_id: String,
    #[serde(rename = "atividades", default)]
    pub activities: Vec<ActivityAggregate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityAggregate {
    #[serde(rename = "idAtividade")]
    pub activity: ActivityCode,
    #[serde(rename = "valorAtividade")]
    pub amount: f64,
    #[serde(rename = "receitasAtividade", default)]
    pub entries: Vec<RevenueEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueEntry {
    #[serde(rename = "valor")]
    pub amount: f64,
    #[serde(rename = "qualificacoesTributarias", default)]
    pub qualifiers: Vec<TaxQualifier>,
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
