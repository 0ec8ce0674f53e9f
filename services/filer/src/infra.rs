use chrono::NaiveDate;
use pgdas::activity::SegmentKey;
use pgdas::declaration::Period;
use pgdas::pipeline::{NotifyError, PartnerNotifier, PartnerPayload};
use pgdas::sources::{
    PayrollSource, RevenueRow, RevenueSource, SourceError, TaxQualifier, TaxTableSource,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

const REVENUE_SOURCE: &str = "revenue export";
const TAX_TABLE_SOURCE: &str = "tax table export";
const PAYROLL_SOURCE: &str = "payroll export";

/// ERP revenue export, one line per establishment and tax-table segment.
#[derive(Debug, Deserialize)]
struct RevenueLine {
    codi_emp: String,
    cgce_emp: String,
    anexo: u16,
    secao: u16,
    tabela: u16,
    #[serde(deserialize_with = "deserialize_amount")]
    basen: f64,
    #[serde(deserialize_with = "deserialize_date")]
    data_sim: NaiveDate,
    #[serde(default, deserialize_with = "deserialize_qualifiers")]
    qualificacoes: Vec<TaxQualifier>,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct CsvRevenueSource {
    rows: Vec<RevenueRow>,
}

impl CsvRevenueSource {
    pub(crate) fn from_path(path: &Path) -> Result<Self, SourceError> {
        Self::from_reader(open(path, REVENUE_SOURCE)?)
    }

    pub(crate) fn from_reader<R: Read>(reader: R) -> Result<Self, SourceError> {
        let rows = read_csv::<RevenueLine, _>(reader, REVENUE_SOURCE)?
            .into_iter()
            .map(|line| RevenueRow {
                establishment_id: line.codi_emp,
                taxpayer_id: digits(&line.cgce_emp),
                segment: SegmentKey::new(line.anexo, line.secao, line.tabela),
                base_amount: line.basen,
                reference_date: line.data_sim,
                qualifiers: line.qualificacoes,
            })
            .collect();
        Ok(Self { rows })
    }
}

impl RevenueSource for CsvRevenueSource {
    /// Rows of every establishment sharing the taxpayer's 8-digit CNPJ root
    /// whose reference date falls in `period`.
    fn revenue_rows(&self, taxpayer_id: &str, period: Period) -> Result<Vec<RevenueRow>, SourceError> {
        let root = cnpj_root(taxpayer_id);
        Ok(self
            .rows
            .iter()
            .filter(|row| cnpj_root(&row.taxpayer_id) == root)
            .filter(|row| Period::from_date(row.reference_date) == period)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct TaxTableLine {
    anexo: u16,
    secao: u16,
    tabela: u16,
    #[serde(deserialize_with = "deserialize_date")]
    vigencia: NaiveDate,
    descricao: String,
}

/// Simples Nacional table dictionary with effective dates.
#[derive(Debug, Default, Clone)]
pub(crate) struct CsvTaxTable {
    entries: HashMap<SegmentKey, Vec<(NaiveDate, String)>>,
}

impl CsvTaxTable {
    pub(crate) fn from_path(path: &Path) -> Result<Self, SourceError> {
        Self::from_reader(open(path, TAX_TABLE_SOURCE)?)
    }

    pub(crate) fn from_reader<R: Read>(reader: R) -> Result<Self, SourceError> {
        let mut entries: HashMap<SegmentKey, Vec<(NaiveDate, String)>> = HashMap::new();
        for line in read_csv::<TaxTableLine, _>(reader, TAX_TABLE_SOURCE)? {
            entries
                .entry(SegmentKey::new(line.anexo, line.secao, line.tabela))
                .or_default()
                .push((line.vigencia, line.descricao));
        }
        for versions in entries.values_mut() {
            versions.sort_by_key(|(effective, _)| *effective);
        }
        Ok(Self { entries })
    }
}

impl TaxTableSource for CsvTaxTable {
    fn effective_description(
        &self,
        segment: SegmentKey,
        as_of: NaiveDate,
    ) -> Result<Option<String>, SourceError> {
        Ok(self.entries.get(&segment).and_then(|versions| {
            versions
                .iter()
                .rev()
                .find(|(effective, _)| *effective <= as_of)
                .map(|(_, description)| description.clone())
        }))
    }
}

#[derive(Debug, Deserialize)]
struct PayrollLine {
    cnpj: String,
    pa: u32,
    #[serde(deserialize_with = "deserialize_amount")]
    valor: f64,
}

/// Monthly payroll totals keyed by CNPJ and period; repeated lines add up.
#[derive(Debug, Default, Clone)]
pub(crate) struct CsvPayroll {
    totals: HashMap<(String, u32), f64>,
}

impl CsvPayroll {
    pub(crate) fn from_path(path: &Path) -> Result<Self, SourceError> {
        Self::from_reader(open(path, PAYROLL_SOURCE)?)
    }

    pub(crate) fn from_reader<R: Read>(reader: R) -> Result<Self, SourceError> {
        let mut totals = HashMap::new();
        for line in read_csv::<PayrollLine, _>(reader, PAYROLL_SOURCE)? {
            *totals.entry((digits(&line.cnpj), line.pa)).or_insert(0.0) += line.valor;
        }
        Ok(Self { totals })
    }
}

impl PayrollSource for CsvPayroll {
    fn payroll_total(&self, taxpayer_id: &str, period: Period) -> Result<Option<f64>, SourceError> {
        Ok(self
            .totals
            .get(&(digits(taxpayer_id), period.yyyymm()))
            .copied())
    }
}

/// Drops each partner payload as `<cnpj>_<pa>_<tipo>.json` for pickup by the
/// forwarding job.
#[derive(Debug, Clone)]
pub(crate) struct OutboxNotifier {
    dir: PathBuf,
}

impl OutboxNotifier {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl PartnerNotifier for OutboxNotifier {
    fn notify(&self, payload: &PartnerPayload) -> Result<(), NotifyError> {
        let transport = |err: String| NotifyError::Transport(format!("{}: {err}", self.dir.display()));
        fs::create_dir_all(&self.dir).map_err(|err| transport(err.to_string()))?;

        let path = self.dir.join(format!(
            "{}_{}_{}.json",
            payload.cnpj,
            payload.pa,
            payload.declaration_type.unwrap_or_default()
        ));
        let body = serde_json::to_vec_pretty(payload).map_err(|err| transport(err.to_string()))?;
        fs::write(&path, body).map_err(|err| transport(err.to_string()))?;

        info!(path = %path.display(), total_due = payload.total_due, "partner payload queued");
        Ok(())
    }
}

fn open(path: &Path, source_name: &'static str) -> Result<fs::File, SourceError> {
    fs::File::open(path).map_err(|err| SourceError::Unavailable {
        source_name,
        message: format!("{}: {err}", path.display()),
    })
}

fn read_csv<T, R>(reader: R, source_name: &'static str) -> Result<Vec<T>, SourceError>
where
    T: for<'de> Deserialize<'de>,
    R: Read,
{
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
        .deserialize::<T>()
        .map(|record| {
            record.map_err(|err| SourceError::Malformed {
                source_name,
                message: err.to_string(),
            })
        })
        .collect()
}

fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

fn cnpj_root(raw: &str) -> String {
    digits(raw).chars().take(8).collect()
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_period(raw: &str) -> Result<Period, String> {
    Period::from_str(raw.trim()).map_err(|err| err.to_string())
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).map_err(serde::de::Error::custom)
}

/// Accepts `1234.56` as well as the ERP's `1.234,56`.
fn deserialize_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let trimmed = raw.trim();
    let normalized = if trimmed.contains(',') {
        trimmed.replace('.', "").replace(',', ".")
    } else {
        trimmed.to_string()
    };
    normalized
        .parse::<f64>()
        .map_err(|err| serde::de::Error::custom(format!("invalid amount '{raw}' ({err})")))
}

/// `codigoTributo:id` pairs separated by `;`, e.g. `1001:2;1004:5`.
fn deserialize_qualifiers<'de, D>(deserializer: D) -> Result<Vec<TaxQualifier>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (tax_code, qualification_id) = pair
                .split_once(':')
                .ok_or_else(|| format!("qualifier '{pair}' must look like code:id"))?;
            Ok(TaxQualifier {
                tax_code: tax_code.trim().parse().map_err(|_| format!("bad tax code in '{pair}'"))?,
                qualification_id: qualification_id
                    .trim()
                    .parse()
                    .map_err(|_| format!("bad qualification id in '{pair}'"))?,
            })
        })
        .collect::<Result<_, String>>()
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const REVENUE: &str = "\
codi_emp,cgce_emp,anexo,secao,tabela,basen,data_sim,qualificacoes
12,11.222.333/0001-81,1,1,1,\"1.500,25\",2025-05-31,1001:2;1004:5
13,11222333000262,3,1,2,800.00,2025-05-31,
14,99888777000166,1,1,1,10.00,2025-05-31,
12,11222333000181,1,1,1,99.00,2025-04-30,
";

    #[test]
    fn revenue_rows_follow_cnpj_root_and_period() {
        let source = CsvRevenueSource::from_reader(Cursor::new(REVENUE)).expect("valid csv");
        let rows = source
            .revenue_rows("11222333000181", Period::new(2025, 5).expect("valid period"))
            .expect("rows");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].taxpayer_id, "11222333000181");
        assert_eq!(rows[0].base_amount, 1500.25);
        assert_eq!(
            rows[0].qualifiers,
            vec![
                TaxQualifier { tax_code: 1001, qualification_id: 2 },
                TaxQualifier { tax_code: 1004, qualification_id: 5 },
            ]
        );
        assert_eq!(rows[1].establishment_id, "13");
        assert!(rows[1].qualifiers.is_empty());
    }

    #[test]
    fn malformed_revenue_is_reported() {
        let csv = "codi_emp,cgce_emp,anexo,secao,tabela,basen,data_sim\n1,1,1,1,1,abc,2025-05-01\n";
        let err = CsvRevenueSource::from_reader(Cursor::new(csv)).expect_err("bad amount");
        assert!(matches!(err, SourceError::Malformed { .. }));
    }

    #[test]
    fn tax_table_picks_latest_effective_version() {
        let csv = "\
anexo,secao,tabela,vigencia,descricao
1,1,1,2018-01-01,Revenda de mercadorias antiga
1,1,1,2024-01-01,Revenda de mercadorias
";
        let table = CsvTaxTable::from_reader(Cursor::new(csv)).expect("valid csv");
        let segment = SegmentKey::new(1, 1, 1);

        let current = table
            .effective_description(segment, NaiveDate::from_ymd_opt(2025, 5, 1).expect("date"))
            .expect("lookup");
        assert_eq!(current.as_deref(), Some("Revenda de mercadorias"));

        let older = table
            .effective_description(segment, NaiveDate::from_ymd_opt(2020, 5, 1).expect("date"))
            .expect("lookup");
        assert_eq!(older.as_deref(), Some("Revenda de mercadorias antiga"));

        let before_any = table
            .effective_description(segment, NaiveDate::from_ymd_opt(2017, 5, 1).expect("date"))
            .expect("lookup");
        assert!(before_any.is_none());
    }

    #[test]
    fn payroll_lines_are_summed() {
        let csv = "cnpj,pa,valor\n11222333000181,202504,1000\n11222333000181,202504,\"250,50\"\n";
        let payroll = CsvPayroll::from_reader(Cursor::new(csv)).expect("valid csv");
        let total = payroll
            .payroll_total("11.222.333/0001-81", Period::new(2025, 4).expect("valid period"))
            .expect("lookup");
        assert_eq!(total, Some(1250.5));
    }

    #[test]
    fn outbox_writes_one_file_per_declaration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let notifier = OutboxNotifier::new(dir.path().join("outbox"));
        let payload = PartnerPayload {
            cnpj: "11222333000181".to_string(),
            pa: Period::new(2025, 5).expect("valid period"),
            declaration_type: Some(1),
            total_due: 42.0,
            amounts_due: Vec::new(),
            pdf_base64: None,
            receipt: None,
            declaration_id: Some("ID-1".to_string()),
        };

        notifier.notify(&payload).expect("queued");
        let written = dir.path().join("outbox").join("11222333000181_202505_1.json");
        assert!(written.exists());
    }

    #[test]
    fn parse_period_accepts_yyyymm() {
        assert_eq!(parse_period("202505"), Ok(Period::new(2025, 5).expect("valid period")));
        assert!(parse_period("2025-05").is_err());
    }
}
