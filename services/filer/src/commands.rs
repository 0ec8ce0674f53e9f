use crate::infra::{
    parse_date, parse_period, CsvPayroll, CsvRevenueSource, CsvTaxTable, OutboxNotifier,
};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use chrono::{Local, NaiveDate};
use clap::{ArgGroup, Args};
use pgdas::activity::{
    classify_description, normalize_description, ActivityResolver, ResolutionOutcome, SegmentKey,
};
use pgdas::archive::save_payload;
use pgdas::clock::{Clock, SystemClock};
use pgdas::config::{AppConfig, SerproCredentials};
use pgdas::credentials::{ensure_certificate, CredentialManager};
use pgdas::declaration::{DeclarationAssembler, DeclarationType, Period};
use pgdas::error::AppError;
use pgdas::pipeline::{
    DeclarationPipeline, PaymentSlipOutcome, PaymentSlipPipeline, PipelineError, PipelineOutcome,
};
use pgdas::sources::{NoPayroll, PayrollSource, RevenueSource};
use pgdas::store::{
    FileSystemRepository, PaymentSlipRecord, PaymentSlipStore, TransmissionRecord,
    TransmissionStatus, TransmissionStore,
};
use pgdas::transmission::{PaymentSlipRequest, StatusPoller, TransmissionClient};
use pgdas::transport::{HttpTransport, ReqwestTransport};
use serde_json::{json, Value};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const DECLARATIONS_DIR: &str = "declarations";
const PAYMENT_SLIPS_DIR: &str = "payment-slips";

#[derive(Args, Debug)]
pub(crate) struct SourceArgs {
    /// ERP revenue export (CSV: codi_emp, cgce_emp, anexo, secao, tabela, basen, data_sim)
    #[arg(long)]
    pub(crate) revenue: PathBuf,
    /// Tax-table dictionary (CSV: anexo, secao, tabela, vigencia, descricao)
    #[arg(long)]
    pub(crate) tax_table: PathBuf,
    /// Monthly payroll totals (CSV: cnpj, pa, valor), needed for fator r taxpayers
    #[arg(long)]
    pub(crate) payroll: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct DeclareArgs {
    #[command(flatten)]
    pub(crate) sources: SourceArgs,
    /// Period of apuração (YYYYMM)
    #[arg(long, value_parser = parse_period)]
    pub(crate) period: Period,
    /// File a RETIFICADORA instead of an ORIGINAL
    #[arg(long)]
    pub(crate) amended: bool,
    /// Taxpayer CNPJ; repeat the flag for a batch
    #[arg(long = "taxpayer", required = true)]
    pub(crate) taxpayers: Vec<String>,
    /// Directory that receives a partner payload for every accepted filing
    #[arg(long)]
    pub(crate) partner_outbox: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct PreviewArgs {
    #[command(flatten)]
    pub(crate) sources: SourceArgs,
    /// Period of apuração (YYYYMM)
    #[arg(long, value_parser = parse_period)]
    pub(crate) period: Period,
    /// Taxpayer CNPJ
    #[arg(long)]
    pub(crate) taxpayer: String,
    /// Build a RETIFICADORA instead of an ORIGINAL
    #[arg(long)]
    pub(crate) amended: bool,
    /// Print compact JSON
    #[arg(long)]
    pub(crate) compact: bool,
    /// Also save the payload under this directory (defaults to PGDAS_ARCHIVE_DIR)
    #[arg(long)]
    pub(crate) archive_dir: Option<PathBuf>,
    /// File label for the archived payload (defaults to the first establishment)
    #[arg(long)]
    pub(crate) label: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct EmitDasArgs {
    /// Taxpayer CNPJ
    #[arg(long)]
    pub(crate) taxpayer: String,
    /// Period of apuração (YYYYMM)
    #[arg(long, value_parser = parse_period)]
    pub(crate) period: Period,
    /// Consolidation date (YYYY-MM-DD). Defaults to tomorrow.
    #[arg(long, value_parser = parse_date)]
    pub(crate) consolidation_date: Option<NaiveDate>,
    /// Write the decoded DAS PDF here
    #[arg(long)]
    pub(crate) pdf_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("input").required(true).args(["description", "tax_table"])))]
pub(crate) struct ResolveArgs {
    /// Simples Nacional annex (1-6, 105)
    #[arg(long)]
    pub(crate) annex: u16,
    /// Classify this description directly
    #[arg(long)]
    pub(crate) description: Option<String>,
    /// Look the segment up in this tax-table export instead
    #[arg(long)]
    pub(crate) tax_table: Option<PathBuf>,
    #[arg(long, default_value_t = 0)]
    pub(crate) section: u16,
    #[arg(long, default_value_t = 0)]
    pub(crate) table: u16,
    /// Reference date for the tax-table lookup (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) date: Option<NaiveDate>,
}

/// Identity, token cache and client shared by the commands that talk to SERPRO.
struct LiveServices {
    client: Arc<TransmissionClient>,
    clock: Arc<dyn Clock>,
}

impl LiveServices {
    fn connect(config: &AppConfig) -> Result<Self, AppError> {
        let credentials = SerproCredentials::from_env()?;
        let certificate = ensure_certificate(
            &credentials.certificate_path,
            &credentials.certificate_password,
        )?;
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::with_identity(
            &certificate,
            &credentials.certificate_password,
            &config.transmission,
        )?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let manager = Arc::new(CredentialManager::new(
            config.endpoints.auth_url.clone(),
            credentials.consumer_key.clone(),
            credentials.consumer_secret.clone(),
            transport.clone(),
            clock.clone(),
        ));
        let client = TransmissionClient::new(
            transport,
            manager,
            config.endpoints.clone(),
            credentials.contractor_cnpj.clone(),
            credentials.api_key.clone(),
            clock.clone(),
        )
        .with_max_retries(config.transmission.max_retries);

        info!(base_url = %config.endpoints.base_url, "SERPRO client ready");
        Ok(Self {
            client: Arc::new(client),
            clock,
        })
    }
}

fn declaration_type(amended: bool) -> DeclarationType {
    if amended {
        DeclarationType::Amended
    } else {
        DeclarationType::Original
    }
}

fn offline_parts(
    config: &AppConfig,
    sources: &SourceArgs,
) -> Result<(Arc<CsvRevenueSource>, DeclarationAssembler), AppError> {
    let tables = Arc::new(CsvTaxTable::from_path(&sources.tax_table)?);
    let resolver = Arc::new(ActivityResolver::with_capacity(
        tables,
        config.declaration.resolver_cache_capacity,
    ));
    let payroll: Arc<dyn PayrollSource> = match &sources.payroll {
        Some(path) => Arc::new(CsvPayroll::from_path(path)?),
        None => Arc::new(NoPayroll),
    };
    let revenue = Arc::new(CsvRevenueSource::from_path(&sources.revenue)?);
    let assembler = DeclarationAssembler::new(resolver, payroll, config.declaration.transmit);
    Ok((revenue, assembler))
}

pub(crate) fn run_declare(config: &AppConfig, args: DeclareArgs) -> Result<(), AppError> {
    let DeclareArgs {
        sources,
        period,
        amended,
        taxpayers,
        partner_outbox,
    } = args;

    let (revenue, assembler) = offline_parts(config, &sources)?;
    let live = LiveServices::connect(config)?;

    let repository = FileSystemRepository::<TransmissionRecord>::open(
        config.storage.store_dir.join(DECLARATIONS_DIR),
    )?;
    let store = TransmissionStore::new(Arc::new(repository), live.clock.clone());
    let poller = StatusPoller::new(live.client.clone(), live.clock.clone()).with_timing(
        config.transmission.poll_interval,
        config.transmission.poll_budget,
    );

    let mut pipeline = DeclarationPipeline::new(revenue, assembler, store, live.client, poller);
    if let Some(dir) = partner_outbox {
        pipeline = pipeline.with_notifier(Arc::new(OutboxNotifier::new(dir)));
    }
    if let Some(dir) = &config.storage.archive_dir {
        pipeline = pipeline.with_archive(dir.clone());
    }

    let results = pipeline.run_batch(&taxpayers, period, declaration_type(amended));
    for (taxpayer, result) in &results {
        let line = match result {
            Ok(outcome) => declaration_summary(outcome),
            Err(err) => {
                json!({ "cnpj": taxpayer, "pa": period, "status": "ERROR", "erro": err.to_string() })
            }
        };
        println!("{line}");
    }

    let failures = results
        .iter()
        .filter(|(_, result)| batch_entry_failed(result))
        .count();
    info!(taxpayers = results.len(), failures, "declaration batch finished");
    batch_result(failures, results.len())
}

/// `ALREADY_SENT` is not a failure: the declaration is on record.
fn batch_entry_failed(result: &Result<PipelineOutcome, PipelineError>) -> bool {
    match result {
        Ok(outcome) => outcome.status == TransmissionStatus::Failure,
        Err(_) => true,
    }
}

fn batch_result(failed: usize, total: usize) -> Result<(), AppError> {
    if failed == 0 {
        Ok(())
    } else {
        Err(AppError::BatchFailed { failed, total })
    }
}

pub(crate) fn run_preview(config: &AppConfig, args: PreviewArgs) -> Result<(), AppError> {
    let (revenue, assembler) = offline_parts(config, &args.sources)?;
    let rows = revenue.revenue_rows(&args.taxpayer, args.period)?;
    let assembled = assembler.build(&rows, declaration_type(args.amended))?;

    let wire = assembled.declaration.to_wire()?;
    let rendered = if args.compact {
        serde_json::to_string(&wire)?
    } else {
        serde_json::to_string_pretty(&wire)?
    };
    println!("{rendered}");

    for row in &assembled.unresolved {
        eprintln!(
            "unclassified: establishment {} segment {} amount {:.2} ({})",
            row.establishment_id,
            row.segment,
            row.amount,
            row.description.as_deref().unwrap_or("no description")
        );
    }

    if let Some(dir) = args.archive_dir.or_else(|| config.storage.archive_dir.clone()) {
        let label = args
            .label
            .as_deref()
            .or_else(|| rows.first().map(|row| row.establishment_id.as_str()));
        let path = save_payload(&assembled.declaration, label, &dir, !args.compact)?;
        eprintln!("payload saved to {}", path.display());
    }
    Ok(())
}

pub(crate) fn run_emit_das(config: &AppConfig, args: EmitDasArgs) -> Result<(), AppError> {
    let request = match args.consolidation_date {
        Some(date) => PaymentSlipRequest::new(args.taxpayer, args.period, date),
        None => PaymentSlipRequest::consolidated_tomorrow(
            args.taxpayer,
            args.period,
            Local::now().date_naive(),
        ),
    };

    let live = LiveServices::connect(config)?;
    let repository = FileSystemRepository::<PaymentSlipRecord>::open(
        config.storage.store_dir.join(PAYMENT_SLIPS_DIR),
    )?;
    let store = PaymentSlipStore::new(Arc::new(repository), live.clock.clone());
    let outcome = PaymentSlipPipeline::new(live.client, store).run(&request)?;

    let pdf = outcome.slip.as_ref().and_then(|slip| slip.pdf_base64.as_deref());
    if let (Some(path), Some(pdf)) = (&args.pdf_out, pdf) {
        let bytes = BASE64_STANDARD
            .decode(pdf.trim())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        fs::write(path, bytes)?;
        info!(path = %path.display(), "DAS PDF written");
    }

    println!("{}", slip_summary(&outcome));
    Ok(())
}

pub(crate) fn run_resolve(args: ResolveArgs) -> Result<(), AppError> {
    if let Some(description) = &args.description {
        let outcome = classify_description(args.annex, description);
        println!(
            "{}",
            json!({
                "anexo": args.annex,
                "normalizada": normalize_description(description),
                "resultado": describe_outcome(&outcome),
            })
        );
        return Ok(());
    }

    let Some(path) = &args.tax_table else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "either --description or --tax-table is required",
        )
        .into());
    };
    let resolver = ActivityResolver::new(Arc::new(CsvTaxTable::from_path(path)?));
    let segment = SegmentKey::new(args.annex, args.section, args.table);
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());
    let resolution = resolver.resolve_segment(segment, date)?;

    println!(
        "{}",
        json!({
            "segmento": segment.to_string(),
            "pa": resolution.period,
            "descricao": resolution.description,
            "resultado": describe_outcome(&resolution.outcome),
        })
    );
    Ok(())
}

fn describe_outcome(outcome: &ResolutionOutcome) -> Value {
    match outcome {
        ResolutionOutcome::Rule(code) => json!({
            "idAtividade": code.get(),
            "metodo": "regra",
            "atividade": code.description(),
        }),
        ResolutionOutcome::Fuzzy { code, score } => json!({
            "idAtividade": code.get(),
            "metodo": "similaridade",
            "score": score,
            "atividade": code.description(),
        }),
        ResolutionOutcome::BelowThreshold { closest, score } => json!({
            "idAtividade": Value::Null,
            "metodo": "abaixo do limiar",
            "maisProxima": closest.get(),
            "score": score,
        }),
        ResolutionOutcome::MissingDescription => json!({
            "idAtividade": Value::Null,
            "metodo": "sem descricao",
        }),
    }
}

fn declaration_summary(outcome: &PipelineOutcome) -> Value {
    json!({
        "cnpj": outcome.key.taxpayer_id,
        "pa": outcome.key.period,
        "tipoDeclaracao": outcome.key.declaration_type.code(),
        "tipo": outcome.key.declaration_type.label(),
        "status": outcome.status,
        "idDeclaracao": outcome.receipt.as_ref().and_then(|receipt| receipt.declaration_id.clone()),
        "totalDevido": outcome.receipt.as_ref().map(|receipt| receipt.total_due()),
        "erro": outcome.error_message,
        "naoClassificados": outcome.unresolved.len(),
    })
}

fn slip_summary(outcome: &PaymentSlipOutcome) -> Value {
    json!({
        "cnpj": outcome.key.taxpayer_id,
        "pa": outcome.key.period,
        "dataConsolidacao": outcome.key.consolidation_date.format("%Y%m%d").to_string(),
        "status": outcome.status,
        "pdf": outcome.slip.as_ref().is_some_and(|slip| slip.pdf_base64.is_some()),
        "detalhamento": outcome.slip.as_ref().and_then(|slip| slip.details.clone()),
        "erro": outcome.error_message,
    })
}
