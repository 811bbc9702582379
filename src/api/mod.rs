use anyhow::Context;
use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{ArgAction, Parser, ValueEnum};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

pub mod export;
mod report;

use crate::core::{
    MAX_HORIZON_YEARS, PayoffPolicy, Projection, ProjectionMetrics, RiskAssessment,
    RiskScenarioResult, ScenarioInputs, UpfrontSummary, YearRecord, assess_risk,
    run_projection, run_risk_scenarios, standard_scenarios,
};
use export::{load_scenario_json, projection_csv, save_scenario_json, write_projection_csv};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliPayoffPolicy {
    Continue,
    StopAtPayoff,
}

impl From<CliPayoffPolicy> for PayoffPolicy {
    fn from(value: CliPayoffPolicy) -> Self {
        match value {
            CliPayoffPolicy::Continue => PayoffPolicy::ContinueToHorizon,
            CliPayoffPolicy::StopAtPayoff => PayoffPolicy::StopAtPayoff,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiPayoffPolicy {
    #[serde(
        alias = "continueToHorizon",
        alias = "continue_to_horizon",
        alias = "continue-to-horizon"
    )]
    Continue,
    #[serde(alias = "stopAtPayoff", alias = "stop_at_payoff")]
    StopAtPayoff,
}

impl From<ApiPayoffPolicy> for CliPayoffPolicy {
    fn from(value: ApiPayoffPolicy) -> Self {
        match value {
            ApiPayoffPolicy::Continue => CliPayoffPolicy::Continue,
            ApiPayoffPolicy::StopAtPayoff => CliPayoffPolicy::StopAtPayoff,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectPayload {
    purchase_price: Option<f64>,
    cash_deposit: Option<f64>,
    equity_contribution: Option<f64>,
    other_upfront_costs: Option<f64>,
    loan_amount: Option<f64>,
    capitalize_lmi: Option<bool>,

    interest_rate: Option<f64>,
    loan_term: Option<u32>,
    projection_years: Option<u32>,
    property_growth: Option<f64>,
    payoff_policy: Option<ApiPayoffPolicy>,

    employment_income: Option<f64>,
    rental_income: Option<f64>,
    agistment_income: Option<f64>,
    employment_income_growth: Option<f64>,
    rental_income_growth: Option<f64>,

    living_expenses: Option<f64>,
    school_fees: Option<f64>,
    property_running_costs: Option<f64>,
    inflation_rate: Option<f64>,

    retirement_year: Option<u32>,
    retirement_lump_sum: Option<f64>,
    partner_retirement_year: Option<u32>,
    partner_lump_sum: Option<f64>,
    lump_sum_payoff: Option<bool>,

    education_change_after: Option<f64>,
    education_new_fees: Option<f64>,
    education_new_duration: Option<u32>,

    include_risk: Option<bool>,
}

#[derive(Parser, Debug)]
#[command(
    name = "homestead",
    about = "Rural property affordability projection (upfront costs, loan, yearly cashflow, risk scenarios)"
)]
struct Cli {
    #[arg(long, default_value_t = 1_700_000.0)]
    purchase_price: f64,
    #[arg(long, default_value_t = 50_000.0, help = "Cash put toward the purchase")]
    cash_deposit: f64,
    #[arg(
        long,
        default_value_t = 1_040_000.0,
        help = "Other funding toward the purchase, e.g. equity released from a current home"
    )]
    equity_contribution: f64,
    #[arg(
        long,
        default_value_t = 5_000.0,
        help = "Legal, inspection and other settlement costs"
    )]
    other_upfront_costs: f64,
    #[arg(long, help = "Override the derived loan amount")]
    loan_amount: Option<f64>,
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        help = "Add LMI to the loan instead of paying it at settlement"
    )]
    capitalize_lmi: bool,
    #[arg(long, default_value_t = 6.0, help = "Annual interest rate in percent")]
    interest_rate: f64,
    #[arg(long, default_value_t = 25, help = "Loan term in years")]
    loan_term: u32,
    #[arg(long, default_value_t = 25, help = "Years to project forward")]
    projection_years: u32,
    #[arg(
        long,
        default_value_t = 4.0,
        allow_hyphen_values = true,
        help = "Annual property value growth in percent"
    )]
    property_growth_rate: f64,
    #[arg(
        long,
        value_enum,
        default_value_t = CliPayoffPolicy::Continue,
        help = "Keep projecting after the loan is repaid, or stop at payoff"
    )]
    payoff_policy: CliPayoffPolicy,
    #[arg(long, default_value_t = 130_000.0, help = "Annual after-tax employment income")]
    employment_income: f64,
    #[arg(long, default_value_t = 21_060.0, help = "Annual rental income after vacancy")]
    rental_income: f64,
    #[arg(long, default_value_t = 8_320.0, help = "Annual agistment income")]
    agistment_income: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        allow_hyphen_values = true,
        help = "Annual employment income growth in percent"
    )]
    employment_income_growth: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        allow_hyphen_values = true,
        help = "Annual rental income growth in percent"
    )]
    rental_income_growth: f64,
    #[arg(long, default_value_t = 78_000.0)]
    living_expenses: f64,
    #[arg(long, default_value_t = 50_000.0, help = "Annual school or boarding fees")]
    school_fees: f64,
    #[arg(
        long,
        default_value_t = 13_500.0,
        help = "Council rates, insurance, maintenance and other property costs"
    )]
    property_running_costs: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        allow_hyphen_values = true,
        help = "Annual inflation in percent, applied to expenses and agistment income"
    )]
    inflation_rate: f64,
    #[arg(long, help = "Year employment income stops and the retirement lump sum lands")]
    retirement_year: Option<u32>,
    #[arg(long, default_value_t = 0.0)]
    retirement_lump_sum: f64,
    #[arg(long, help = "Year the partner's lump sum lands")]
    partner_retirement_year: Option<u32>,
    #[arg(long, default_value_t = 0.0)]
    partner_lump_sum: f64,
    #[arg(long, help = "Apply the retirement lump sum to the loan balance")]
    lump_sum_payoff: bool,
    #[arg(
        long,
        help = "Years until school fees change, e.g. 3.5; fees stop after the new duration"
    )]
    education_change_after: Option<f64>,
    #[arg(long, default_value_t = 0.0, help = "Annual education cost after the change")]
    education_new_fees: f64,
    #[arg(long, default_value_t = 0, help = "Years the new education cost applies")]
    education_new_duration: u32,
    #[arg(long, help = "Load scenario inputs from a saved JSON file")]
    config: Option<PathBuf>,
    #[arg(long, help = "Write the scenario inputs to a JSON file")]
    save_config: Option<PathBuf>,
    #[arg(long, help = "Write the yearly projection to a CSV file")]
    csv: Option<PathBuf>,
    #[arg(long, help = "Skip the risk scenario comparison")]
    skip_risk: bool,
}

#[derive(Debug)]
struct ApiRequest {
    inputs: ScenarioInputs,
    include_risk: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    upfront: UpfrontSummary,
    annual_repayment: f64,
    metrics: ProjectionMetrics,
    years: Vec<YearRecord>,
    risk_scenarios: Vec<RiskScenarioResult>,
    risk_assessment: Option<RiskAssessment>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_inputs(cli: &Cli) -> Result<ScenarioInputs, String> {
    if !cli.purchase_price.is_finite() || cli.purchase_price <= 0.0 {
        return Err("--purchase-price must be > 0".to_string());
    }

    for (name, value) in [
        ("--cash-deposit", cli.cash_deposit),
        ("--equity-contribution", cli.equity_contribution),
        ("--other-upfront-costs", cli.other_upfront_costs),
        ("--employment-income", cli.employment_income),
        ("--rental-income", cli.rental_income),
        ("--agistment-income", cli.agistment_income),
        ("--living-expenses", cli.living_expenses),
        ("--school-fees", cli.school_fees),
        ("--property-running-costs", cli.property_running_costs),
        ("--retirement-lump-sum", cli.retirement_lump_sum),
        ("--partner-lump-sum", cli.partner_lump_sum),
        ("--education-new-fees", cli.education_new_fees),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }

    if let Some(loan) = cli.loan_amount {
        if !loan.is_finite() || loan < 0.0 {
            return Err("--loan-amount must be >= 0".to_string());
        }
    }

    if !(0.0..=100.0).contains(&cli.interest_rate) {
        return Err("--interest-rate must be between 0 and 100".to_string());
    }

    if cli.loan_term == 0 {
        return Err("--loan-term must be >= 1".to_string());
    }

    if cli.projection_years == 0 || cli.projection_years > MAX_HORIZON_YEARS {
        return Err(format!(
            "--projection-years must be between 1 and {MAX_HORIZON_YEARS}"
        ));
    }

    for (name, rate) in [
        ("--property-growth-rate", cli.property_growth_rate),
        ("--employment-income-growth", cli.employment_income_growth),
        ("--rental-income-growth", cli.rental_income_growth),
        ("--inflation-rate", cli.inflation_rate),
    ] {
        if !rate.is_finite() || rate <= -100.0 || rate > 100.0 {
            return Err(format!("{name} must be > -100 and <= 100"));
        }
    }

    if cli.lump_sum_payoff && cli.retirement_year.is_none() {
        return Err("--lump-sum-payoff requires --retirement-year".to_string());
    }

    if cli.education_new_duration > 0 && cli.education_change_after.is_none() {
        return Err("--education-new-duration requires --education-change-after".to_string());
    }

    let inputs = ScenarioInputs {
        purchase_price: cli.purchase_price,
        cash_deposit: cli.cash_deposit,
        equity_contribution: cli.equity_contribution,
        other_upfront_costs: cli.other_upfront_costs,
        loan_amount_override: cli.loan_amount,
        capitalize_lmi: cli.capitalize_lmi,
        interest_rate: cli.interest_rate / 100.0,
        loan_term_years: cli.loan_term,
        horizon_years: cli.projection_years,
        property_growth_rate: cli.property_growth_rate / 100.0,
        payoff_policy: cli.payoff_policy.into(),
        employment_income: cli.employment_income,
        rental_income: cli.rental_income,
        agistment_income: cli.agistment_income,
        employment_income_growth: cli.employment_income_growth / 100.0,
        rental_income_growth: cli.rental_income_growth / 100.0,
        living_expenses: cli.living_expenses,
        school_fees: cli.school_fees,
        property_running_costs: cli.property_running_costs,
        inflation_rate: cli.inflation_rate / 100.0,
        retirement_year: cli.retirement_year,
        retirement_lump_sum: cli.retirement_lump_sum,
        partner_retirement_year: cli.partner_retirement_year,
        partner_lump_sum: cli.partner_lump_sum,
        lump_sum_payoff: cli.lump_sum_payoff,
        education_change_after_years: cli.education_change_after,
        education_new_annual_fees: cli.education_new_fees,
        education_new_duration_years: cli.education_new_duration,
        ..ScenarioInputs::default()
    };
    inputs.validate().map_err(|e| e.to_string())?;
    Ok(inputs)
}

/// Command line entry point: builds or loads inputs, prints the report and writes any
/// requested files.
pub fn run_cli<I, T>(args: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    let inputs = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading scenario file {}", path.display()))?;
            load_scenario_json(&text)
                .with_context(|| format!("loading scenario file {}", path.display()))?
        }
        None => build_inputs(&cli).map_err(anyhow::Error::msg)?,
    };

    if let Some(path) = &cli.save_config {
        fs::write(path, save_scenario_json(&inputs)?)
            .with_context(|| format!("writing scenario file {}", path.display()))?;
        info!("saved scenario inputs to {}", path.display());
    }

    let projection = run_projection(&inputs)?;
    let risk = if cli.skip_risk {
        Vec::new()
    } else {
        run_risk_scenarios(&inputs, &standard_scenarios())
    };

    if let Some(path) = &cli.csv {
        let file = fs::File::create(path)
            .with_context(|| format!("creating CSV file {}", path.display()))?;
        write_projection_csv(file, &projection.years)?;
        info!("wrote {} projection rows to {}", projection.years.len(), path.display());
    }

    print!("{}", report::render_report(&projection, &risk));
    Ok(())
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .route("/api/project/config", post(project_config_handler))
        .route("/api/project.csv", post(project_csv_handler))
        .route("/api/config/default", get(default_config_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!("projection API listening on http://{addr}");
    info!("local access: http://127.0.0.1:{port}/api/project");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_get_handler(Query(payload): Query<ProjectPayload>) -> Response {
    project_handler_impl(payload).await
}

async fn project_post_handler(Json(payload): Json<ProjectPayload>) -> Response {
    project_handler_impl(payload).await
}

async fn project_handler_impl(payload: ProjectPayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => {
            warn!("rejected projection request: {msg}");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };
    respond_with_projection(request)
}

async fn project_config_handler(body: String) -> Response {
    let inputs = match load_scenario_json(&body) {
        Ok(inputs) => inputs,
        Err(e) => {
            warn!("rejected scenario config: {e}");
            return error_response(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };
    respond_with_projection(ApiRequest {
        inputs,
        include_risk: true,
    })
}

async fn project_csv_handler(Json(payload): Json<ProjectPayload>) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => {
            warn!("rejected CSV export request: {msg}");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };
    let projection = match run_projection(&request.inputs) {
        Ok(projection) => projection,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    match projection_csv(&projection.years) {
        Ok(body) => with_cache_control((
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"property_projection.csv\"",
                ),
            ],
            body,
        )),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn default_config_handler() -> Response {
    json_response(StatusCode::OK, ScenarioInputs::default())
}

fn respond_with_projection(request: ApiRequest) -> Response {
    match evaluate_request(&request) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(msg) => {
            warn!("projection failed: {msg}");
            error_response(StatusCode::BAD_REQUEST, &msg)
        }
    }
}

fn evaluate_request(request: &ApiRequest) -> Result<ProjectResponse, String> {
    let projection = run_projection(&request.inputs).map_err(|e| e.to_string())?;
    let risk = if request.include_risk {
        run_risk_scenarios(&request.inputs, &standard_scenarios())
    } else {
        Vec::new()
    };
    Ok(build_project_response(projection, risk))
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<ProjectPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: ProjectPayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.purchase_price {
        cli.purchase_price = v;
    }
    if let Some(v) = payload.cash_deposit {
        cli.cash_deposit = v;
    }
    if let Some(v) = payload.equity_contribution {
        cli.equity_contribution = v;
    }
    if let Some(v) = payload.other_upfront_costs {
        cli.other_upfront_costs = v;
    }
    if payload.loan_amount.is_some() {
        cli.loan_amount = payload.loan_amount;
    }
    if let Some(v) = payload.capitalize_lmi {
        cli.capitalize_lmi = v;
    }

    if let Some(v) = payload.interest_rate {
        cli.interest_rate = v;
    }
    if let Some(v) = payload.loan_term {
        cli.loan_term = v;
    }
    if let Some(v) = payload.projection_years {
        cli.projection_years = v;
    }
    if let Some(v) = payload.property_growth {
        cli.property_growth_rate = v;
    }
    if let Some(v) = payload.payoff_policy {
        cli.payoff_policy = v.into();
    }

    if let Some(v) = payload.employment_income {
        cli.employment_income = v;
    }
    if let Some(v) = payload.rental_income {
        cli.rental_income = v;
    }
    if let Some(v) = payload.agistment_income {
        cli.agistment_income = v;
    }
    if let Some(v) = payload.employment_income_growth {
        cli.employment_income_growth = v;
    }
    if let Some(v) = payload.rental_income_growth {
        cli.rental_income_growth = v;
    }

    if let Some(v) = payload.living_expenses {
        cli.living_expenses = v;
    }
    if let Some(v) = payload.school_fees {
        cli.school_fees = v;
    }
    if let Some(v) = payload.property_running_costs {
        cli.property_running_costs = v;
    }
    if let Some(v) = payload.inflation_rate {
        cli.inflation_rate = v;
    }

    if payload.retirement_year.is_some() {
        cli.retirement_year = payload.retirement_year;
    }
    if let Some(v) = payload.retirement_lump_sum {
        cli.retirement_lump_sum = v;
    }
    if payload.partner_retirement_year.is_some() {
        cli.partner_retirement_year = payload.partner_retirement_year;
    }
    if let Some(v) = payload.partner_lump_sum {
        cli.partner_lump_sum = v;
    }
    if let Some(v) = payload.lump_sum_payoff {
        cli.lump_sum_payoff = v;
    }

    if payload.education_change_after.is_some() {
        cli.education_change_after = payload.education_change_after;
    }
    if let Some(v) = payload.education_new_fees {
        cli.education_new_fees = v;
    }
    if let Some(v) = payload.education_new_duration {
        cli.education_new_duration = v;
    }

    let inputs = build_inputs(&cli)?;
    Ok(ApiRequest {
        inputs,
        include_risk: payload.include_risk.unwrap_or(true),
    })
}

fn default_cli_for_api() -> Cli {
    Cli {
        purchase_price: 1_700_000.0,
        cash_deposit: 50_000.0,
        equity_contribution: 1_040_000.0,
        other_upfront_costs: 5_000.0,
        loan_amount: None,
        capitalize_lmi: true,
        interest_rate: 6.0,
        loan_term: 25,
        projection_years: 25,
        property_growth_rate: 4.0,
        payoff_policy: CliPayoffPolicy::Continue,
        employment_income: 130_000.0,
        rental_income: 21_060.0,
        agistment_income: 8_320.0,
        employment_income_growth: 0.0,
        rental_income_growth: 0.0,
        living_expenses: 78_000.0,
        school_fees: 50_000.0,
        property_running_costs: 13_500.0,
        inflation_rate: 0.0,
        retirement_year: None,
        retirement_lump_sum: 0.0,
        partner_retirement_year: None,
        partner_lump_sum: 0.0,
        lump_sum_payoff: false,
        education_change_after: None,
        education_new_fees: 0.0,
        education_new_duration: 0,
        config: None,
        save_config: None,
        csv: None,
        skip_risk: false,
    }
}

fn build_project_response(
    projection: Projection,
    risk_scenarios: Vec<RiskScenarioResult>,
) -> ProjectResponse {
    let risk_assessment = assess_risk(&risk_scenarios);
    ProjectResponse {
        upfront: projection.upfront,
        annual_repayment: projection.annual_repayment,
        metrics: projection.metrics,
        years: projection.years,
        risk_scenarios,
        risk_assessment,
    }
}
