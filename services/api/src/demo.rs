use crate::infra::{parse_date, parse_insurance_type, InMemoryBlobStore, InMemoryLeadStore};
use chrono::{Duration, Local, NaiveDate};
use clap::Args;
use quote_intake::error::AppError;
use quote_intake::workflows::quote::{
    classify, format_file_size, InsuranceType, LeadPatch, PolicyDocument, QuoteIntakeService,
    SessionError, SessionId, SubmissionGateway, VehicleCount, WizardView, CLOSE_DELAY,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct ClassifyArgs {
    /// Requested coverage start date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) start_date: NaiveDate,
    /// Classification date (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Declarations page to attach; content type is guessed from the extension.
    #[arg(long)]
    pub(crate) file: Option<PathBuf>,
    /// Coverage line the demo prospect asks about (auto, home, or commercial).
    #[arg(long, value_parser = parse_insurance_type, default_value = "auto")]
    pub(crate) insurance_type: InsuranceType,
    /// Days between today and the requested start date.
    #[arg(long, default_value_t = 5)]
    pub(crate) days_out: i64,
}

pub(crate) fn run_classify(args: ClassifyArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let classification = classify(args.start_date, today);

    println!("Lead classification");
    println!("- Start date: {} (today {})", args.start_date, today);
    println!(
        "- Days until effective: {}",
        classification.days_until_effective
    );
    println!(
        "- Hot lead: {}",
        if classification.is_hot_lead { "yes" } else { "no" }
    );
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        file,
        insurance_type,
        days_out,
    } = args;

    let blobs = InMemoryBlobStore::default();
    let leads = InMemoryLeadStore::default();
    let gateway = SubmissionGateway::new(Arc::new(blobs.clone()), Arc::new(leads.clone()));
    let service = QuoteIntakeService::new(Arc::new(gateway));

    println!("Quote intake wizard demo");
    let (id, view) = service.open();
    render_step(&id, &view);

    let window = service.start_date_window();
    println!(
        "  Start dates offered: {} through {}",
        window.earliest, window.latest
    );
    for quick in window.quick_selections() {
        println!("  - {}: {}", quick.label, quick.date);
    }

    if let Err(SessionError::Rejected { view, .. }) = service.advance(&id) {
        println!("  Continue without a selection is blocked:");
        render_errors(&view);
    }

    service.update(&id, LeadPatch::insurance_type(insurance_type))?;
    render_step(&id, &service.advance(&id)?);

    let start_date = window.earliest + Duration::days(days_out.clamp(0, 30));
    service.update(&id, LeadPatch::start_date(start_date))?;
    render_step(&id, &service.advance(&id)?);

    service.update(
        &id,
        LeadPatch::contact("Jordan Rivera", "jordan.rivera@example.com", "5558675309"),
    )?;
    match insurance_type {
        InsuranceType::Auto => {
            service.update(&id, LeadPatch::vehicle_count(VehicleCount::Two))?;
        }
        InsuranceType::Home => {
            service.update(&id, LeadPatch::property_address("41 Lakeview Dr, Madison, WI"))?;
        }
        InsuranceType::Commercial => {}
    }
    let view = service.advance(&id)?;
    println!(
        "  Contact: {} <{}> {}",
        view.record.full_name, view.record.email, view.record.phone
    );
    render_step(&id, &view);

    let document = load_document(file)?;
    let view = service.attach_document(&id, document)?;
    if let Some(document) = &view.record.document {
        println!(
            "  Attached {} ({}, {})",
            document.file_name,
            document.kind,
            format_file_size(document.size)
        );
    }

    let view = service.submit(&id).await?;
    println!(
        "\nSubmitted lead {}",
        view.lead_id
            .as_ref()
            .map(|lead| lead.0.as_str())
            .unwrap_or("<unknown>")
    );
    for row in leads.rows() {
        println!(
            "- {} lead for {} starting {}",
            row.insurance_type, row.full_name, row.effective_date
        );
        println!(
            "  {} day(s) until effective | hot lead: {}",
            row.days_until_effective,
            if row.is_hot_lead { "yes" } else { "no" }
        );
        if let Some(address) = &row.property_address {
            println!("  Property: {address}");
        }
        if let Some(count) = &row.vehicle_count {
            println!("  Vehicles: {count}");
        }
        println!(
            "  Document: {}",
            row.policy_document_url.as_deref().unwrap_or("none")
        );
    }
    println!("- {} object(s) stored", blobs.objects().len());
    println!(
        "  Wizard closes {} ms after success",
        CLOSE_DELAY.as_millis()
    );

    service.close(&id)?;
    Ok(())
}

fn load_document(file: Option<PathBuf>) -> Result<PolicyDocument, AppError> {
    let Some(path) = file else {
        return Ok(PolicyDocument::new(
            "declarations-page.pdf",
            "application/pdf",
            b"%PDF-1.7\n% demo declarations page\n".to_vec(),
        ));
    };

    let bytes = std::fs::read(&path)?;
    let content_type = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    Ok(PolicyDocument::new(file_name, content_type, bytes))
}

fn render_step(id: &SessionId, view: &WizardView) {
    println!(
        "\n[{}] Step {} of {}: {} ({}%)",
        id, view.current_step, view.total_steps, view.step_label, view.progress_percent
    );
}

fn render_errors(view: &WizardView) {
    for (field, message) in &view.errors {
        println!("    - {field:?}: {message}");
    }
}
