// ===============================
// src/main.rs
// ===============================
/*
 # preview (tanpa PDF, tanpa sync)
 tenant-bill preview --tenant-name "Ravi Kumar" --pump-bill 600 --occupants 3 \
     --previous-reading 100 --current-reading 150 --rent 5000

 # generate + sync ke Drive, salinan lokal di ./bills
 tenant-bill generate --period "March 2025" --tenant-id P001 --tenant-name "Ravi Kumar" \
     --pump-bill 600 --occupants 3 --previous-reading 100 --current-reading 150 \
     --rent 5000 --dues 150 --output-dir bills
*/
/*
=============================================================================
Project : tenant_bill_rust — monthly tenant utility bill generator in Rust
Module  : main.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
License : MIT (see LICENSE)

Summary : Computes one tenant's monthly bill (rent, metered electricity,
          shared pump cost, society charge, arrears), renders it as a PDF
          and archives it into a per-month Google Drive folder.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
mod archive;
mod config;
mod credentials;
mod domain;
mod drive;     // Google Drive v3 REST (ArchiveStore)
mod pipeline;
mod render;    // PDF (lopdf)
mod tariff;

use std::path::PathBuf;

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::domain::{format_units, BillingPeriod, TenantIdentity};
use crate::drive::DriveClient;
use crate::pipeline::{ArchiveTarget, BillRequest, Pipeline, SyncOutcome};

#[derive(Parser)]
#[command(
    name = "tenant-bill",
    about = "Generate a tenant's monthly utility bill as PDF and archive it to Google Drive",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Calculate, render, sync and keep a local copy
    Generate {
        #[command(flatten)]
        bill: BillArgs,
        /// Directory for the operator copy (default: only kept when sync does not succeed)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Skip the Drive upload
        #[arg(long)]
        no_sync: bool,
    },
    /// Print the line items without rendering or syncing
    Preview {
        #[command(flatten)]
        bill: BillArgs,
    },
}

#[derive(Args)]
struct BillArgs {
    /// Billing month label, e.g. "March 2025" (default: current month)
    #[arg(long)]
    period: Option<String>,
    /// Total pump/motor bill for the building
    #[arg(long, default_value = "0")]
    pump_bill: Decimal,
    /// Total persons in the building
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    occupants: u32,
    /// Person ID, e.g. P001
    #[arg(long, default_value = "")]
    tenant_id: String,
    #[arg(long)]
    tenant_name: String,
    #[arg(long, default_value = "0")]
    previous_reading: Decimal,
    #[arg(long, default_value = "0")]
    current_reading: Decimal,
    /// Monthly rent
    #[arg(long, default_value = "0")]
    rent: Decimal,
    /// Previous dues carried forward
    #[arg(long, default_value = "0")]
    dues: Decimal,
}

impl BillArgs {
    fn into_request(self) -> BillRequest {
        let period = match self.period {
            Some(p) if !p.trim().is_empty() => BillingPeriod::new(p),
            _ => BillingPeriod::current(Local::now()),
        };
        BillRequest {
            period,
            total_pump_cost: self.pump_bill,
            occupant_count: self.occupants,
            tenant: TenantIdentity { id: self.tenant_id, name: self.tenant_name },
            previous_reading: self.previous_reading,
            current_reading: self.current_reading,
            rent: self.rent,
            dues: self.dues,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ---- Args dulu (supaya --help jalan walau .env rusak), lalu config ----
    let cli = Cli::parse();
    let cfg = config::load()?;
    let pipeline = Pipeline::new(&cfg);

    match cli.command {
        Command::Preview { bill } => {
            let req = bill.into_request();
            let bill = pipeline.calculate(&req)?;
            println!("BILL INVOICE - {}", bill.period.label());
            println!("Name: {} (ID: {})", req.tenant.name, req.tenant.id);
            println!("Units consumed: {}", format_units(bill.consumed_units));
            for item in &bill.items {
                println!("{:<40} {:>12}", item.label, item.display_amount());
            }
            println!("{:<40} {:>12}", "TOTAL PAYABLE", bill.display_total());
        }
        Command::Generate { bill, output_dir, no_sync } => {
            let req = bill.into_request();

            info!(
                property = %cfg.property.name,
                rate_per_unit = %cfg.tariff.rate_per_unit,
                society_charge = %cfg.tariff.society_charge,
                archive = cfg.archive.enabled && !no_sync,
                "startup config"
            );

            // Validasi dulu sebelum menyentuh Drive
            pipeline.calculate(&req)?;

            let mut connect_error = None;
            let client = if cfg.archive.enabled && !no_sync {
                match DriveClient::connect(&cfg.archive).await {
                    Ok(c) => Some(c),
                    Err(e) => {
                        connect_error = Some(e);
                        None
                    }
                }
            } else {
                None
            };
            let target = match (&client, connect_error) {
                (Some(c), _) => ArchiveTarget::Store { store: c, root_folder_id: &cfg.archive.root_folder_id },
                (None, Some(e)) => ArchiveTarget::Unavailable(e),
                (None, None) => ArchiveTarget::Disabled,
            };

            let outcome = pipeline.run(&req, target, output_dir.as_deref()).await?;

            println!("Bill: {} (total {})", outcome.file_name, outcome.bill.display_total());
            match &outcome.sync {
                SyncOutcome::Archived(r) => println!("Synced to Drive folder {} (file {})", r.folder_id, r.file_id),
                SyncOutcome::Skipped => println!("Sync skipped"),
                SyncOutcome::Failed(e) => println!("Sync failed, but PDF generated. Error: {e}"),
            }
            if let Some(path) = &outcome.local_copy {
                println!("Local copy: {}", path.display());
            }
        }
    }
    Ok(())
}
