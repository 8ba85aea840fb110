// ===============================
// src/pipeline.rs
// ===============================
//
// Satu aksi operator = satu pipeline berurutan:
//   calculate -> render -> stage (tempdir) -> sync -> salinan lokal -> cleanup
// Staging dir dihapus otomatis (Drop) di semua jalur keluar.
//
use std::path::{Path, PathBuf};

use anyhow::Context;
use rust_decimal::Decimal;
use tempfile::TempDir;
use tracing::{info, warn};

use crate::archive::{archive_document, ArchiveReceipt, ArchiveStore, SyncError};
use crate::config::AppConfig;
use crate::domain::{Bill, BillingPeriod, TenantIdentity, TenantReading};
use crate::render::{document_file_name, BillRenderer};
use crate::tariff::TariffCalculator;

/// Input form operator untuk satu penyewa.
#[derive(Debug, Clone)]
pub struct BillRequest {
    pub period: BillingPeriod,
    pub total_pump_cost: Decimal,
    pub occupant_count: u32,
    pub tenant: TenantIdentity,
    pub previous_reading: Decimal,
    pub current_reading: Decimal,
    pub rent: Decimal,
    pub dues: Decimal,
}

impl BillRequest {
    pub fn reading(&self) -> TenantReading {
        TenantReading {
            tenant: self.tenant.clone(),
            previous_reading: self.previous_reading,
            current_reading: self.current_reading,
            rent: self.rent,
            dues_carried_forward: self.dues,
        }
    }
}

pub enum ArchiveTarget<'a> {
    Disabled,
    /// Store could not be reached (e.g. credentials); reported as a failed sync.
    Unavailable(SyncError),
    Store { store: &'a dyn ArchiveStore, root_folder_id: &'a str },
}

#[derive(Debug)]
pub enum SyncOutcome {
    Archived(ArchiveReceipt),
    Skipped,
    Failed(String),
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub bill: Bill,
    pub file_name: String,
    /// Salinan untuk operator; selalu ada kalau sync tidak berhasil.
    pub local_copy: Option<PathBuf>,
    pub sync: SyncOutcome,
}

/// Rendered PDF in a private temp dir, removed when dropped.
struct StagedDocument {
    _dir: TempDir,
    path: PathBuf,
}

impl StagedDocument {
    fn write(file_name: &str, bytes: &[u8]) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("tenant-bill-").tempdir()?;
        let path = dir.path().join(file_name);
        std::fs::write(&path, bytes)?;
        Ok(Self { _dir: dir, path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

pub struct Pipeline {
    calculator: TariffCalculator,
    renderer: BillRenderer,
}

impl Pipeline {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            calculator: TariffCalculator::new(cfg.tariff.clone()),
            renderer: BillRenderer::new(cfg.property.clone()),
        }
    }

    pub fn calculate(&self, req: &BillRequest) -> anyhow::Result<Bill> {
        let shared = self.calculator.shared_inputs(req.total_pump_cost, req.occupant_count);
        let bill = self
            .calculator
            .calculate(&req.period, &shared, &req.reading())
            .context("invalid bill details")?;
        Ok(bill)
    }

    /// `output_dir`: where the operator copy goes. `None` keeps a copy only when sync did not succeed
    /// (written to the current directory).
    pub async fn run(
        &self,
        req: &BillRequest,
        target: ArchiveTarget<'_>,
        output_dir: Option<&Path>,
    ) -> anyhow::Result<PipelineOutcome> {
        let bill = self.calculate(req)?;
        info!(
            period = %bill.period.label(),
            tenant = %req.tenant.name,
            total = %bill.display_total(),
            arrears = bill.has_arrears(),
            "bill calculated"
        );

        let bytes = self.renderer.render(&bill, &req.tenant).context("rendering bill")?;
        let file_name = document_file_name(bill.period.label(), &req.tenant.name);
        let staged = StagedDocument::write(&file_name, &bytes).context("staging rendered bill")?;

        let sync = match target {
            ArchiveTarget::Disabled => SyncOutcome::Skipped,
            ArchiveTarget::Unavailable(e) => {
                warn!(error = %e, "archive unavailable, bill kept locally");
                SyncOutcome::Failed(e.to_string())
            }
            ArchiveTarget::Store { store, root_folder_id } => {
                match archive_document(store, root_folder_id, &bill.period.folder_label(), staged.path()).await {
                    Ok(receipt) => SyncOutcome::Archived(receipt),
                    Err(e) => {
                        warn!(error = %e, "sync failed, but PDF generated");
                        SyncOutcome::Failed(e.to_string())
                    }
                }
            }
        };

        let archived = matches!(sync, SyncOutcome::Archived(_));
        let local_copy = if output_dir.is_some() || !archived {
            let dir = output_dir.unwrap_or_else(|| Path::new("."));
            match save_copy(dir, &file_name, &bytes).await {
                Ok(dest) => {
                    info!(path = %dest.display(), "local copy saved");
                    Some(dest)
                }
                // Sudah ada di arsip: salinan lokal gagal cukup warning.
                Err(e) if archived => {
                    let error = format!("{e:#}");
                    warn!(%error, "local copy failed, bill is archived");
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        Ok(PipelineOutcome { bill, file_name, local_copy, sync })
    }
}

async fn save_copy(dir: &Path, file_name: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await.with_context(|| format!("creating {}", dir.display()))?;
    let dest = dir.join(file_name);
    tokio::fs::write(&dest, bytes).await.with_context(|| format!("writing {}", dest.display()))?;
    Ok(dest)
}
